//! Canonical Primitive Types
//!
//! These types are the foundational building blocks for all
//! consensus-critical data structures. They are designed to be:
//! - Fixed-size (no dynamic allocation)
//! - Deterministically serializable
//! - Efficient to copy and compare

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// TYPE ALIASES
// ============================================================================

/// Block height in an account chain or the snapshot chain (1-indexed)
pub type BlockHeight = u64;

/// Ledger transfer amounts (smallest token unit)
pub type Amount = u128;

// ============================================================================
// HASH
// ============================================================================

/// 32-byte block hash
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize, Default)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// Create a new Hash from raw bytes
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create a zeroed Hash
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Get the underlying bytes
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// ============================================================================
// ADDRESS
// ============================================================================

/// Byte length of an account address
pub const ADDRESS_LEN: usize = 21;

/// 21-byte account identifier
///
/// Two kinds of account share this type: user accounts (externally
/// controlled) and contract accounts (code-bound). Well-known contract
/// addresses are hard-coded constants in the runtime.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize, Default)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// Create a new Address from raw bytes
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Create a zeroed Address
    pub const fn zero() -> Self {
        Self([0u8; ADDRESS_LEN])
    }

    /// Get the underlying bytes
    pub const fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Parse an address from a byte slice of exactly [`ADDRESS_LEN`] bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; ADDRESS_LEN] = bytes.try_into().ok()?;
        Some(Self(raw))
    }

    /// Check if this is the zero address
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; ADDRESS_LEN]> for Address {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// ============================================================================
// TOKEN TAG
// ============================================================================

/// Byte length of a token tag
pub const TOKEN_TAG_LEN: usize = 10;

/// 10-byte asset identifier
///
/// A tag is *valid* iff the global token registry (the mintage contract's
/// storage) holds a mintage record under it.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize, Default)]
pub struct TokenTag(pub [u8; TOKEN_TAG_LEN]);

impl TokenTag {
    /// Create a new TokenTag from raw bytes
    pub const fn new(bytes: [u8; TOKEN_TAG_LEN]) -> Self {
        Self(bytes)
    }

    /// Create a zeroed TokenTag
    pub const fn zero() -> Self {
        Self([0u8; TOKEN_TAG_LEN])
    }

    /// Get the underlying bytes
    pub const fn as_bytes(&self) -> &[u8; TOKEN_TAG_LEN] {
        &self.0
    }

    /// Parse a tag from a byte slice of exactly [`TOKEN_TAG_LEN`] bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; TOKEN_TAG_LEN] = bytes.try_into().ok()?;
        Some(Self(raw))
    }

    /// Check if this is the zero tag
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; TOKEN_TAG_LEN]
    }
}

impl fmt::Debug for TokenTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenTag({})", hex::encode(self.0))
    }
}

impl fmt::Display for TokenTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; TOKEN_TAG_LEN]> for TokenTag {
    fn from(bytes: [u8; TOKEN_TAG_LEN]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for TokenTag {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_from_slice_length() {
        assert!(Address::from_slice(&[0u8; ADDRESS_LEN]).is_some());
        assert!(Address::from_slice(&[0u8; ADDRESS_LEN - 1]).is_none());
        assert!(Address::from_slice(&[0u8; ADDRESS_LEN + 1]).is_none());
    }

    #[test]
    fn test_token_tag_from_slice_length() {
        assert!(TokenTag::from_slice(&[0u8; TOKEN_TAG_LEN]).is_some());
        assert!(TokenTag::from_slice(&[0u8; 9]).is_none());
        assert!(TokenTag::from_slice(&[0u8; 11]).is_none());
    }

    #[test]
    fn test_zero_checks() {
        assert!(Address::zero().is_zero());
        assert!(TokenTag::zero().is_zero());
        assert!(Hash::zero().is_zero());
        assert!(!Address::new([1u8; ADDRESS_LEN]).is_zero());
    }

    #[test]
    fn test_display_is_hex() {
        let tag = TokenTag::new(*b"VITE TOKEN");
        assert_eq!(tag.to_string(), hex::encode(b"VITE TOKEN"));
    }
}
