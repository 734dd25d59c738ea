//! Key Encoding Helpers
//!
//! Key encoding is PROTOCOL. These functions define the canonical byte
//! layout for all storage keys. Never inline key construction in business
//! logic.
//!
//! # Format Conventions
//!
//! - Composite keys are big-endian byte concatenation of fixed-width fields
//! - Prefix bytes namespace record kinds within one contract's storage
//! - No key is a prefix of another record kind under the same contract

use lib_types::{Address, TokenTag, ADDRESS_LEN, TOKEN_TAG_LEN};

/// Record-kind prefix for fund records under the Fund contract
pub const FUND_KEY_PREFIX: u8 = 0x01;

/// Record-kind prefix for mintage records under the Mintage contract
pub const MINTAGE_KEY_PREFIX: u8 = 0x01;

/// Record-kind prefix for beneficial pledge amounts under the Pledge contract
pub const PLEDGE_KEY_PREFIX: u8 = 0x02;

/// Singleton key for the Fund contract's monotonic order serial
pub const ORDER_SERIAL_KEY: [u8; 1] = [0x03];

/// Key for a user's fund record: `0x01 || address(21)` = 22 bytes
#[inline]
pub fn fund_key(owner: &Address) -> [u8; 1 + ADDRESS_LEN] {
    let mut key = [0u8; 1 + ADDRESS_LEN];
    key[0] = FUND_KEY_PREFIX;
    key[1..].copy_from_slice(owner.as_bytes());
    key
}

/// Parse the owner address back out of a fund key
#[inline]
pub fn parse_fund_key(key: &[u8]) -> Option<Address> {
    if key.len() != 1 + ADDRESS_LEN || key[0] != FUND_KEY_PREFIX {
        return None;
    }
    Address::from_slice(&key[1..])
}

/// Key for a token's mintage record: `0x01 || tag(10)` = 11 bytes
#[inline]
pub fn mintage_key(tag: &TokenTag) -> [u8; 1 + TOKEN_TAG_LEN] {
    let mut key = [0u8; 1 + TOKEN_TAG_LEN];
    key[0] = MINTAGE_KEY_PREFIX;
    key[1..].copy_from_slice(tag.as_bytes());
    key
}

/// Key for a beneficiary's pledge amount: `0x02 || beneficiary(21)` = 22 bytes
#[inline]
pub fn pledge_key(beneficiary: &Address) -> [u8; 1 + ADDRESS_LEN] {
    let mut key = [0u8; 1 + ADDRESS_LEN];
    key[0] = PLEDGE_KEY_PREFIX;
    key[1..].copy_from_slice(beneficiary.as_bytes());
    key
}
