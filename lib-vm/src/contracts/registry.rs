//! Registry Reads
//!
//! Read-only probes into the mintage and pledge contracts' storage. Both
//! registries are external collaborators; during DEX execution they are
//! consulted against committed state only, never through an overlay.

use lib_types::{Address, TokenTag};

use crate::contracts::{ADDRESS_MINTAGE, ADDRESS_PLEDGE};
use crate::storage::keys::{mintage_key, pledge_key};
use crate::storage::{ChainEnv, StorageResult, VmDatabase};

/// True iff the token registry holds a mintage record for `tag`
pub fn token_registered(db: &VmDatabase<'_>, tag: &TokenTag) -> StorageResult<bool> {
    Ok(db.get_external(&ADDRESS_MINTAGE, &mintage_key(tag))?.is_some())
}

/// Beneficial pledge amount backing `beneficiary`'s quota (0 when absent)
///
/// The record is a big-endian unsigned integer of at most 16 bytes; wider
/// records saturate, which the section-table ceiling absorbs.
pub fn pledge_beneficial_amount(
    env: &dyn ChainEnv,
    beneficiary: &Address,
) -> StorageResult<u128> {
    match env.storage_get(&ADDRESS_PLEDGE, &pledge_key(beneficiary))? {
        Some(bytes) if !bytes.is_empty() => Ok(amount_from_be_bytes(&bytes)),
        _ => Ok(0),
    }
}

fn amount_from_be_bytes(bytes: &[u8]) -> u128 {
    if bytes.len() > 16 {
        let (head, tail) = bytes.split_at(bytes.len() - 16);
        if head.iter().any(|&b| b != 0) {
            return u128::MAX;
        }
        return amount_from_be_bytes(tail);
    }
    let mut raw = [0u8; 16];
    raw[16 - bytes.len()..].copy_from_slice(bytes);
    u128::from_be_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryChain;

    #[test]
    fn test_token_registered_probe() {
        let mut chain = MemoryChain::new();
        let vite = TokenTag::new(*b"VITE TOKEN");
        let eth = TokenTag::new(*b"ETH  TOKEN");
        chain.register_token(&vite);

        let db = VmDatabase::new(&mut chain, Address::zero());
        assert!(token_registered(&db, &vite).unwrap());
        assert!(!token_registered(&db, &eth).unwrap());
    }

    #[test]
    fn test_pledge_amount_defaults_to_zero() {
        let chain = MemoryChain::new();
        let user = Address::new([5u8; 21]);
        assert_eq!(pledge_beneficial_amount(&chain, &user).unwrap(), 0);
    }

    #[test]
    fn test_pledge_amount_roundtrip() {
        let mut chain = MemoryChain::new();
        let user = Address::new([5u8; 21]);
        chain.set_pledge(&user, 10_000_000);
        assert_eq!(
            pledge_beneficial_amount(&chain, &user).unwrap(),
            10_000_000
        );
    }

    #[test]
    fn test_amount_parsing_widths() {
        assert_eq!(amount_from_be_bytes(&[0x01]), 1);
        assert_eq!(amount_from_be_bytes(&[0x01, 0x00]), 256);
        // 17 bytes with zero head parses the low 16
        let mut wide = vec![0u8; 17];
        wide[16] = 0x2a;
        assert_eq!(amount_from_be_bytes(&wide), 42);
        // non-zero head saturates
        let mut huge = vec![0xff; 17];
        huge[0] = 0x01;
        assert_eq!(amount_from_be_bytes(&huge), u128::MAX);
    }
}
