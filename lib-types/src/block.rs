//! Account and Snapshot Block Types
//!
//! An account block is the unit of ledger mutation. Every transaction is a
//! *pair* of blocks: a send block appended to the originator's chain and a
//! matching receive block appended to the destination's chain. Blocks are
//! immutable once appended; re-execution is prevented by unique hashing at
//! the ledger layer.
//!
//! A snapshot block is a consensus checkpoint. The quota engine measures the
//! height gap between the snapshot an account block references and the
//! snapshot its predecessor referenced.

use serde::{Deserialize, Serialize};

use crate::primitives::{Address, Amount, BlockHeight, Hash, TokenTag};

/// Kind of an account block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BlockType {
    /// A send calling a method or transferring value
    #[default]
    SendCall,
    /// A successful receive paired with a send
    Receive,
    /// A failed receive; persists and consumes quota, storage unchanged
    ReceiveError,
}

impl BlockType {
    /// True for the send half of a pair
    pub fn is_send(&self) -> bool {
        matches!(self, BlockType::SendCall)
    }

    /// True for either receive outcome
    pub fn is_receive(&self) -> bool {
        matches!(self, BlockType::Receive | BlockType::ReceiveError)
    }
}

/// The unit of ledger mutation
///
/// Immutable once appended. `nonce` is the proof-of-work witness; a
/// non-empty nonce marks the block as claiming PoW quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AccountBlock {
    /// Originating account
    pub account_address: Address,
    /// Destination account
    pub to_address: Address,
    /// Transferred asset (zero tag when no value moves)
    pub token: TokenTag,
    /// Transferred amount in smallest units
    pub amount: Amount,
    /// Opaque call payload (ABI method id + packed args, or empty)
    pub data: Vec<u8>,
    /// Send/receive discriminator
    pub block_type: BlockType,
    /// Quota consumed by executing this block
    pub quota: u64,
    /// Proof-of-work witness; empty when no PoW was computed
    pub nonce: Vec<u8>,
    /// Hash of the previous block on this account's chain
    pub prev_hash: Hash,
    /// Hash of the snapshot block this block references
    pub snapshot_hash: Hash,
    /// Position on this account's chain
    pub height: BlockHeight,
    /// Unix seconds; receive blocks stamp their appended sends with this
    pub timestamp: i64,
    /// Unique block hash assigned by the ledger
    pub hash: Hash,
}

impl AccountBlock {
    /// True when the block carries a PoW witness
    pub fn has_pow_nonce(&self) -> bool {
        !self.nonce.is_empty()
    }

    /// True when the block moves value (as opposed to a pure call)
    pub fn is_transfer(&self) -> bool {
        self.amount > 0
    }
}

/// Consensus checkpoint referenced by account blocks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SnapshotBlock {
    /// Unique snapshot hash
    pub hash: Hash,
    /// Position on the snapshot chain
    pub height: BlockHeight,
    /// Unix seconds
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_type_classification() {
        assert!(BlockType::SendCall.is_send());
        assert!(!BlockType::SendCall.is_receive());
        assert!(BlockType::Receive.is_receive());
        assert!(BlockType::ReceiveError.is_receive());
        assert!(!BlockType::ReceiveError.is_send());
    }

    #[test]
    fn test_pow_nonce_detection() {
        let mut block = AccountBlock::default();
        assert!(!block.has_pow_nonce());
        block.nonce = vec![0xde, 0xad];
        assert!(block.has_pow_nonce());
    }
}
