//! State Store Facade
//!
//! Contract execution never touches the node's store directly. All reads
//! and writes go through [`VmDatabase`], a per-contract view that shadows
//! the committed snapshot with a transient *unsaved overlay*:
//!
//! - reads consult the overlay first, then the snapshot
//! - writes go to the overlay
//! - an empty-byte write is semantically a delete
//! - `commit` flushes the overlay into the snapshot atomically at block
//!   finalization; `discard` drops it
//!
//! The committed snapshot itself, together with the ledger queries the quota
//! engine needs, is abstracted behind [`ChainEnv`] — the narrow interface
//! the surrounding node implements.

pub mod keys;
pub mod overlay;

use thiserror::Error;
use tracing::trace;

use lib_types::{AccountBlock, Address, Amount, SnapshotBlock, TokenTag};

use self::overlay::UnsavedOverlay;

/// Error from the underlying store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("missing snapshot block referenced by account chain")]
    MissingSnapshot,
}

/// Result type for store operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Node-side collaborators of the VM
///
/// Committed per-contract storage, the external token balance ledger, and
/// the block queries the quota engine walks. The ledger serializes receives
/// per account, so a single `&mut` borrow of the environment is the
/// concurrency model.
pub trait ChainEnv {
    /// Read committed storage under a contract address
    fn storage_get(&self, addr: &Address, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Write committed storage (called only by `VmDatabase::commit`)
    fn storage_put(&mut self, addr: &Address, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Delete committed storage (called only by `VmDatabase::commit`)
    fn storage_delete(&mut self, addr: &Address, key: &[u8]) -> StorageResult<()>;

    /// External ledger balance of an account (0 when absent)
    fn balance(&self, addr: &Address, token: &TokenTag) -> StorageResult<Amount>;

    /// Overwrite an external ledger balance
    fn set_balance(&mut self, addr: &Address, token: &TokenTag, amount: Amount)
        -> StorageResult<()>;

    /// Latest block on an account's chain
    fn prev_account_block(&self, addr: &Address) -> StorageResult<Option<AccountBlock>>;

    /// Look up an account block by hash
    fn account_block_by_hash(&self, hash: &lib_types::Hash)
        -> StorageResult<Option<AccountBlock>>;

    /// The snapshot block new account blocks reference
    fn current_snapshot(&self) -> StorageResult<SnapshotBlock>;

    /// Look up a snapshot block by hash
    fn snapshot_by_hash(&self, hash: &lib_types::Hash) -> StorageResult<Option<SnapshotBlock>>;
}

/// Per-contract storage view with an unsaved overlay
///
/// Owned exclusively by the in-flight block. On successful finalization the
/// overlay is merged into the committed snapshot; on error it is discarded.
pub struct VmDatabase<'a> {
    env: &'a mut dyn ChainEnv,
    addr: Address,
    unsaved: UnsavedOverlay,
}

impl<'a> VmDatabase<'a> {
    /// Bind a fresh overlay to `addr`'s storage
    pub fn new(env: &'a mut dyn ChainEnv, addr: Address) -> Self {
        Self {
            env,
            addr,
            unsaved: UnsavedOverlay::new(),
        }
    }

    /// The contract address this view is scoped to
    pub fn contract_address(&self) -> &Address {
        &self.addr
    }

    /// Read a value: overlay first, then the committed snapshot
    pub fn get_value(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        if let Some(value) = self.unsaved.get(key) {
            // Empty overlay bytes record a pending delete.
            if value.is_empty() {
                return Ok(None);
            }
            return Ok(Some(value.to_vec()));
        }
        self.get_committed(key)
    }

    /// Read the committed value, bypassing the overlay
    pub fn get_committed(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        match self.env.storage_get(&self.addr, key)? {
            Some(v) if v.is_empty() => Ok(None),
            other => Ok(other),
        }
    }

    /// Stage a write in the overlay
    pub fn set_value(&mut self, key: &[u8], value: &[u8]) {
        self.unsaved.set(key, value);
    }

    /// Stage a delete in the overlay
    pub fn delete_value(&mut self, key: &[u8]) {
        self.unsaved.set(key, &[]);
    }

    /// Read another contract's committed storage (registry probes)
    pub fn get_external(&self, addr: &Address, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        match self.env.storage_get(addr, key)? {
            Some(v) if v.is_empty() => Ok(None),
            other => Ok(other),
        }
    }

    /// Flush the overlay into the committed snapshot
    ///
    /// Consumes the view; the single transaction boundary per receive.
    pub fn commit(self) -> StorageResult<()> {
        let VmDatabase { env, addr, unsaved } = self;
        let writes = unsaved.into_writes();
        trace!(contract = %addr, writes = writes.len(), "committing unsaved overlay");
        for (key, value) in writes {
            if value.is_empty() {
                env.storage_delete(&addr, &key)?;
            } else {
                env.storage_put(&addr, &key, &value)?;
            }
        }
        Ok(())
    }

    /// Drop all staged writes
    pub fn discard(&mut self) {
        self.unsaved.clear();
    }

    /// Number of staged overlay entries
    pub fn pending_writes(&self) -> usize {
        self.unsaved.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryChain;

    fn addr(b: u8) -> Address {
        Address::new([b; 21])
    }

    #[test]
    fn test_read_through_overlay() {
        let mut chain = MemoryChain::new();
        let contract = addr(1);
        chain
            .storage_put(&contract, b"key", b"committed")
            .unwrap();

        let mut db = VmDatabase::new(&mut chain, contract);
        assert_eq!(db.get_value(b"key").unwrap().unwrap(), b"committed");

        db.set_value(b"key", b"staged");
        assert_eq!(db.get_value(b"key").unwrap().unwrap(), b"staged");
        // Committed view is unchanged until commit.
        assert_eq!(db.get_committed(b"key").unwrap().unwrap(), b"committed");
    }

    #[test]
    fn test_empty_write_is_delete() {
        let mut chain = MemoryChain::new();
        let contract = addr(1);
        chain.storage_put(&contract, b"key", b"value").unwrap();

        let mut db = VmDatabase::new(&mut chain, contract);
        db.delete_value(b"key");
        assert_eq!(db.get_value(b"key").unwrap(), None);

        db.commit().unwrap();
        assert_eq!(chain.storage_get(&contract, b"key").unwrap(), None);
    }

    #[test]
    fn test_discard_drops_staged_writes() {
        let mut chain = MemoryChain::new();
        let contract = addr(1);

        let mut db = VmDatabase::new(&mut chain, contract);
        db.set_value(b"key", b"staged");
        db.discard();
        assert_eq!(db.get_value(b"key").unwrap(), None);
        db.commit().unwrap();

        assert_eq!(chain.storage_get(&contract, b"key").unwrap(), None);
    }

    #[test]
    fn test_commit_flushes_all_writes() {
        let mut chain = MemoryChain::new();
        let contract = addr(1);

        let mut db = VmDatabase::new(&mut chain, contract);
        db.set_value(b"a", b"1");
        db.set_value(b"b", b"2");
        db.commit().unwrap();

        assert_eq!(chain.storage_get(&contract, b"a").unwrap().unwrap(), b"1");
        assert_eq!(chain.storage_get(&contract, b"b").unwrap().unwrap(), b"2");
    }

    #[test]
    fn test_external_read_is_committed_only() {
        let mut chain = MemoryChain::new();
        let this = addr(1);
        let other = addr(2);
        chain.storage_put(&other, b"probe", b"yes").unwrap();

        let db = VmDatabase::new(&mut chain, this);
        assert_eq!(db.get_external(&other, b"probe").unwrap().unwrap(), b"yes");
        assert_eq!(db.get_external(&other, b"missing").unwrap(), None);
    }
}
