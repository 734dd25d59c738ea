//! In-Memory Chain Environment
//!
//! A complete [`ChainEnv`] over hash maps, used by unit and integration
//! tests. Behaves like the production collaborators: per-contract storage
//! trees, an external balance ledger, per-account block chains linked by
//! prev-hash, and a snapshot chain the quota engine measures gaps against.

use std::collections::{BTreeMap, HashMap};

use lib_types::{AccountBlock, Address, Amount, Hash, SnapshotBlock, TokenTag};

use crate::contracts::{ADDRESS_MINTAGE, ADDRESS_PLEDGE};
use crate::storage::keys::{mintage_key, pledge_key};
use crate::storage::{ChainEnv, StorageResult};

/// Unix-seconds base for the synthetic snapshot chain
const GENESIS_TIMESTAMP: i64 = 1_600_000_000;

/// Hash-map-backed chain environment
pub struct MemoryChain {
    storage: HashMap<Address, BTreeMap<Vec<u8>, Vec<u8>>>,
    balances: HashMap<(Address, TokenTag), Amount>,
    blocks: HashMap<Hash, AccountBlock>,
    heads: HashMap<Address, Hash>,
    snapshots: HashMap<Hash, SnapshotBlock>,
    current: SnapshotBlock,
}

fn snapshot_at(height: u64) -> SnapshotBlock {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"snapshot");
    hasher.update(&height.to_be_bytes());
    SnapshotBlock {
        hash: Hash::new(*hasher.finalize().as_bytes()),
        height,
        timestamp: GENESIS_TIMESTAMP + height as i64,
    }
}

fn block_hash(block: &AccountBlock) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(block.account_address.as_bytes());
    hasher.update(block.to_address.as_bytes());
    hasher.update(block.token.as_bytes());
    hasher.update(&block.amount.to_be_bytes());
    hasher.update(&block.data);
    hasher.update(&block.height.to_be_bytes());
    hasher.update(block.prev_hash.as_bytes());
    hasher.update(block.snapshot_hash.as_bytes());
    hasher.update(&block.timestamp.to_be_bytes());
    hasher.update(&block.nonce);
    Hash::new(*hasher.finalize().as_bytes())
}

impl MemoryChain {
    /// Fresh environment at snapshot height 1
    pub fn new() -> Self {
        let genesis = snapshot_at(1);
        let mut snapshots = HashMap::new();
        snapshots.insert(genesis.hash, genesis.clone());
        Self {
            storage: HashMap::new(),
            balances: HashMap::new(),
            blocks: HashMap::new(),
            heads: HashMap::new(),
            snapshots,
            current: genesis,
        }
    }

    /// Produce the next snapshot block and make it current
    pub fn advance_snapshot(&mut self) -> SnapshotBlock {
        let next = snapshot_at(self.current.height + 1);
        self.snapshots.insert(next.hash, next.clone());
        self.current = next.clone();
        next
    }

    /// Write a mintage record so `tag` counts as registered
    pub fn register_token(&mut self, tag: &TokenTag) {
        let mut record = tag.as_bytes().to_vec();
        record.push(18); // decimals
        self.storage
            .entry(ADDRESS_MINTAGE)
            .or_default()
            .insert(mintage_key(tag).to_vec(), record);
    }

    /// Write a beneficial pledge record backing `beneficiary`'s quota
    pub fn set_pledge(&mut self, beneficiary: &Address, amount: u128) {
        self.storage
            .entry(ADDRESS_PLEDGE)
            .or_default()
            .insert(pledge_key(beneficiary).to_vec(), amount.to_be_bytes().to_vec());
    }

    /// Credit an external ledger balance
    pub fn credit_balance(&mut self, addr: &Address, token: &TokenTag, amount: Amount) {
        *self.balances.entry((*addr, *token)).or_insert(0) += amount;
    }

    /// Append a block to its account's chain
    ///
    /// Fills in prev-hash, height, snapshot reference, and the block hash
    /// when the caller left them zeroed, then advances the account head.
    pub fn append_account_block(&mut self, mut block: AccountBlock) -> Hash {
        let owner = block.account_address;
        if block.prev_hash.is_zero() {
            if let Some(head) = self.heads.get(&owner) {
                block.prev_hash = *head;
            }
        }
        if block.height == 0 {
            block.height = self
                .blocks
                .get(&block.prev_hash)
                .map(|prev| prev.height + 1)
                .unwrap_or(1);
        }
        if block.snapshot_hash.is_zero() {
            block.snapshot_hash = self.current.hash;
        }
        if block.hash.is_zero() {
            block.hash = block_hash(&block);
        }
        let hash = block.hash;
        self.heads.insert(owner, hash);
        self.blocks.insert(hash, block);
        hash
    }

    /// Give an account a one-block history under the current snapshot
    ///
    /// Pledge quota only accrues once an account has a predecessor block
    /// anchored to an older snapshot.
    pub fn seed_account(&mut self, addr: &Address) {
        self.append_account_block(AccountBlock {
            account_address: *addr,
            ..Default::default()
        });
    }
}

impl Default for MemoryChain {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainEnv for MemoryChain {
    fn storage_get(&self, addr: &Address, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .storage
            .get(addr)
            .and_then(|tree| tree.get(key))
            .cloned())
    }

    fn storage_put(&mut self, addr: &Address, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.storage
            .entry(*addr)
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn storage_delete(&mut self, addr: &Address, key: &[u8]) -> StorageResult<()> {
        if let Some(tree) = self.storage.get_mut(addr) {
            tree.remove(key);
        }
        Ok(())
    }

    fn balance(&self, addr: &Address, token: &TokenTag) -> StorageResult<Amount> {
        Ok(self.balances.get(&(*addr, *token)).copied().unwrap_or(0))
    }

    fn set_balance(&mut self, addr: &Address, token: &TokenTag, amount: Amount) -> StorageResult<()> {
        self.balances.insert((*addr, *token), amount);
        Ok(())
    }

    fn prev_account_block(&self, addr: &Address) -> StorageResult<Option<AccountBlock>> {
        Ok(self
            .heads
            .get(addr)
            .and_then(|hash| self.blocks.get(hash))
            .cloned())
    }

    fn account_block_by_hash(&self, hash: &Hash) -> StorageResult<Option<AccountBlock>> {
        Ok(self.blocks.get(hash).cloned())
    }

    fn current_snapshot(&self) -> StorageResult<SnapshotBlock> {
        Ok(self.current.clone())
    }

    fn snapshot_by_hash(&self, hash: &Hash) -> StorageResult<Option<SnapshotBlock>> {
        Ok(self.snapshots.get(hash).cloned())
    }
}
