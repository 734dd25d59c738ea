//! Built-in Contracts
//!
//! Well-known contract addresses are hard-coded runtime constants. A
//! built-in contract is a set of [`ContractMethod`]s keyed by ABI id; the
//! dispatcher routes the send half of a block pair to `do_send` and the
//! receive half to `do_receive`.
//!
//! Contracts never reach into ledger internals: the only capability they
//! hold during a receive is [`CallContext`], which queues follow-on send
//! blocks and assigns their heights.

pub mod dex_fund;
pub mod registry;

use lib_types::{AccountBlock, Address};

use crate::errors::VmResult;
use crate::storage::VmDatabase;

/// Custody contract for exchange balances; originates orders
pub const ADDRESS_DEX_FUND: Address = Address::new(*b"builtin/dex/fund.....");

/// The external matcher; receives orders, reports settlements
pub const ADDRESS_DEX_TRADE: Address = Address::new(*b"builtin/dex/trade....");

/// Token registry; a token tag is valid iff a mintage record exists
pub const ADDRESS_MINTAGE: Address = Address::new(*b"builtin/mintage......");

/// Pledge registry; quota derives from beneficial pledge amounts
pub const ADDRESS_PLEDGE: Address = Address::new(*b"builtin/pledge.......");

/// True for any well-known contract address
///
/// Built-in accounts execute under the per-account quota ceiling instead
/// of pledge-derived budgets.
pub fn is_builtin(addr: &Address) -> bool {
    addr == &ADDRESS_DEX_FUND
        || addr == &ADDRESS_DEX_TRADE
        || addr == &ADDRESS_MINTAGE
        || addr == &ADDRESS_PLEDGE
}

/// Narrow ledger capability exposed to a receiving contract
///
/// Appended blocks are queued in emission order, become siblings on the
/// contract's chain, and commit atomically with the receive's storage
/// writes.
pub trait CallContext {
    /// Queue a follow-on send block
    fn append_block(&mut self, block: AccountBlock);

    /// Height the next appended block will occupy under `parent`
    fn new_block_height(&mut self, parent: &AccountBlock) -> u64;
}

/// One dispatchable method of a built-in contract
pub trait ContractMethod: Send + Sync {
    /// Send-side validation and normalization
    ///
    /// May rewrite the block's payload, token, amount, and destination;
    /// downstream observers see the normalized form. Charges data quota
    /// from `quota_left` and returns the remainder. An error rejects the
    /// block before it enters the ledger.
    fn do_send(
        &self,
        db: &mut VmDatabase<'_>,
        block: &mut AccountBlock,
        quota_left: u64,
    ) -> VmResult<u64>;

    /// Receive-side state mutation
    ///
    /// Writes go through the unsaved overlay in `db`; the dispatcher
    /// commits on success and discards on error. May append follow-on
    /// blocks through `ctx`.
    fn do_receive(
        &self,
        ctx: &mut dyn CallContext,
        db: &mut VmDatabase<'_>,
        receive_block: &AccountBlock,
        send_block: &AccountBlock,
    ) -> VmResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_types::ADDRESS_LEN;

    #[test]
    fn test_well_known_addresses_are_distinct() {
        let all = [
            ADDRESS_DEX_FUND,
            ADDRESS_DEX_TRADE,
            ADDRESS_MINTAGE,
            ADDRESS_PLEDGE,
        ];
        for (i, a) in all.iter().enumerate() {
            assert_eq!(a.as_bytes().len(), ADDRESS_LEN);
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_builtin_classification() {
        assert!(is_builtin(&ADDRESS_DEX_FUND));
        assert!(is_builtin(&ADDRESS_DEX_TRADE));
        assert!(!is_builtin(&Address::zero()));
    }
}
