//! Dispatcher / VM Context
//!
//! Routes a send block to its destination contract's `do_send` and the
//! paired receive to `do_receive`, charging quota around both. The state
//! machine for one pair:
//!
//! ```text
//!   [Originated] --do_send ok--> [Pending]
//!   [Originated] --do_send err-> [Rejected, not appended]
//!   [Pending]    --do_receive ok--> [Confirmed] (+ optional appended sends)
//!   [Pending]    --do_receive err-> [ReceiveError]
//! ```
//!
//! Send-side failures reject the block before it enters the ledger.
//! Receive-side failures record a receive-error block that still consumes
//! `total - addition` quota while the unsaved overlay is discarded, so
//! contract storage never observes a failed receive.

use std::collections::HashMap;

use tracing::{debug, warn};

use lib_types::{AccountBlock, Address, BlockType, Hash};

use crate::contracts::dex_fund::{
    MethodDexFundNewOrder, MethodDexFundSettleOrders, MethodDexFundUserDeposit,
    MethodDexFundUserWithdraw, ABI_DEX_FUND, METHOD_NEW_ORDER, METHOD_SETTLE_ORDERS,
    METHOD_USER_DEPOSIT, METHOD_USER_WITHDRAW,
};
use crate::contracts::{is_builtin, CallContext, ContractMethod, ADDRESS_DEX_FUND};
use crate::errors::{VmError, VmResult};
use crate::quota::{
    calc_quota_used, calc_quota_v2, intrinsic_gas_cost, use_quota, ExecOutcome, QuotaError,
    DEFAULT_DIFFICULTY, QUOTA_LIMIT_FOR_ACCOUNT,
};
use crate::storage::{ChainEnv, VmDatabase};

/// Result of executing a receive
#[derive(Debug)]
pub enum ReceiveOutcome {
    /// Storage committed; appended blocks queued in emission order
    Confirmed {
        receive_block: AccountBlock,
        appended: Vec<AccountBlock>,
    },
    /// Storage discarded; the receive-error block still enters the ledger
    Failed {
        receive_block: AccountBlock,
        error: VmError,
    },
}

struct ContractTable {
    methods: HashMap<[u8; 4], Box<dyn ContractMethod>>,
}

impl ContractTable {
    fn resolve(&self, data: &[u8]) -> VmResult<&dyn ContractMethod> {
        if data.len() < 4 {
            return Err(VmError::InvalidArgument(
                "calldata shorter than a method id".into(),
            ));
        }
        let mut id = [0u8; 4];
        id.copy_from_slice(&data[..4]);
        self.methods
            .get(&id)
            .map(|m| m.as_ref())
            .ok_or(VmError::MethodNotFound(id))
    }
}

/// Appended-block queue handed to a receiving contract
///
/// The only ledger capability contracts hold. Heights are assigned
/// sequentially after the parent; the dispatcher stamps every queued block
/// with the receive timestamp before returning it.
struct AppendQueue {
    appended: Vec<AccountBlock>,
}

impl CallContext for AppendQueue {
    fn append_block(&mut self, block: AccountBlock) {
        self.appended.push(block);
    }

    fn new_block_height(&mut self, parent: &AccountBlock) -> u64 {
        parent.height + 1 + self.appended.len() as u64
    }
}

/// The contract VM: a method registry plus the send/receive drivers
pub struct Vm {
    contracts: HashMap<Address, ContractTable>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// Registry with the built-in Fund contract installed
    pub fn new() -> Self {
        let entries: Vec<(&str, Box<dyn ContractMethod>)> = vec![
            (METHOD_USER_DEPOSIT, Box::new(MethodDexFundUserDeposit)),
            (METHOD_USER_WITHDRAW, Box::new(MethodDexFundUserWithdraw)),
            (METHOD_NEW_ORDER, Box::new(MethodDexFundNewOrder)),
            (METHOD_SETTLE_ORDERS, Box::new(MethodDexFundSettleOrders)),
        ];
        let mut methods: HashMap<[u8; 4], Box<dyn ContractMethod>> = HashMap::new();
        for (name, method) in entries {
            if let Some(entry) = ABI_DEX_FUND.method(name) {
                methods.insert(entry.id, method);
            }
        }
        let mut contracts = HashMap::new();
        contracts.insert(ADDRESS_DEX_FUND, ContractTable { methods });
        Self { contracts }
    }

    /// True when `addr` hosts a dispatchable contract
    pub fn is_contract(&self, addr: &Address) -> bool {
        self.contracts.contains_key(addr)
    }

    fn budget(&self, env: &dyn ChainEnv, addr: &Address, difficulty: u128) -> VmResult<(u64, u64)> {
        // Built-in accounts run under the ceiling; user accounts earn
        // their budget from pledge and PoW.
        if is_builtin(addr) {
            return Ok((QUOTA_LIMIT_FOR_ACCOUNT, 0));
        }
        Ok(calc_quota_v2(env, addr, difficulty)?)
    }

    /// Execute the send half of a pair
    ///
    /// On success the block is normalized in place (contract methods may
    /// rewrite payload, token, amount, destination), its quota field is
    /// stamped, and any transferred amount is debited from the caller's
    /// external balance. On error the block must not enter the ledger.
    pub fn execute_send(&self, env: &mut dyn ChainEnv, block: &mut AccountBlock) -> VmResult<()> {
        let difficulty = if block.has_pow_nonce() {
            DEFAULT_DIFFICULTY
        } else {
            0
        };
        let (quota_total, quota_addition) = self.budget(env, &block.account_address, difficulty)?;
        let mut quota_left = use_quota(quota_total, intrinsic_gas_cost(&block.data)?)?;
        block.block_type = BlockType::SendCall;

        if let Some(table) = self.contracts.get(&block.to_address) {
            let method = table.resolve(&block.data)?;
            debug!(
                from = %block.account_address,
                to = %block.to_address,
                quota_total,
                "dispatching contract send"
            );
            let mut db = VmDatabase::new(env, block.to_address);
            quota_left = method.do_send(&mut db, block, quota_left)?;
            // Send-side storage effects (e.g. the order serial) commit with
            // the send itself.
            db.commit()?;
        }

        if block.amount > 0 {
            let held = env.balance(&block.account_address, &block.token)?;
            if held < block.amount {
                return Err(VmError::InsufficientFunds {
                    available: held,
                    required: block.amount,
                });
            }
            env.set_balance(&block.account_address, &block.token, held - block.amount)?;
        }

        block.quota = calc_quota_used(
            quota_total,
            quota_addition,
            quota_left,
            0,
            ExecOutcome::Success,
        );
        Ok(())
    }

    /// Execute the receive half of a pair
    ///
    /// Builds the receive block on the destination chain, runs the target
    /// method against an overlay-backed database, and either commits the
    /// overlay (Confirmed) or discards it (Failed). Infrastructure errors
    /// surface as `Err`; contract failures are data, not control flow.
    pub fn execute_receive(
        &self,
        env: &mut dyn ChainEnv,
        send_block: &AccountBlock,
    ) -> VmResult<ReceiveOutcome> {
        let receiver = send_block.to_address;
        let snapshot = env.current_snapshot()?;
        let (prev_hash, height) = match env.prev_account_block(&receiver)? {
            Some(prev) => (prev.hash, prev.height + 1),
            None => (Hash::zero(), 1),
        };
        let mut receive_block = AccountBlock {
            account_address: receiver,
            token: send_block.token,
            amount: send_block.amount,
            block_type: BlockType::Receive,
            prev_hash,
            snapshot_hash: snapshot.hash,
            height,
            timestamp: snapshot.timestamp,
            ..Default::default()
        };

        let (quota_total, quota_addition) = self.budget(env, &receiver, 0)?;
        let quota_left = match intrinsic_gas_cost(&send_block.data)
            .and_then(|cost| use_quota(quota_total, cost))
        {
            Ok(left) => left,
            Err(e) => {
                warn!(to = %receiver, error = %e, "receive rejected before execution");
                receive_block.block_type = BlockType::ReceiveError;
                receive_block.quota =
                    calc_quota_used(quota_total, quota_addition, 0, 0, ExecOutcome::OutOfQuota);
                return Ok(ReceiveOutcome::Failed {
                    receive_block,
                    error: e.into(),
                });
            }
        };

        let Some(table) = self.contracts.get(&receiver) else {
            // Plain transfer to a non-contract account.
            if send_block.amount > 0 {
                let held = env.balance(&receiver, &send_block.token)?;
                env.set_balance(&receiver, &send_block.token, held + send_block.amount)?;
            }
            receive_block.quota = calc_quota_used(
                quota_total,
                quota_addition,
                quota_left,
                0,
                ExecOutcome::Success,
            );
            return Ok(ReceiveOutcome::Confirmed {
                receive_block,
                appended: Vec::new(),
            });
        };

        let method = match table.resolve(&send_block.data) {
            Ok(method) => method,
            Err(error) => {
                warn!(to = %receiver, error = %error, "receive failed to resolve method");
                receive_block.block_type = BlockType::ReceiveError;
                receive_block.quota =
                    calc_quota_used(quota_total, quota_addition, quota_left, 0, ExecOutcome::Failed);
                return Ok(ReceiveOutcome::Failed {
                    receive_block,
                    error,
                });
            }
        };

        let mut ctx = AppendQueue {
            appended: Vec::new(),
        };
        let mut db = VmDatabase::new(env, receiver);
        match method.do_receive(&mut ctx, &mut db, &receive_block, send_block) {
            Ok(()) => {
                db.commit()?;
                if send_block.amount > 0 {
                    let held = env.balance(&receiver, &send_block.token)?;
                    env.set_balance(&receiver, &send_block.token, held + send_block.amount)?;
                }
                receive_block.quota = calc_quota_used(
                    quota_total,
                    quota_addition,
                    quota_left,
                    0,
                    ExecOutcome::Success,
                );
                let mut appended = ctx.appended;
                for block in &mut appended {
                    block.timestamp = receive_block.timestamp;
                }
                debug!(
                    to = %receiver,
                    appended = appended.len(),
                    "receive confirmed"
                );
                Ok(ReceiveOutcome::Confirmed {
                    receive_block,
                    appended,
                })
            }
            Err(error) => {
                // Overlay dropped with `db`; storage unchanged.
                drop(db);
                warn!(to = %receiver, error = %error, "receive failed; recording receive-error block");
                receive_block.block_type = BlockType::ReceiveError;
                let outcome = match &error {
                    VmError::Quota(QuotaError::OutOfQuota) => ExecOutcome::OutOfQuota,
                    _ => ExecOutcome::Failed,
                };
                receive_block.quota =
                    calc_quota_used(quota_total, quota_addition, quota_left, 0, outcome);
                Ok(ReceiveOutcome::Failed {
                    receive_block,
                    error,
                })
            }
        }
    }
}
