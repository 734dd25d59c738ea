//! Quota Engine
//!
//! Computes the per-account execution budget for a new block and settles
//! what a block actually consumed. The budget derives from three inputs:
//! pledge amount (read from the pledge contract), the height gap to the
//! snapshot the previous block referenced (capped at one day of blocks),
//! and an optional proof-of-work difficulty.
//!
//! `x = param_a * gap * pledge + param_b * difficulty` is mapped to a
//! discrete quantum through the monotone section table; the PoW portion is
//! the difference between the quota with and without the difficulty term.
//!
//! All arithmetic is u128 with saturation; saturation can only overshoot
//! into the top section, which the per-account ceiling already caps.

pub mod sections;

use thiserror::Error;

use lib_types::{Address, BlockType};

use crate::contracts::registry::pledge_beneficial_amount;
use crate::storage::{ChainEnv, StorageError, StorageResult};

pub use self::sections::{index_in_section, SECTION_COUNT, SECTION_LIST};

// ============================================================================
// PROTOCOL CONSTANTS
// ============================================================================

/// Hard per-account quota ceiling
pub const QUOTA_LIMIT_FOR_ACCOUNT: u64 = 1_000_000;

/// Quota quantum granted per section index
pub const QUOTA_PER_SECTION: u64 = 21_000;

/// Snapshot height gap cap: one day of one-second blocks
pub const MAX_QUOTA_HEIGHT_GAP: u64 = 86_400;

/// Intrinsic cost of any transaction block
pub const TX_GAS: u64 = 21_000;

/// Per-byte cost of zero payload bytes
pub const TX_DATA_ZERO_GAS: u64 = 4;

/// Per-byte cost of non-zero payload bytes
pub const TX_DATA_NONZERO_GAS: u64 = 68;

/// Difficulty attributed to a block carrying a PoW witness
pub const DEFAULT_DIFFICULTY: u128 = 0xffff_ffc0_0000_0000;

/// Fixed rational protocol parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ratio {
    pub numer: u128,
    pub denom: u128,
}

impl Ratio {
    /// `v * numer / denom`, saturating
    pub const fn apply(&self, v: u128) -> u128 {
        v.saturating_mul(self.numer) / self.denom
    }
}

/// Weight of `gap * pledge` in the quota input
pub const PARAM_A: Ratio = Ratio { numer: 1, denom: 100 };

/// Weight of PoW difficulty in the quota input
pub const PARAM_B: Ratio = Ratio {
    numer: 1,
    denom: 50_000_000_000_000,
};

// ============================================================================
// ERRORS
// ============================================================================

/// Quota accounting failure
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaError {
    /// Charge exceeds the remaining budget
    #[error("out of quota")]
    OutOfQuota,

    /// u64 arithmetic overflow in a cost calculation
    #[error("gas uint64 overflow")]
    GasUintOverflow,
}

/// Result type for quota charges
pub type QuotaResult<T> = Result<T, QuotaError>;

// ============================================================================
// BUDGET CALCULATION
// ============================================================================

fn section_quota(x: u128) -> u64 {
    let quota = index_in_section(x) as u64 * QUOTA_PER_SECTION;
    quota.min(QUOTA_LIMIT_FOR_ACCOUNT)
}

/// Compute `(quota_total, quota_addition)` available for a new block
///
/// `difficulty` is zero when the block carries no PoW witness. Walks the
/// account's prev chain over blocks referencing the *current* snapshot:
///
/// - any prior same-snapshot receive-error block quick-fails to `(0, 0)`
/// - only one block per snapshot may claim PoW quota
/// - quota already consumed within the same snapshot reduces the budget
///
/// The first block of an account (and any account with zero pledge) earns
/// no pledge quota; PoW is then its only budget source.
pub fn calc_quota_v2(
    env: &dyn ChainEnv,
    addr: &Address,
    difficulty: u128,
) -> StorageResult<(u64, u64)> {
    let pledge = pledge_beneficial_amount(env, addr)?;
    let is_pow = difficulty > 0;
    let current = env.current_snapshot()?;

    let mut prev = env.prev_account_block(addr)?;
    let mut quota_used: u64 = 0;

    loop {
        match prev {
            Some(block) if block.snapshot_hash == current.hash => {
                if block.block_type == BlockType::ReceiveError {
                    return Ok((0, 0));
                }
                if is_pow && block.has_pow_nonce() {
                    return Ok((0, 0));
                }
                quota_used = quota_used.saturating_add(block.quota);
                prev = env.account_block_by_hash(&block.prev_hash)?;
            }
            boundary => {
                // `boundary` is the first block not referencing the current
                // snapshot, or None for a fresh account chain.
                let x_pledge = match &boundary {
                    Some(block) if pledge > 0 => {
                        let anchor = env
                            .snapshot_by_hash(&block.snapshot_hash)?
                            .ok_or(StorageError::MissingSnapshot)?;
                        let gap = current
                            .height
                            .saturating_sub(anchor.height)
                            .min(MAX_QUOTA_HEIGHT_GAP);
                        PARAM_A.apply(pledge.saturating_mul(gap as u128))
                    }
                    _ => 0,
                };
                let quota_without_pow = match &boundary {
                    Some(_) if pledge > 0 => section_quota(x_pledge),
                    _ => 0,
                };
                let quota_total = if is_pow {
                    section_quota(x_pledge.saturating_add(PARAM_B.apply(difficulty)))
                } else {
                    quota_without_pow
                };
                if quota_total < quota_used {
                    return Ok((0, 0));
                }
                return Ok((quota_total - quota_used, quota_total - quota_without_pow));
            }
        }
    }
}

// ============================================================================
// COST DEDUCTION
// ============================================================================

/// Byte cost of a payload, priced per zero/non-zero byte counts
///
/// Exposed with explicit counts so overflow guards are testable without
/// materializing exabyte payloads.
pub fn data_gas_for_counts(non_zero: u64, zero: u64) -> QuotaResult<u64> {
    if non_zero > 0 && u64::MAX / TX_DATA_NONZERO_GAS < non_zero {
        return Err(QuotaError::GasUintOverflow);
    }
    let mut gas = non_zero * TX_DATA_NONZERO_GAS;
    if zero > 0 && (u64::MAX - gas) / TX_DATA_ZERO_GAS < zero {
        return Err(QuotaError::GasUintOverflow);
    }
    gas += zero * TX_DATA_ZERO_GAS;
    Ok(gas)
}

/// Byte cost of `data`
pub fn data_gas_cost(data: &[u8]) -> QuotaResult<u64> {
    if data.is_empty() {
        return Ok(0);
    }
    let non_zero = data.iter().filter(|&&b| b != 0).count() as u64;
    let zero = data.len() as u64 - non_zero;
    data_gas_for_counts(non_zero, zero)
}

/// Base cost plus byte cost of `data`
pub fn intrinsic_gas_cost(data: &[u8]) -> QuotaResult<u64> {
    let data_gas = data_gas_cost(data)?;
    TX_GAS
        .checked_add(data_gas)
        .ok_or(QuotaError::GasUintOverflow)
}

/// Charge `cost` against the remaining budget
pub fn use_quota(quota_left: u64, cost: u64) -> QuotaResult<u64> {
    if quota_left < cost {
        return Err(QuotaError::OutOfQuota);
    }
    Ok(quota_left - cost)
}

/// Charge the byte cost of `data` against the remaining budget
pub fn use_quota_for_data(data: &[u8], quota_left: u64) -> QuotaResult<u64> {
    let cost = data_gas_cost(data)?;
    use_quota(quota_left, cost)
}

// ============================================================================
// SETTLEMENT
// ============================================================================

/// How a block's execution ended, for quota settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Execution succeeded; a refund may apply
    Success,
    /// Execution aborted on [`QuotaError::OutOfQuota`]
    OutOfQuota,
    /// Execution failed for any other reason
    Failed,
}

/// Quota actually recorded on a block
///
/// On success, the refund is capped at half of what was spent beyond the
/// PoW addition. Out-of-quota blocks are charged the full non-PoW budget
/// to deter spam.
pub fn calc_quota_used(
    quota_total: u64,
    quota_addition: u64,
    quota_left: u64,
    quota_refund: u64,
    outcome: ExecOutcome,
) -> u64 {
    match outcome {
        ExecOutcome::OutOfQuota => quota_total.saturating_sub(quota_addition),
        ExecOutcome::Failed => {
            if quota_total.saturating_sub(quota_left) < quota_addition {
                0
            } else {
                quota_total - quota_addition - quota_left
            }
        }
        ExecOutcome::Success => {
            if quota_total.saturating_sub(quota_left) < quota_addition {
                0
            } else {
                let spent = quota_total - quota_addition - quota_left;
                spent - quota_refund.min(spent / 2)
            }
        }
    }
}
