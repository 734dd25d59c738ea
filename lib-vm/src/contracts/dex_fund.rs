//! DEX Fund Contract
//!
//! Custodies user exchange balances and originates orders. Four methods:
//!
//! - `UserDeposit`: move external tokens into custody
//! - `UserWithdraw`: move custody back out via an appended transfer block
//! - `NewOrder`: lock the order's funds and forward it to the matcher
//! - `SettleOrders`: apply the matcher's balance deltas, all-or-nothing
//!
//! Fund records live under `fund_key(owner)` in this contract's storage as
//! encoded [`Fund`] records. The order serial is a singleton counter in the
//! same storage; it advances on the send side so the normalized payload
//! already carries the final id.

use once_cell::sync::Lazy;

use lib_types::{AccountBlock, Address, BlockType};

use crate::abi::{AbiValue, ContractAbi, ParamKind};
use crate::contracts::registry::token_registered;
use crate::contracts::{CallContext, ContractMethod, ADDRESS_DEX_FUND, ADDRESS_DEX_TRADE};
use crate::errors::{VmError, VmResult};
use crate::quota::use_quota;
use crate::storage::keys::{fund_key, ORDER_SERIAL_KEY};
use crate::storage::VmDatabase;
use crate::wire::dex::{quote_amount, Fund, Order, OrderStatus, SettleOrders};

pub const METHOD_USER_DEPOSIT: &str = "UserDeposit";
pub const METHOD_USER_WITHDRAW: &str = "UserWithdraw";
pub const METHOD_NEW_ORDER: &str = "NewOrder";
pub const METHOD_SETTLE_ORDERS: &str = "SettleOrders";

const TRANSFER_PARAMS: &[ParamKind] = &[ParamKind::Address, ParamKind::Token, ParamKind::Uint256];
const PAYLOAD_PARAMS: &[ParamKind] = &[ParamKind::Bytes];

// Per-method execution gas, charged on top of the dispatcher's intrinsic
// cost. Protocol constants.
const DEPOSIT_GAS: u64 = 3_500;
const WITHDRAW_GAS: u64 = 5_000;
const NEW_ORDER_GAS: u64 = 8_000;
const SETTLE_ORDERS_GAS: u64 = 21_000;

/// Method table of the Fund contract
pub static ABI_DEX_FUND: Lazy<ContractAbi> = Lazy::new(|| {
    ContractAbi::new(&[
        (
            METHOD_USER_DEPOSIT,
            "DexFund.UserDeposit(address,token,uint256)",
            TRANSFER_PARAMS,
        ),
        (
            METHOD_USER_WITHDRAW,
            "DexFund.UserWithdraw(address,token,uint256)",
            TRANSFER_PARAMS,
        ),
        (METHOD_NEW_ORDER, "DexFund.NewOrder(bytes)", PAYLOAD_PARAMS),
        (
            METHOD_SETTLE_ORDERS,
            "DexFund.SettleOrders(bytes)",
            PAYLOAD_PARAMS,
        ),
    ])
});

// ============================================================================
// FUND STORAGE
// ============================================================================

/// Load a user's fund record; absent means never deposited
pub fn fund_from_storage(db: &VmDatabase<'_>, owner: &Address) -> VmResult<Fund> {
    match db.get_value(&fund_key(owner))? {
        Some(bytes) => Ok(Fund::decode(&bytes)?),
        None => Ok(Fund::default()),
    }
}

/// Persist a user's fund record through the overlay
pub fn save_fund(db: &mut VmDatabase<'_>, owner: &Address, fund: &Fund) {
    db.set_value(&fund_key(owner), &fund.encode());
}

fn next_order_serial(db: &mut VmDatabase<'_>) -> VmResult<u64> {
    let prev = match db.get_value(&ORDER_SERIAL_KEY)? {
        Some(bytes) => {
            let raw: [u8; 8] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| VmError::InvalidArgument("order serial record malformed".into()))?;
            u64::from_be_bytes(raw)
        }
        None => 0,
    };
    let serial = prev + 1;
    db.set_value(&ORDER_SERIAL_KEY, &serial.to_be_bytes());
    Ok(serial)
}

// ============================================================================
// ARGUMENT HELPERS
// ============================================================================

fn arg_address(args: &[AbiValue], index: usize) -> VmResult<Address> {
    args.get(index)
        .and_then(AbiValue::as_address)
        .ok_or_else(|| VmError::InvalidArgument(format!("argument {index} must be an address")))
}

fn arg_token(args: &[AbiValue], index: usize) -> VmResult<lib_types::TokenTag> {
    args.get(index)
        .and_then(AbiValue::as_token)
        .ok_or_else(|| VmError::InvalidArgument(format!("argument {index} must be a token tag")))
}

fn arg_uint(args: &[AbiValue], index: usize) -> VmResult<u128> {
    args.get(index)
        .and_then(AbiValue::as_uint)
        .ok_or_else(|| VmError::InvalidArgument(format!("argument {index} must be an integer")))
}

fn arg_bytes<'a>(args: &'a [AbiValue], index: usize) -> VmResult<&'a [u8]> {
    args.get(index)
        .and_then(AbiValue::as_bytes)
        .ok_or_else(|| VmError::InvalidArgument(format!("argument {index} must be bytes")))
}

fn custody_amount(amount: u128) -> VmResult<u64> {
    u64::try_from(amount)
        .map_err(|_| VmError::InvalidArgument("amount exceeds custody range".into()))
}

// ============================================================================
// UserDeposit
// ============================================================================

/// `UserDeposit(beneficiary, asset, amount)`
pub struct MethodDexFundUserDeposit;

impl ContractMethod for MethodDexFundUserDeposit {
    fn do_send(
        &self,
        db: &mut VmDatabase<'_>,
        block: &mut AccountBlock,
        quota_left: u64,
    ) -> VmResult<u64> {
        let quota_left = use_quota(quota_left, DEPOSIT_GAS)?;
        let args = ABI_DEX_FUND.unpack_method(METHOD_USER_DEPOSIT, &block.data)?;
        let asset = arg_token(&args, 1)?;
        let amount = arg_uint(&args, 2)?;
        if amount == 0 {
            return Err(VmError::InvalidArgument("deposit amount must be positive".into()));
        }
        custody_amount(amount)?;
        if !token_registered(db, &asset)? {
            return Err(VmError::TokenInvalid);
        }
        // Normalize into a transfer send; downstream observers (and the
        // external-ledger balance check) see the canonical form.
        block.token = asset;
        block.amount = amount;
        block.to_address = ADDRESS_DEX_FUND;
        Ok(quota_left)
    }

    fn do_receive(
        &self,
        _ctx: &mut dyn CallContext,
        db: &mut VmDatabase<'_>,
        _receive_block: &AccountBlock,
        send_block: &AccountBlock,
    ) -> VmResult<()> {
        let args = ABI_DEX_FUND.unpack_method(METHOD_USER_DEPOSIT, &send_block.data)?;
        let beneficiary = arg_address(&args, 0)?;
        let asset = arg_token(&args, 1)?;
        let amount = custody_amount(send_block.amount)?;

        let mut fund = fund_from_storage(db, &beneficiary)?;
        let entry = fund.account_mut_or_insert(&asset);
        entry.available = entry
            .available
            .checked_add(amount)
            .ok_or_else(|| VmError::ConsistencyViolation("available balance overflow".into()))?;
        save_fund(db, &beneficiary, &fund);
        Ok(())
    }
}

// ============================================================================
// UserWithdraw
// ============================================================================

/// `UserWithdraw(beneficiary, asset, amount)`; self-withdraw only
pub struct MethodDexFundUserWithdraw;

impl ContractMethod for MethodDexFundUserWithdraw {
    fn do_send(
        &self,
        db: &mut VmDatabase<'_>,
        block: &mut AccountBlock,
        quota_left: u64,
    ) -> VmResult<u64> {
        let quota_left = use_quota(quota_left, WITHDRAW_GAS)?;
        let args = ABI_DEX_FUND.unpack_method(METHOD_USER_WITHDRAW, &block.data)?;
        let beneficiary = arg_address(&args, 0)?;
        let asset = arg_token(&args, 1)?;
        let amount = arg_uint(&args, 2)?;
        if amount == 0 {
            return Err(VmError::InvalidArgument("withdraw amount must be positive".into()));
        }
        custody_amount(amount)?;
        if !token_registered(db, &asset)? {
            return Err(VmError::TokenInvalid);
        }
        if block.account_address != beneficiary {
            return Err(VmError::Unauthorized);
        }
        block.to_address = ADDRESS_DEX_FUND;
        Ok(quota_left)
    }

    fn do_receive(
        &self,
        ctx: &mut dyn CallContext,
        db: &mut VmDatabase<'_>,
        receive_block: &AccountBlock,
        send_block: &AccountBlock,
    ) -> VmResult<()> {
        let args = ABI_DEX_FUND.unpack_method(METHOD_USER_WITHDRAW, &send_block.data)?;
        let beneficiary = arg_address(&args, 0)?;
        let asset = arg_token(&args, 1)?;
        let amount = custody_amount(arg_uint(&args, 2)?)?;

        let mut fund = fund_from_storage(db, &beneficiary)?;
        let entry = fund.account_mut_or_insert(&asset);
        if entry.available < amount {
            return Err(VmError::InsufficientFunds {
                available: entry.available as u128,
                required: amount as u128,
            });
        }
        entry.available -= amount;
        save_fund(db, &beneficiary, &fund);

        // Reply with the custody transfer; shares the receive timestamp.
        let height = ctx.new_block_height(receive_block);
        ctx.append_block(AccountBlock {
            account_address: ADDRESS_DEX_FUND,
            to_address: beneficiary,
            token: asset,
            amount: amount as u128,
            block_type: BlockType::SendCall,
            height,
            timestamp: receive_block.timestamp,
            ..Default::default()
        });
        Ok(())
    }
}

// ============================================================================
// NewOrder
// ============================================================================

/// `NewOrder(serialized_order)`
///
/// The send side rewrites the block payload with the canonical re-encoded
/// order: status forced to Pending, amount derived from price and
/// quantity, timestamp and owner taken from the block, id from the serial
/// counter.
pub struct MethodDexFundNewOrder;

impl ContractMethod for MethodDexFundNewOrder {
    fn do_send(
        &self,
        db: &mut VmDatabase<'_>,
        block: &mut AccountBlock,
        quota_left: u64,
    ) -> VmResult<u64> {
        let quota_left = use_quota(quota_left, NEW_ORDER_GAS)?;
        let args = ABI_DEX_FUND.unpack_method(METHOD_NEW_ORDER, &block.data)?;
        let mut order = Order::decode(arg_bytes(&args, 0)?)?;

        if !token_registered(db, &order.trade_asset)? || !token_registered(db, &order.quote_asset)? {
            return Err(VmError::TokenInvalid);
        }
        if order.trade_asset == order.quote_asset {
            return Err(VmError::InvalidArgument(
                "trade and quote assets must differ".into(),
            ));
        }
        if order.price == 0 {
            return Err(VmError::InvalidArgument("order price must be positive".into()));
        }
        if order.quantity == 0 {
            return Err(VmError::InvalidArgument(
                "order quantity must be positive".into(),
            ));
        }

        order.amount = quote_amount(order.quantity, order.price)
            .ok_or_else(|| VmError::InvalidArgument("order amount out of range".into()))?;
        order.address = block.account_address;
        order.status = OrderStatus::Pending;
        order.timestamp = block.timestamp;
        order.id = next_order_serial(db)?;

        block.data = ABI_DEX_FUND.pack(METHOD_NEW_ORDER, &[AbiValue::Bytes(order.encode())])?;
        block.to_address = ADDRESS_DEX_FUND;
        Ok(quota_left)
    }

    fn do_receive(
        &self,
        ctx: &mut dyn CallContext,
        db: &mut VmDatabase<'_>,
        receive_block: &AccountBlock,
        send_block: &AccountBlock,
    ) -> VmResult<()> {
        let args = ABI_DEX_FUND.unpack_method(METHOD_NEW_ORDER, &send_block.data)?;
        let order = Order::decode(arg_bytes(&args, 0)?)?;

        // sell locks the trade asset by quantity; buy locks the quote
        // asset by the derived amount
        let (lock_asset, lock_amount) = if order.side {
            (order.trade_asset, order.quantity)
        } else {
            (order.quote_asset, order.amount)
        };

        let mut fund = fund_from_storage(db, &order.address)?;
        let entry = fund.account_mut_or_insert(&lock_asset);
        if entry.available < lock_amount {
            return Err(VmError::InsufficientFunds {
                available: entry.available as u128,
                required: lock_amount as u128,
            });
        }
        entry.available -= lock_amount;
        entry.locked = entry
            .locked
            .checked_add(lock_amount)
            .ok_or_else(|| VmError::ConsistencyViolation("locked balance overflow".into()))?;
        save_fund(db, &order.address, &fund);

        let height = ctx.new_block_height(receive_block);
        ctx.append_block(AccountBlock {
            account_address: ADDRESS_DEX_FUND,
            to_address: ADDRESS_DEX_TRADE,
            data: order.encode(),
            block_type: BlockType::SendCall,
            height,
            timestamp: receive_block.timestamp,
            ..Default::default()
        });
        Ok(())
    }
}

// ============================================================================
// SettleOrders
// ============================================================================

/// `SettleOrders(serialized_settle_envelope)`; matcher-only
pub struct MethodDexFundSettleOrders;

impl ContractMethod for MethodDexFundSettleOrders {
    fn do_send(
        &self,
        _db: &mut VmDatabase<'_>,
        block: &mut AccountBlock,
        quota_left: u64,
    ) -> VmResult<u64> {
        let quota_left = use_quota(quota_left, SETTLE_ORDERS_GAS)?;
        if block.account_address != ADDRESS_DEX_TRADE {
            return Err(VmError::Unauthorized);
        }
        let args = ABI_DEX_FUND.unpack_method(METHOD_SETTLE_ORDERS, &block.data)?;
        SettleOrders::decode(arg_bytes(&args, 0)?)?;
        block.to_address = ADDRESS_DEX_FUND;
        Ok(quota_left)
    }

    fn do_receive(
        &self,
        _ctx: &mut dyn CallContext,
        db: &mut VmDatabase<'_>,
        _receive_block: &AccountBlock,
        send_block: &AccountBlock,
    ) -> VmResult<()> {
        let args = ABI_DEX_FUND.unpack_method(METHOD_SETTLE_ORDERS, &send_block.data)?;
        let envelope = SettleOrders::decode(arg_bytes(&args, 0)?)?;

        // Stage every touched fund; nothing persists until all actions
        // validate. Ordering inside the envelope cannot change the final
        // state, but every intermediate value must stay non-negative.
        use std::collections::btree_map::Entry;
        let mut staged = std::collections::BTreeMap::new();
        for action in &envelope.actions {
            let fund = match staged.entry(action.address) {
                Entry::Occupied(slot) => slot.into_mut(),
                Entry::Vacant(slot) => slot.insert(fund_from_storage(db, &action.address)?),
            };
            let entry = fund.account_mut_or_insert(&action.asset);
            entry.available = entry
                .available
                .checked_add(action.inc_available)
                .and_then(|v| v.checked_sub(action.dec_available))
                .ok_or_else(|| {
                    VmError::ConsistencyViolation(format!(
                        "available delta out of range for {} on {}",
                        action.address, action.asset
                    ))
                })?;
            entry.locked = entry
                .locked
                .checked_add(action.inc_locked)
                .and_then(|v| v.checked_sub(action.dec_locked))
                .ok_or_else(|| {
                    VmError::ConsistencyViolation(format!(
                        "locked delta out of range for {} on {}",
                        action.address, action.asset
                    ))
                })?;
        }
        for (owner, fund) in &staged {
            save_fund(db, owner, fund);
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
