//! End-to-end DEX scenarios
//!
//! Drives full send/receive pairs through the dispatcher against the
//! in-memory chain: custody deposits and withdrawals, order placement with
//! fund locking, matcher settlement, and the failure paths that must leave
//! storage untouched.

use lib_types::{AccountBlock, Address, BlockType, TokenTag};
use lib_vm::abi::AbiValue;
use lib_vm::contracts::dex_fund::{
    fund_from_storage, ABI_DEX_FUND, METHOD_NEW_ORDER, METHOD_SETTLE_ORDERS, METHOD_USER_DEPOSIT,
    METHOD_USER_WITHDRAW,
};
use lib_vm::contracts::{ADDRESS_DEX_FUND, ADDRESS_DEX_TRADE};
use lib_vm::quota::{data_gas_for_counts, QuotaError, QUOTA_LIMIT_FOR_ACCOUNT, TX_DATA_NONZERO_GAS};
use lib_vm::storage::{ChainEnv, VmDatabase};
use lib_vm::testing::MemoryChain;
use lib_vm::wire::dex::{Fund, Order, OrderStatus, OrderType, SettleAction, SettleOrders};
use lib_vm::{ReceiveOutcome, Vm, VmError};

const VITE: TokenTag = TokenTag::new(*b"VITE TOKEN");
const ETH: TokenTag = TokenTag::new(*b"ETH  TOKEN");

fn user() -> Address {
    Address::new(*b"123456789012345678901")
}

/// Chain where `user` holds 3000 VITE externally and has quota to spend
fn new_chain() -> MemoryChain {
    let mut chain = MemoryChain::new();
    chain.register_token(&VITE);
    chain.set_pledge(&user(), 100_000_000);
    chain.seed_account(&user());
    chain.advance_snapshot();
    chain.credit_balance(&user(), &VITE, 3_000);
    chain
}

fn read_fund(chain: &mut MemoryChain, owner: &Address) -> Fund {
    let db = VmDatabase::new(chain, ADDRESS_DEX_FUND);
    fund_from_storage(&db, owner).expect("fund storage must decode")
}

fn transfer_call(method: &str, beneficiary: Address, asset: TokenTag, amount: u128) -> Vec<u8> {
    ABI_DEX_FUND
        .pack(
            method,
            &[
                AbiValue::Address(beneficiary),
                AbiValue::Token(asset),
                AbiValue::Uint(amount),
            ],
        )
        .expect("packing a well-formed call")
}

/// Run a full pair; panics on any rejection
fn run_pair(
    vm: &Vm,
    chain: &mut MemoryChain,
    mut send: AccountBlock,
) -> (AccountBlock, Vec<AccountBlock>) {
    vm.execute_send(chain, &mut send).expect("send must pass");
    chain.append_account_block(send.clone());
    match vm.execute_receive(chain, &send).expect("receive infra") {
        ReceiveOutcome::Confirmed {
            receive_block,
            appended,
        } => {
            chain.append_account_block(receive_block.clone());
            (receive_block, appended)
        }
        ReceiveOutcome::Failed { error, .. } => panic!("unexpected receive failure: {error}"),
    }
}

fn deposit_3000(vm: &Vm, chain: &mut MemoryChain) {
    let send = AccountBlock {
        account_address: user(),
        to_address: ADDRESS_DEX_FUND,
        data: transfer_call(METHOD_USER_DEPOSIT, user(), VITE, 3_000),
        ..Default::default()
    };
    let (_, appended) = run_pair(vm, chain, send);
    assert!(appended.is_empty());
}

#[test]
fn scenario_deposit_and_withdraw() {
    let vm = Vm::new();
    let mut chain = new_chain();

    deposit_3000(&vm, &mut chain);

    let fund = read_fund(&mut chain, &user());
    assert_eq!(fund.accounts.len(), 1);
    assert_eq!(fund.accounts[0].asset, VITE);
    assert_eq!(fund.accounts[0].available, 3_000);
    assert_eq!(fund.accounts[0].locked, 0);
    assert_eq!(chain.balance(&user(), &VITE).unwrap(), 0);
    assert_eq!(chain.balance(&ADDRESS_DEX_FUND, &VITE).unwrap(), 3_000);

    chain.advance_snapshot();

    let send = AccountBlock {
        account_address: user(),
        to_address: ADDRESS_DEX_FUND,
        data: transfer_call(METHOD_USER_WITHDRAW, user(), VITE, 200),
        ..Default::default()
    };
    let (receive_block, appended) = run_pair(&vm, &mut chain, send);

    let fund = read_fund(&mut chain, &user());
    assert_eq!(fund.accounts[0].available, 2_800);
    assert_eq!(fund.accounts[0].locked, 0);

    // Exactly one appended transfer, custody back to the user.
    assert_eq!(appended.len(), 1);
    let reply = &appended[0];
    assert_eq!(reply.account_address, ADDRESS_DEX_FUND);
    assert_eq!(reply.to_address, user());
    assert_eq!(reply.token, VITE);
    assert_eq!(reply.amount, 200);
    assert_eq!(reply.block_type, BlockType::SendCall);
    assert_eq!(reply.timestamp, receive_block.timestamp);

    // Execute the appended transfer to completion.
    let mut reply_send = reply.clone();
    vm.execute_send(&mut chain, &mut reply_send)
        .expect("contract transfer send");
    chain.append_account_block(reply_send.clone());
    match vm.execute_receive(&mut chain, &reply_send).unwrap() {
        ReceiveOutcome::Confirmed { appended, .. } => assert!(appended.is_empty()),
        ReceiveOutcome::Failed { error, .. } => panic!("transfer receive failed: {error}"),
    }

    assert_eq!(chain.balance(&user(), &VITE).unwrap(), 200);
    assert_eq!(chain.balance(&ADDRESS_DEX_FUND, &VITE).unwrap(), 2_800);

    // Conservation: custody plus external holdings equal the original 3000.
    let fund = read_fund(&mut chain, &user());
    let custody: u64 = fund
        .accounts
        .iter()
        .map(|entry| entry.available + entry.locked)
        .sum();
    assert_eq!(custody as u128 + chain.balance(&user(), &VITE).unwrap(), 3_000);
}

#[test]
fn scenario_unregistered_token_deposit_rejected() {
    let vm = Vm::new();
    let mut chain = new_chain();
    chain.credit_balance(&user(), &ETH, 100);

    let mut send = AccountBlock {
        account_address: user(),
        to_address: ADDRESS_DEX_FUND,
        data: transfer_call(METHOD_USER_DEPOSIT, user(), ETH, 100),
        ..Default::default()
    };
    let err = vm.execute_send(&mut chain, &mut send).unwrap_err();
    assert_eq!(err.to_string(), "token is invalid");

    // Rejected sends never touch balances or fund storage.
    assert_eq!(chain.balance(&user(), &ETH).unwrap(), 100);
    assert!(read_fund(&mut chain, &user()).accounts.is_empty());
}

fn sell_order_call() -> Vec<u8> {
    let order = Order {
        id: 0,
        address: user(),
        trade_asset: VITE,
        quote_asset: ETH,
        side: true,
        order_type: OrderType::Limited,
        price: 3_000_000, // 0.03 at scale 10^8
        quantity: 2_000,
        amount: 0,
        status: OrderStatus::FullyExecuted,
        timestamp: 0,
    };
    ABI_DEX_FUND
        .pack(METHOD_NEW_ORDER, &[AbiValue::Bytes(order.encode())])
        .expect("packing a well-formed call")
}

/// Deposit, withdraw 200, register ETH, place the sell order
fn place_sell_order(vm: &Vm, chain: &mut MemoryChain) -> Vec<AccountBlock> {
    deposit_3000(vm, chain);
    chain.advance_snapshot();

    let send = AccountBlock {
        account_address: user(),
        to_address: ADDRESS_DEX_FUND,
        data: transfer_call(METHOD_USER_WITHDRAW, user(), VITE, 200),
        ..Default::default()
    };
    run_pair(vm, chain, send);

    chain.register_token(&ETH);
    chain.advance_snapshot();

    let mut send = AccountBlock {
        account_address: user(),
        to_address: ADDRESS_DEX_FUND,
        timestamp: 1_600_000_555,
        data: sell_order_call(),
        ..Default::default()
    };
    vm.execute_send(chain, &mut send).expect("order send");

    // The payload was rewritten to the canonical order on send.
    let args = ABI_DEX_FUND
        .unpack_method(METHOD_NEW_ORDER, &send.data)
        .unwrap();
    let normalized = Order::decode(args[0].as_bytes().unwrap()).unwrap();
    assert_eq!(normalized.amount, 60);
    assert_eq!(normalized.status, OrderStatus::Pending);
    assert_eq!(normalized.id, 1);

    chain.append_account_block(send.clone());
    match vm.execute_receive(chain, &send).expect("receive infra") {
        ReceiveOutcome::Confirmed {
            receive_block,
            appended,
        } => {
            chain.append_account_block(receive_block);
            appended
        }
        ReceiveOutcome::Failed { error, .. } => panic!("order receive failed: {error}"),
    }
}

#[test]
fn scenario_sell_order_locks_funds_and_reaches_matcher() {
    let vm = Vm::new();
    let mut chain = new_chain();

    let appended = place_sell_order(&vm, &mut chain);

    // Funds moved from available to locked by exactly the lock amount.
    let fund = read_fund(&mut chain, &user());
    let entry = fund.account(&VITE).unwrap();
    assert_eq!(entry.available, 800);
    assert_eq!(entry.locked, 2_000);

    // One block forwarded to the matcher carrying the canonical order.
    assert_eq!(appended.len(), 1);
    let forwarded = &appended[0];
    assert_eq!(forwarded.account_address, ADDRESS_DEX_FUND);
    assert_eq!(forwarded.to_address, ADDRESS_DEX_TRADE);
    let order = Order::decode(&forwarded.data).unwrap();
    assert_eq!(order.id, 1);
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.amount, 60);
    assert_eq!(order.quantity, 2_000);
}

fn settle_call(actions: Vec<SettleAction>) -> Vec<u8> {
    ABI_DEX_FUND
        .pack(
            METHOD_SETTLE_ORDERS,
            &[AbiValue::Bytes(SettleOrders { actions }.encode())],
        )
        .expect("packing a well-formed call")
}

fn half_fill_actions() -> Vec<SettleAction> {
    vec![
        SettleAction {
            address: user(),
            asset: VITE,
            dec_locked: 1_000,
            ..Default::default()
        },
        SettleAction {
            address: user(),
            asset: ETH,
            inc_available: 30,
            ..Default::default()
        },
    ]
}

#[test]
fn scenario_settlement_from_matcher() {
    let vm = Vm::new();
    let mut chain = new_chain();
    place_sell_order(&vm, &mut chain);
    chain.advance_snapshot();

    let send = AccountBlock {
        account_address: ADDRESS_DEX_TRADE,
        to_address: ADDRESS_DEX_FUND,
        data: settle_call(half_fill_actions()),
        ..Default::default()
    };
    run_pair(&vm, &mut chain, send);

    let fund = read_fund(&mut chain, &user());
    assert_eq!(fund.accounts.len(), 2);
    let vite_entry = fund.account(&VITE).unwrap();
    assert_eq!(vite_entry.available, 800);
    assert_eq!(vite_entry.locked, 1_000);
    let eth_entry = fund.account(&ETH).unwrap();
    assert_eq!(eth_entry.available, 30);
    assert_eq!(eth_entry.locked, 0);
}

#[test]
fn scenario_settlement_rejected_for_other_senders() {
    let vm = Vm::new();
    let mut chain = new_chain();
    place_sell_order(&vm, &mut chain);
    chain.advance_snapshot();
    let before = read_fund(&mut chain, &user());

    let mut send = AccountBlock {
        account_address: user(),
        to_address: ADDRESS_DEX_FUND,
        data: settle_call(half_fill_actions()),
        ..Default::default()
    };
    let err = vm.execute_send(&mut chain, &mut send).unwrap_err();
    assert!(matches!(err, VmError::Unauthorized));
    assert_eq!(read_fund(&mut chain, &user()), before);
}

#[test]
fn scenario_settlement_is_all_or_nothing() {
    let vm = Vm::new();
    let mut chain = new_chain();
    place_sell_order(&vm, &mut chain);
    chain.advance_snapshot();
    let before = read_fund(&mut chain, &user());

    // Second action would drive available negative; nothing may apply.
    let mut send = AccountBlock {
        account_address: ADDRESS_DEX_TRADE,
        to_address: ADDRESS_DEX_FUND,
        data: settle_call(vec![
            SettleAction {
                address: user(),
                asset: ETH,
                inc_available: 30,
                ..Default::default()
            },
            SettleAction {
                address: user(),
                asset: VITE,
                dec_available: 10_000,
                ..Default::default()
            },
        ]),
        ..Default::default()
    };
    vm.execute_send(&mut chain, &mut send).expect("send is authorized");
    chain.append_account_block(send.clone());

    match vm.execute_receive(&mut chain, &send).unwrap() {
        ReceiveOutcome::Failed {
            receive_block,
            error,
        } => {
            assert_eq!(receive_block.block_type, BlockType::ReceiveError);
            assert!(matches!(error, VmError::ConsistencyViolation(_)));
        }
        ReceiveOutcome::Confirmed { .. } => panic!("envelope must be rejected"),
    }
    assert_eq!(read_fund(&mut chain, &user()), before);
}

#[test]
fn receive_out_of_quota_consumes_budget_without_state_change() {
    let vm = Vm::new();
    let mut chain = new_chain();

    // 16500 non-zero bytes cost 1,122,000 quota, over the account ceiling.
    let send = AccountBlock {
        account_address: user(),
        to_address: ADDRESS_DEX_FUND,
        data: vec![0xff; 16_500],
        ..Default::default()
    };
    match vm.execute_receive(&mut chain, &send).unwrap() {
        ReceiveOutcome::Failed {
            receive_block,
            error,
        } => {
            assert_eq!(receive_block.block_type, BlockType::ReceiveError);
            assert_eq!(receive_block.quota, QUOTA_LIMIT_FOR_ACCOUNT);
            assert!(matches!(error, VmError::Quota(QuotaError::OutOfQuota)));
        }
        ReceiveOutcome::Confirmed { .. } => panic!("must run out of quota"),
    }
    assert!(read_fund(&mut chain, &user()).accounts.is_empty());
}

#[test]
fn byte_cost_overflow_is_hard_failure() {
    let too_many = u64::MAX / TX_DATA_NONZERO_GAS + 1;
    assert_eq!(
        data_gas_for_counts(too_many, 0),
        Err(QuotaError::GasUintOverflow)
    );
}

#[test]
fn fund_balances_never_go_negative_across_flows() {
    let vm = Vm::new();
    let mut chain = new_chain();
    place_sell_order(&vm, &mut chain);
    chain.advance_snapshot();

    let send = AccountBlock {
        account_address: ADDRESS_DEX_TRADE,
        to_address: ADDRESS_DEX_FUND,
        data: settle_call(half_fill_actions()),
        ..Default::default()
    };
    run_pair(&vm, &mut chain, send);

    // Invariant: every entry of every fund stays non-negative (u64 by
    // construction) and matches the expected post-trade totals.
    let fund = read_fund(&mut chain, &user());
    let vite_total =
        fund.account(&VITE).unwrap().available + fund.account(&VITE).unwrap().locked;
    assert_eq!(vite_total, 1_800); // 2800 custody minus the 1000 sold
    assert_eq!(fund.account(&ETH).unwrap().available, 30);
}
