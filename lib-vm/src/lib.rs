//! Contract VM — the on-chain DEX subsystem
//!
//! This crate implements the virtual-machine half of the decentralized
//! exchange: a *Fund* contract that custodies user balances and originates
//! orders, and the dispatcher that routes send/receive block pairs to it.
//!
//! # Layers
//!
//! - [`storage`]: key-value view over per-contract storage with a
//!   write-through "unsaved" overlay; canonical key encoding
//! - [`quota`]: per-account execution budget from pledge, PoW difficulty,
//!   and snapshot gap; intrinsic and data-byte costs
//! - [`abi`]: method dispatch codec (4-byte keccak ids, 32-byte words)
//! - [`wire`]: tag-length-value record codec for orders, settle envelopes,
//!   and persisted fund records
//! - [`contracts`]: well-known addresses, registry reads, and the Fund
//!   contract methods
//! - [`dispatcher`]: send-side validation, receive-side state mutation, and
//!   appended-block collaboration with the ledger
//!
//! # Execution model
//!
//! Single-threaded per receiving account. A `DoSend`/`DoReceive` pair is
//! pure CPU plus storage-facade calls; all receive-side writes go through an
//! unsaved overlay that is committed after a successful receive and
//! discarded before a receive-error block is recorded.

pub mod abi;
pub mod contracts;
pub mod dispatcher;
pub mod errors;
pub mod quota;
pub mod storage;
pub mod testing;
pub mod wire;

pub use dispatcher::{ReceiveOutcome, Vm};
pub use errors::{VmError, VmResult};
