//! Consensus Primitive Types
//!
//! Rule: No String identifiers in consensus state. Ever.
//!
//! This crate defines the foundational types shared by the ledger and the
//! contract VM:
//!
//! - [`Address`]: 21-byte account identifier (user or contract)
//! - [`TokenTag`]: 10-byte asset identifier
//! - [`Hash`]: 32-byte block/snapshot hash
//! - [`AccountBlock`] / [`SnapshotBlock`]: the unit of ledger mutation and
//!   the consensus checkpoint quota is measured against
//!
//! All types are fixed-size, deterministically serializable, and cheap to
//! copy and compare.

pub mod block;
pub mod primitives;

pub use block::{AccountBlock, BlockType, SnapshotBlock};
pub use primitives::{
    Address, Amount, BlockHeight, Hash, TokenTag, ADDRESS_LEN, TOKEN_TAG_LEN,
};
