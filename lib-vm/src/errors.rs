//! VM Execution Errors
//!
//! Every failure is an explicit result value; nothing panics. Send-side
//! errors reject the block before it enters the ledger. Receive-side errors
//! produce a receive-error block that persists and consumes quota while
//! leaving contract storage unchanged.

use thiserror::Error;

use crate::abi::AbiError;
use crate::quota::QuotaError;
use crate::storage::StorageError;
use crate::wire::WireError;

/// Error during contract send/receive execution
#[derive(Error, Debug)]
pub enum VmError {
    /// Asset not present in the token registry (send-side)
    #[error("token is invalid")]
    TokenInvalid,

    /// Unknown ABI method id (send-side)
    #[error("method not found: 0x{}", hex::encode(.0))]
    MethodNotFound([u8; 4]),

    /// Decode failure, zero amount, self-asset pair, malformed field (send-side)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Wrong caller for a restricted method (send-side)
    #[error("unauthorized caller")]
    Unauthorized,

    /// Available balance below the required amount (receive-side, and the
    /// dispatcher's external-ledger check on transfer sends)
    #[error("insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: u128, required: u128 },

    /// A settle action would drive a balance field negative; the whole
    /// envelope is rejected (receive-side)
    #[error("settle consistency violation: {0}")]
    ConsistencyViolation(String),

    /// Out-of-quota or cost-arithmetic overflow (dispatcher)
    #[error(transparent)]
    Quota(#[from] QuotaError),

    /// Underlying store failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<AbiError> for VmError {
    fn from(e: AbiError) -> Self {
        match e {
            AbiError::MethodNotFound(id) => VmError::MethodNotFound(id),
            other => VmError::InvalidArgument(other.to_string()),
        }
    }
}

impl From<WireError> for VmError {
    fn from(e: WireError) -> Self {
        VmError::InvalidArgument(e.to_string())
    }
}

/// Result type for contract execution
pub type VmResult<T> = Result<T, VmError>;
