//! Error types for FERRY instances.
//!
//! Every entry point returns a [`FerryError`]. Callers that need to react
//! differently to, say, a pause versus an empty balance should match on
//! [`FerryError::kind`] rather than on display strings.

use thiserror::Error;

use crate::assets::AssetError;
use crate::messaging::TransportError;
use crate::strategy::StrategyError;
use crate::types::{Address, Amount, AssetId, ChainId, MessageId};

/// Coarse classification of a [`FerryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input: null/zero values, unknown chain, out-of-range settings.
    Validation,
    /// Caller lacks the role the operation requires.
    Authorization,
    /// Balance, fee reserve, or sweepable surplus too low.
    InsufficientResource,
    /// Instance configuration makes the operation unusable.
    Configuration,
    /// Paused, re-entered, or already processed.
    State,
    /// A collaborator (asset bank, strategy, transport) failed.
    External,
    /// Internal accounting no longer balances.
    Invariant,
}

/// Errors returned by instance operations.
#[derive(Debug, Error)]
pub enum FerryError {
    /// Amount must be nonzero.
    #[error("amount must be nonzero")]
    ZeroAmount,

    /// The null asset identity was supplied.
    #[error("asset identity is null")]
    NullAsset,

    /// A required address was the null identity.
    #[error("{0} address is null")]
    NullAddress(&'static str),

    /// Destination chain is not on the allowlist.
    #[error("destination {0} is not allowlisted")]
    ChainNotAllowed(ChainId),

    /// The transport does not route to the destination chain.
    #[error("transport does not support {0}")]
    ChainNotSupported(ChainId),

    /// Memo exceeds the intent size cap.
    #[error("memo too long: {len} bytes (max {max})")]
    MemoTooLong {
        /// Memo length in bytes.
        len: usize,
        /// Allowed maximum.
        max: usize,
    },

    /// Execution budget value outside the configured bounds.
    #[error("execution budget {value} outside [{min}, {max}]")]
    ExecutionBudgetOutOfBounds {
        /// Rejected value.
        value: u64,
        /// Lower bound.
        min: u64,
        /// Upper bound.
        max: u64,
    },

    /// Execution bounds are inverted or empty.
    #[error("invalid execution bounds [{min}, {max}]")]
    InvalidExecutionBounds {
        /// Proposed lower bound.
        min: u64,
        /// Proposed upper bound.
        max: u64,
    },

    /// The caller does not hold the required role.
    #[error("unauthorized: {caller} is not the {role}")]
    Unauthorized {
        /// Who called.
        caller: Address,
        /// Role that was required.
        role: &'static str,
    },

    /// The user's ledger balance cannot cover the request.
    #[error("insufficient balance: available {available}, requested {requested} (asset {asset})")]
    InsufficientBalance {
        /// Asset being spent.
        asset: AssetId,
        /// Current ledger balance.
        available: Amount,
        /// Requested amount.
        requested: Amount,
    },

    /// The fee reserve cannot pay the transport fee.
    #[error("insufficient fee reserve: available {available}, fee {required}")]
    InsufficientFeeReserve {
        /// Reserve held by the instance.
        available: Amount,
        /// Quoted fee.
        required: Amount,
    },

    /// A sweep asked for more than the stray surplus.
    #[error("insufficient stray balance of {asset}: available {available}, requested {requested}")]
    InsufficientStray {
        /// Asset being swept.
        asset: AssetId,
        /// Sweepable surplus.
        available: Amount,
        /// Requested amount.
        requested: Amount,
    },

    /// Strategy routing is on but the asset has no handle.
    #[error("strategy not configured for asset {0}")]
    StrategyNotConfigured(AssetId),

    /// The instance is paused.
    #[error("instance is paused")]
    Paused,

    /// A mutating entry point was re-entered during its own execution.
    #[error("reentrant call rejected")]
    Reentrancy,

    /// The inbound message was already credited.
    #[error("message {0} already processed")]
    DuplicateMessage(MessageId),

    /// The intent payload could not be decoded.
    #[error("malformed intent payload: {0}")]
    MalformedIntent(String),

    /// Checked arithmetic failed.
    #[error("amount overflow")]
    AmountOverflow,

    /// Asset bank failure.
    #[error("asset bank: {0}")]
    Asset(#[from] AssetError),

    /// Strategy handle failure.
    #[error("strategy: {0}")]
    Strategy(#[from] StrategyError),

    /// Transport failure.
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// Ledger liabilities exceed the assets backing them.
    #[error("solvency check failed for {asset}: ledger {liabilities}, backing {backing}")]
    InvariantViolation {
        /// Asset checked.
        asset: AssetId,
        /// Ledger total.
        liabilities: Amount,
        /// Direct holding plus strategy TVL.
        backing: Amount,
    },
}

impl FerryError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        use FerryError::*;
        match self {
            ZeroAmount
            | NullAsset
            | NullAddress(_)
            | ChainNotAllowed(_)
            | ChainNotSupported(_)
            | MemoTooLong { .. }
            | ExecutionBudgetOutOfBounds { .. }
            | InvalidExecutionBounds { .. }
            | MalformedIntent(_)
            | AmountOverflow => ErrorKind::Validation,
            Unauthorized { .. } => ErrorKind::Authorization,
            InsufficientBalance { .. } | InsufficientFeeReserve { .. } | InsufficientStray { .. } => {
                ErrorKind::InsufficientResource
            }
            StrategyNotConfigured(_) => ErrorKind::Configuration,
            Paused | Reentrancy | DuplicateMessage(_) => ErrorKind::State,
            Asset(_) | Strategy(_) | Transport(_) => ErrorKind::External,
            InvariantViolation { .. } => ErrorKind::Invariant,
        }
    }

    pub(crate) fn unauthorized(caller: &Address, role: &'static str) -> Self {
        FerryError::Unauthorized {
            caller: *caller,
            role,
        }
    }
}

/// Result alias used throughout the crate.
pub type FerryResult<T> = Result<T, FerryError>;
