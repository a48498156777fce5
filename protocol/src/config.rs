//! # Instance Configuration & Constants
//!
//! Every magic number in FERRY lives here. Runtime configuration (owner,
//! pauser, transport, fee asset, execution budget) is carried by
//! [`InstanceConfig`] and handed to the instance at construction. There is
//! no global state; two instances in one process never see each other's
//! settings.

use serde::{Deserialize, Serialize};

use crate::error::{FerryError, FerryResult};
use crate::types::{Address, AssetId, ChainId};

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Crate-level protocol version string.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Version byte stamped into every encoded intent. Bump when the intent
/// layout changes; decoders reject versions they do not know.
pub const INTENT_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Execution Budget
// ---------------------------------------------------------------------------

/// Default gas limit forwarded to destination execution.
pub const DEFAULT_GAS_LIMIT: u64 = 200_000;

/// Default lower bound for the execution budget.
pub const DEFAULT_MIN_GAS_LIMIT: u64 = 50_000;

/// Default upper bound for the execution budget. Anything above this is
/// either a typo or an expensive mistake.
pub const DEFAULT_MAX_GAS_LIMIT: u64 = 2_000_000;

// ---------------------------------------------------------------------------
// Message Limits
// ---------------------------------------------------------------------------

/// Maximum free-form memo length in bytes carried inside an intent.
pub const MAX_MEMO_LENGTH: usize = 1024;

/// Number of events the in-memory journal retains before dropping the
/// oldest.
pub const EVENT_JOURNAL_CAPACITY: usize = 4096;

// ---------------------------------------------------------------------------
// ExecutionBudget
// ---------------------------------------------------------------------------

/// Gas budget for destination-side execution, bounded by an
/// administrator-set `[min, max]` range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionBudget {
    /// Inclusive lower bound.
    pub min: u64,
    /// Inclusive upper bound.
    pub max: u64,
    /// Current value, always inside `[min, max]`.
    pub value: u64,
}

impl ExecutionBudget {
    /// Builds a budget, validating bounds and value.
    ///
    /// # Errors
    ///
    /// [`FerryError::InvalidExecutionBounds`] if `min > max` or `max == 0`.
    /// [`FerryError::ExecutionBudgetOutOfBounds`] if `value` is outside the range.
    pub fn new(min: u64, max: u64, value: u64) -> FerryResult<Self> {
        Self::check_bounds(min, max)?;
        let budget = Self { min, max, value };
        budget.check_value(value)?;
        Ok(budget)
    }

    /// Validates a candidate value against the current bounds.
    pub fn check_value(&self, value: u64) -> FerryResult<()> {
        if value < self.min || value > self.max {
            return Err(FerryError::ExecutionBudgetOutOfBounds {
                value,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    /// Validates a candidate `[min, max]` pair.
    pub fn check_bounds(min: u64, max: u64) -> FerryResult<()> {
        if max == 0 || min > max {
            return Err(FerryError::InvalidExecutionBounds { min, max });
        }
        Ok(())
    }

    /// Replaces the bounds and clamps the current value into them.
    pub fn rebound(&mut self, min: u64, max: u64) -> FerryResult<()> {
        Self::check_bounds(min, max)?;
        self.min = min;
        self.max = max;
        self.value = self.value.clamp(min, max);
        Ok(())
    }
}

impl Default for ExecutionBudget {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_GAS_LIMIT,
            max: DEFAULT_MAX_GAS_LIMIT,
            value: DEFAULT_GAS_LIMIT,
        }
    }
}

// ---------------------------------------------------------------------------
// InstanceConfig
// ---------------------------------------------------------------------------

/// Construction-time configuration of one instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// The instance's own identity. Assets it custodies sit at this address
    /// in the asset bank.
    pub address: Address,
    /// The chain this instance lives on.
    pub chain_id: ChainId,
    /// Administrator.
    pub owner: Address,
    /// May pause and unpause, nothing else.
    pub pauser: Address,
    /// Asset the transport charges fees in.
    pub fee_asset: AssetId,
    /// Destination execution budget.
    #[serde(default)]
    pub execution_budget: ExecutionBudget,
}

impl InstanceConfig {
    /// Checks identities and the execution budget.
    ///
    /// # Errors
    ///
    /// [`FerryError::NullAddress`] for a zero instance, owner, or pauser
    /// address; [`FerryError::NullAsset`] for a null fee asset; budget errors
    /// from [`ExecutionBudget::new`].
    pub fn validate(&self) -> FerryResult<()> {
        for (field, addr) in [
            ("address", self.address),
            ("owner", self.owner),
            ("pauser", self.pauser),
        ] {
            if addr.is_zero() {
                return Err(FerryError::NullAddress(field));
            }
        }
        if self.fee_asset.is_null() {
            return Err(FerryError::NullAsset);
        }
        let b = self.execution_budget;
        ExecutionBudget::new(b.min, b.max, b.value)?;
        Ok(())
    }
}
