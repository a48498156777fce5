//! # Yield Strategies
//!
//! A strategy handle deploys an instance's idle balance of one asset into
//! an external yield venue and reports value back. The instance never sees
//! a concrete venue type: it holds an `Arc<dyn StrategyHandle>` per asset in
//! its [`StrategyRouter`] and talks to it through the five capabilities
//! below.
//!
//! Funds flow through the asset bank:
//!
//! ```text
//!   deposit:  instance ──approve──► handle pulls `amount` from instance
//!   withdraw: handle pays up to `amount` back to the calling instance
//! ```

pub mod router;

use thiserror::Error;

use crate::types::{Address, Amount, AssetId, BasisPoints};

pub use router::StrategyRouter;

/// Errors reported by a strategy handle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StrategyError {
    /// Mutating call from someone other than the bound router.
    #[error("caller {0} is not the bound router")]
    UnauthorizedCaller(Address),

    /// The handle does not manage this asset.
    #[error("asset {0} not supported by this strategy")]
    UnsupportedAsset(AssetId),

    /// The venue refused or failed the operation.
    #[error("venue failure: {0}")]
    Venue(String),

    /// The venue moved less than the instance asked for.
    #[error("venue moved {moved} of {requested}")]
    Shortfall {
        /// Amount the instance asked the venue to move.
        requested: Amount,
        /// Amount the venue reported moving.
        moved: Amount,
    },
}

/// Capability interface every yield venue adapter implements.
///
/// Mutating methods take the calling identity so the handle can refuse
/// anyone but the router it was bound to. Per-user sub-balances are the
/// handle's own bookkeeping; decrements must saturate at zero.
pub trait StrategyHandle: Send + Sync {
    /// The handle's identity in the asset bank.
    fn address(&self) -> Address;

    /// Pulls `amount` of `asset` from `caller` into the venue and credits
    /// `on_behalf_of`'s sub-balance. Returns the amount actually deposited.
    fn deposit(
        &self,
        caller: &Address,
        asset: &AssetId,
        amount: Amount,
        on_behalf_of: &Address,
    ) -> Result<Amount, StrategyError>;

    /// Takes up to `amount` out of the venue, pays it to `caller`, and
    /// debits `on_behalf_of`'s sub-balance. Returns the amount actually
    /// withdrawn.
    fn withdraw(
        &self,
        caller: &Address,
        asset: &AssetId,
        amount: Amount,
        on_behalf_of: &Address,
    ) -> Result<Amount, StrategyError>;

    /// Current yield in basis points.
    fn current_apy(&self, asset: &AssetId) -> BasisPoints;

    /// Everything the venue holds for `asset`.
    fn total_value_locked(&self, asset: &AssetId) -> Amount;

    /// `user`'s sub-balance.
    fn user_balance(&self, user: &Address, asset: &AssetId) -> Amount;
}
