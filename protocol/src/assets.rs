//! # Asset Bank Interface
//!
//! The token substrate an instance custodies assets in. An instance "holds"
//! an asset by having a balance at its own address; deposits pull from the
//! user with an allowance, withdrawals push back, and collaborators
//! (strategies, the transport) draw from the instance through approvals.
//!
//! Transfers may invoke holder callbacks. The instance's reentrancy lock
//! exists because of exactly that.

use thiserror::Error;

use crate::types::{Address, Amount, AssetId};

/// Errors reported by an asset bank.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssetError {
    /// Holder cannot cover the transfer.
    #[error("insufficient funds: {holder} holds {available} of {asset}, needs {requested}")]
    InsufficientFunds {
        /// Asset being moved.
        asset: AssetId,
        /// Paying holder.
        holder: Address,
        /// Holder's balance.
        available: Amount,
        /// Requested amount.
        requested: Amount,
    },

    /// Spender's allowance cannot cover the transfer.
    #[error("insufficient allowance: {spender} may move {available} of {asset}, needs {requested}")]
    InsufficientAllowance {
        /// Asset being moved.
        asset: AssetId,
        /// Spender drawing the funds.
        spender: Address,
        /// Remaining allowance.
        available: Amount,
        /// Requested amount.
        requested: Amount,
    },

    /// The bank refused the transfer for its own reasons.
    #[error("transfer rejected: {0}")]
    Rejected(String),

    /// Arithmetic overflow inside the bank.
    #[error("balance overflow")]
    Overflow,
}

/// Fungible-asset substrate consumed by an instance.
pub trait AssetBank: Send + Sync {
    /// Balance of `holder` in `asset`.
    fn balance_of(&self, asset: &AssetId, holder: &Address) -> Amount;

    /// Moves `amount` from `from` to `to`, authorized by `from` itself.
    fn transfer(
        &self,
        asset: &AssetId,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), AssetError>;

    /// Moves `amount` from `from` to `to` on behalf of `spender`, consuming
    /// allowance.
    fn transfer_from(
        &self,
        asset: &AssetId,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), AssetError>;

    /// Sets the allowance `owner` grants `spender`.
    fn approve(
        &self,
        asset: &AssetId,
        owner: &Address,
        spender: &Address,
        amount: Amount,
    ) -> Result<(), AssetError>;

    /// Remaining allowance.
    fn allowance(&self, asset: &AssetId, owner: &Address, spender: &Address) -> Amount;
}
