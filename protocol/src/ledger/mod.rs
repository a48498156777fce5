//! # Ledger
//!
//! Deposit and withdraw entry points of an [`Instance`], on top of the
//! [`BalanceBook`].
//!
//! Ordering, for both operations:
//!
//! 1. Entry lock and pause check.
//! 2. All validation, including the routing decision.
//! 3. Effects, staged so a late failure can be undone:
//!    - deposit credits the book *last*, after funds are in custody (and in
//!      the strategy, when routed); a strategy failure returns the pulled
//!      funds to the caller, and a routed deposit credits only what the
//!      handle reports it took in;
//!    - withdraw debits the book *first*, so a re-entrant second withdraw
//!      sees the reduced balance; any later failure restores the debit,
//!      including a strategy releasing less than the user's position.

mod book;

pub use book::BalanceBook;

use crate::error::{FerryError, FerryResult};
use crate::events::EventKind;
use crate::instance::{Gate, Instance};
use crate::strategy::{router, StrategyHandle};
use crate::types::{Address, Amount, AssetId};

fn validate_movement(caller: &Address, asset: &AssetId, amount: Amount) -> FerryResult<()> {
    if amount == 0 {
        return Err(FerryError::ZeroAmount);
    }
    if asset.is_null() {
        return Err(FerryError::NullAsset);
    }
    if caller.is_zero() {
        return Err(FerryError::NullAddress("caller"));
    }
    Ok(())
}

impl Instance {
    /// Ledger balance of `user` in `asset`.
    pub fn balance_of(&self, user: &Address, asset: &AssetId) -> Amount {
        self.state().read().book.balance_of(user, asset)
    }

    /// Sum of every user's ledger balance in `asset`.
    pub fn total_deposits(&self, asset: &AssetId) -> Amount {
        self.state().read().book.total(asset)
    }

    /// Pulls `amount` of `asset` from `caller` into custody (and into the
    /// asset's strategy when routing is on) and credits the caller.
    /// Returns the caller's new balance.
    ///
    /// # Errors
    ///
    /// Validation errors for zero amounts or null identities,
    /// [`FerryError::Paused`], [`FerryError::Reentrancy`],
    /// [`FerryError::StrategyNotConfigured`] when routing is on without a
    /// handle for `asset`, and collaborator errors. No balance changes on
    /// any error.
    pub fn deposit(&self, caller: &Address, asset: &AssetId, amount: Amount) -> FerryResult<Amount> {
        let _lock = self.enter(Gate::Pausable)?;
        validate_movement(caller, asset, amount)?;

        let route = {
            let st = self.state().read();
            let route = st.router.route(asset)?;
            // Reject overflow now; the credit comes after external effects.
            st.book
                .balance_of(caller, asset)
                .checked_add(amount)
                .and(st.book.total(asset).checked_add(amount))
                .ok_or(FerryError::AmountOverflow)?;
            route
        };

        let me = self.address();
        self.bank().transfer_from(asset, &me, caller, &me, amount)?;

        let mut credited = amount;
        if let Some(handle) = route.as_deref() {
            match router::forward_deposit(self.bank(), &me, handle, asset, amount, caller) {
                Ok(deposited) => {
                    // Only the position the handle holds for the user backs the credit.
                    credited = deposited.min(amount);
                    if credited < amount {
                        tracing::warn!(user = %caller, %asset, amount, credited, "strategy took in less than deposited");
                    }
                }
                Err(e) => {
                    tracing::warn!(user = %caller, %asset, amount, error = %e, "strategy deposit failed, refunding");
                    if let Err(refund) = self.bank().transfer(asset, &me, caller, amount) {
                        tracing::error!(user = %caller, %asset, amount, error = %refund, "refund after failed strategy deposit failed");
                    }
                    return Err(e);
                }
            }
        }

        let new_balance = {
            let mut st = self.state().write();
            let new_balance = st.book.credit(caller, asset, credited)?;
            if route.is_some() {
                st.router.note_routed(asset, credited);
            }
            st.journal.record(EventKind::Deposited {
                user: *caller,
                asset: *asset,
                amount: credited,
                routed: route.is_some(),
            });
            new_balance
        };

        tracing::info!(user = %caller, %asset, amount = credited, new_balance, routed = route.is_some(), "deposit");
        Ok(new_balance)
    }

    /// Debits `caller` by `amount`, releases routed funds from the asset's
    /// strategy, and pays `amount` to the caller. Returns the caller's new
    /// balance.
    ///
    /// # Errors
    ///
    /// [`FerryError::InsufficientBalance`] if `amount` exceeds the balance,
    /// plus the same guard, validation, and configuration errors as
    /// [`deposit`](Self::deposit). Any failure after the debit restores it.
    pub fn withdraw(&self, caller: &Address, asset: &AssetId, amount: Amount) -> FerryResult<Amount> {
        let _lock = self.enter(Gate::Pausable)?;
        validate_movement(caller, asset, amount)?;

        let route = self.state().read().router.route(asset)?;
        let new_balance = self.state().write().book.debit(caller, asset, amount)?;

        match self.pay_out(caller, asset, amount, route.as_deref()) {
            Ok(from_strategy) => {
                self.record(EventKind::Withdrawn {
                    user: *caller,
                    asset: *asset,
                    amount,
                    from_strategy,
                });
                tracing::info!(user = %caller, %asset, amount, new_balance, from_strategy, "withdraw");
                Ok(new_balance)
            }
            Err(e) => {
                tracing::warn!(user = %caller, %asset, amount, error = %e, "withdraw failed, restoring balance");
                self.restore_debit(caller, asset, amount);
                Err(e)
            }
        }
    }

    // Returns how much came out of the strategy.
    fn pay_out(
        &self,
        user: &Address,
        asset: &AssetId,
        amount: Amount,
        handle: Option<&dyn StrategyHandle>,
    ) -> FerryResult<Amount> {
        let me = self.address();
        let released = match handle {
            Some(h) => self.release_position(h, asset, amount, user)?,
            None => 0,
        };

        if let Err(e) = self.bank().transfer(asset, &me, user, amount) {
            if let Some(h) = handle {
                self.restore_position(h, asset, released, user);
            }
            return Err(e.into());
        }
        Ok(released)
    }
}
