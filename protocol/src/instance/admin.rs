//! Administrative entry points.
//!
//! All of these run while paused, take the reentrancy lock, check the
//! caller's role, and record an event.

use std::sync::Arc;

use super::{Gate, Instance};
use crate::error::{FerryError, FerryResult};
use crate::events::EventKind;
use crate::strategy::StrategyHandle;
use crate::types::{Address, Amount, AssetId, ChainId};

impl Instance {
    /// Adds `chain` to, or removes it from, the outbound allowlist.
    pub fn set_chain_allowed(&self, caller: &Address, chain: ChainId, allowed: bool) -> FerryResult<()> {
        let _lock = self.enter(Gate::AlwaysOpen)?;
        let mut st = self.state().write();
        st.access.ensure_owner(caller)?;
        if allowed {
            st.allowlist.insert(chain);
        } else {
            st.allowlist.remove(&chain);
        }
        st.journal.record(EventKind::ChainAllowlistUpdated { chain, allowed });
        tracing::info!(%chain, allowed, "chain allowlist updated");
        Ok(())
    }

    /// Replaces the execution bounds, clamping the current value into them.
    ///
    /// # Errors
    ///
    /// [`FerryError::InvalidExecutionBounds`] if `min > max` or `max == 0`.
    pub fn set_execution_bounds(&self, caller: &Address, min: u64, max: u64) -> FerryResult<()> {
        let _lock = self.enter(Gate::AlwaysOpen)?;
        let mut st = self.state().write();
        st.access.ensure_owner(caller)?;
        st.budget.rebound(min, max)?;
        let value = st.budget.value;
        st.journal.record(EventKind::ExecutionBoundsUpdated { min, max });
        tracing::info!(min, max, value, "execution bounds updated");
        Ok(())
    }

    /// Sets the destination execution budget.
    ///
    /// # Errors
    ///
    /// [`FerryError::ExecutionBudgetOutOfBounds`] outside the current bounds.
    pub fn set_execution_budget(&self, caller: &Address, value: u64) -> FerryResult<()> {
        let _lock = self.enter(Gate::AlwaysOpen)?;
        let mut st = self.state().write();
        st.access.ensure_owner(caller)?;
        st.budget.check_value(value)?;
        st.budget.value = value;
        st.journal.record(EventKind::ExecutionBudgetUpdated { value });
        tracing::info!(value, "execution budget updated");
        Ok(())
    }

    /// Registers, replaces, or clears the strategy for `asset`. Funds held
    /// by a displaced strategy are not migrated.
    pub fn set_strategy(
        &self,
        caller: &Address,
        asset: &AssetId,
        handle: Option<Arc<dyn StrategyHandle>>,
    ) -> FerryResult<()> {
        let _lock = self.enter(Gate::AlwaysOpen)?;
        if asset.is_null() {
            return Err(FerryError::NullAsset);
        }
        let strategy = handle.as_ref().map(|h| h.address());
        if strategy.is_some_and(|a| a.is_zero()) {
            return Err(FerryError::NullAddress("strategy"));
        }

        let mut st = self.state().write();
        st.access.ensure_owner(caller)?;
        let previous = st.router.set_strategy(*asset, handle);
        st.journal.record(EventKind::StrategyUpdated {
            asset: *asset,
            strategy,
        });
        if previous.is_some() {
            tracing::warn!(%asset, "strategy replaced; funds in the old strategy stay there");
        }
        tracing::info!(%asset, strategy = ?strategy, "strategy updated");
        Ok(())
    }

    /// Flips the global routing switch.
    pub fn set_strategies_enabled(&self, caller: &Address, enabled: bool) -> FerryResult<()> {
        let _lock = self.enter(Gate::AlwaysOpen)?;
        let mut st = self.state().write();
        st.access.ensure_owner(caller)?;
        st.router.set_enabled(enabled);
        st.journal.record(EventKind::StrategyRoutingToggled { enabled });
        tracing::info!(enabled, "strategy routing toggled");
        Ok(())
    }

    /// Rotates the pauser. Owner only.
    pub fn set_pauser(&self, caller: &Address, pauser: Address) -> FerryResult<()> {
        let _lock = self.enter(Gate::AlwaysOpen)?;
        let mut st = self.state().write();
        let previous = st.access.set_pauser(caller, pauser)?;
        st.journal.record(EventKind::PauserChanged {
            previous,
            current: pauser,
        });
        tracing::info!(%previous, current = %pauser, "pauser changed");
        Ok(())
    }

    /// Hands the owner role to `owner`.
    pub fn transfer_ownership(&self, caller: &Address, owner: Address) -> FerryResult<()> {
        let _lock = self.enter(Gate::AlwaysOpen)?;
        let mut st = self.state().write();
        let previous = st.access.transfer_ownership(caller, owner)?;
        st.journal.record(EventKind::OwnershipTransferred {
            previous,
            current: owner,
        });
        tracing::info!(%previous, current = %owner, "ownership transferred");
        Ok(())
    }

    /// Blocks deposits, withdrawals and outbound transfers. Pauser or owner.
    pub fn pause(&self, caller: &Address) -> FerryResult<()> {
        self.set_paused(caller, true)
    }

    /// Lifts the pause. Pauser or owner.
    pub fn unpause(&self, caller: &Address) -> FerryResult<()> {
        self.set_paused(caller, false)
    }

    fn set_paused(&self, caller: &Address, paused: bool) -> FerryResult<()> {
        let _lock = self.enter(Gate::AlwaysOpen)?;
        let mut st = self.state().write();
        if st.access.set_paused(caller, paused)? {
            let by = *caller;
            st.journal.record(if paused {
                EventKind::Paused { by }
            } else {
                EventKind::Unpaused { by }
            });
            tracing::info!(%by, paused, "pause switch flipped");
        }
        Ok(())
    }

    /// Sends `amount` of `asset` that no user is owed to `beneficiary`.
    /// Use [`AssetId::NATIVE`] for the chain's native currency.
    ///
    /// # Errors
    ///
    /// [`FerryError::InsufficientStray`] if `amount` exceeds
    /// [`stray_balance`](Self::stray_balance); validation, role, and asset
    /// bank errors otherwise.
    pub fn sweep(
        &self,
        caller: &Address,
        asset: &AssetId,
        beneficiary: Address,
        amount: Amount,
    ) -> FerryResult<()> {
        let _lock = self.enter(Gate::AlwaysOpen)?;
        self.state().read().access.ensure_owner(caller)?;
        if amount == 0 {
            return Err(FerryError::ZeroAmount);
        }
        if asset.is_null() {
            return Err(FerryError::NullAsset);
        }
        if beneficiary.is_zero() {
            return Err(FerryError::NullAddress("beneficiary"));
        }

        let available = self.stray_balance(asset);
        if amount > available {
            return Err(FerryError::InsufficientStray {
                asset: *asset,
                available,
                requested: amount,
            });
        }

        self.bank()
            .transfer(asset, &self.address(), &beneficiary, amount)?;
        self.record(EventKind::Swept {
            asset: *asset,
            beneficiary,
            amount,
        });
        tracing::info!(%asset, %beneficiary, amount, "swept stray balance");
        Ok(())
    }
}
