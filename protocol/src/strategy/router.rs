//! # Strategy Router
//!
//! Decides whether a balance movement goes through a registered strategy
//! handle or stays in direct custody, and owns the `asset -> handle`
//! registry.
//!
//! Routing rules:
//!
//! | `enabled` | handle registered | deposit / withdraw            |
//! |-----------|-------------------|-------------------------------|
//! | false     | any               | direct custody                |
//! | true      | yes               | through the handle            |
//! | true      | no                | `StrategyNotConfigured` error |
//!
//! Replacing a handle does not migrate funds held by the previous one.
//!
//! The router also keeps, per asset, the total of user positions the
//! current handle holds on the instance's behalf. Ledger liabilities minus
//! that total is what direct custody must cover.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::assets::AssetBank;
use crate::error::{FerryError, FerryResult};
use crate::strategy::StrategyHandle;
use crate::types::{Address, Amount, AssetId};

/// Asset-to-strategy registry plus the global routing switch.
#[derive(Clone, Default)]
pub struct StrategyRouter {
    handles: HashMap<AssetId, Arc<dyn StrategyHandle>>,
    routed: HashMap<AssetId, Amount>,
    enabled: bool,
}

impl fmt::Debug for StrategyRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handles: HashMap<_, _> = self
            .handles
            .iter()
            .map(|(asset, h)| (*asset, h.address()))
            .collect();
        f.debug_struct("StrategyRouter")
            .field("enabled", &self.enabled)
            .field("handles", &handles)
            .field("routed", &self.routed)
            .finish()
    }
}

impl StrategyRouter {
    /// Routing disabled, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Global routing switch.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Flips the routing switch. Returns the previous value.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        std::mem::replace(&mut self.enabled, enabled)
    }

    /// Registers, replaces, or (with `None`) clears the handle for `asset`.
    /// Returns the handle it displaced.
    ///
    /// Positions held by a displaced handle are no longer reachable, so the
    /// routed total restarts at zero unless the same handle is re-registered.
    pub fn set_strategy(
        &mut self,
        asset: AssetId,
        handle: Option<Arc<dyn StrategyHandle>>,
    ) -> Option<Arc<dyn StrategyHandle>> {
        let next = handle.as_ref().map(|h| h.address());
        let previous = match handle {
            Some(h) => self.handles.insert(asset, h),
            None => self.handles.remove(&asset),
        };
        if previous.as_ref().map(|h| h.address()) != next {
            self.routed.remove(&asset);
        }
        previous
    }

    /// Sum of user positions in the registered handle for `asset`.
    pub fn routed_total(&self, asset: &AssetId) -> Amount {
        self.routed.get(asset).copied().unwrap_or(0)
    }

    /// Records `amount` entering the handle for `asset`.
    pub fn note_routed(&mut self, asset: &AssetId, amount: Amount) {
        if amount == 0 {
            return;
        }
        let total = self.routed.entry(*asset).or_insert(0);
        *total = total.saturating_add(amount);
    }

    /// Records `amount` leaving the handle for `asset`.
    pub fn note_released(&mut self, asset: &AssetId, amount: Amount) {
        if let Some(total) = self.routed.get_mut(asset) {
            *total = total.saturating_sub(amount);
            if *total == 0 {
                self.routed.remove(asset);
            }
        }
    }

    /// Registered handle, ignoring the routing switch.
    pub fn handle_for(&self, asset: &AssetId) -> Option<Arc<dyn StrategyHandle>> {
        self.handles.get(asset).cloned()
    }

    /// Address of the registered handle.
    pub fn strategy_address(&self, asset: &AssetId) -> Option<Address> {
        self.handles.get(asset).map(|h| h.address())
    }

    /// Assets that have a handle, sorted.
    pub fn registered_assets(&self) -> Vec<AssetId> {
        let mut assets: Vec<_> = self.handles.keys().copied().collect();
        assets.sort();
        assets
    }

    /// Handle a deposit or withdrawal of `asset` must go through, or `None`
    /// for direct custody.
    ///
    /// # Errors
    ///
    /// [`FerryError::StrategyNotConfigured`] when routing is on and `asset`
    /// has no handle.
    pub fn route(&self, asset: &AssetId) -> FerryResult<Option<Arc<dyn StrategyHandle>>> {
        if !self.enabled {
            return Ok(None);
        }
        self.handle_for(asset)
            .map(Some)
            .ok_or(FerryError::StrategyNotConfigured(*asset))
    }

    /// Like [`route`](Self::route) but falls back to direct custody when no
    /// handle is registered. Used when value leaves over the transport.
    pub fn route_lenient(&self, asset: &AssetId) -> Option<Arc<dyn StrategyHandle>> {
        if self.enabled {
            self.handle_for(asset)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Fund movement
// ---------------------------------------------------------------------------

/// Moves `amount` of custody into `handle` on behalf of `user`.
///
/// The approval is cleared afterwards whatever the outcome, so a handle can
/// never draw more than one deposit's worth.
pub(crate) fn forward_deposit(
    bank: &dyn AssetBank,
    custodian: &Address,
    handle: &dyn StrategyHandle,
    asset: &AssetId,
    amount: Amount,
    user: &Address,
) -> FerryResult<Amount> {
    let spender = handle.address();
    bank.approve(asset, custodian, &spender, amount)?;
    let result = handle.deposit(custodian, asset, amount, user);
    if let Err(e) = bank.approve(asset, custodian, &spender, 0) {
        tracing::warn!(%asset, strategy = %spender, error = %e, "failed to clear strategy allowance");
    }
    let deposited = result?;
    tracing::debug!(%asset, %user, amount, deposited, strategy = %spender, "routed deposit");
    Ok(deposited)
}

/// Pulls up to `amount` of `user`'s position out of `handle` into custody.
///
/// Capped at the handle's reported sub-balance for `user`; anything beyond
/// that is expected to be in direct custody already (inbound credits never
/// enter a strategy).
pub(crate) fn release(
    custodian: &Address,
    handle: &dyn StrategyHandle,
    asset: &AssetId,
    amount: Amount,
    user: &Address,
) -> FerryResult<Amount> {
    let take = amount.min(handle.user_balance(user, asset));
    if take == 0 {
        return Ok(0);
    }
    let withdrawn = handle.withdraw(custodian, asset, take, user)?;
    tracing::debug!(%asset, %user, requested = amount, withdrawn, strategy = %handle.address(), "released from strategy");
    Ok(withdrawn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::FixedStrategy;

    fn asset() -> AssetId {
        AssetId(Address::repeat_byte(0x11))
    }

    #[test]
    fn disabled_routing_is_direct_even_with_handle() {
        let mut router = StrategyRouter::new();
        router.set_strategy(asset(), Some(Arc::new(FixedStrategy::new(500, 1_000))));
        assert!(router.route(&asset()).unwrap().is_none());
        assert!(router.route_lenient(&asset()).is_none());
    }

    #[test]
    fn enabled_routing_requires_handle() {
        let mut router = StrategyRouter::new();
        router.set_enabled(true);
        let err = router.route(&asset()).err().unwrap();
        assert!(matches!(err, FerryError::StrategyNotConfigured(a) if a == asset()));
        assert!(router.route_lenient(&asset()).is_none());
    }

    #[test]
    fn addresses_reported_for_registered_assets() {
        let mut router = StrategyRouter::new();
        assert_eq!(router.strategy_address(&asset()), None);
        let handle = Arc::new(FixedStrategy::new(425, 9_000));
        let addr = handle.address();
        router.set_strategy(asset(), Some(handle));
        assert_eq!(router.strategy_address(&asset()), Some(addr));
        assert_eq!(router.registered_assets(), vec![asset()]);
    }

    #[test]
    fn clearing_strategy_returns_previous() {
        let mut router = StrategyRouter::new();
        router.set_strategy(asset(), Some(Arc::new(FixedStrategy::new(1, 1))));
        assert!(router.set_strategy(asset(), None).is_some());
        assert!(router.handle_for(&asset()).is_none());
    }

    #[test]
    fn routed_total_tracks_movements() {
        let mut router = StrategyRouter::new();
        router.note_routed(&asset(), 300);
        router.note_routed(&asset(), 200);
        router.note_released(&asset(), 120);
        assert_eq!(router.routed_total(&asset()), 380);

        router.note_released(&asset(), 1_000);
        assert_eq!(router.routed_total(&asset()), 0);
    }

    #[test]
    fn replacing_handle_resets_routed_total() {
        let mut router = StrategyRouter::new();
        let handle: Arc<dyn StrategyHandle> = Arc::new(FixedStrategy::new(1, 1));
        router.set_strategy(asset(), Some(handle.clone()));
        router.note_routed(&asset(), 500);

        router.set_strategy(asset(), Some(handle));
        assert_eq!(router.routed_total(&asset()), 500);

        router.set_strategy(asset(), None);
        assert_eq!(router.routed_total(&asset()), 0);
    }
}
