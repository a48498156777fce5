//! # Vault Strategy
//!
//! Reference [`StrategyHandle`]: a single-venue vault that keeps deposited
//! funds at its own address in an [`InMemoryBank`] and tracks a sub-balance
//! per `(user, asset)`.
//!
//! The vault is bound to one router (an instance address) at construction.
//! Mutating calls from anyone else are refused.
//!
//! Operators can move the venue's real holdings away from the sub-balances
//! with [`accrue_yield`](VaultStrategy::accrue_yield) and
//! [`apply_loss`](VaultStrategy::apply_loss). Withdrawals never pay more
//! than the vault holds, and sub-balances saturate at zero.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ferry_protocol::{Address, Amount, AssetBank, AssetId, BasisPoints, StrategyError, StrategyHandle};
use parking_lot::RwLock;

use crate::bank::InMemoryBank;

#[derive(Default)]
struct VaultBook {
    positions: HashMap<(Address, AssetId), Amount>,
    apy: HashMap<AssetId, BasisPoints>,
}

/// Yield venue adapter over the in-memory bank.
pub struct VaultStrategy {
    address: Address,
    router: Address,
    bank: Arc<InMemoryBank>,
    assets: HashSet<AssetId>,
    book: RwLock<VaultBook>,
}

impl VaultStrategy {
    /// A vault at `address` that only `router` may deposit into or
    /// withdraw from, managing the listed assets.
    pub fn new(
        address: Address,
        router: Address,
        bank: Arc<InMemoryBank>,
        assets: impl IntoIterator<Item = AssetId>,
    ) -> Self {
        Self {
            address,
            router,
            bank,
            assets: assets.into_iter().collect(),
            book: RwLock::new(VaultBook::default()),
        }
    }

    /// Sets the advertised yield for `asset`.
    pub fn set_apy(&self, asset: &AssetId, apy: BasisPoints) {
        self.book.write().apy.insert(*asset, apy);
    }

    /// Mints `amount` of venue yield into the vault. Sub-balances are not
    /// touched; the surplus shows up only in TVL.
    pub fn accrue_yield(&self, asset: &AssetId, amount: Amount) -> Result<(), StrategyError> {
        self.ensure_supported(asset)?;
        self.bank
            .mint(asset, &self.address, amount)
            .map_err(|e| StrategyError::Venue(e.to_string()))?;
        tracing::debug!(vault = %self.address, %asset, amount, "yield accrued");
        Ok(())
    }

    /// Burns up to `amount` of the vault's holding, as a venue loss would.
    /// Returns what was actually lost.
    pub fn apply_loss(&self, asset: &AssetId, amount: Amount) -> Result<Amount, StrategyError> {
        self.ensure_supported(asset)?;
        let lost = amount.min(self.bank.balance_of(asset, &self.address));
        self.bank
            .burn(asset, &self.address, lost)
            .map_err(|e| StrategyError::Venue(e.to_string()))?;
        tracing::warn!(vault = %self.address, %asset, lost, "venue loss applied");
        Ok(lost)
    }

    fn ensure_router(&self, caller: &Address) -> Result<(), StrategyError> {
        if *caller != self.router {
            return Err(StrategyError::UnauthorizedCaller(*caller));
        }
        Ok(())
    }

    fn ensure_supported(&self, asset: &AssetId) -> Result<(), StrategyError> {
        if !self.assets.contains(asset) {
            return Err(StrategyError::UnsupportedAsset(*asset));
        }
        Ok(())
    }
}

impl StrategyHandle for VaultStrategy {
    fn address(&self) -> Address {
        self.address
    }

    fn deposit(
        &self,
        caller: &Address,
        asset: &AssetId,
        amount: Amount,
        on_behalf_of: &Address,
    ) -> Result<Amount, StrategyError> {
        self.ensure_router(caller)?;
        self.ensure_supported(asset)?;

        let key = (*on_behalf_of, *asset);
        let position = self.book.read().positions.get(&key).copied().unwrap_or(0);
        let updated = position
            .checked_add(amount)
            .ok_or_else(|| StrategyError::Venue("position overflow".into()))?;

        self.bank
            .transfer_from(asset, &self.address, caller, &self.address, amount)
            .map_err(|e| StrategyError::Venue(e.to_string()))?;
        self.book.write().positions.insert(key, updated);

        tracing::debug!(vault = %self.address, user = %on_behalf_of, %asset, amount, "vault deposit");
        Ok(amount)
    }

    fn withdraw(
        &self,
        caller: &Address,
        asset: &AssetId,
        amount: Amount,
        on_behalf_of: &Address,
    ) -> Result<Amount, StrategyError> {
        self.ensure_router(caller)?;
        self.ensure_supported(asset)?;

        let take = amount.min(self.bank.balance_of(asset, &self.address));
        if take > 0 {
            self.bank
                .transfer(asset, &self.address, caller, take)
                .map_err(|e| StrategyError::Venue(e.to_string()))?;
        }

        let mut book = self.book.write();
        let position = book.positions.entry((*on_behalf_of, *asset)).or_default();
        *position = position.saturating_sub(take);

        tracing::debug!(vault = %self.address, user = %on_behalf_of, %asset, requested = amount, paid = take, "vault withdraw");
        Ok(take)
    }

    fn current_apy(&self, asset: &AssetId) -> BasisPoints {
        self.book.read().apy.get(asset).copied().unwrap_or(0)
    }

    fn total_value_locked(&self, asset: &AssetId) -> Amount {
        self.bank.balance_of(asset, &self.address)
    }

    fn user_balance(&self, user: &Address, asset: &AssetId) -> Amount {
        self.book
            .read()
            .positions
            .get(&(*user, *asset))
            .copied()
            .unwrap_or(0)
    }
}
