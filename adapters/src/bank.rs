//! # In-Memory Asset Bank
//!
//! A fungible-token ledger standing in for one chain's token contracts.
//! Holds balances, allowances, and per-asset supply, and can notify a
//! [`TransferHook`] after every completed transfer, the way a token with
//! receiver callbacks would.
//!
//! ## Semantics
//!
//! - Any non-null [`AssetId`] can hold balances. [`register`](InMemoryBank::register)
//!   only attaches metadata (symbol, decimals) and derives an id from the
//!   symbol.
//! - `transfer_from` always consumes allowance. Nobody is pre-approved.
//! - Supply changes only through [`mint`](InMemoryBank::mint) and
//!   [`burn`](InMemoryBank::burn). All arithmetic is checked.
//! - The hook runs after the state lock is released, so it may call back
//!   into the bank or into an instance.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ferry_protocol::{Address, Amount, AssetBank, AssetError, AssetId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the bank's operator surface (registration, mint, burn).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BankError {
    /// A token with this symbol already exists.
    #[error("duplicate symbol: a token with symbol '{0}' already exists")]
    DuplicateSymbol(String),

    /// The null asset cannot hold balances.
    #[error("the null asset cannot be minted or burned")]
    NullAsset,

    /// Minting would overflow the supply or a balance.
    #[error("supply overflow: minting {amount} of {asset} would overflow")]
    SupplyOverflow {
        /// Asset minted.
        asset: AssetId,
        /// Amount attempted.
        amount: Amount,
    },

    /// Holder cannot cover the burn.
    #[error("insufficient balance: {holder} has {balance} of {asset}, tried to burn {amount}")]
    InsufficientBalance {
        asset: AssetId,
        holder: Address,
        balance: Amount,
        amount: Amount,
    },
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Metadata for a registered asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetInfo {
    pub asset: AssetId,
    /// Ticker, upper-cased. Unique within the bank.
    pub symbol: String,
    pub decimals: u8,
    pub registered_at: DateTime<Utc>,
}

/// Observer invoked after each completed transfer.
pub trait TransferHook: Send + Sync {
    fn on_transfer(&self, asset: &AssetId, from: &Address, to: &Address, amount: Amount);
}

#[derive(Default)]
struct BankState {
    balances: HashMap<(AssetId, Address), Amount>,
    allowances: HashMap<(AssetId, Address, Address), Amount>,
    supply: HashMap<AssetId, Amount>,
    registry: HashMap<AssetId, AssetInfo>,
}

impl BankState {
    fn balance(&self, asset: &AssetId, holder: &Address) -> Amount {
        self.balances.get(&(*asset, *holder)).copied().unwrap_or(0)
    }

    fn move_funds(
        &mut self,
        asset: &AssetId,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), AssetError> {
        let available = self.balance(asset, from);
        if available < amount {
            return Err(AssetError::InsufficientFunds {
                asset: *asset,
                holder: *from,
                available,
                requested: amount,
            });
        }
        if from == to {
            return Ok(());
        }
        let credited = self
            .balance(asset, to)
            .checked_add(amount)
            .ok_or(AssetError::Overflow)?;
        self.balances.insert((*asset, *from), available - amount);
        self.balances.insert((*asset, *to), credited);
        Ok(())
    }
}

/// Balances, allowances, and supply for every asset on one chain.
#[derive(Default)]
pub struct InMemoryBank {
    state: RwLock<BankState>,
    hook: RwLock<Option<Arc<dyn TransferHook>>>,
}

impl InMemoryBank {
    /// Empty bank with [`AssetId::NATIVE`] registered as `ETH`.
    pub fn new() -> Self {
        let bank = Self::default();
        bank.state.write().registry.insert(
            AssetId::NATIVE,
            AssetInfo {
                asset: AssetId::NATIVE,
                symbol: "ETH".into(),
                decimals: 18,
                registered_at: Utc::now(),
            },
        );
        bank
    }

    /// Registers metadata for a new asset and returns its id, derived from
    /// the upper-cased symbol.
    ///
    /// # Errors
    ///
    /// [`BankError::DuplicateSymbol`] if the symbol is taken.
    pub fn register(&self, symbol: &str, decimals: u8) -> Result<AssetId, BankError> {
        let symbol = symbol.to_uppercase();
        let asset = asset_id_for(&symbol);
        let mut st = self.state.write();
        if st.registry.values().any(|i| i.symbol == symbol) {
            return Err(BankError::DuplicateSymbol(symbol));
        }
        st.registry.insert(
            asset,
            AssetInfo {
                asset,
                symbol: symbol.clone(),
                decimals,
                registered_at: Utc::now(),
            },
        );
        tracing::debug!(%asset, %symbol, decimals, "asset registered");
        Ok(asset)
    }

    /// Metadata for `asset`, if registered.
    pub fn info(&self, asset: &AssetId) -> Option<AssetInfo> {
        self.state.read().registry.get(asset).cloned()
    }

    /// Asset registered under `symbol`.
    pub fn asset_by_symbol(&self, symbol: &str) -> Option<AssetId> {
        let symbol = symbol.to_uppercase();
        self.state
            .read()
            .registry
            .values()
            .find(|i| i.symbol == symbol)
            .map(|i| i.asset)
    }

    /// Creates `amount` of `asset` at `to`.
    ///
    /// # Errors
    ///
    /// [`BankError::NullAsset`] or [`BankError::SupplyOverflow`].
    pub fn mint(&self, asset: &AssetId, to: &Address, amount: Amount) -> Result<(), BankError> {
        if asset.is_null() {
            return Err(BankError::NullAsset);
        }
        let overflow = || BankError::SupplyOverflow {
            asset: *asset,
            amount,
        };
        let mut st = self.state.write();
        let supply = st
            .supply
            .get(asset)
            .copied()
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or_else(overflow)?;
        let balance = st.balance(asset, to).checked_add(amount).ok_or_else(overflow)?;
        st.supply.insert(*asset, supply);
        st.balances.insert((*asset, *to), balance);
        tracing::trace!(%asset, %to, amount, "minted");
        Ok(())
    }

    /// Destroys `amount` of `asset` held by `from`.
    ///
    /// # Errors
    ///
    /// [`BankError::InsufficientBalance`] if `from` holds less.
    pub fn burn(&self, asset: &AssetId, from: &Address, amount: Amount) -> Result<(), BankError> {
        let mut st = self.state.write();
        let balance = st.balance(asset, from);
        if balance < amount {
            return Err(BankError::InsufficientBalance {
                asset: *asset,
                holder: *from,
                balance,
                amount,
            });
        }
        st.balances.insert((*asset, *from), balance - amount);
        let supply = st.supply.get(asset).copied().unwrap_or(0).saturating_sub(amount);
        st.supply.insert(*asset, supply);
        tracing::trace!(%asset, %from, amount, "burned");
        Ok(())
    }

    /// Total minted minus burned.
    pub fn total_supply(&self, asset: &AssetId) -> Amount {
        self.state.read().supply.get(asset).copied().unwrap_or(0)
    }

    /// Installs or removes the transfer hook.
    pub fn set_transfer_hook(&self, hook: Option<Arc<dyn TransferHook>>) {
        *self.hook.write() = hook;
    }

    fn notify(&self, asset: &AssetId, from: &Address, to: &Address, amount: Amount) {
        let hook = self.hook.read().clone();
        if let Some(hook) = hook {
            hook.on_transfer(asset, from, to, amount);
        }
    }
}

/// First 20 bytes of `blake3(symbol)`.
fn asset_id_for(symbol: &str) -> AssetId {
    let digest = blake3::hash(symbol.as_bytes());
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest.as_bytes()[..20]);
    AssetId(Address::new(bytes))
}

impl AssetBank for InMemoryBank {
    fn balance_of(&self, asset: &AssetId, holder: &Address) -> Amount {
        self.state.read().balance(asset, holder)
    }

    fn transfer(&self, asset: &AssetId, from: &Address, to: &Address, amount: Amount) -> Result<(), AssetError> {
        self.state.write().move_funds(asset, from, to, amount)?;
        self.notify(asset, from, to, amount);
        Ok(())
    }

    fn transfer_from(
        &self,
        asset: &AssetId,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), AssetError> {
        {
            let mut st = self.state.write();
            let key = (*asset, *from, *spender);
            let allowed = st.allowances.get(&key).copied().unwrap_or(0);
            if allowed < amount {
                return Err(AssetError::InsufficientAllowance {
                    asset: *asset,
                    spender: *spender,
                    available: allowed,
                    requested: amount,
                });
            }
            st.move_funds(asset, from, to, amount)?;
            st.allowances.insert(key, allowed - amount);
        }
        self.notify(asset, from, to, amount);
        Ok(())
    }

    fn approve(&self, asset: &AssetId, owner: &Address, spender: &Address, amount: Amount) -> Result<(), AssetError> {
        if asset.is_null() {
            return Err(AssetError::Rejected("approval for the null asset".into()));
        }
        self.state
            .write()
            .allowances
            .insert((*asset, *owner, *spender), amount);
        Ok(())
    }

    fn allowance(&self, asset: &AssetId, owner: &Address, spender: &Address) -> Amount {
        self.state
            .read()
            .allowances
            .get(&(*asset, *owner, *spender))
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    fn alice() -> Address {
        Address::repeat_byte(0xa1)
    }

    fn bob() -> Address {
        Address::repeat_byte(0xb0)
    }

    #[test]
    fn register_derives_stable_ids_and_rejects_duplicates() {
        let bank = InMemoryBank::new();
        let usdc = bank.register("usdc", 6).unwrap();
        assert_eq!(usdc, asset_id_for("USDC"));
        assert_eq!(bank.asset_by_symbol("USDC"), Some(usdc));
        assert_eq!(bank.info(&usdc).unwrap().decimals, 6);
        assert_eq!(bank.register("USDC", 6), Err(BankError::DuplicateSymbol("USDC".into())));
        assert_eq!(bank.asset_by_symbol("eth"), Some(AssetId::NATIVE));
    }

    #[test]
    fn mint_and_burn_track_supply() {
        let bank = InMemoryBank::new();
        let asset = bank.register("TOK", 8).unwrap();
        bank.mint(&asset, &alice(), 1_000).unwrap();
        bank.burn(&asset, &alice(), 400).unwrap();
        assert_eq!(bank.total_supply(&asset), 600);
        assert_eq!(bank.balance_of(&asset, &alice()), 600);
        assert!(matches!(
            bank.burn(&asset, &alice(), 601),
            Err(BankError::InsufficientBalance { balance: 600, .. })
        ));
        assert!(bank.mint(&asset, &bob(), Amount::MAX).is_err());
        assert_eq!(bank.mint(&AssetId::NULL, &bob(), 1), Err(BankError::NullAsset));
    }

    #[test]
    fn transfer_from_consumes_allowance() {
        let bank = InMemoryBank::new();
        let asset = bank.register("TOK", 8).unwrap();
        bank.mint(&asset, &alice(), 100).unwrap();

        let err = bank
            .transfer_from(&asset, &bob(), &alice(), &bob(), 10)
            .unwrap_err();
        assert!(matches!(err, AssetError::InsufficientAllowance { available: 0, .. }));

        bank.approve(&asset, &alice(), &bob(), 30).unwrap();
        bank.transfer_from(&asset, &bob(), &alice(), &bob(), 10).unwrap();
        assert_eq!(bank.allowance(&asset, &alice(), &bob()), 20);
        assert_eq!(bank.balance_of(&asset, &bob()), 10);
        assert_eq!(bank.balance_of(&asset, &alice()), 90);
    }

    #[test]
    fn failed_transfer_changes_nothing() {
        let bank = InMemoryBank::new();
        let asset = bank.register("TOK", 8).unwrap();
        bank.mint(&asset, &alice(), 5).unwrap();
        bank.approve(&asset, &alice(), &bob(), 50).unwrap();
        assert!(bank.transfer_from(&asset, &bob(), &alice(), &bob(), 6).is_err());
        assert_eq!(bank.allowance(&asset, &alice(), &bob()), 50);
        assert_eq!(bank.balance_of(&asset, &alice()), 5);
    }

    struct Recorder(Mutex<Vec<(Address, Address, Amount)>>);

    impl TransferHook for Recorder {
        fn on_transfer(&self, _asset: &AssetId, from: &Address, to: &Address, amount: Amount) {
            self.0.lock().push((*from, *to, amount));
        }
    }

    #[test]
    fn hook_sees_completed_transfers_only() {
        let bank = InMemoryBank::new();
        let asset = bank.register("TOK", 8).unwrap();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        bank.set_transfer_hook(Some(recorder.clone()));

        bank.mint(&asset, &alice(), 10).unwrap();
        bank.transfer(&asset, &alice(), &bob(), 4).unwrap();
        assert!(bank.transfer(&asset, &alice(), &bob(), 40).is_err());

        assert_eq!(recorder.0.lock().as_slice(), &[(alice(), bob(), 4)]);
    }
}
