//! # Balance Book
//!
//! The authoritative `(owner, asset) -> amount` table of one instance, plus a
//! per-asset running total so solvency checks do not have to walk every
//! user.
//!
//! Entries are created on first credit and reset to zero on full withdrawal.
//! They are never removed; a zero entry and a missing entry read the same.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{FerryError, FerryResult};
use crate::types::{Address, Amount, AssetId};

/// Per-user, per-asset balances.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BalanceBook {
    entries: HashMap<Address, HashMap<AssetId, Amount>>,
    totals: HashMap<AssetId, Amount>,
}

impl BalanceBook {
    /// Empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `owner` in `asset`; zero when never credited.
    pub fn balance_of(&self, owner: &Address, asset: &AssetId) -> Amount {
        self.entries
            .get(owner)
            .and_then(|m| m.get(asset))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of every owner's balance in `asset`.
    pub fn total(&self, asset: &AssetId) -> Amount {
        self.totals.get(asset).copied().unwrap_or(0)
    }

    /// Adds `amount` to `owner`'s entry. Returns the new balance.
    ///
    /// # Errors
    ///
    /// [`FerryError::AmountOverflow`] if either the entry or the asset total
    /// would overflow. Nothing is written in that case.
    pub fn credit(&mut self, owner: &Address, asset: &AssetId, amount: Amount) -> FerryResult<Amount> {
        let new_total = self
            .total(asset)
            .checked_add(amount)
            .ok_or(FerryError::AmountOverflow)?;
        let new_balance = self
            .balance_of(owner, asset)
            .checked_add(amount)
            .ok_or(FerryError::AmountOverflow)?;

        self.entries
            .entry(*owner)
            .or_default()
            .insert(*asset, new_balance);
        self.totals.insert(*asset, new_total);
        Ok(new_balance)
    }

    /// Subtracts `amount` from `owner`'s entry. Returns the new balance.
    ///
    /// # Errors
    ///
    /// [`FerryError::InsufficientBalance`] if the entry is smaller than
    /// `amount`. Nothing is written in that case.
    pub fn debit(&mut self, owner: &Address, asset: &AssetId, amount: Amount) -> FerryResult<Amount> {
        let available = self.balance_of(owner, asset);
        if available < amount {
            return Err(FerryError::InsufficientBalance {
                asset: *asset,
                available,
                requested: amount,
            });
        }

        let new_balance = available - amount;
        // The total covers this entry, so it cannot underflow.
        let new_total = self.total(asset).saturating_sub(amount);

        self.entries
            .entry(*owner)
            .or_default()
            .insert(*asset, new_balance);
        self.totals.insert(*asset, new_total);
        Ok(new_balance)
    }

    /// Credits several assets to one owner, all or nothing.
    ///
    /// Every addition is computed before anything is written, so an overflow
    /// on the last item leaves the earlier items uncredited.
    pub fn credit_all<'a, I>(&mut self, owner: &Address, items: I) -> FerryResult<()>
    where
        I: IntoIterator<Item = (&'a AssetId, Amount)>,
    {
        let mut staged = self.clone_for(owner);
        for (asset, amount) in items {
            staged.credit(owner, asset, amount)?;
        }
        self.commit(owner, staged);
        Ok(())
    }

    /// Non-zero balances of one owner.
    pub fn holdings_of(&self, owner: &Address) -> Vec<(AssetId, Amount)> {
        let mut out: Vec<_> = self
            .entries
            .get(owner)
            .map(|m| m.iter().filter(|(_, v)| **v > 0).map(|(a, v)| (*a, *v)).collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    /// Number of owners that have ever held a balance.
    pub fn owner_count(&self) -> usize {
        self.entries.len()
    }

    // A scratch book holding only `owner`'s entries and the totals.
    fn clone_for(&self, owner: &Address) -> BalanceBook {
        let mut entries = HashMap::new();
        if let Some(m) = self.entries.get(owner) {
            entries.insert(*owner, m.clone());
        }
        BalanceBook {
            entries,
            totals: self.totals.clone(),
        }
    }

    fn commit(&mut self, owner: &Address, staged: BalanceBook) {
        let BalanceBook {
            mut entries,
            totals,
        } = staged;
        if let Some(m) = entries.remove(owner) {
            self.entries.insert(*owner, m);
        }
        self.totals = totals;
    }
}
