//! # Access & Safety Guard
//!
//! Two independent pieces of state protect every mutating entry point:
//!
//! ```text
//!   paused:           false ──pause()──► true ──unpause()──► false
//!   reentrancy lock:  free ──enter()──► held ──drop(token)──► free
//! ```
//!
//! The lock is released when its [`LockToken`] is dropped, which means every
//! exit path (including `?` early returns) releases it. Roles live in
//! [`AccessControl`] inside the instance state; the lock lives outside it so
//! it can be checked without touching the state `RwLock`.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{FerryError, FerryResult};
use crate::types::Address;

// ---------------------------------------------------------------------------
// Reentrancy lock
// ---------------------------------------------------------------------------

/// Non-reentrant entry lock.
#[derive(Debug, Default)]
pub struct ReentrancyLock {
    held: AtomicBool,
}

impl ReentrancyLock {
    /// Creates a free lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock.
    ///
    /// # Errors
    ///
    /// [`FerryError::Reentrancy`] if the lock is already held.
    pub fn enter(&self) -> FerryResult<LockToken<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| FerryError::Reentrancy)?;
        Ok(LockToken { lock: self })
    }

    /// Returns `true` while some entry point is executing.
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Proof of lock ownership. Releases the lock on drop.
#[must_use = "the lock is released as soon as the token is dropped"]
#[derive(Debug)]
pub struct LockToken<'a> {
    lock: &'a ReentrancyLock,
}

impl Drop for LockToken<'_> {
    fn drop(&mut self) {
        self.lock.held.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Roles and pause switch
// ---------------------------------------------------------------------------

/// Owner/pauser roles and the pause switch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessControl {
    owner: Address,
    pauser: Address,
    paused: bool,
}

impl AccessControl {
    /// Starts unpaused.
    pub fn new(owner: Address, pauser: Address) -> Self {
        Self {
            owner,
            pauser,
            paused: false,
        }
    }

    /// Current owner.
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Current pauser.
    pub fn pauser(&self) -> Address {
        self.pauser
    }

    /// Pause switch.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Fails unless `caller` is the owner.
    pub fn ensure_owner(&self, caller: &Address) -> FerryResult<()> {
        if *caller != self.owner {
            return Err(FerryError::unauthorized(caller, "owner"));
        }
        Ok(())
    }

    /// Fails unless `caller` is the pauser or the owner.
    pub fn ensure_pauser_or_owner(&self, caller: &Address) -> FerryResult<()> {
        if *caller != self.pauser && *caller != self.owner {
            return Err(FerryError::unauthorized(caller, "pauser"));
        }
        Ok(())
    }

    /// Fails while paused.
    pub fn ensure_not_paused(&self) -> FerryResult<()> {
        if self.paused {
            return Err(FerryError::Paused);
        }
        Ok(())
    }

    /// Sets the pause switch. Returns `true` if it changed.
    pub fn set_paused(&mut self, caller: &Address, paused: bool) -> FerryResult<bool> {
        self.ensure_pauser_or_owner(caller)?;
        let changed = self.paused != paused;
        self.paused = paused;
        Ok(changed)
    }

    /// Owner-only pauser rotation.
    pub fn set_pauser(&mut self, caller: &Address, pauser: Address) -> FerryResult<Address> {
        self.ensure_owner(caller)?;
        if pauser.is_zero() {
            return Err(FerryError::NullAddress("pauser"));
        }
        Ok(std::mem::replace(&mut self.pauser, pauser))
    }

    /// Owner-only ownership transfer. Returns the previous owner.
    pub fn transfer_ownership(&mut self, caller: &Address, owner: Address) -> FerryResult<Address> {
        self.ensure_owner(caller)?;
        if owner.is_zero() {
            return Err(FerryError::NullAddress("owner"));
        }
        Ok(std::mem::replace(&mut self.owner, owner))
    }
}
