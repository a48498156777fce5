//! # Instance
//!
//! One deployed copy of the ledger on one chain. The [`Instance`] is the
//! context object every operation runs against: it owns the balance book,
//! strategy registry, chain allowlist, execution budget, roles, processed
//! message set, and event journal, and holds the three external
//! collaborators (asset bank, transport, strategy handles) behind traits.
//!
//! ## Locking discipline
//!
//! - The reentrancy lock is taken at the top of every mutating entry point
//!   and held until it returns.
//! - The state `RwLock` is only held for short critical sections and is
//!   never held across a call into a collaborator. A collaborator that calls
//!   back into the instance therefore hits the reentrancy lock (and gets a
//!   clean error) instead of deadlocking.
//!
//! Entry points live next to the component they belong to: deposits and
//! withdrawals in [`crate::ledger`], transfers in [`crate::messaging`],
//! administration in [`admin`].

pub mod admin;

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::assets::AssetBank;
use crate::config::{ExecutionBudget, InstanceConfig};
use crate::error::{FerryError, FerryResult};
use crate::events::{EventJournal, EventKind, InstanceEvent};
use crate::guard::{AccessControl, LockToken, ReentrancyLock};
use crate::ledger::BalanceBook;
use crate::messaging::Transport;
use crate::strategy::{router, StrategyError, StrategyHandle, StrategyRouter};
use crate::types::{Address, Amount, AssetId, BasisPoints, ChainId, MessageId};

/// Whether an entry point honours the pause switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Gate {
    /// Blocked while paused (deposit, withdraw, outbound transfer).
    Pausable,
    /// Runs while paused (inbound credit, administration).
    AlwaysOpen,
}

/// Everything an instance persists.
#[derive(Debug)]
pub(crate) struct InstanceState {
    pub(crate) access: AccessControl,
    pub(crate) book: BalanceBook,
    pub(crate) router: StrategyRouter,
    pub(crate) allowlist: HashSet<ChainId>,
    pub(crate) budget: ExecutionBudget,
    pub(crate) processed: HashSet<MessageId>,
    pub(crate) journal: EventJournal,
}

/// Serializable view of an instance's configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub address: Address,
    pub chain_id: ChainId,
    pub owner: Address,
    pub pauser: Address,
    pub paused: bool,
    pub transport: Address,
    pub fee_asset: AssetId,
    pub execution_budget: ExecutionBudget,
    pub strategies_enabled: bool,
    pub strategies: Vec<(AssetId, Address)>,
    pub allowed_chains: Vec<ChainId>,
    pub processed_messages: usize,
}

/// A ledger instance on one chain.
pub struct Instance {
    address: Address,
    chain_id: ChainId,
    fee_asset: AssetId,
    bank: Arc<dyn AssetBank>,
    transport: Arc<dyn Transport>,
    lock: ReentrancyLock,
    state: RwLock<InstanceState>,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("transport", &self.transport.address())
            .finish_non_exhaustive()
    }
}

impl Instance {
    /// Builds an instance from validated configuration.
    ///
    /// The allowlist starts empty and strategy routing starts disabled.
    ///
    /// # Errors
    ///
    /// Any error from [`InstanceConfig::validate`], or
    /// [`FerryError::NullAddress`] if the transport has a null address.
    pub fn new(
        config: InstanceConfig,
        bank: Arc<dyn AssetBank>,
        transport: Arc<dyn Transport>,
    ) -> FerryResult<Self> {
        config.validate()?;
        if transport.address().is_zero() {
            return Err(FerryError::NullAddress("transport"));
        }

        tracing::info!(
            address = %config.address,
            chain = %config.chain_id,
            owner = %config.owner,
            transport = %transport.address(),
            "instance created"
        );

        Ok(Self {
            address: config.address,
            chain_id: config.chain_id,
            fee_asset: config.fee_asset,
            bank,
            transport,
            lock: ReentrancyLock::new(),
            state: RwLock::new(InstanceState {
                access: AccessControl::new(config.owner, config.pauser),
                book: BalanceBook::new(),
                router: StrategyRouter::new(),
                allowlist: HashSet::new(),
                budget: config.execution_budget,
                processed: HashSet::new(),
                journal: EventJournal::new(),
            }),
        })
    }

    // -----------------------------------------------------------------------
    // Internal plumbing
    // -----------------------------------------------------------------------

    /// Takes the reentrancy lock and, for pausable entry points, checks the
    /// pause switch.
    pub(crate) fn enter(&self, gate: Gate) -> FerryResult<LockToken<'_>> {
        let token = self.lock.enter()?;
        if gate == Gate::Pausable {
            self.state.read().access.ensure_not_paused()?;
        }
        Ok(token)
    }

    pub(crate) fn state(&self) -> &RwLock<InstanceState> {
        &self.state
    }

    pub(crate) fn bank(&self) -> &dyn AssetBank {
        self.bank.as_ref()
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Puts back a debit made earlier in the same entry point.
    pub(crate) fn restore_debit(&self, user: &Address, asset: &AssetId, amount: Amount) {
        if let Err(e) = self.state.write().book.credit(user, asset, amount) {
            // Unreachable while the entry lock is held: the debit freed the room.
            tracing::error!(%user, %asset, amount, error = %e, "failed to restore debit");
        }
    }

    /// Re-deposits funds that were released from a strategy for an operation
    /// that then failed. Best effort: on failure the funds stay in direct
    /// custody, which keeps the solvency invariant but breaks strategy parity.
    pub(crate) fn restore_position(
        &self,
        handle: &dyn StrategyHandle,
        asset: &AssetId,
        amount: Amount,
        user: &Address,
    ) {
        if amount == 0 {
            return;
        }
        match router::forward_deposit(self.bank(), &self.address, handle, asset, amount, user) {
            Ok(deposited) => self.state.write().router.note_routed(asset, deposited.min(amount)),
            Err(e) => {
                tracing::warn!(%user, %asset, amount, error = %e, "could not restore strategy position");
            }
        }
    }

    /// Pulls up to `amount` of `user`'s position out of `handle`.
    ///
    /// The request is capped at the position; the rest of `amount` must come
    /// from direct custody. A venue that pays out less than the capped
    /// request gets back what it paid and the call fails, so the gap is
    /// never covered from other users' direct funds.
    pub(crate) fn release_position(
        &self,
        handle: &dyn StrategyHandle,
        asset: &AssetId,
        amount: Amount,
        user: &Address,
    ) -> FerryResult<Amount> {
        let requested = amount.min(handle.user_balance(user, asset));
        let released = router::release(&self.address, handle, asset, requested, user)?;
        self.state.write().router.note_released(asset, released);
        if released < requested {
            tracing::warn!(%user, %asset, requested, released, "strategy released less than the position");
            self.restore_position(handle, asset, released, user);
            return Err(StrategyError::Shortfall {
                requested,
                moved: released,
            }
            .into());
        }
        Ok(released)
    }

    fn strategy(&self, asset: &AssetId) -> Option<Arc<dyn StrategyHandle>> {
        self.state.read().router.handle_for(asset)
    }

    // -----------------------------------------------------------------------
    // Read surface
    // -----------------------------------------------------------------------

    /// The instance's identity.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The chain this instance runs on.
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// Asset transport fees are paid in.
    pub fn fee_asset(&self) -> AssetId {
        self.fee_asset
    }

    /// Current owner.
    pub fn owner(&self) -> Address {
        self.state.read().access.owner()
    }

    /// Current pauser.
    pub fn pauser(&self) -> Address {
        self.state.read().access.pauser()
    }

    /// Pause switch.
    pub fn is_paused(&self) -> bool {
        self.state.read().access.is_paused()
    }

    /// Whether `chain` may be used as an outbound destination.
    pub fn is_chain_allowed(&self, chain: ChainId) -> bool {
        self.state.read().allowlist.contains(&chain)
    }

    /// Allowlisted destinations, sorted.
    pub fn allowed_chains(&self) -> Vec<ChainId> {
        let mut chains: Vec<_> = self.state.read().allowlist.iter().copied().collect();
        chains.sort();
        chains
    }

    /// Destination execution budget.
    pub fn execution_budget(&self) -> ExecutionBudget {
        self.state.read().budget
    }

    /// Global strategy routing switch.
    pub fn strategies_enabled(&self) -> bool {
        self.state.read().router.is_enabled()
    }

    /// Address of the strategy registered for `asset`.
    pub fn strategy_for(&self, asset: &AssetId) -> Option<Address> {
        self.state.read().router.strategy_address(asset)
    }

    /// Registered strategy's APY in basis points, or 0.
    pub fn apy(&self, asset: &AssetId) -> BasisPoints {
        self.strategy(asset)
            .map(|h| h.current_apy(asset))
            .unwrap_or(0)
    }

    /// Registered strategy's TVL, or 0.
    pub fn strategy_tvl(&self, asset: &AssetId) -> Amount {
        self.strategy(asset)
            .map(|h| h.total_value_locked(asset))
            .unwrap_or(0)
    }

    /// `user`'s sub-balance in the registered strategy, or 0.
    pub fn user_strategy_balance(&self, user: &Address, asset: &AssetId) -> Amount {
        self.strategy(asset)
            .map(|h| h.user_balance(user, asset))
            .unwrap_or(0)
    }

    /// Amount of `asset` the instance holds directly in the asset bank.
    pub fn direct_balance(&self, asset: &AssetId) -> Amount {
        self.bank.balance_of(asset, &self.address)
    }

    /// Direct holding plus the registered strategy's TVL.
    pub fn total_value_locked(&self, asset: &AssetId) -> Amount {
        self.direct_balance(asset)
            .saturating_add(self.strategy_tvl(asset))
    }

    /// Sum of user positions held by the registered strategy for `asset`,
    /// as recorded by this instance.
    pub fn routed_deposits(&self, asset: &AssetId) -> Amount {
        self.state.read().router.routed_total(asset)
    }

    /// Ledger liabilities in `asset` that direct custody must cover: every
    /// balance minus the part parked in the strategy.
    pub fn direct_liabilities(&self, asset: &AssetId) -> Amount {
        let st = self.state.read();
        st.book
            .total(asset)
            .saturating_sub(st.router.routed_total(asset))
    }

    /// Fee-asset holding not owed to any user.
    pub fn fee_reserve(&self) -> Amount {
        self.fee_reserve_with(0)
    }

    /// Fee reserve while `in_flight` of the fee asset has been debited from
    /// the ledger but has not left custody yet.
    pub(crate) fn fee_reserve_with(&self, in_flight: Amount) -> Amount {
        let owed_direct = {
            let st = self.state.read();
            st.book
                .total(&self.fee_asset)
                .saturating_add(in_flight)
                .saturating_sub(st.router.routed_total(&self.fee_asset))
        };
        self.direct_balance(&self.fee_asset)
            .saturating_sub(owed_direct)
    }

    /// Direct holding not owed to any direct-custody user, further capped by
    /// the overall surplus. This is the most a sweep can move. Strategy
    /// yield never counts: it is only reachable through user positions.
    pub fn stray_balance(&self, asset: &AssetId) -> Amount {
        let owed = self.total_deposits(asset);
        let direct = self.direct_balance(asset);
        let surplus = direct
            .saturating_add(self.strategy_tvl(asset))
            .saturating_sub(owed);
        direct
            .saturating_sub(self.direct_liabilities(asset))
            .min(surplus)
    }

    /// Verifies that ledger liabilities for `asset` are fully backed by the
    /// direct holding plus strategy TVL, and that the direct holding alone
    /// covers the balances not parked in the strategy.
    ///
    /// # Errors
    ///
    /// [`FerryError::InvariantViolation`] with both sides of the failing
    /// comparison.
    pub fn check_solvency(&self, asset: &AssetId) -> FerryResult<()> {
        let liabilities = self.total_deposits(asset);
        let backing = self.total_value_locked(asset);
        if liabilities > backing {
            return Err(FerryError::InvariantViolation {
                asset: *asset,
                liabilities,
                backing,
            });
        }
        let direct_liabilities = self.direct_liabilities(asset);
        let direct = self.direct_balance(asset);
        if direct_liabilities > direct {
            return Err(FerryError::InvariantViolation {
                asset: *asset,
                liabilities: direct_liabilities,
                backing: direct,
            });
        }
        Ok(())
    }

    /// Whether an inbound message id has already been credited.
    pub fn is_message_processed(&self, id: &MessageId) -> bool {
        self.state.read().processed.contains(id)
    }

    /// Retained events, oldest first.
    pub fn events(&self) -> Vec<InstanceEvent> {
        self.state.read().journal.snapshot()
    }

    /// Removes and returns retained events.
    pub fn drain_events(&self) -> Vec<InstanceEvent> {
        self.state.write().journal.drain()
    }

    /// Configuration snapshot.
    pub fn snapshot(&self) -> InstanceSnapshot {
        let st = self.state.read();
        let strategies = st
            .router
            .registered_assets()
            .into_iter()
            .filter_map(|a| st.router.strategy_address(&a).map(|s| (a, s)))
            .collect();
        let mut allowed_chains: Vec<_> = st.allowlist.iter().copied().collect();
        allowed_chains.sort();
        InstanceSnapshot {
            address: self.address,
            chain_id: self.chain_id,
            owner: st.access.owner(),
            pauser: st.access.pauser(),
            paused: st.access.is_paused(),
            transport: self.transport.address(),
            fee_asset: self.fee_asset,
            execution_budget: st.budget,
            strategies_enabled: st.router.is_enabled(),
            strategies,
            allowed_chains,
            processed_messages: st.processed.len(),
        }
    }

    pub(crate) fn record(&self, kind: EventKind) {
        self.state.write().journal.record(kind);
    }
}
