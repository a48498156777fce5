//! In-crate fakes for unit tests. The full-featured collaborators live in
//! `ferry-adapters`; these stay small so protocol tests do not depend on it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::assets::{AssetBank, AssetError};
use crate::config::InstanceConfig;
use crate::instance::Instance;
use crate::messaging::{OutboundMessage, Transport, TransportError};
use crate::strategy::{StrategyError, StrategyHandle};
use crate::types::{Address, Amount, AssetId, BasisPoints, ChainId, MessageId};

pub const HOME_CHAIN: ChainId = ChainId(1);
pub const PEER_CHAIN: ChainId = ChainId(2);

// ---------------------------------------------------------------------------
// Asset bank
// ---------------------------------------------------------------------------

/// Plain balances and allowances. `trusted` spenders skip the allowance
/// check, so tests can deposit without an approve step.
#[derive(Default)]
pub struct MemoryBank {
    balances: Mutex<HashMap<(AssetId, Address), Amount>>,
    allowances: Mutex<HashMap<(AssetId, Address, Address), Amount>>,
    trusted: Option<Address>,
}

impl MemoryBank {
    pub fn trusting(spender: Address) -> Self {
        Self {
            trusted: Some(spender),
            ..Self::default()
        }
    }

    pub fn mint(&self, asset: &AssetId, to: &Address, amount: Amount) {
        *self.balances.lock().entry((*asset, *to)).or_default() += amount;
    }

    pub fn balance(&self, asset: &AssetId, holder: &Address) -> Amount {
        self.balance_of(asset, holder)
    }

    pub fn allowance_of(&self, asset: &AssetId, owner: &Address, spender: &Address) -> Amount {
        self.allowance(asset, owner, spender)
    }

    fn move_funds(&self, asset: &AssetId, from: &Address, to: &Address, amount: Amount) -> Result<(), AssetError> {
        let mut balances = self.balances.lock();
        let available = balances.get(&(*asset, *from)).copied().unwrap_or(0);
        if available < amount {
            return Err(AssetError::InsufficientFunds {
                asset: *asset,
                holder: *from,
                available,
                requested: amount,
            });
        }
        balances.insert((*asset, *from), available - amount);
        let dest = balances.entry((*asset, *to)).or_default();
        *dest = dest.checked_add(amount).ok_or(AssetError::Overflow)?;
        Ok(())
    }
}

impl AssetBank for MemoryBank {
    fn balance_of(&self, asset: &AssetId, holder: &Address) -> Amount {
        self.balances
            .lock()
            .get(&(*asset, *holder))
            .copied()
            .unwrap_or(0)
    }

    fn transfer(&self, asset: &AssetId, from: &Address, to: &Address, amount: Amount) -> Result<(), AssetError> {
        self.move_funds(asset, from, to, amount)
    }

    fn transfer_from(
        &self,
        asset: &AssetId,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), AssetError> {
        if self.trusted != Some(*spender) {
            let mut allowances = self.allowances.lock();
            let key = (*asset, *from, *spender);
            let available = allowances.get(&key).copied().unwrap_or(0);
            if available < amount {
                return Err(AssetError::InsufficientAllowance {
                    asset: *asset,
                    spender: *spender,
                    available,
                    requested: amount,
                });
            }
            allowances.insert(key, available - amount);
        }
        self.move_funds(asset, from, to, amount)
    }

    fn approve(&self, asset: &AssetId, owner: &Address, spender: &Address, amount: Amount) -> Result<(), AssetError> {
        self.allowances
            .lock()
            .insert((*asset, *owner, *spender), amount);
        Ok(())
    }

    fn allowance(&self, asset: &AssetId, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .lock()
            .get(&(*asset, *owner, *spender))
            .copied()
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Holds deposited funds at its own address and tracks sub-balances.
pub struct StubStrategy {
    address: Address,
    router: Address,
    bank: Arc<MemoryBank>,
    positions: Mutex<HashMap<(Address, AssetId), Amount>>,
    fail: AtomicBool,
    short: Mutex<Amount>,
}

impl StubStrategy {
    pub fn new(bank: Arc<MemoryBank>, router: Address) -> Self {
        Self {
            address: Address::repeat_byte(0x57),
            router,
            bank,
            positions: Mutex::new(HashMap::new()),
            fail: AtomicBool::new(false),
            short: Mutex::new(0),
        }
    }

    /// Makes the next mutating call fail.
    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Makes the next mutating call move `amount` less than asked: a deposit
    /// keeps it as a venue fee, a withdrawal pays it short.
    pub fn short_next(&self, amount: Amount) {
        *self.short.lock() = amount;
    }

    fn take_short(&self) -> Amount {
        std::mem::take(&mut *self.short.lock())
    }

    fn check(&self, caller: &Address) -> Result<(), StrategyError> {
        if *caller != self.router {
            return Err(StrategyError::UnauthorizedCaller(*caller));
        }
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(StrategyError::Venue("injected failure".into()));
        }
        Ok(())
    }
}

impl StrategyHandle for StubStrategy {
    fn address(&self) -> Address {
        self.address
    }

    fn deposit(&self, caller: &Address, asset: &AssetId, amount: Amount, on_behalf_of: &Address) -> Result<Amount, StrategyError> {
        self.check(caller)?;
        self.bank
            .transfer_from(asset, &self.address, caller, &self.address, amount)
            .map_err(|e| StrategyError::Venue(e.to_string()))?;
        let credited = amount.saturating_sub(self.take_short());
        *self.positions.lock().entry((*on_behalf_of, *asset)).or_default() += credited;
        Ok(credited)
    }

    fn withdraw(&self, caller: &Address, asset: &AssetId, amount: Amount, on_behalf_of: &Address) -> Result<Amount, StrategyError> {
        self.check(caller)?;
        let take = amount
            .min(self.bank.balance(asset, &self.address))
            .saturating_sub(self.take_short());
        self.bank
            .transfer(asset, &self.address, caller, take)
            .map_err(|e| StrategyError::Venue(e.to_string()))?;
        let mut positions = self.positions.lock();
        let entry = positions.entry((*on_behalf_of, *asset)).or_default();
        *entry = entry.saturating_sub(take);
        Ok(take)
    }

    fn current_apy(&self, _asset: &AssetId) -> BasisPoints {
        350
    }

    fn total_value_locked(&self, asset: &AssetId) -> Amount {
        self.bank.balance(asset, &self.address)
    }

    fn user_balance(&self, user: &Address, asset: &AssetId) -> Amount {
        self.positions
            .lock()
            .get(&(*user, *asset))
            .copied()
            .unwrap_or(0)
    }
}

/// Reports fixed figures and refuses to move funds.
pub struct FixedStrategy {
    apy: BasisPoints,
    tvl: Amount,
}

impl FixedStrategy {
    pub fn new(apy: BasisPoints, tvl: Amount) -> Self {
        Self { apy, tvl }
    }
}

impl StrategyHandle for FixedStrategy {
    fn address(&self) -> Address {
        Address::repeat_byte(0xf1)
    }

    fn deposit(&self, _: &Address, _: &AssetId, _: Amount, _: &Address) -> Result<Amount, StrategyError> {
        Err(StrategyError::Venue("read-only".into()))
    }

    fn withdraw(&self, _: &Address, _: &AssetId, _: Amount, _: &Address) -> Result<Amount, StrategyError> {
        Err(StrategyError::Venue("read-only".into()))
    }

    fn current_apy(&self, _: &AssetId) -> BasisPoints {
        self.apy
    }

    fn total_value_locked(&self, _: &AssetId) -> Amount {
        self.tvl
    }

    fn user_balance(&self, _: &Address, _: &AssetId) -> Amount {
        0
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Flat-fee transport with a single lane to [`PEER_CHAIN`]. Records what it
/// accepted instead of delivering it.
pub struct StubTransport {
    bank: Arc<MemoryBank>,
    fee_asset: AssetId,
    submitted: Mutex<Vec<(MessageId, ChainId, OutboundMessage)>>,
    fail: AtomicBool,
    next_id: AtomicU64,
}

impl StubTransport {
    const FEE: Amount = 25;

    pub fn new(bank: Arc<MemoryBank>, fee_asset: AssetId) -> Self {
        Self {
            bank,
            fee_asset,
            submitted: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn fee(&self) -> Amount {
        Self::FEE
    }

    pub fn submitted(&self) -> Vec<(MessageId, ChainId, OutboundMessage)> {
        self.submitted.lock().clone()
    }

    /// Makes the next submit fail before drawing anything.
    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    fn draw(&self, asset: &AssetId, from: &Address, amount: Amount) -> Result<(), TransportError> {
        let me = self.address();
        self.bank
            .transfer_from(asset, &me, from, &me, amount)
            .map_err(|e| TransportError::Funding(e.to_string()))
    }
}

impl Transport for StubTransport {
    fn address(&self) -> Address {
        Address::repeat_byte(0x7a)
    }

    fn quote_fee(&self, destination: ChainId, _message: &OutboundMessage) -> Result<Amount, TransportError> {
        if !self.is_chain_supported(destination) {
            return Err(TransportError::UnsupportedChain(destination));
        }
        Ok(Self::FEE)
    }

    fn submit(&self, sender: &Address, destination: ChainId, message: OutboundMessage) -> Result<MessageId, TransportError> {
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Rejected("injected failure".into()));
        }
        let fee = self.quote_fee(destination, &message)?;
        self.draw(&self.fee_asset, sender, fee)?;
        for token in &message.tokens {
            self.draw(&token.asset, sender, token.amount)?;
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&n.to_be_bytes());
        let id = MessageId::new(bytes);
        self.submitted.lock().push((id, destination, message));
        Ok(id)
    }

    fn is_chain_supported(&self, chain: ChainId) -> bool {
        chain == PEER_CHAIN
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

pub struct Fixture {
    pub instance: Instance,
    pub bank: Arc<MemoryBank>,
    pub transport: Arc<StubTransport>,
    pub owner: Address,
    pub pauser: Address,
    pub user: Address,
    pub asset: AssetId,
    pub fee_asset: AssetId,
}

pub fn fixture() -> Fixture {
    let address = Address::repeat_byte(0x1e);
    let owner = Address::repeat_byte(0x01);
    let pauser = Address::repeat_byte(0x02);
    let fee_asset = AssetId(Address::repeat_byte(0xfe));

    let bank = Arc::new(MemoryBank::trusting(address));
    let transport = Arc::new(StubTransport::new(bank.clone(), fee_asset));
    let config = InstanceConfig {
        address,
        chain_id: HOME_CHAIN,
        owner,
        pauser,
        fee_asset,
        execution_budget: Default::default(),
    };
    let instance = Instance::new(config, bank.clone(), transport.clone()).unwrap();

    Fixture {
        instance,
        bank,
        transport,
        owner,
        pauser,
        user: Address::repeat_byte(0x03),
        asset: AssetId(Address::repeat_byte(0xa1)),
        fee_asset,
    }
}
