//! # Loopback Network
//!
//! An in-process cross-chain transport. Every attached chain has its own
//! [`InMemoryBank`]; an instance on that chain talks to the network through
//! the chain's [`LoopbackEndpoint`].
//!
//! ## Message Flow
//!
//! ```text
//!   submit (chain A)                        deliver (chain B)
//!   ────────────────                        ─────────────────
//!   draw fee + tokens from sender           mint tokens to receiver
//!   burn the tokens on A                    receiver.on_message_received
//!   queue Envelope ───────── queue ───────► (burn them again on failure)
//! ```
//!
//! Delivery is explicit: nothing moves until someone calls
//! [`deliver`](LoopbackNetwork::deliver). The node's relayer task does that
//! in the background; tests do it by hand, which also lets them redeliver a
//! message or deliver it to the wrong instance.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ferry_protocol::{
    Address, Amount, AssetBank, AssetId, ChainId, FerryError, InboundMessage, Instance, MessageId,
    OutboundMessage, ReceiptSummary, Transport, TransportError,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bank::{BankError, InMemoryBank};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from network setup and delivery.
#[derive(Debug, Error)]
pub enum LoopbackError {
    /// No bank attached for the chain.
    #[error("chain {0} is not attached to the network")]
    UnknownChain(ChainId),

    /// Envelope handed to an instance it is not addressed to.
    #[error("envelope for {expected} on {chain} delivered to {actual}")]
    WrongReceiver {
        chain: ChainId,
        expected: Address,
        actual: Address,
    },

    /// Tokens could not be minted on the destination chain.
    #[error("destination mint failed: {0}")]
    Mint(#[from] BankError),

    /// The receiving instance rejected the message.
    #[error("delivery rejected: {0}")]
    Delivery(#[from] FerryError),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Fee schedule, uniform across lanes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopbackConfig {
    /// Asset every fee is charged in.
    pub fee_asset: AssetId,
    /// Flat part of every fee.
    pub base_fee: Amount,
    /// Charged per byte of [`OutboundMessage::payload_len`].
    pub fee_per_byte: Amount,
}

/// A message accepted on one chain and waiting for delivery on another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub message_id: MessageId,
    pub source_chain: ChainId,
    pub destination_chain: ChainId,
    /// Instance that submitted the message.
    pub sender: Address,
    pub message: OutboundMessage,
}

/// Shared lane registry and message queue.
pub struct LoopbackNetwork {
    config: LoopbackConfig,
    chains: RwLock<HashMap<ChainId, Arc<InMemoryBank>>>,
    queue: Mutex<VecDeque<Envelope>>,
    nonce: AtomicU64,
}

impl LoopbackNetwork {
    /// Network with no chains attached.
    pub fn new(config: LoopbackConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            chains: RwLock::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            nonce: AtomicU64::new(0),
        })
    }

    /// Fee schedule.
    pub fn config(&self) -> &LoopbackConfig {
        &self.config
    }

    /// Attaches `chain`, whose assets live in `bank`. Every attached chain
    /// has a lane to every other.
    pub fn attach(&self, chain: ChainId, bank: Arc<InMemoryBank>) {
        tracing::info!(%chain, endpoint = %Self::endpoint_address(chain), "chain attached");
        self.chains.write().insert(chain, bank);
    }

    /// Transport handle for instances on `chain`.
    ///
    /// # Errors
    ///
    /// [`LoopbackError::UnknownChain`] if `chain` is not attached.
    pub fn endpoint(self: &Arc<Self>, chain: ChainId) -> Result<Arc<LoopbackEndpoint>, LoopbackError> {
        if !self.chains.read().contains_key(&chain) {
            return Err(LoopbackError::UnknownChain(chain));
        }
        Ok(Arc::new(LoopbackEndpoint {
            chain,
            network: Arc::clone(self),
        }))
    }

    /// Address the endpoint on `chain` calls inbound handlers from:
    /// the first 20 bytes of `blake3("ferry-loopback" || chain)`.
    pub fn endpoint_address(chain: ChainId) -> Address {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"ferry-loopback");
        hasher.update(&chain.0.to_be_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hasher.finalize().as_bytes()[..20]);
        Address::new(bytes)
    }

    /// Messages waiting for delivery.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Removes the oldest undelivered envelope.
    pub fn next_envelope(&self) -> Option<Envelope> {
        self.queue.lock().pop_front()
    }

    /// Settles `envelope` on `receiver`: mints the carried tokens to it on
    /// the destination chain, then runs its inbound handler from the
    /// destination endpoint. If the handler refuses the message the minted
    /// tokens are burned again.
    ///
    /// # Errors
    ///
    /// [`LoopbackError::WrongReceiver`] if `receiver` is not the addressed
    /// instance, plus mint and delivery failures.
    pub fn deliver(&self, envelope: Envelope, receiver: &Instance) -> Result<ReceiptSummary, LoopbackError> {
        let Envelope {
            message_id,
            source_chain,
            destination_chain,
            sender,
            message,
        } = envelope;

        if receiver.chain_id() != destination_chain || receiver.address() != message.receiver {
            return Err(LoopbackError::WrongReceiver {
                chain: destination_chain,
                expected: message.receiver,
                actual: receiver.address(),
            });
        }
        let bank = self.bank(destination_chain)?;

        let mut minted = Vec::with_capacity(message.tokens.len());
        for token in &message.tokens {
            if let Err(e) = bank.mint(&token.asset, &message.receiver, token.amount) {
                unwind(&bank, &message.receiver, &minted);
                return Err(e.into());
            }
            minted.push(*token);
        }

        let inbound = InboundMessage {
            message_id,
            source_chain,
            sender,
            tokens: message.tokens,
            data: message.data,
        };
        match receiver.on_message_received(&Self::endpoint_address(destination_chain), inbound) {
            Ok(receipt) => {
                tracing::debug!(%message_id, source = %source_chain, destination = %destination_chain, "envelope delivered");
                Ok(receipt)
            }
            Err(e) => {
                tracing::warn!(%message_id, destination = %destination_chain, error = %e, "delivery rejected");
                unwind(&bank, &message.receiver, &minted);
                Err(e.into())
            }
        }
    }

    fn bank(&self, chain: ChainId) -> Result<Arc<InMemoryBank>, LoopbackError> {
        self.chains
            .read()
            .get(&chain)
            .cloned()
            .ok_or(LoopbackError::UnknownChain(chain))
    }

    fn message_id(&self, source: ChainId, sender: &Address, destination: ChainId, message: &OutboundMessage) -> MessageId {
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let mut hasher = blake3::Hasher::new();
        hasher.update(&source.0.to_be_bytes());
        hasher.update(&nonce.to_be_bytes());
        hasher.update(sender.as_bytes());
        hasher.update(&destination.0.to_be_bytes());
        hasher.update(message.receiver.as_bytes());
        hasher.update(&message.data);
        MessageId::new(*hasher.finalize().as_bytes())
    }
}

fn unwind(bank: &InMemoryBank, holder: &Address, minted: &[ferry_protocol::TokenAmount]) {
    for token in minted {
        if let Err(e) = bank.burn(&token.asset, holder, token.amount) {
            tracing::error!(asset = %token.asset, %holder, amount = token.amount, error = %e, "could not unwind delivery mint");
        }
    }
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// One chain's view of the network; implements [`Transport`].
pub struct LoopbackEndpoint {
    chain: ChainId,
    network: Arc<LoopbackNetwork>,
}

impl LoopbackEndpoint {
    /// Chain this endpoint submits from.
    pub fn chain(&self) -> ChainId {
        self.chain
    }

    /// Checks allowances and balances for everything `submit` will draw,
    /// so a shortfall is reported before anything moves.
    fn check_funding(
        &self,
        bank: &InMemoryBank,
        sender: &Address,
        draws: &HashMap<AssetId, Amount>,
    ) -> Result<(), TransportError> {
        let me = self.address();
        for (asset, needed) in draws {
            let allowed = bank.allowance(asset, sender, &me);
            let held = bank.balance_of(asset, sender);
            if allowed < *needed || held < *needed {
                return Err(TransportError::Funding(format!(
                    "{sender} must approve and hold {needed} of {asset} (approved {allowed}, holds {held})"
                )));
            }
        }
        Ok(())
    }
}

impl Transport for LoopbackEndpoint {
    fn address(&self) -> Address {
        LoopbackNetwork::endpoint_address(self.chain)
    }

    fn quote_fee(&self, destination: ChainId, message: &OutboundMessage) -> Result<Amount, TransportError> {
        if !self.is_chain_supported(destination) {
            return Err(TransportError::UnsupportedChain(destination));
        }
        let cfg = &self.network.config;
        let bytes = message.payload_len() as Amount;
        cfg.fee_per_byte
            .checked_mul(bytes)
            .and_then(|v| v.checked_add(cfg.base_fee))
            .ok_or_else(|| TransportError::Rejected("fee overflow".into()))
    }

    fn submit(
        &self,
        sender: &Address,
        destination: ChainId,
        message: OutboundMessage,
    ) -> Result<MessageId, TransportError> {
        let fee = self.quote_fee(destination, &message)?;
        if message.fee_asset != self.network.config.fee_asset {
            return Err(TransportError::Rejected(format!(
                "fees are charged in {}, not {}",
                self.network.config.fee_asset, message.fee_asset
            )));
        }
        let bank = self
            .network
            .bank(self.chain)
            .map_err(|_| TransportError::UnsupportedChain(self.chain))?;

        let mut draws: HashMap<AssetId, Amount> = HashMap::new();
        for (asset, amount) in std::iter::once((message.fee_asset, fee))
            .chain(message.tokens.iter().map(|t| (t.asset, t.amount)))
        {
            let entry = draws.entry(asset).or_default();
            *entry = entry
                .checked_add(amount)
                .ok_or_else(|| TransportError::Rejected("amount overflow".into()))?;
        }
        self.check_funding(&bank, sender, &draws)?;

        let me = self.address();
        let funding = |e: ferry_protocol::AssetError| TransportError::Funding(e.to_string());
        bank.transfer_from(&message.fee_asset, &me, sender, &me, fee)
            .map_err(funding)?;
        for token in &message.tokens {
            bank.transfer_from(&token.asset, &me, sender, &me, token.amount)
                .map_err(funding)?;
            bank.burn(&token.asset, &me, token.amount)
                .map_err(|e| TransportError::Funding(e.to_string()))?;
        }

        let message_id = self.network.message_id(self.chain, sender, destination, &message);
        tracing::info!(
            %message_id,
            source = %self.chain,
            %destination,
            %sender,
            fee,
            "message accepted"
        );
        self.network.queue.lock().push_back(Envelope {
            message_id,
            source_chain: self.chain,
            destination_chain: destination,
            sender: *sender,
            message,
        });
        Ok(message_id)
    }

    fn is_chain_supported(&self, chain: ChainId) -> bool {
        chain != self.chain && self.network.chains.read().contains_key(&chain)
    }
}
