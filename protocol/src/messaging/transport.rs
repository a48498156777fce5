//! Transport interface consumed by the outbound builder.
//!
//! The transport is the single trust anchor between instances: it quotes
//! fees, accepts messages, draws the approved fee and assets from the
//! sending instance, and later invokes the receiving instance's inbound
//! handler from its own address.

use thiserror::Error;

use super::OutboundMessage;
use crate::types::{Address, Amount, ChainId, MessageId};

/// Errors reported by a transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No lane to the destination.
    #[error("unsupported destination {0}")]
    UnsupportedChain(ChainId),

    /// The transport could not draw the fee or the assets.
    #[error("funding failed: {0}")]
    Funding(String),

    /// The message was refused.
    #[error("message rejected: {0}")]
    Rejected(String),
}

/// Asynchronous cross-chain message transport.
pub trait Transport: Send + Sync {
    /// Identity the transport calls inbound handlers from, and the spender
    /// instances approve.
    fn address(&self) -> Address;

    /// Fee for sending `message` to `destination`, in the message's fee asset.
    fn quote_fee(&self, destination: ChainId, message: &OutboundMessage) -> Result<Amount, TransportError>;

    /// Accepts `message` from `sender`, drawing the quoted fee and the
    /// carried assets through prior approvals.
    fn submit(
        &self,
        sender: &Address,
        destination: ChainId,
        message: OutboundMessage,
    ) -> Result<MessageId, TransportError>;

    /// Whether the transport has a lane to `chain`.
    fn is_chain_supported(&self, chain: ChainId) -> bool;
}
