//! Cross-chain message envelopes as the core sees them.
//!
//! The transport owns the real wire format. These types carry only the
//! fields the outbound builder fills in and the inbound handler reads.

use serde::{Deserialize, Serialize};

use crate::types::{Address, Amount, AssetId, ChainId, MessageId};

/// One asset movement carried by a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
    /// Asset on the source chain.
    pub asset: AssetId,
    /// Amount moved.
    pub amount: Amount,
}

/// Destination-execution parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionArgs {
    /// Gas limit for the receiver's handler on the destination chain.
    pub gas_limit: u64,
}

/// A message ready to be quoted and submitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Peer instance on the destination chain.
    pub receiver: Address,
    /// Assets the transport moves alongside the data.
    pub tokens: Vec<TokenAmount>,
    /// Encoded [`Intent`](super::Intent).
    pub data: Vec<u8>,
    /// Asset the transport fee is paid in.
    pub fee_asset: AssetId,
    /// Destination execution parameters.
    pub extra_args: ExecutionArgs,
}

impl OutboundMessage {
    /// Rough payload size the transport may price by.
    pub fn payload_len(&self) -> usize {
        self.data.len() + self.tokens.len() * 52
    }
}

/// A message delivered by the transport to the inbound handler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Transport-assigned identifier.
    pub message_id: MessageId,
    /// Chain the message originated on.
    pub source_chain: ChainId,
    /// Instance that sent it.
    pub sender: Address,
    /// Assets delivered to the receiving instance.
    pub tokens: Vec<TokenAmount>,
    /// Encoded [`Intent`](super::Intent).
    pub data: Vec<u8>,
}
