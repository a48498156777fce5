//! # Inbound Message Handler
//!
//! Settles a message delivered by the transport: recover the requester from
//! the intent payload and credit every carried token to them.
//!
//! The transport is the trust anchor for authenticity and ordering. The
//! handler only checks that the caller *is* the transport, and refuses to
//! credit the same message id twice.

use serde::{Deserialize, Serialize};

use super::{InboundMessage, Intent, TokenAmount};
use crate::error::{FerryError, FerryResult};
use crate::events::EventKind;
use crate::instance::{Gate, Instance};
use crate::types::{Address, ChainId, MessageId};

/// What an inbound delivery credited.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptSummary {
    pub message_id: MessageId,
    pub source_chain: ChainId,
    pub requester: Address,
    pub memo: String,
    /// Non-zero credits, in message order.
    pub credited: Vec<TokenAmount>,
}

impl Instance {
    /// Credits the tokens carried by `message` to the requester named in its
    /// intent. Runs while paused so in-flight transfers still settle.
    ///
    /// # Errors
    ///
    /// - [`FerryError::Unauthorized`] unless `caller` is the transport.
    /// - [`FerryError::MalformedIntent`] for an undecodable payload.
    /// - [`FerryError::NullAsset`] if any token names the null asset.
    /// - [`FerryError::DuplicateMessage`] for an id already credited.
    /// - [`FerryError::AmountOverflow`]; nothing is credited in that case.
    pub fn on_message_received(
        &self,
        caller: &Address,
        message: InboundMessage,
    ) -> FerryResult<ReceiptSummary> {
        let _lock = self.enter(Gate::AlwaysOpen)?;
        if *caller != self.transport().address() {
            return Err(FerryError::unauthorized(caller, "transport"));
        }

        let InboundMessage {
            message_id,
            source_chain,
            sender,
            tokens,
            data,
        } = message;

        let intent = Intent::decode(&data)?;
        if tokens.iter().any(|t| t.asset.is_null()) {
            return Err(FerryError::NullAsset);
        }
        let credited: Vec<TokenAmount> = tokens.into_iter().filter(|t| t.amount > 0).collect();

        {
            let mut st = self.state().write();
            if st.processed.contains(&message_id) {
                return Err(FerryError::DuplicateMessage(message_id));
            }
            st.book
                .credit_all(&intent.requester, credited.iter().map(|t| (&t.asset, t.amount)))?;
            st.processed.insert(message_id);
            st.journal.record(EventKind::TransferReceived {
                message_id,
                source_chain,
                sender,
                requester: intent.requester,
                tokens: credited.clone(),
            });
        }

        tracing::info!(
            %message_id,
            source = %source_chain,
            %sender,
            requester = %intent.requester,
            tokens = credited.len(),
            "transfer received"
        );

        Ok(ReceiptSummary {
            message_id,
            source_chain,
            requester: intent.requester,
            memo: intent.memo,
            credited,
        })
    }
}
