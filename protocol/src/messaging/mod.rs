//! # Cross-Chain Messaging
//!
//! Two legs, linked only by the intent payload:
//!
//! ```text
//!   chain A                                        chain B
//!   ┌──────────────┐   OutboundMessage   ┌───────────┐   InboundMessage   ┌──────────────┐
//!   │ request_     ├────────────────────►│ transport ├───────────────────►│ on_message_  │
//!   │ transfer     │  (debit, fee, send) │  (async)  │  (credit requester)│ received     │
//!   └──────────────┘                     └───────────┘                    └──────────────┘
//! ```
//!
//! The outbound leg debits the requester before anything leaves the
//! instance. Once the transport accepts the message the debit is final:
//! there is no refund path if delivery never happens.

mod inbound;
mod intent;
mod message;
mod outbound;
mod transport;

pub use inbound::ReceiptSummary;
pub use intent::Intent;
pub use message::{ExecutionArgs, InboundMessage, OutboundMessage, TokenAmount};
pub use outbound::{build_message, TransferRequest};
pub use transport::{Transport, TransportError};
