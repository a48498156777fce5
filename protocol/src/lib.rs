// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # FERRY Protocol: Core Library
//!
//! FERRY keeps a per-user ledger of fungible assets on each chain it is
//! deployed to, optionally parks idle balances in a yield strategy, and moves
//! value between its own instances over an asynchronous cross-chain
//! transport.
//!
//! The hard part is not the arithmetic. It is keeping the books right while
//! three external parties (the asset bank, the strategy venue, the
//! transport) can fail halfway through a call or try to call back in.
//!
//! ## Architecture
//!
//! - **instance**: The context object. Owns all state, runs the guard.
//! - **ledger**: Deposits, withdrawals, and the balance book.
//! - **strategy**: The strategy handle interface and the router.
//! - **messaging**: Outbound builder, inbound handler, intent payload.
//! - **guard**: Reentrancy lock and role checks.
//! - **events**: Bounded journal of everything that changed.
//! - **assets**: The asset bank interface instances custody funds in.
//! - **config**: Protocol constants and instance configuration.
//!
//! ## Invariant
//!
//! For every asset, at the start and end of every entry point:
//!
//! ```text
//!   sum(ledger balances)                   <= direct holding + strategy TVL
//!   sum(ledger balances) - routed positions <= direct holding
//! ```
//!
//! Without venue yield the first line holds with equality; the inequality
//! leaves room for yield that accrues in the strategy but belongs to no
//! ledger balance. The second line keeps that yield from counting as
//! backing for balances held in direct custody.
//!
//! [`Instance::check_solvency`] verifies both on demand.

pub mod assets;
pub mod config;
pub mod error;
pub mod events;
pub mod guard;
pub mod instance;
pub mod ledger;
pub mod messaging;
pub mod strategy;
pub mod types;

#[cfg(test)]
mod testkit;

pub use assets::{AssetBank, AssetError};
pub use config::{ExecutionBudget, InstanceConfig};
pub use error::{ErrorKind, FerryError, FerryResult};
pub use events::{EventKind, InstanceEvent};
pub use instance::{Instance, InstanceSnapshot};
pub use messaging::{
    InboundMessage, Intent, OutboundMessage, ReceiptSummary, TokenAmount, TransferRequest, Transport,
    TransportError,
};
pub use strategy::{StrategyError, StrategyHandle};
pub use types::{Address, Amount, AssetId, BasisPoints, ChainId, MessageId};
