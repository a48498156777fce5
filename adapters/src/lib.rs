//! # FERRY Adapters
//!
//! Concrete collaborators for `ferry-protocol` instances. Everything here
//! runs in process; it is what the node simulator and the integration tests
//! wire instances to.
//!
//! - **bank**: [`InMemoryBank`], a per-chain fungible-token ledger with
//!   allowances and an optional transfer hook.
//! - **vault_strategy**: [`VaultStrategy`], a reference yield venue with
//!   operator controls for yield and losses.
//! - **loopback**: [`LoopbackNetwork`], a queued cross-chain transport
//!   between chains attached to it.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow. Wrapping arithmetic and
//!    money do not mix.
//! 2. Collaborators never hold a lock while calling out, so an instance's
//!    reentrancy guard is the only thing a callback can run into.

pub mod bank;
pub mod loopback;
pub mod vault_strategy;

pub use bank::{AssetInfo, BankError, InMemoryBank, TransferHook};
pub use loopback::{Envelope, LoopbackConfig, LoopbackEndpoint, LoopbackError, LoopbackNetwork};
pub use vault_strategy::VaultStrategy;
