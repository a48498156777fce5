//! # Instance Event Journal
//!
//! Every state change an instance makes is recorded as an [`InstanceEvent`]
//! and mirrored to `tracing`. The journal is bounded; operators that need a
//! full history should drain it periodically.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EVENT_JOURNAL_CAPACITY;
use crate::messaging::TokenAmount;
use crate::types::{Address, Amount, AssetId, ChainId, MessageId};

/// What happened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Deposited {
        user: Address,
        asset: AssetId,
        amount: Amount,
        routed: bool,
    },
    Withdrawn {
        user: Address,
        asset: AssetId,
        amount: Amount,
        from_strategy: Amount,
    },
    TransferRequested {
        message_id: MessageId,
        requester: Address,
        destination_chain: ChainId,
        receiver: Address,
        asset: AssetId,
        amount: Amount,
        fee: Amount,
    },
    TransferReceived {
        message_id: MessageId,
        source_chain: ChainId,
        sender: Address,
        requester: Address,
        tokens: Vec<TokenAmount>,
    },
    ChainAllowlistUpdated {
        chain: ChainId,
        allowed: bool,
    },
    StrategyUpdated {
        asset: AssetId,
        strategy: Option<Address>,
    },
    StrategyRoutingToggled {
        enabled: bool,
    },
    ExecutionBoundsUpdated {
        min: u64,
        max: u64,
    },
    ExecutionBudgetUpdated {
        value: u64,
    },
    Paused {
        by: Address,
    },
    Unpaused {
        by: Address,
    },
    PauserChanged {
        previous: Address,
        current: Address,
    },
    OwnershipTransferred {
        previous: Address,
        current: Address,
    },
    Swept {
        asset: AssetId,
        beneficiary: Address,
        amount: Amount,
    },
}

/// A timestamped [`EventKind`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceEvent {
    /// Monotonic per-instance sequence number.
    pub seq: u64,
    /// Wall-clock time the event was recorded.
    pub at: DateTime<Utc>,
    /// Payload.
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Bounded FIFO of events.
#[derive(Debug, Default)]
pub struct EventJournal {
    next_seq: u64,
    events: VecDeque<InstanceEvent>,
}

impl EventJournal {
    /// Empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event, evicting the oldest past capacity.
    pub fn record(&mut self, kind: EventKind) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        tracing::debug!(seq, event = ?kind, "event recorded");
        if self.events.len() == EVENT_JOURNAL_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back(InstanceEvent {
            seq,
            at: Utc::now(),
            kind,
        });
        seq
    }

    /// Copy of retained events, oldest first.
    pub fn snapshot(&self) -> Vec<InstanceEvent> {
        self.events.iter().cloned().collect()
    }

    /// Removes and returns retained events.
    pub fn drain(&mut self) -> Vec<InstanceEvent> {
        self.events.drain(..).collect()
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// `true` when nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
