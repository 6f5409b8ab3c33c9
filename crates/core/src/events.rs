//! Chain-resident event log.
//!
//! Events are appended by protocol operations and live inside the world
//! state itself, so a rolled-back transaction also rolls back everything it
//! emitted. Every emission is mirrored to `tracing` for operator visibility;
//! the log is what tests and off-chain consumers assert against.

use alloy::primitives::{keccak256, Address, B256, U256};

/// A protocol event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A trigger's one-way flag moved false -> true. Emitted exactly once
    /// per trigger lifetime, on the toggle call that flips the flag.
    TriggerActivated { trigger: Address },

    /// A market observed its trigger fire: its own one-way flag is now set
    /// and all outstanding debt has been forgiven.
    MarketTriggered {
        market: Address,
        trigger: Address,
        debt_forgiven: U256,
    },

    /// Funds borrowed from a market.
    Borrow {
        market: Address,
        borrower: Address,
        amount: U256,
    },

    /// Debt repaid on a borrower's behalf.
    RepayBorrow {
        market: Address,
        payer: Address,
        borrower: Address,
        amount: U256,
    },

    /// An optional batch call failed; the batch continued past it.
    BatchCallFailed { index: usize },

    /// LP tokens staked into a reward gauge.
    Staked {
        gauge: Address,
        account: Address,
        amount: U256,
    },

    /// LP tokens withdrawn from a reward gauge.
    Unstaked {
        gauge: Address,
        account: Address,
        amount: U256,
    },

    /// Pending rewards paid out.
    RewardsClaimed {
        gauge: Address,
        account: Address,
        to: Address,
        amount: U256,
    },

    /// An adapter completed a borrow-and-deploy sequence.
    Invested {
        adapter: Address,
        market: Address,
        borrowed: U256,
        staked: U256,
    },

    /// An adapter completed an unwind sequence.
    Divested {
        adapter: Address,
        market: Address,
        redeemed: U256,
        repaid: U256,
        refunded: U256,
    },
}

/// Ordered log of emitted events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and mirror it to tracing.
    pub fn emit(&mut self, event: Event) {
        tracing::debug!(event = ?event, "chain event");
        self.events.push(event);
    }

    /// All events, in emission order.
    pub fn all(&self) -> &[Event] {
        &self.events
    }

    /// Number of emitted events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing has been emitted.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Count events matching a predicate.
    pub fn count_where(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

/// Keccak signatures of the canonical wire events.
pub mod event_signatures {
    use super::*;

    /// keccak256("TriggerActivated(address)")
    pub fn trigger_activated() -> B256 {
        keccak256("TriggerActivated(address)")
    }

    /// keccak256("MarketTriggered(address,address,uint256)")
    pub fn market_triggered() -> B256 {
        keccak256("MarketTriggered(address,address,uint256)")
    }

    /// keccak256("BatchCallFailed(uint256)")
    pub fn batch_call_failed() -> B256 {
        keccak256("BatchCallFailed(uint256)")
    }
}
