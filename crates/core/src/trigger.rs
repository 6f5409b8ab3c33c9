//! One-way trigger state machine.
//!
//! A trigger reports whether an external protected condition has occurred.
//! The flag is monotonic: it moves false -> true at most once and never
//! back. The sole mutation path is [`Trigger::check_and_toggle`], which
//! short-circuits once the flag is set, so redundant, concurrent or
//! adversarial callers can never re-fire it or flip it back.
//!
//! Condition logic sits behind the [`TriggerCondition`] capability trait:
//! the one-way flag and the short-circuit rule belong to this module's
//! contract, not to any particular condition implementation.

use alloy::primitives::{Address, U256};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Immutable trigger metadata, fixed at construction.
#[derive(Debug, Clone)]
pub struct TriggerMetadata {
    /// Human-readable name.
    pub name: String,
    /// Short symbol.
    pub symbol: String,
    /// What condition this trigger protects against.
    pub description: String,
    /// Ordered platform identifiers covered by this trigger.
    pub platform_ids: SmallVec<[u16; 4]>,
    /// Subsidy beneficiary.
    pub recipient: Address,
}

/// Read-only view of the world a condition may consult.
#[derive(Debug)]
pub struct ConditionEnv<'a> {
    /// Admin-posted oracle feed prices.
    pub prices: &'a HashMap<Address, U256>,
}

impl ConditionEnv<'_> {
    /// Latest posted price for a feed, if any.
    pub fn price(&self, feed: Address) -> Option<U256> {
        self.prices.get(&feed).copied()
    }
}

/// A protected-condition check.
///
/// Implementations must be free of side effects: the only state change a
/// toggle call may produce is the trigger's own flag.
pub trait TriggerCondition: Send + Sync + std::fmt::Debug {
    /// Whether the protected condition currently holds.
    fn probe(&self, env: &ConditionEnv<'_>) -> bool;
}

/// Manually armed condition.
///
/// The armed flag models an off-chain event, not chain state: arming it is
/// not undone by a transaction rollback.
#[derive(Debug, Default)]
pub struct ManualCondition {
    armed: AtomicBool,
}

impl ManualCondition {
    /// Create an unarmed condition handle.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Arm the condition. One-way, like the event it models.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Whether the condition is armed.
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

impl TriggerCondition for ManualCondition {
    fn probe(&self, _env: &ConditionEnv<'_>) -> bool {
        self.is_armed()
    }
}

/// Fires when an oracle feed reports a price strictly below a floor.
///
/// A missing feed never fires: absence of data is not evidence of failure.
#[derive(Debug, Clone)]
pub struct PriceFloorCondition {
    /// Oracle feed address to read.
    pub feed: Address,
    /// Price floor in feed units.
    pub floor: U256,
}

impl TriggerCondition for PriceFloorCondition {
    fn probe(&self, env: &ConditionEnv<'_>) -> bool {
        match env.price(self.feed) {
            Some(price) => price < self.floor,
            None => false,
        }
    }
}

/// Outcome of a toggle attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Flag was already set; nothing changed, nothing probed.
    AlreadyTriggered,
    /// The condition matched for the first time; the flag is now set.
    JustTriggered,
    /// The condition did not match; state unchanged.
    NotMet,
}

impl ToggleOutcome {
    /// The wire-level boolean: is the trigger set after this call?
    pub fn as_bool(self) -> bool {
        !matches!(self, Self::NotMet)
    }
}

/// The trigger state machine: {Untriggered, Triggered}, with Triggered
/// terminal.
#[derive(Debug, Clone)]
pub struct Trigger {
    meta: TriggerMetadata,
    is_triggered: bool,
    condition: Arc<dyn TriggerCondition>,
}

impl Trigger {
    /// Create an untriggered trigger with fixed metadata.
    pub fn new(meta: TriggerMetadata, condition: Arc<dyn TriggerCondition>) -> Self {
        Self {
            meta,
            is_triggered: false,
            condition,
        }
    }

    /// Trigger metadata.
    pub fn metadata(&self) -> &TriggerMetadata {
        &self.meta
    }

    /// Ordered platform identifiers. Pure read.
    pub fn platform_ids(&self) -> &[u16] {
        &self.meta.platform_ids
    }

    /// Current flag value.
    pub fn is_triggered(&self) -> bool {
        self.is_triggered
    }

    /// Probe the condition and flip the flag on the first match.
    ///
    /// Short-circuits without probing once triggered, so the observable
    /// contract is idempotent: any number of calls moves the flag from
    /// false to true at most once.
    pub fn check_and_toggle(&mut self, env: &ConditionEnv<'_>) -> ToggleOutcome {
        if self.is_triggered {
            return ToggleOutcome::AlreadyTriggered;
        }
        if self.condition.probe(env) {
            self.is_triggered = true;
            ToggleOutcome::JustTriggered
        } else {
            ToggleOutcome::NotMet
        }
    }
}
