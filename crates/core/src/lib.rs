//! Protection-market protocol core.
//!
//! This crate provides the chain-resident building blocks of the engine:
//! - One-way trigger state machine with pluggable conditions
//! - Market boundary model (borrow/repay codes, debt forgiveness)
//! - Fungible-token and native-currency ledger
//! - Event log that rolls back together with state
//! - Error taxonomy (reverts vs. in-protocol soft-failure codes)
//! - Deployment configuration

pub mod config;
mod error;
mod events;
mod ledger;
mod market;
pub mod router;
mod trigger;

pub use config::{load_deployment, parse_address, DeploymentConfig};
pub use error::{CallError, ErrorCode};
pub use events::{event_signatures, Event, EventLog};
pub use ledger::{Asset, Ledger, TokenState};
pub use market::{Market, Underlying, REPAY_MAX};
pub use trigger::{
    ConditionEnv, ManualCondition, PriceFloorCondition, ToggleOutcome, Trigger, TriggerCondition,
    TriggerMetadata,
};
