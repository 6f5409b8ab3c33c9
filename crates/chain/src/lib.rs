//! Execution environment and batched multicall executor.
//!
//! This crate provides:
//! - A word-oriented calldata codec (selector + 32-byte argument words)
//! - The [`World`] execution environment: account registry, selector
//!   dispatch, storage slots, oracle price board, snapshot rollback
//! - The batched multicall executor with per-call success policy and
//!   self-context helper dispatch
//!
//! Atomicity within a transaction is provided here, by snapshotting and
//! restoring the world, not by the contracts themselves.

pub mod abi;
mod executor;
mod world;

pub use executor::{
    batch_calls, BatchBuilder, BatchError, Call, CallKind, CallOutcome, HelperCall,
};
pub use world::{sel, CallContext, ContractLogic, StorageSlot, World};
