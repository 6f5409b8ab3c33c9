//! Batched multicall executor.
//!
//! Executes an ordered, heterogeneous sequence of calls in one atomic
//! transaction with a per-call success policy. Two dispatch modes exist,
//! chosen explicitly on the call record: an external call to a target
//! account, and a self-context helper that runs against the *caller's* own
//! balances, for the moves that cannot be encoded ahead of time because
//! they depend on runtime balances ("send everything I hold", "repay
//! whatever I owe by now").
//!
//! Failure semantics:
//! - a self-context call carrying value is a configuration error: the whole
//!   batch aborts immediately;
//! - a failing call marked `require_success` aborts the whole batch and
//!   surfaces the revert reason;
//! - a failing optional call is rolled back by itself, recorded with an
//!   index-tagged event, and the batch continues.
//!
//! The executor runs with the calling proxy's identity throughout; it is
//! only ever invoked from trusted, owner-controlled contexts.

use alloy::primitives::{Address, Bytes, U256};
use thiserror::Error;
use tracing::{debug, warn};

use bulwark_core::{Asset, CallError, Event, REPAY_MAX};

use crate::abi::{encode_uint, CalldataBuilder};
use crate::world::World;

/// One step of a batch.
#[derive(Debug, Clone)]
pub struct Call {
    /// Dispatch mode and payload.
    pub kind: CallKind,
    /// Native currency forwarded with the call. Must be zero for
    /// self-context calls.
    pub value: U256,
    /// Whether a failure of this call aborts the whole batch.
    pub require_success: bool,
}

/// Dispatch mode of a call.
#[derive(Debug, Clone)]
pub enum CallKind {
    /// Ordinary call to an external target.
    External {
        /// Target account.
        target: Address,
        /// Opaque call payload.
        data: Bytes,
    },
    /// Run a helper against the executor's own method table, in the
    /// caller's balance context.
    SelfContext(HelperCall),
}

/// Helpers available through self-context dispatch only, because they act
/// on "my own" balance, where "my own" means the calling proxy.
#[derive(Debug, Clone)]
pub enum HelperCall {
    /// Send the caller's full current balance of an asset.
    TransferAll {
        /// Asset to sweep.
        asset: Asset,
        /// Destination.
        to: Address,
    },
    /// Repay the caller's entire token-market debt, falling back to the
    /// available balance when "repay max" cannot cover accrued drift.
    RepayBorrowToken {
        /// Token market to repay.
        market: Address,
    },
    /// Forward the caller's full native balance to a repayment router that
    /// repays what it can and refunds the excess.
    RepayBorrowNative {
        /// Native market to repay.
        market: Address,
        /// Repayment router handling the overpay-and-refund.
        router: Address,
    },
}

/// Result of one call in a batch.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    /// Whether the call succeeded.
    pub success: bool,
    /// Raw return payload; for a failed optional call, the raw (possibly
    /// empty) revert payload.
    pub output: Bytes,
}

/// A batch-level failure. Any prior effects of the batch are rolled back.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// A call marked `require_success` failed.
    #[error("call {index} failed: {reason}")]
    RequiredCallFailed {
        /// Index of the failing call.
        index: usize,
        /// Revert reason, verbatim when decodable.
        reason: String,
    },

    /// A self-context call carried a nonzero value.
    #[error("self-context call {index} must not carry value")]
    ValueOnSelfContext {
        /// Index of the misconfigured call.
        index: usize,
    },
}

/// Execute a batch of calls on behalf of `caller`.
///
/// Calls run strictly sequentially; the returned outcomes are in call
/// order, one per call. On `Err`, no effect of any call in the batch
/// persists.
pub fn batch_calls(
    world: &mut World,
    caller: Address,
    calls: &[Call],
) -> Result<Vec<CallOutcome>, BatchError> {
    let checkpoint = world.clone();
    let mut outcomes = Vec::with_capacity(calls.len());

    for (index, call) in calls.iter().enumerate() {
        if matches!(call.kind, CallKind::SelfContext(_)) && !call.value.is_zero() {
            *world = checkpoint;
            return Err(BatchError::ValueOnSelfContext { index });
        }

        let before = world.clone();
        let result = match &call.kind {
            CallKind::External { target, data } => world.call(caller, *target, data, call.value),
            CallKind::SelfContext(helper) => execute_helper(world, caller, helper),
        };

        match result {
            Ok(output) => {
                debug!(index, output_len = output.len(), "batch call succeeded");
                outcomes.push(CallOutcome {
                    success: true,
                    output,
                });
            }
            Err(err) => {
                // This call's own effects never persist.
                *world = before;
                if call.require_success {
                    *world = checkpoint;
                    return Err(BatchError::RequiredCallFailed {
                        index,
                        reason: err.reason(),
                    });
                }
                warn!(index, error = %err, "optional batch call failed, continuing");
                world.emit(Event::BatchCallFailed { index });
                outcomes.push(CallOutcome {
                    success: false,
                    output: revert_payload(&err),
                });
            }
        }
    }

    Ok(outcomes)
}

/// Raw payload a failed call leaves in its outcome slot.
fn revert_payload(err: &CallError) -> Bytes {
    match err {
        CallError::Revert(reason) => Bytes::from(reason.clone().into_bytes()),
        _ => Bytes::new(),
    }
}

/// Run a self-context helper with the caller's balances.
fn execute_helper(
    world: &mut World,
    caller: Address,
    helper: &HelperCall,
) -> Result<Bytes, CallError> {
    match helper {
        HelperCall::TransferAll { asset, to } => {
            let balance = world.balance_of(*asset, caller);
            if !balance.is_zero() {
                world.transfer_asset(*asset, caller, *to, balance)?;
            }
            debug!(caller = %caller, to = %to, amount = %balance, "transferred full balance");
            Ok(encode_uint(balance))
        }
        HelperCall::RepayBorrowToken { market } => repay_borrow_token(world, caller, *market),
        HelperCall::RepayBorrowNative { market, router } => {
            let balance = world.balance_of(Asset::Native, caller);
            let data = CalldataBuilder::new("repayBehalfExplicit(address,address)")
                .address(caller)
                .address(*market)
                .build();
            world.call(caller, *router, &data, balance)
        }
    }
}

/// Two-tier token repayment.
///
/// Tier 1 attempts "repay max", the full debt as of now. Interest accrued
/// since the batch was encoded can push the debt past the caller's balance
/// and make that attempt revert; tier 2 then repays as much as the balance
/// allows. A nonzero error code from the fallback is a hard failure.
fn repay_borrow_token(
    world: &mut World,
    caller: Address,
    market: Address,
) -> Result<Bytes, CallError> {
    let debt = world.borrow_balance_current(market, caller)?;
    if debt.is_zero() {
        return Ok(encode_uint(U256::ZERO));
    }
    let underlying = match world.market_underlying(market)? {
        bulwark_core::Underlying::Token(token) => token,
        bulwark_core::Underlying::Native => {
            return Err(CallError::revert("market does not lend a token"));
        }
    };
    world.ensure_max_allowance(underlying, caller, market)?;

    match world.market_repay_behalf(market, caller, caller, REPAY_MAX) {
        Ok(code) if code.is_ok() => return Ok(encode_uint(debt)),
        Ok(code) => {
            debug!(market = %market, code = %code, "repay max rejected, falling back");
        }
        Err(err) => {
            debug!(market = %market, error = %err, "repay max reverted, falling back");
        }
    }

    // Fallback: repay what the available balance covers.
    let balance = world.balance_of(Asset::Token(underlying), caller);
    let debt = world.borrow_balance_current(market, caller)?;
    let available = balance.min(debt);
    let code = world.market_repay_behalf(market, caller, caller, available)?;
    if !code.is_ok() {
        return Err(CallError::Revert(format!(
            "repay fallback failed: error code {code}"
        )));
    }
    Ok(encode_uint(available))
}

/// Fluent builder for call batches.
#[derive(Debug, Clone, Default)]
pub struct BatchBuilder {
    calls: Vec<Call>,
}

impl BatchBuilder {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mandatory external call.
    pub fn external(mut self, target: Address, data: Bytes, value: U256) -> Self {
        self.calls.push(Call {
            kind: CallKind::External { target, data },
            value,
            require_success: true,
        });
        self
    }

    /// Add an optional external call (failure is recorded, not fatal).
    pub fn external_optional(mut self, target: Address, data: Bytes, value: U256) -> Self {
        self.calls.push(Call {
            kind: CallKind::External { target, data },
            value,
            require_success: false,
        });
        self
    }

    /// Add a mandatory self-context helper.
    pub fn helper(mut self, helper: HelperCall) -> Self {
        self.calls.push(Call {
            kind: CallKind::SelfContext(helper),
            value: U256::ZERO,
            require_success: true,
        });
        self
    }

    /// Sweep the caller's full balance of an asset.
    pub fn transfer_all(self, asset: Asset, to: Address) -> Self {
        self.helper(HelperCall::TransferAll { asset, to })
    }

    /// Repay the caller's full token-market debt, best effort.
    pub fn repay_borrow_token(self, market: Address) -> Self {
        self.helper(HelperCall::RepayBorrowToken { market })
    }

    /// Repay the caller's native-market debt through a router.
    pub fn repay_borrow_native(self, market: Address, router: Address) -> Self {
        self.helper(HelperCall::RepayBorrowNative { market, router })
    }

    /// Finish the batch.
    pub fn build(self) -> Vec<Call> {
        self.calls
    }

    /// Number of calls queued so far.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
