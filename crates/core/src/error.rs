//! Error taxonomy for the protection-market engine.
//!
//! Two failure channels exist, mirroring the conventions of the money-market
//! ecosystem this engine models:
//!
//! - **Reverts** ([`CallError`]): the call's effects are undone by the
//!   execution environment and a reason string (possibly empty) is surfaced
//!   to the caller.
//! - **Soft failures** ([`ErrorCode`]): the call succeeds at the transport
//!   level but signals an in-protocol failure via a nonzero return code.
//!   Components calling into a market must surface a nonzero code, never
//!   ignore it.

use alloy::primitives::Address;
use thiserror::Error;

/// In-protocol error codes returned by market operations.
///
/// Zero means success; anything else is a soft failure that does not revert
/// the enclosing call by itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    /// Operation succeeded.
    NoError = 0,
    /// The market refuses the operation because its trigger has fired.
    MarketTriggered = 1,
    /// Market cash cannot cover the requested borrow.
    InsufficientCash = 2,
    /// Explicit repay amount exceeds the outstanding debt.
    RepayTooMuch = 3,
}

impl ErrorCode {
    /// Map a raw code back to the enum.
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(Self::NoError),
            1 => Some(Self::MarketTriggered),
            2 => Some(Self::InsufficientCash),
            3 => Some(Self::RepayTooMuch),
            _ => None,
        }
    }

    /// Raw numeric code (the wire representation).
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Whether this code signals success.
    pub fn is_ok(self) -> bool {
        matches!(self, Self::NoError)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A reverted call.
///
/// The execution environment guarantees that a call returning `CallError`
/// left no observable effects behind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallError {
    /// Revert with a decodable reason string, propagated verbatim.
    #[error("{0}")]
    Revert(String),

    /// Revert whose payload is too short to decode a reason string.
    #[error("reverted silently")]
    Silent,

    /// No account of any kind lives at the target address.
    #[error("unknown account {0}")]
    UnknownAccount(Address),

    /// The target account does not understand this selector.
    #[error("unknown selector 0x{}", hex::encode(.0))]
    UnknownSelector([u8; 4]),

    /// Calldata shorter than a selector, or arguments not word-aligned.
    #[error("malformed calldata")]
    BadCalldata,
}

impl CallError {
    /// Build a revert with the given reason.
    pub fn revert(reason: impl Into<String>) -> Self {
        Self::Revert(reason.into())
    }

    /// Reason surfaced to batch callers: the revert reason verbatim when one
    /// is decodable, the generic silent-revert message otherwise.
    pub fn reason(&self) -> String {
        match self {
            Self::Revert(reason) if !reason.is_empty() => reason.clone(),
            Self::Revert(_) | Self::Silent => "reverted silently".to_string(),
            other => other.to_string(),
        }
    }
}
