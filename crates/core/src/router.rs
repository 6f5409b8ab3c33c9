//! Best-effort repayment router arithmetic.
//!
//! The router's wire surface (`repayBehalfExplicit(borrower, market)`,
//! payable) repays as much of the borrower's native-currency debt as the
//! forwarded value covers and refunds the excess to the payer within the
//! same call. The dispatch lives with the execution environment; the split
//! itself is here.

use alloy::primitives::U256;

/// Split a forwarded payment into `(repay, refund)` against the current
/// debt. Never repays more than the debt, never refunds more than the
/// value.
pub fn split_repayment(value: U256, debt: U256) -> (U256, U256) {
    let repay = value.min(debt);
    (repay, value - repay)
}
