//! Market boundary model.
//!
//! Borrow/repay bookkeeping for a single lending market with the
//! ecosystem's split failure convention: logic failures return an
//! [`ErrorCode`], transfer failures revert. A protection market additionally
//! holds a reference to a trigger and maintains its *own* one-way triggered
//! flag, set exactly once when it observes the trigger's toggle method
//! return true; setting the flag forgives all outstanding debt.
//!
//! Fund movements are not performed here; the execution environment moves
//! ledger balances and records the results through this bookkeeping.

use alloy::primitives::{Address, U256};
use std::collections::HashMap;

use crate::error::ErrorCode;
use crate::ledger::Asset;

/// Sentinel repay amount meaning "the full outstanding debt, whatever it is
/// by now". Tolerates interest accrued between encoding and execution.
pub const REPAY_MAX: U256 = U256::MAX;

/// What a market lends out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Underlying {
    /// The native currency.
    Native,
    /// A fungible token.
    Token(Address),
}

impl Underlying {
    /// The ledger asset this underlying maps to.
    pub fn asset(self) -> Asset {
        match self {
            Self::Native => Asset::Native,
            Self::Token(token) => Asset::Token(token),
        }
    }
}

/// One lending market's debt ledger.
#[derive(Debug, Clone)]
pub struct Market {
    underlying: Underlying,
    trigger: Option<Address>,
    triggered: bool,
    borrows: HashMap<Address, U256>,
}

impl Market {
    /// A base money market: no trigger, debt is never forgiven.
    pub fn money(underlying: Underlying) -> Self {
        Self {
            underlying,
            trigger: None,
            triggered: false,
            borrows: HashMap::new(),
        }
    }

    /// A protection market gated by `trigger`.
    pub fn protection(underlying: Underlying, trigger: Address) -> Self {
        Self {
            underlying,
            trigger: Some(trigger),
            triggered: false,
            borrows: HashMap::new(),
        }
    }

    /// What this market lends.
    pub fn underlying(&self) -> Underlying {
        self.underlying
    }

    /// The gating trigger, if this is a protection market.
    pub fn trigger(&self) -> Option<Address> {
        self.trigger
    }

    /// Whether this market is gated by a trigger.
    pub fn is_protection(&self) -> bool {
        self.trigger.is_some()
    }

    /// The market's own one-way triggered flag.
    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    /// Feed the market the result of its trigger's toggle method.
    ///
    /// The first observed `true` sets the market's flag and forgives all
    /// outstanding debt; returns the forgiven total on that observation and
    /// `None` on every other call.
    pub fn observe_trigger(&mut self, toggled: bool) -> Option<U256> {
        if self.triggered || !toggled {
            return None;
        }
        self.triggered = true;
        let forgiven = self.total_borrows();
        self.borrows.clear();
        Some(forgiven)
    }

    /// Current debt of `account`. Zero after forgiveness.
    pub fn borrow_balance(&self, account: Address) -> U256 {
        self.borrows.get(&account).copied().unwrap_or(U256::ZERO)
    }

    /// Sum of all outstanding debt.
    pub fn total_borrows(&self) -> U256 {
        self.borrows.values().copied().sum()
    }

    /// Validate a borrow against market policy, given the market's current
    /// cash balance. Returns the code the borrow call reports.
    pub fn can_borrow(&self, cash: U256, amount: U256) -> ErrorCode {
        if self.triggered {
            ErrorCode::MarketTriggered
        } else if cash < amount {
            ErrorCode::InsufficientCash
        } else {
            ErrorCode::NoError
        }
    }

    /// Record a borrow after funds have moved.
    pub fn record_borrow(&mut self, borrower: Address, amount: U256) {
        let debt = self.borrows.entry(borrower).or_insert(U256::ZERO);
        *debt += amount;
    }

    /// Record a repayment after funds have moved. Callers resolve
    /// [`REPAY_MAX`] and validate the amount beforehand.
    pub fn record_repay(&mut self, borrower: Address, amount: U256) {
        if let Some(debt) = self.borrows.get_mut(&borrower) {
            *debt = debt.saturating_sub(amount);
            if debt.is_zero() {
                self.borrows.remove(&borrower);
            }
        }
    }

    /// Accrue `rate_bps` basis points of interest on every outstanding
    /// borrow. Returns the new total. No-op after forgiveness.
    pub fn accrue_interest(&mut self, rate_bps: u64) -> U256 {
        let rate = U256::from(rate_bps);
        let scale = U256::from(10_000u64);
        for debt in self.borrows.values_mut() {
            *debt += *debt * rate / scale;
        }
        self.total_borrows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[test]
    fn test_borrow_and_repay_bookkeeping() {
        let mut market = Market::money(Underlying::Token(addr(0x01)));

        assert_eq!(
            market.can_borrow(U256::from(1000), U256::from(100)),
            ErrorCode::NoError
        );
        market.record_borrow(addr(0xaa), U256::from(100));
        market.record_borrow(addr(0xaa), U256::from(50));
        assert_eq!(market.borrow_balance(addr(0xaa)), U256::from(150));
        assert_eq!(market.total_borrows(), U256::from(150));

        market.record_repay(addr(0xaa), U256::from(150));
        assert_eq!(market.borrow_balance(addr(0xaa)), U256::ZERO);
    }

    #[test]
    fn test_borrow_rejected_when_cash_short() {
        let market = Market::money(Underlying::Token(addr(0x01)));
        assert_eq!(
            market.can_borrow(U256::from(10), U256::from(100)),
            ErrorCode::InsufficientCash
        );
    }

    #[test]
    fn test_trigger_observation_forgives_debt_once() {
        let mut market = Market::protection(Underlying::Token(addr(0x01)), addr(0x02));
        market.record_borrow(addr(0xaa), U256::from(100));
        market.record_borrow(addr(0xbb), U256::from(25));

        // A false observation changes nothing.
        assert_eq!(market.observe_trigger(false), None);
        assert!(!market.is_triggered());

        // First true observation sets the flag and forgives everything.
        assert_eq!(market.observe_trigger(true), Some(U256::from(125)));
        assert!(market.is_triggered());
        assert_eq!(market.borrow_balance(addr(0xaa)), U256::ZERO);
        assert_eq!(market.total_borrows(), U256::ZERO);

        // Later observations are no-ops; the flag never resets.
        assert_eq!(market.observe_trigger(true), None);
        assert!(market.is_triggered());
        assert_eq!(
            market.can_borrow(U256::from(1000), U256::from(1)),
            ErrorCode::MarketTriggered
        );
    }

    #[test]
    fn test_accrue_interest_scales_debt() {
        let mut market = Market::money(Underlying::Token(addr(0x01)));
        market.record_borrow(addr(0xaa), U256::from(1000));

        // 5% accrual
        let total = market.accrue_interest(500);
        assert_eq!(total, U256::from(1050));
        assert_eq!(market.borrow_balance(addr(0xaa)), U256::from(1050));
    }
}
