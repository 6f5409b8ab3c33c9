//! Deterministic execution environment.
//!
//! [`World`] owns every piece of chain-resident state: the ledger, market
//! debt books, trigger flags, registered contract logic, venue storage
//! slots, the oracle price board, and the event log. Cloning the world is
//! the snapshot primitive: the batch executor clones before a batch and
//! restores on a mandatory failure, and [`World::call`] snapshots around
//! each top-level call so a reverted call never leaves partial effects (or
//! stray events) behind. That is the whole concurrency story: atomicity is
//! provided by this environment, not by the contracts themselves.
//!
//! Trust boundary: registered contract logic executes with the *caller's*
//! identity, the way proxy-delegated strategy contracts do. The environment
//! is only ever driven from trusted, owner-controlled contexts (a personal
//! proxy wallet); nothing here re-checks who that caller is.

use alloy::primitives::{Address, Bytes, U256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use bulwark_core::router::split_repayment;
use bulwark_core::{
    Asset, CallError, ConditionEnv, ErrorCode, Event, EventLog, Ledger, Market, ToggleOutcome,
    Trigger, Underlying, REPAY_MAX,
};

use crate::abi::{encode_bool, encode_uint, encode_words, CalldataReader};

/// Identity context for a dispatched call.
#[derive(Debug, Clone, Copy)]
pub struct CallContext {
    /// The account on whose behalf the call runs.
    pub caller: Address,
    /// The account being called.
    pub this: Address,
}

/// Stateless contract logic registered at an address.
///
/// Implementations keep no mutable state of their own; everything they
/// touch lives in the world (ledger balances and storage slots), which is
/// what makes snapshot rollback complete.
pub trait ContractLogic: Send + Sync + std::fmt::Debug {
    /// Execute a call against this contract.
    fn execute(
        &self,
        world: &mut World,
        ctx: CallContext,
        data: &[u8],
    ) -> Result<Bytes, CallError>;
}

/// Storage slot for registered-contract bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageSlot {
    /// Owning contract.
    pub contract: Address,
    /// Contract-defined namespace within its storage.
    pub topic: u8,
    /// Account the value is keyed by.
    pub subject: Address,
}

/// The execution environment.
#[derive(Debug, Clone, Default)]
pub struct World {
    ledger: Ledger,
    markets: HashMap<Address, Market>,
    triggers: HashMap<Address, Trigger>,
    routers: HashSet<Address>,
    logic: HashMap<Address, Arc<dyn ContractLogic>>,
    storage: HashMap<StorageSlot, U256>,
    prices: HashMap<Address, U256>,
    events: EventLog,
}

impl World {
    /// Create an empty world.
    pub fn new() -> Self {
        Self::default()
    }

    // ---- deployment / admin surface ------------------------------------

    /// Register a fungible token.
    pub fn create_token(&mut self, address: Address, symbol: &str, decimals: u8) {
        self.ledger.create_token(address, symbol, decimals);
    }

    /// Mint tokens (deployment/admin only).
    pub fn mint(&mut self, token: Address, to: Address, amount: U256) -> Result<(), CallError> {
        self.ledger.mint(token, to, amount)
    }

    /// Credit native currency (deployment/admin only).
    pub fn mint_native(&mut self, to: Address, amount: U256) {
        self.ledger.mint_native(to, amount);
    }

    /// Install a market at an address.
    pub fn install_market(&mut self, address: Address, market: Market) {
        info!(market = %address, protection = market.is_protection(), "installing market");
        self.markets.insert(address, market);
    }

    /// Install a trigger at an address.
    pub fn install_trigger(&mut self, address: Address, trigger: Trigger) {
        info!(trigger = %address, symbol = %trigger.metadata().symbol, "installing trigger");
        self.triggers.insert(address, trigger);
    }

    /// Install a repayment router at an address.
    pub fn install_router(&mut self, address: Address) {
        self.routers.insert(address);
    }

    /// Register contract logic at an address.
    pub fn install_logic(&mut self, address: Address, logic: Arc<dyn ContractLogic>) {
        info!(contract = %address, "installing contract logic");
        self.logic.insert(address, logic);
    }

    /// Post an oracle feed price.
    pub fn set_price(&mut self, feed: Address, price: U256) {
        self.prices.insert(feed, price);
    }

    /// Accrue interest on a market's outstanding borrows (admin clock).
    pub fn accrue_interest(&mut self, market: Address, rate_bps: u64) -> Result<U256, CallError> {
        let state = self
            .markets
            .get_mut(&market)
            .ok_or(CallError::UnknownAccount(market))?;
        let total = state.accrue_interest(rate_bps);
        debug!(market = %market, rate_bps, total_borrows = %total, "accrued interest");
        Ok(total)
    }

    // ---- views ---------------------------------------------------------

    /// The ledger.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// The event log.
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Balance convenience passthrough.
    pub fn balance_of(&self, asset: Asset, account: Address) -> U256 {
        self.ledger.balance_of(asset, account)
    }

    /// Allowance convenience passthrough.
    pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.ledger.allowance(token, owner, spender)
    }

    /// Installed market state, if any.
    pub fn market(&self, address: Address) -> Option<&Market> {
        self.markets.get(&address)
    }

    /// Installed trigger state, if any.
    pub fn trigger(&self, address: Address) -> Option<&Trigger> {
        self.triggers.get(&address)
    }

    /// Append an event.
    pub fn emit(&mut self, event: Event) {
        self.events.emit(event);
    }

    // ---- storage slots -------------------------------------------------

    /// Read a storage slot (zero when unset).
    pub fn storage_get(&self, slot: StorageSlot) -> U256 {
        self.storage.get(&slot).copied().unwrap_or(U256::ZERO)
    }

    /// Write a storage slot.
    pub fn storage_set(&mut self, slot: StorageSlot, value: U256) {
        if value.is_zero() {
            self.storage.remove(&slot);
        } else {
            self.storage.insert(slot, value);
        }
    }

    /// Add to a storage slot.
    pub fn storage_add(&mut self, slot: StorageSlot, amount: U256) {
        let current = self.storage_get(slot);
        self.storage_set(slot, current + amount);
    }

    /// Read a storage slot and zero it.
    pub fn storage_take(&mut self, slot: StorageSlot) -> U256 {
        self.storage.remove(&slot).unwrap_or(U256::ZERO)
    }

    // ---- token operations (context-preserving API) ---------------------

    /// Move an asset on behalf of `from`.
    pub fn transfer_asset(
        &mut self,
        asset: Asset,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), CallError> {
        self.ledger.transfer_asset(asset, from, to, amount)
    }

    /// Spend an allowance to move tokens, as `spender`.
    pub fn transfer_from(
        &mut self,
        token: Address,
        spender: Address,
        owner: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), CallError> {
        self.ledger.transfer_from(token, spender, owner, to, amount)
    }

    /// Burn tokens from `from` (venue receipt accounting).
    pub fn burn(&mut self, token: Address, from: Address, amount: U256) -> Result<(), CallError> {
        self.ledger.burn(token, from, amount)
    }

    /// Set an allowance on behalf of `owner`.
    pub fn approve(
        &mut self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<(), CallError> {
        self.ledger.approve(token, owner, spender, amount)
    }

    /// Grant `spender` an unlimited allowance from `owner` once.
    ///
    /// Checked before granting: a nonzero prior allowance is left untouched,
    /// since some tokens require resetting to zero before re-approving.
    /// Returns whether an approval was written.
    pub fn ensure_max_allowance(
        &mut self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<bool, CallError> {
        if !self.ledger.allowance(token, owner, spender).is_zero() {
            return Ok(false);
        }
        self.ledger.approve(token, owner, spender, U256::MAX)?;
        Ok(true)
    }

    // ---- trigger operations --------------------------------------------

    /// Run a trigger's toggle method.
    ///
    /// Short-circuits once triggered; the first condition match sets the
    /// flag and emits the activation event exactly once.
    pub fn check_and_toggle_trigger(&mut self, address: Address) -> Result<bool, CallError> {
        let trigger = self
            .triggers
            .get_mut(&address)
            .ok_or(CallError::UnknownAccount(address))?;
        let env = ConditionEnv {
            prices: &self.prices,
        };
        let outcome = trigger.check_and_toggle(&env);
        if outcome == ToggleOutcome::JustTriggered {
            info!(trigger = %address, "trigger activated");
            self.events.emit(Event::TriggerActivated { trigger: address });
        }
        Ok(outcome.as_bool())
    }

    // ---- market operations ---------------------------------------------

    /// What a market lends.
    pub fn market_underlying(&self, market: Address) -> Result<Underlying, CallError> {
        self.markets
            .get(&market)
            .map(|m| m.underlying())
            .ok_or(CallError::UnknownAccount(market))
    }

    /// Let a gated market observe its trigger; first observed fire sets the
    /// market's own one-way flag and forgives all debt.
    fn sync_market_trigger(&mut self, market: Address) -> Result<(), CallError> {
        let (trigger_addr, already_triggered) = {
            let state = self
                .markets
                .get(&market)
                .ok_or(CallError::UnknownAccount(market))?;
            (state.trigger(), state.is_triggered())
        };
        let Some(trigger_addr) = trigger_addr else {
            return Ok(());
        };
        if already_triggered {
            return Ok(());
        }

        let toggled = self.check_and_toggle_trigger(trigger_addr)?;
        let forgiven = self
            .markets
            .get_mut(&market)
            .and_then(|m| m.observe_trigger(toggled));
        if let Some(debt_forgiven) = forgiven {
            info!(
                market = %market,
                trigger = %trigger_addr,
                debt_forgiven = %debt_forgiven,
                "market observed trigger fire; outstanding debt forgiven"
            );
            self.emit(Event::MarketTriggered {
                market,
                trigger: trigger_addr,
                debt_forgiven,
            });
        }
        Ok(())
    }

    /// Current debt of `account` on `market`, after trigger observation.
    pub fn borrow_balance_current(
        &mut self,
        market: Address,
        account: Address,
    ) -> Result<U256, CallError> {
        self.sync_market_trigger(market)?;
        self.markets
            .get(&market)
            .map(|m| m.borrow_balance(account))
            .ok_or(CallError::UnknownAccount(market))
    }

    /// Borrow from a market on behalf of `borrower`.
    ///
    /// Policy failures come back as a nonzero [`ErrorCode`]; only transport
    /// problems revert.
    pub fn market_borrow(
        &mut self,
        market: Address,
        borrower: Address,
        amount: U256,
    ) -> Result<ErrorCode, CallError> {
        self.sync_market_trigger(market)?;
        let (underlying, code) = {
            let state = self
                .markets
                .get(&market)
                .ok_or(CallError::UnknownAccount(market))?;
            let cash = self.ledger.balance_of(state.underlying().asset(), market);
            (state.underlying(), state.can_borrow(cash, amount))
        };
        if !code.is_ok() {
            warn!(market = %market, borrower = %borrower, amount = %amount, code = %code, "borrow rejected");
            return Ok(code);
        }

        self.ledger
            .transfer_asset(underlying.asset(), market, borrower, amount)?;
        if let Some(state) = self.markets.get_mut(&market) {
            state.record_borrow(borrower, amount);
        }
        debug!(market = %market, borrower = %borrower, amount = %amount, "borrow");
        self.emit(Event::Borrow {
            market,
            borrower,
            amount,
        });
        Ok(ErrorCode::NoError)
    }

    /// Repay a token-market borrow on `borrower`'s behalf, pulling funds
    /// from `payer`.
    ///
    /// `amount == REPAY_MAX` means the full current debt. The transfer-in
    /// reverts when the payer's balance or allowance cannot cover it; an
    /// explicit amount above the debt is the [`ErrorCode::RepayTooMuch`]
    /// soft failure.
    pub fn market_repay_behalf(
        &mut self,
        market: Address,
        payer: Address,
        borrower: Address,
        amount: U256,
    ) -> Result<ErrorCode, CallError> {
        self.sync_market_trigger(market)?;
        let (token, debt) = {
            let state = self
                .markets
                .get(&market)
                .ok_or(CallError::UnknownAccount(market))?;
            let Underlying::Token(token) = state.underlying() else {
                return Err(CallError::revert("market does not lend a token"));
            };
            (token, state.borrow_balance(borrower))
        };

        let repay_amount = if amount == REPAY_MAX { debt } else { amount };
        if repay_amount > debt {
            return Ok(ErrorCode::RepayTooMuch);
        }
        if repay_amount.is_zero() {
            return Ok(ErrorCode::NoError);
        }

        // The market pulls the repayment from the payer.
        self.ledger
            .transfer_from(token, market, payer, market, repay_amount)?;
        if let Some(state) = self.markets.get_mut(&market) {
            state.record_repay(borrower, repay_amount);
        }
        debug!(market = %market, payer = %payer, borrower = %borrower, amount = %repay_amount, "repay");
        self.emit(Event::RepayBorrow {
            market,
            payer,
            borrower,
            amount: repay_amount,
        });
        Ok(ErrorCode::NoError)
    }

    /// Repay a native-market borrow with value already forwarded to the
    /// market. Reverts when the value exceeds the debt; the router exists
    /// for overpay-and-refund flows.
    fn market_repay_native(
        &mut self,
        market: Address,
        payer: Address,
        borrower: Address,
        value: U256,
    ) -> Result<(), CallError> {
        self.sync_market_trigger(market)?;
        let debt = {
            let state = self
                .markets
                .get(&market)
                .ok_or(CallError::UnknownAccount(market))?;
            if state.underlying() != Underlying::Native {
                return Err(CallError::revert("market does not lend native currency"));
            }
            state.borrow_balance(borrower)
        };
        if value > debt {
            return Err(CallError::revert("repay exceeds outstanding debt"));
        }
        if let Some(state) = self.markets.get_mut(&market) {
            state.record_repay(borrower, value);
        }
        self.emit(Event::RepayBorrow {
            market,
            payer,
            borrower,
            amount: value,
        });
        Ok(())
    }

    /// Router semantics: repay as much of `borrower`'s native debt as
    /// `value` covers, refund the excess to `payer`. Returns the repaid
    /// amount.
    fn repay_behalf_explicit(
        &mut self,
        router: Address,
        payer: Address,
        borrower: Address,
        market: Address,
        value: U256,
    ) -> Result<U256, CallError> {
        let debt = self.borrow_balance_current(market, borrower)?;
        if self.market_underlying(market)? != Underlying::Native {
            return Err(CallError::revert("market does not lend native currency"));
        }
        let (repay, refund) = split_repayment(value, debt);
        if !repay.is_zero() {
            self.ledger.transfer_native(router, market, repay)?;
            if let Some(state) = self.markets.get_mut(&market) {
                state.record_repay(borrower, repay);
            }
            self.emit(Event::RepayBorrow {
                market,
                payer,
                borrower,
                amount: repay,
            });
        }
        if !refund.is_zero() {
            self.ledger.transfer_native(router, payer, refund)?;
        }
        debug!(router = %router, market = %market, repay = %repay, refund = %refund, "explicit repay");
        Ok(repay)
    }

    // ---- dispatch ------------------------------------------------------

    /// Execute a call against whatever lives at `target`.
    ///
    /// The call is atomic: on any error the world is restored to its state
    /// before the call, including forwarded value and emitted events.
    pub fn call(
        &mut self,
        caller: Address,
        target: Address,
        data: &[u8],
        value: U256,
    ) -> Result<Bytes, CallError> {
        let snapshot = self.clone();
        let result = self.call_inner(caller, target, data, value);
        if result.is_err() {
            *self = snapshot;
        }
        result
    }

    fn call_inner(
        &mut self,
        caller: Address,
        target: Address,
        data: &[u8],
        value: U256,
    ) -> Result<Bytes, CallError> {
        if !value.is_zero() {
            self.ledger.transfer_native(caller, target, value)?;
        }
        if self.ledger.has_token(target) {
            return self.dispatch_token(caller, target, data);
        }
        if self.markets.contains_key(&target) {
            return self.dispatch_market(caller, target, data, value);
        }
        if self.triggers.contains_key(&target) {
            return self.dispatch_trigger(target, data);
        }
        if self.routers.contains(&target) {
            return self.dispatch_router(caller, target, data, value);
        }
        if let Some(logic) = self.logic.get(&target).cloned() {
            return logic.execute(self, CallContext { caller, this: target }, data);
        }
        Err(CallError::UnknownAccount(target))
    }

    fn dispatch_token(
        &mut self,
        caller: Address,
        token: Address,
        data: &[u8],
    ) -> Result<Bytes, CallError> {
        let mut reader = CalldataReader::parse(data)?;
        let s = reader.selector();
        if s == *sel::TRANSFER {
            let to = reader.address()?;
            let amount = reader.uint()?;
            self.ledger.transfer(token, caller, to, amount)?;
            Ok(encode_bool(true))
        } else if s == *sel::TRANSFER_FROM {
            let from = reader.address()?;
            let to = reader.address()?;
            let amount = reader.uint()?;
            self.ledger.transfer_from(token, caller, from, to, amount)?;
            Ok(encode_bool(true))
        } else if s == *sel::APPROVE {
            let spender = reader.address()?;
            let amount = reader.uint()?;
            self.ledger.approve(token, caller, spender, amount)?;
            Ok(encode_bool(true))
        } else if s == *sel::BALANCE_OF {
            let account = reader.address()?;
            Ok(encode_uint(self.ledger.balance_of(Asset::Token(token), account)))
        } else if s == *sel::ALLOWANCE {
            let owner = reader.address()?;
            let spender = reader.address()?;
            Ok(encode_uint(self.ledger.allowance(token, owner, spender)))
        } else {
            Err(CallError::UnknownSelector(s))
        }
    }

    fn dispatch_market(
        &mut self,
        caller: Address,
        market: Address,
        data: &[u8],
        value: U256,
    ) -> Result<Bytes, CallError> {
        let mut reader = CalldataReader::parse(data)?;
        let s = reader.selector();
        if s == *sel::BORROW {
            let amount = reader.uint()?;
            let code = self.market_borrow(market, caller, amount)?;
            Ok(encode_uint(U256::from(code.code())))
        } else if s == *sel::REPAY_BORROW_BEHALF {
            let borrower = reader.address()?;
            let amount = reader.uint()?;
            let code = self.market_repay_behalf(market, caller, borrower, amount)?;
            Ok(encode_uint(U256::from(code.code())))
        } else if s == *sel::REPAY_BORROW_BEHALF_NATIVE {
            let borrower = reader.address()?;
            self.market_repay_native(market, caller, borrower, value)?;
            Ok(Bytes::new())
        } else if s == *sel::BORROW_BALANCE_CURRENT {
            let account = reader.address()?;
            let balance = self.borrow_balance_current(market, account)?;
            Ok(encode_uint(balance))
        } else if s == *sel::UNDERLYING {
            let word = match self.market_underlying(market)? {
                Underlying::Native => U256::ZERO,
                Underlying::Token(token) => U256::from_be_slice(token.as_slice()),
            };
            Ok(encode_uint(word))
        } else {
            Err(CallError::UnknownSelector(s))
        }
    }

    fn dispatch_trigger(&mut self, trigger: Address, data: &[u8]) -> Result<Bytes, CallError> {
        let reader = CalldataReader::parse(data)?;
        let s = reader.selector();
        if s == *sel::CHECK_AND_TOGGLE_TRIGGER {
            let toggled = self.check_and_toggle_trigger(trigger)?;
            Ok(encode_bool(toggled))
        } else if s == *sel::GET_PLATFORM_IDS {
            let state = self
                .triggers
                .get(&trigger)
                .ok_or(CallError::UnknownAccount(trigger))?;
            let words: Vec<U256> = state
                .platform_ids()
                .iter()
                .map(|id| U256::from(*id))
                .collect();
            Ok(encode_words(&words))
        } else if s == *sel::IS_TRIGGERED {
            let state = self
                .triggers
                .get(&trigger)
                .ok_or(CallError::UnknownAccount(trigger))?;
            Ok(encode_bool(state.is_triggered()))
        } else {
            Err(CallError::UnknownSelector(s))
        }
    }

    fn dispatch_router(
        &mut self,
        caller: Address,
        router: Address,
        data: &[u8],
        value: U256,
    ) -> Result<Bytes, CallError> {
        let mut reader = CalldataReader::parse(data)?;
        let s = reader.selector();
        if s == *sel::REPAY_BEHALF_EXPLICIT {
            let borrower = reader.address()?;
            let market = reader.address()?;
            let repaid = self.repay_behalf_explicit(router, caller, borrower, market, value)?;
            Ok(encode_uint(repaid))
        } else {
            Err(CallError::UnknownSelector(s))
        }
    }
}

/// Wire selectors for the builtin account kinds.
pub mod sel {
    use std::sync::LazyLock;

    use crate::abi::selector;

    pub static TRANSFER: LazyLock<[u8; 4]> = LazyLock::new(|| selector("transfer(address,uint256)"));
    pub static TRANSFER_FROM: LazyLock<[u8; 4]> =
        LazyLock::new(|| selector("transferFrom(address,address,uint256)"));
    pub static APPROVE: LazyLock<[u8; 4]> = LazyLock::new(|| selector("approve(address,uint256)"));
    pub static BALANCE_OF: LazyLock<[u8; 4]> = LazyLock::new(|| selector("balanceOf(address)"));
    pub static ALLOWANCE: LazyLock<[u8; 4]> =
        LazyLock::new(|| selector("allowance(address,address)"));

    pub static BORROW: LazyLock<[u8; 4]> = LazyLock::new(|| selector("borrow(uint256)"));
    pub static REPAY_BORROW_BEHALF: LazyLock<[u8; 4]> =
        LazyLock::new(|| selector("repayBorrowBehalf(address,uint256)"));
    pub static REPAY_BORROW_BEHALF_NATIVE: LazyLock<[u8; 4]> =
        LazyLock::new(|| selector("repayBorrowBehalf(address)"));
    pub static BORROW_BALANCE_CURRENT: LazyLock<[u8; 4]> =
        LazyLock::new(|| selector("borrowBalanceCurrent(address)"));
    pub static UNDERLYING: LazyLock<[u8; 4]> = LazyLock::new(|| selector("underlying()"));

    pub static CHECK_AND_TOGGLE_TRIGGER: LazyLock<[u8; 4]> =
        LazyLock::new(|| selector("checkAndToggleTrigger()"));
    pub static GET_PLATFORM_IDS: LazyLock<[u8; 4]> =
        LazyLock::new(|| selector("getPlatformIds()"));
    pub static IS_TRIGGERED: LazyLock<[u8; 4]> = LazyLock::new(|| selector("isTriggered()"));

    pub static REPAY_BEHALF_EXPLICIT: LazyLock<[u8; 4]> =
        LazyLock::new(|| selector("repayBehalfExplicit(address,address)"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{self, CalldataBuilder};
    use bulwark_core::{ManualCondition, TriggerMetadata};
    use smallvec::smallvec;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn trigger_meta(platform_ids: smallvec::SmallVec<[u16; 4]>) -> TriggerMetadata {
        TriggerMetadata {
            name: "Venue Failure".to_string(),
            symbol: "VF".to_string(),
            description: "Fires when the protected venue fails".to_string(),
            platform_ids,
            recipient: addr(0x77),
        }
    }

    /// World with a token, a money market and a gated protection market.
    fn fixture() -> (World, Arc<ManualCondition>) {
        let mut world = World::new();
        let token = addr(0x01);
        world.create_token(token, "USDQ", 6);

        let condition = ManualCondition::new();
        world.install_trigger(
            addr(0x30),
            Trigger::new(trigger_meta(smallvec![3]), condition.clone()),
        );

        world.install_market(addr(0x20), Market::money(Underlying::Token(token)));
        world.install_market(
            addr(0x21),
            Market::protection(Underlying::Token(token), addr(0x30)),
        );
        world.mint(token, addr(0x20), U256::from(1_000_000)).unwrap();
        world.mint(token, addr(0x21), U256::from(1_000_000)).unwrap();
        (world, condition)
    }

    #[test]
    fn test_token_dispatch_via_wire() {
        let (mut world, _) = fixture();
        let token = addr(0x01);
        world.mint(token, addr(0xaa), U256::from(100)).unwrap();

        let data = CalldataBuilder::new("transfer(address,uint256)")
            .address(addr(0xbb))
            .uint(U256::from(40))
            .build();
        world.call(addr(0xaa), token, &data, U256::ZERO).unwrap();

        let query = CalldataBuilder::new("balanceOf(address)")
            .address(addr(0xbb))
            .build();
        let out = world.call(addr(0xcc), token, &query, U256::ZERO).unwrap();
        assert_eq!(abi::decode_uint(&out).unwrap(), U256::from(40));
    }

    #[test]
    fn test_borrow_via_wire_and_insufficient_cash_code() {
        let (mut world, _) = fixture();
        let token = addr(0x01);
        let market = addr(0x20);

        let data = CalldataBuilder::new("borrow(uint256)")
            .uint(U256::from(500))
            .build();
        let out = world.call(addr(0xaa), market, &data, U256::ZERO).unwrap();
        assert_eq!(abi::decode_uint(&out).unwrap(), U256::ZERO);
        assert_eq!(
            world.balance_of(Asset::Token(token), addr(0xaa)),
            U256::from(500)
        );
        assert_eq!(
            world.borrow_balance_current(market, addr(0xaa)).unwrap(),
            U256::from(500)
        );

        // Borrow beyond cash comes back as a soft-failure code, not a revert.
        let big = CalldataBuilder::new("borrow(uint256)")
            .uint(U256::from(10_000_000))
            .build();
        let out = world.call(addr(0xaa), market, &big, U256::ZERO).unwrap();
        assert_eq!(
            abi::decode_uint(&out).unwrap(),
            U256::from(ErrorCode::InsufficientCash.code())
        );
    }

    #[test]
    fn test_trigger_toggle_scenario_over_the_wire() {
        // Deploy a trigger with platformIds = [3], confirm untriggered,
        // arm the manual condition, expect one toggle and one event.
        let (mut world, condition) = fixture();
        let trigger = addr(0x30);

        let ids = world
            .call(
                addr(0xaa),
                trigger,
                &CalldataBuilder::new("getPlatformIds()").build(),
                U256::ZERO,
            )
            .unwrap();
        assert_eq!(abi::decode_uint(&ids).unwrap(), U256::from(3));

        let toggle = CalldataBuilder::new("checkAndToggleTrigger()").build();
        let out = world.call(addr(0xaa), trigger, &toggle, U256::ZERO).unwrap();
        assert!(!abi::decode_bool(&out).unwrap());

        condition.arm();
        let out = world.call(addr(0xaa), trigger, &toggle, U256::ZERO).unwrap();
        assert!(abi::decode_bool(&out).unwrap());

        // Redundant calls keep returning true without new events.
        for _ in 0..3 {
            let out = world.call(addr(0xbb), trigger, &toggle, U256::ZERO).unwrap();
            assert!(abi::decode_bool(&out).unwrap());
        }
        assert_eq!(
            world
                .events()
                .count_where(|e| matches!(e, Event::TriggerActivated { .. })),
            1
        );
    }

    #[test]
    fn test_market_observes_trigger_and_forgives_debt_once() {
        let (mut world, condition) = fixture();
        let market = addr(0x21);

        world.market_borrow(market, addr(0xaa), U256::from(700)).unwrap();
        assert_eq!(
            world.borrow_balance_current(market, addr(0xaa)).unwrap(),
            U256::from(700)
        );

        condition.arm();
        // Any market operation makes the market observe the toggle.
        assert_eq!(
            world.borrow_balance_current(market, addr(0xaa)).unwrap(),
            U256::ZERO
        );
        assert!(world.market(market).unwrap().is_triggered());
        assert_eq!(
            world
                .events()
                .count_where(|e| matches!(e, Event::MarketTriggered { .. })),
            1
        );

        // Borrowing is rejected after the fire; the flag is set only once.
        let code = world.market_borrow(market, addr(0xaa), U256::from(1)).unwrap();
        assert_eq!(code, ErrorCode::MarketTriggered);
        assert_eq!(
            world
                .events()
                .count_where(|e| matches!(e, Event::MarketTriggered { .. })),
            1
        );
    }

    #[test]
    fn test_repay_max_resolves_current_debt() {
        let (mut world, _) = fixture();
        let token = addr(0x01);
        let market = addr(0x20);

        world.market_borrow(market, addr(0xaa), U256::from(500)).unwrap();
        world
            .approve(token, addr(0xaa), market, U256::MAX)
            .unwrap();

        let code = world
            .market_repay_behalf(market, addr(0xaa), addr(0xaa), REPAY_MAX)
            .unwrap();
        assert!(code.is_ok());
        assert_eq!(
            world.borrow_balance_current(market, addr(0xaa)).unwrap(),
            U256::ZERO
        );
    }

    #[test]
    fn test_repay_max_reverts_when_balance_cannot_cover_debt() {
        let (mut world, _) = fixture();
        let token = addr(0x01);
        let market = addr(0x20);

        world.market_borrow(market, addr(0xaa), U256::from(500)).unwrap();
        world.approve(token, addr(0xaa), market, U256::MAX).unwrap();
        // Interest accrues after encoding; the payer now holds less than the debt.
        world.accrue_interest(market, 500).unwrap();

        let err = world
            .market_repay_behalf(market, addr(0xaa), addr(0xaa), REPAY_MAX)
            .unwrap_err();
        assert_eq!(err.reason(), "transfer amount exceeds balance");
    }

    #[test]
    fn test_router_repays_and_refunds_excess() {
        let mut world = World::new();
        let market = addr(0x22);
        let router = addr(0x40);
        world.install_market(market, Market::money(Underlying::Native));
        world.install_router(router);
        world.mint_native(market, U256::from(10_000));
        world.mint_native(addr(0xaa), U256::from(5_000));

        world.market_borrow(market, addr(0xaa), U256::from(600)).unwrap();

        // Overpay: 1000 against a 600 debt.
        let data = CalldataBuilder::new("repayBehalfExplicit(address,address)")
            .address(addr(0xaa))
            .address(market)
            .build();
        let out = world
            .call(addr(0xaa), router, &data, U256::from(1_000))
            .unwrap();
        assert_eq!(abi::decode_uint(&out).unwrap(), U256::from(600));

        assert_eq!(
            world.borrow_balance_current(market, addr(0xaa)).unwrap(),
            U256::ZERO
        );
        // Started at 5000, borrowed +600, paid 1000, refunded 400.
        assert_eq!(
            world.balance_of(Asset::Native, addr(0xaa)),
            U256::from(5_000)
        );
        assert_eq!(world.balance_of(Asset::Native, router), U256::ZERO);
    }

    #[test]
    fn test_native_repay_exceeding_debt_reverts_atomically() {
        let mut world = World::new();
        let market = addr(0x22);
        world.install_market(market, Market::money(Underlying::Native));
        world.mint_native(market, U256::from(10_000));
        world.mint_native(addr(0xaa), U256::from(5_000));
        world.market_borrow(market, addr(0xaa), U256::from(600)).unwrap();

        let data = CalldataBuilder::new("repayBorrowBehalf(address)")
            .address(addr(0xaa))
            .build();
        let err = world
            .call(addr(0xaa), market, &data, U256::from(1_000))
            .unwrap_err();
        assert_eq!(err.reason(), "repay exceeds outstanding debt");

        // The forwarded value was rolled back with the call.
        assert_eq!(
            world.balance_of(Asset::Native, addr(0xaa)),
            U256::from(5_600)
        );
        assert_eq!(
            world.borrow_balance_current(market, addr(0xaa)).unwrap(),
            U256::from(600)
        );
    }

    #[test]
    fn test_failed_call_leaves_no_events_behind() {
        let (mut world, _) = fixture();
        let market = addr(0x20);

        // Unknown selector on a real account reverts the whole call.
        let bogus = CalldataBuilder::new("selfDestructAll()").build();
        let err = world.call(addr(0xaa), market, &bogus, U256::ZERO).unwrap_err();
        assert!(matches!(err, CallError::UnknownSelector(_)));
        assert!(world.events().is_empty());
    }

    #[test]
    fn test_price_floor_trigger_fires_from_posted_prices() {
        let mut world = World::new();
        let feed = addr(0x0f);
        let trigger = addr(0x31);
        world.install_trigger(
            trigger,
            Trigger::new(
                trigger_meta(smallvec![3, 7]),
                std::sync::Arc::new(bulwark_core::PriceFloorCondition {
                    feed,
                    floor: U256::from(95),
                }),
            ),
        );

        world.set_price(feed, U256::from(100));
        assert!(!world.check_and_toggle_trigger(trigger).unwrap());

        world.set_price(feed, U256::from(90));
        assert!(world.check_and_toggle_trigger(trigger).unwrap());

        // A price recovery cannot un-trigger.
        world.set_price(feed, U256::from(120));
        assert!(world.check_and_toggle_trigger(trigger).unwrap());
        assert!(world.trigger(trigger).unwrap().is_triggered());
        assert_eq!(
            world
                .events()
                .count_where(|e| matches!(e, Event::TriggerActivated { .. })),
            1
        );
    }

    #[test]
    fn test_ensure_max_allowance_never_reapproves() {
        let (mut world, _) = fixture();
        let token = addr(0x01);

        assert!(world.ensure_max_allowance(token, addr(0xaa), addr(0xbb)).unwrap());
        assert_eq!(world.allowance(token, addr(0xaa), addr(0xbb)), U256::MAX);
        // Second call is a no-op on the existing nonzero allowance.
        assert!(!world.ensure_max_allowance(token, addr(0xaa), addr(0xbb)).unwrap());

        // A finite nonzero allowance is also left untouched.
        world.approve(token, addr(0xcc), addr(0xbb), U256::from(5)).unwrap();
        assert!(!world.ensure_max_allowance(token, addr(0xcc), addr(0xbb)).unwrap());
        assert_eq!(world.allowance(token, addr(0xcc), addr(0xbb)), U256::from(5));
    }
}
