//! Invest/divest adapter.
//!
//! A narrow, stateless strategy contract: borrow from one of exactly two
//! whitelisted markets, deploy the proceeds into the pool, stake the LP
//! into the gauge, and unwind symmetrically, repaying as much debt as the
//! freed funds allow and refunding the rest. The adapter keeps no position
//! book: the staked position is whatever gauge receipt balance the calling
//! proxy holds.
//!
//! Like every registered contract, the adapter runs with the calling
//! proxy's identity: funds, debt, allowances and receipts all accrue to the
//! proxy, never to the adapter.

use alloy::primitives::{Address, Bytes, U256};
use tracing::info;

use bulwark_chain::abi::{decode_uint, encode_uint, CalldataBuilder, CalldataReader};
use bulwark_chain::{CallContext, ContractLogic, World};
use bulwark_core::{Asset, CallError, Event, Underlying};

use crate::sel;

/// Borrow-and-deploy adapter over one pool/gauge venue.
#[derive(Debug, Clone)]
pub struct InvestAdapter {
    address: Address,
    money_market: Address,
    protection_market: Address,
    underlying: Address,
    pool: Address,
    lp_token: Address,
    gauge: Address,
}

impl InvestAdapter {
    /// Bind an adapter to its two markets and venue contracts.
    ///
    /// Exactly these two markets are ever eligible for borrowing, and both
    /// must lend the same token.
    pub fn bind(
        world: &World,
        address: Address,
        money_market: Address,
        protection_market: Address,
        pool: Address,
        lp_token: Address,
        gauge: Address,
    ) -> Result<Self, CallError> {
        let money_underlying = world.market_underlying(money_market)?;
        let protection_underlying = world.market_underlying(protection_market)?;
        if money_underlying != protection_underlying {
            return Err(CallError::revert("markets lend different underlyings"));
        }
        let Underlying::Token(underlying) = money_underlying else {
            return Err(CallError::revert("markets must lend a token"));
        };
        Ok(Self {
            address,
            money_market,
            protection_market,
            underlying,
            pool,
            lp_token,
            gauge,
        })
    }

    /// Adapter address.
    pub fn address(&self) -> Address {
        self.address
    }

    fn check_market(&self, market: Address) -> Result<(), CallError> {
        if market != self.money_market && market != self.protection_market {
            return Err(CallError::revert("invalid borrow market"));
        }
        Ok(())
    }

    /// Borrow from `market` and deploy into the venue on `caller`'s behalf.
    /// Returns the LP amount staked.
    pub fn invest(
        &self,
        world: &mut World,
        caller: Address,
        market: Address,
        borrow_amount: U256,
        min_amount_out: U256,
    ) -> Result<U256, CallError> {
        self.check_market(market)?;

        let borrow = CalldataBuilder::new("borrow(uint256)")
            .uint(borrow_amount)
            .build();
        let out = world.call(caller, market, &borrow, U256::ZERO)?;
        if !decode_uint(&out)?.is_zero() {
            return Err(CallError::revert("borrow failed"));
        }

        // One-time unlimited approval; a nonzero prior allowance is never
        // re-approved.
        world.ensure_max_allowance(self.underlying, caller, self.pool)?;
        let deposit = CalldataBuilder::new("deposit(uint256,uint256)")
            .uint(borrow_amount)
            .uint(min_amount_out)
            .build();
        let out = world.call(caller, self.pool, &deposit, U256::ZERO)?;
        let lp_out = decode_uint(&out)?;

        world.ensure_max_allowance(self.lp_token, caller, self.gauge)?;
        let stake = CalldataBuilder::new("stake(uint256)").uint(lp_out).build();
        world.call(caller, self.gauge, &stake, U256::ZERO)?;

        info!(
            adapter = %self.address,
            market = %market,
            borrowed = %borrow_amount,
            staked = %lp_out,
            "invested"
        );
        world.emit(Event::Invested {
            adapter: self.address,
            market,
            borrowed: borrow_amount,
            staked: lp_out,
        });
        Ok(lp_out)
    }

    /// Unwind `redeem_amount` of the staked position: unstake, withdraw,
    /// repay as much of `caller`'s debt on `market` as the freed funds
    /// allow, sweep the rest to `recipient`, then forward pending rewards.
    /// Returns the freed underlying amount.
    pub fn divest(
        &self,
        world: &mut World,
        caller: Address,
        market: Address,
        recipient: Address,
        redeem_amount: U256,
        min_amount_out: U256,
    ) -> Result<U256, CallError> {
        self.check_market(market)?;

        let unstake = CalldataBuilder::new("unstake(uint256)")
            .uint(redeem_amount)
            .build();
        world.call(caller, self.gauge, &unstake, U256::ZERO)?;

        let withdraw = CalldataBuilder::new("withdraw(uint256,uint256)")
            .uint(redeem_amount)
            .uint(min_amount_out)
            .build();
        let out = world.call(caller, self.pool, &withdraw, U256::ZERO)?;
        let freed = decode_uint(&out)?;

        // Best-effort repay: as much as the balance covers, never more than
        // the debt. A nonzero code from the explicit-amount repay is fatal.
        let debt = world.borrow_balance_current(market, caller)?;
        let mut repaid = U256::ZERO;
        if !debt.is_zero() {
            world.ensure_max_allowance(self.underlying, caller, market)?;
            let balance = world.balance_of(Asset::Token(self.underlying), caller);
            let amount = balance.min(debt);
            if !amount.is_zero() {
                let repay = CalldataBuilder::new("repayBorrowBehalf(address,uint256)")
                    .address(caller)
                    .uint(amount)
                    .build();
                let out = world.call(caller, market, &repay, U256::ZERO)?;
                let code = decode_uint(&out)?;
                if !code.is_zero() {
                    return Err(CallError::Revert(format!(
                        "repay failed: error code {code}"
                    )));
                }
                repaid = amount;
            }
        }

        // Whatever was not needed for the repay goes to the recipient.
        let refunded = world.balance_of(Asset::Token(self.underlying), caller);
        if !refunded.is_zero() {
            world.transfer_asset(Asset::Token(self.underlying), caller, recipient, refunded)?;
        }

        let claim = CalldataBuilder::new("claim(address)")
            .address(recipient)
            .build();
        world.call(caller, self.gauge, &claim, U256::ZERO)?;

        info!(
            adapter = %self.address,
            market = %market,
            redeemed = %freed,
            repaid = %repaid,
            refunded = %refunded,
            "divested"
        );
        world.emit(Event::Divested {
            adapter: self.address,
            market,
            redeemed: freed,
            repaid,
            refunded,
        });
        Ok(freed)
    }

    /// Forward `caller`'s pending gauge rewards to `recipient`.
    pub fn claim_rewards(
        &self,
        world: &mut World,
        caller: Address,
        recipient: Address,
    ) -> Result<U256, CallError> {
        let claim = CalldataBuilder::new("claim(address)")
            .address(recipient)
            .build();
        let out = world.call(caller, self.gauge, &claim, U256::ZERO)?;
        decode_uint(&out)
    }
}

impl ContractLogic for InvestAdapter {
    fn execute(
        &self,
        world: &mut World,
        ctx: CallContext,
        data: &[u8],
    ) -> Result<Bytes, CallError> {
        let mut reader = CalldataReader::parse(data)?;
        let s = reader.selector();
        if s == *sel::INVEST {
            let market = reader.address()?;
            let borrow_amount = reader.uint()?;
            let min_amount_out = reader.uint()?;
            self.invest(world, ctx.caller, market, borrow_amount, min_amount_out)
                .map(encode_uint)
        } else if s == *sel::DIVEST {
            let market = reader.address()?;
            let recipient = reader.address()?;
            let redeem_amount = reader.uint()?;
            let min_amount_out = reader.uint()?;
            self.divest(
                world,
                ctx.caller,
                market,
                recipient,
                redeem_amount,
                min_amount_out,
            )
            .map(encode_uint)
        } else if s == *sel::CLAIM_REWARDS {
            let recipient = reader.address()?;
            self.claim_rewards(world, ctx.caller, recipient).map(encode_uint)
        } else {
            Err(CallError::UnknownSelector(s))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gauge::RewardGauge;
    use crate::pool::LiquidityPool;
    use bulwark_core::{ManualCondition, Market, Trigger, TriggerMetadata};
    use smallvec::smallvec;
    use std::sync::Arc;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    const UNDERLYING: u8 = 0x01;
    const LP: u8 = 0x02;
    const RECEIPT: u8 = 0x03;
    const REWARD: u8 = 0x04;
    const MONEY: u8 = 0x20;
    const PROTECTION: u8 = 0x21;
    const TRIGGER: u8 = 0x30;
    const POOL: u8 = 0x41;
    const GAUGE: u8 = 0x42;
    const ADAPTER: u8 = 0x51;
    const PROXY: u8 = 0x60;
    const RECIPIENT: u8 = 0x61;

    struct Fixture {
        world: World,
        adapter: InvestAdapter,
        gauge: RewardGauge,
        condition: Arc<ManualCondition>,
    }

    fn fixture() -> Fixture {
        let mut world = World::new();
        for (token, symbol, decimals) in [
            (UNDERLYING, "USDQ", 6u8),
            (LP, "QLP", 18),
            (RECEIPT, "stQLP", 18),
            (REWARD, "VNE", 18),
        ] {
            world.create_token(addr(token), symbol, decimals);
        }

        let condition = ManualCondition::new();
        world.install_trigger(
            addr(TRIGGER),
            Trigger::new(
                TriggerMetadata {
                    name: "Venue Failure".to_string(),
                    symbol: "VF".to_string(),
                    description: "Fires when the protected venue fails".to_string(),
                    platform_ids: smallvec![3],
                    recipient: addr(0x77),
                },
                condition.clone(),
            ),
        );

        world.install_market(
            addr(MONEY),
            Market::money(Underlying::Token(addr(UNDERLYING))),
        );
        world.install_market(
            addr(PROTECTION),
            Market::protection(Underlying::Token(addr(UNDERLYING)), addr(TRIGGER)),
        );
        world
            .mint(addr(UNDERLYING), addr(MONEY), U256::from(1_000_000))
            .unwrap();
        world
            .mint(addr(UNDERLYING), addr(PROTECTION), U256::from(1_000_000))
            .unwrap();

        let pool = LiquidityPool::new(addr(POOL), addr(UNDERLYING), addr(LP), 10_000, 0).unwrap();
        let gauge = RewardGauge::new(addr(GAUGE), addr(LP), addr(RECEIPT), addr(REWARD));
        world.mint(addr(REWARD), addr(GAUGE), U256::from(1_000_000)).unwrap();

        let adapter = InvestAdapter::bind(
            &world,
            addr(ADAPTER),
            addr(MONEY),
            addr(PROTECTION),
            addr(POOL),
            addr(LP),
            addr(GAUGE),
        )
        .unwrap();

        world.install_logic(addr(POOL), Arc::new(pool));
        world.install_logic(addr(GAUGE), Arc::new(gauge.clone()));
        world.install_logic(addr(ADAPTER), Arc::new(adapter.clone()));

        Fixture {
            world,
            adapter,
            gauge,
            condition,
        }
    }

    fn staked_balance(world: &World) -> U256 {
        world.balance_of(Asset::Token(addr(RECEIPT)), addr(PROXY))
    }

    #[test]
    fn test_invalid_market_rejected_for_any_amount() {
        let mut fx = fixture();
        for amount in [U256::ZERO, U256::from(1), U256::from(1_000_000)] {
            let err = fx
                .adapter
                .invest(&mut fx.world, addr(PROXY), addr(0xde), amount, U256::ZERO)
                .unwrap_err();
            assert_eq!(err.reason(), "invalid borrow market");

            let err = fx
                .adapter
                .divest(
                    &mut fx.world,
                    addr(PROXY),
                    addr(0xde),
                    addr(RECIPIENT),
                    amount,
                    U256::ZERO,
                )
                .unwrap_err();
            assert_eq!(err.reason(), "invalid borrow market");
        }
    }

    #[test]
    fn test_invest_borrows_deploys_and_stakes() {
        let mut fx = fixture();
        let staked = fx
            .adapter
            .invest(
                &mut fx.world,
                addr(PROXY),
                addr(PROTECTION),
                U256::from(1_000),
                U256::from(1_000),
            )
            .unwrap();

        assert_eq!(staked, U256::from(1_000));
        assert_eq!(staked_balance(&fx.world), U256::from(1_000));
        assert_eq!(
            fx.world
                .borrow_balance_current(addr(PROTECTION), addr(PROXY))
                .unwrap(),
            U256::from(1_000)
        );
        // No underlying sits idle with the proxy; it all went to the venue.
        assert_eq!(
            fx.world
                .balance_of(Asset::Token(addr(UNDERLYING)), addr(PROXY)),
            U256::ZERO
        );
    }

    #[test]
    fn test_invest_is_additive_across_calls() {
        let mut once = fixture();
        once.adapter
            .invest(
                &mut once.world,
                addr(PROXY),
                addr(MONEY),
                U256::from(900),
                U256::ZERO,
            )
            .unwrap();

        let mut twice = fixture();
        twice
            .adapter
            .invest(
                &mut twice.world,
                addr(PROXY),
                addr(MONEY),
                U256::from(400),
                U256::ZERO,
            )
            .unwrap();
        twice
            .adapter
            .invest(
                &mut twice.world,
                addr(PROXY),
                addr(MONEY),
                U256::from(500),
                U256::ZERO,
            )
            .unwrap();

        assert_eq!(staked_balance(&once.world), staked_balance(&twice.world));
    }

    #[test]
    fn test_invest_never_reapproves_a_nonzero_allowance() {
        let mut fx = fixture();
        fx.adapter
            .invest(&mut fx.world, addr(PROXY), addr(MONEY), U256::from(100), U256::ZERO)
            .unwrap();
        assert_eq!(
            fx.world.allowance(addr(UNDERLYING), addr(PROXY), addr(POOL)),
            U256::MAX
        );

        // A second invest leaves the unlimited allowance untouched.
        fx.adapter
            .invest(&mut fx.world, addr(PROXY), addr(MONEY), U256::from(100), U256::ZERO)
            .unwrap();
        assert_eq!(
            fx.world.allowance(addr(UNDERLYING), addr(PROXY), addr(POOL)),
            U256::MAX
        );
    }

    #[test]
    fn test_borrow_beyond_cash_surfaces_borrow_failed() {
        let mut fx = fixture();
        let err = fx
            .adapter
            .invest(
                &mut fx.world,
                addr(PROXY),
                addr(MONEY),
                U256::from(10_000_000),
                U256::ZERO,
            )
            .unwrap_err();
        assert_eq!(err.reason(), "borrow failed");
        // The failed borrow left no debt behind.
        assert_eq!(
            fx.world
                .borrow_balance_current(addr(MONEY), addr(PROXY))
                .unwrap(),
            U256::ZERO
        );
    }

    #[test]
    fn test_partial_divest_then_rest_clears_position() {
        let mut fx = fixture();
        fx.adapter
            .invest(
                &mut fx.world,
                addr(PROXY),
                addr(MONEY),
                U256::from(1_000),
                U256::ZERO,
            )
            .unwrap();
        fx.gauge
            .notify_reward(&mut fx.world, addr(PROXY), U256::from(50));

        // First divest: 40% of the position.
        fx.adapter
            .divest(
                &mut fx.world,
                addr(PROXY),
                addr(MONEY),
                addr(RECIPIENT),
                U256::from(400),
                U256::ZERO,
            )
            .unwrap();
        assert_eq!(staked_balance(&fx.world), U256::from(600));
        // Everything freed went into the repay; nothing to refund yet.
        assert_eq!(
            fx.world
                .borrow_balance_current(addr(MONEY), addr(PROXY))
                .unwrap(),
            U256::from(600)
        );
        // Rewards arrived exactly once.
        assert_eq!(
            fx.world
                .balance_of(Asset::Token(addr(REWARD)), addr(RECIPIENT)),
            U256::from(50)
        );

        // Second divest: the remainder.
        fx.adapter
            .divest(
                &mut fx.world,
                addr(PROXY),
                addr(MONEY),
                addr(RECIPIENT),
                U256::from(600),
                U256::ZERO,
            )
            .unwrap();
        assert_eq!(staked_balance(&fx.world), U256::ZERO);
        assert_eq!(
            fx.world
                .borrow_balance_current(addr(MONEY), addr(PROXY))
                .unwrap(),
            U256::ZERO
        );
        // No new rewards accrued, so no second payout.
        assert_eq!(
            fx.world
                .balance_of(Asset::Token(addr(REWARD)), addr(RECIPIENT)),
            U256::from(50)
        );
        assert_eq!(
            fx.world
                .events()
                .count_where(|e| matches!(e, Event::RewardsClaimed { .. })),
            1
        );
    }

    #[test]
    fn test_divest_after_trigger_refunds_everything() {
        let mut fx = fixture();
        fx.adapter
            .invest(
                &mut fx.world,
                addr(PROXY),
                addr(PROTECTION),
                U256::from(1_000),
                U256::ZERO,
            )
            .unwrap();

        // The protected condition occurs; the market forgives the debt.
        fx.condition.arm();
        fx.adapter
            .divest(
                &mut fx.world,
                addr(PROXY),
                addr(PROTECTION),
                addr(RECIPIENT),
                U256::from(1_000),
                U256::ZERO,
            )
            .unwrap();

        assert_eq!(staked_balance(&fx.world), U256::ZERO);
        // No debt remained, so the full unwind went to the recipient.
        assert_eq!(
            fx.world
                .balance_of(Asset::Token(addr(UNDERLYING)), addr(RECIPIENT)),
            U256::from(1_000)
        );
        assert_eq!(
            fx.world
                .events()
                .count_where(|e| matches!(e, Event::MarketTriggered { .. })),
            1
        );
    }

    #[test]
    fn test_invest_and_divest_over_the_wire() {
        let mut fx = fixture();

        let invest = CalldataBuilder::new("invest(address,uint256,uint256)")
            .address(addr(MONEY))
            .uint(U256::from(800))
            .uint(U256::from(800))
            .build();
        let out = fx
            .world
            .call(addr(PROXY), addr(ADAPTER), &invest, U256::ZERO)
            .unwrap();
        assert_eq!(decode_uint(&out).unwrap(), U256::from(800));
        assert_eq!(staked_balance(&fx.world), U256::from(800));

        let divest = CalldataBuilder::new("divest(address,address,uint256,uint256)")
            .address(addr(MONEY))
            .address(addr(RECIPIENT))
            .uint(U256::from(800))
            .uint(U256::ZERO)
            .build();
        fx.world
            .call(addr(PROXY), addr(ADAPTER), &divest, U256::ZERO)
            .unwrap();
        assert_eq!(staked_balance(&fx.world), U256::ZERO);
    }

    #[test]
    fn test_bind_rejects_mismatched_markets() {
        let mut world = World::new();
        world.create_token(addr(UNDERLYING), "USDQ", 6);
        world.create_token(addr(0x05), "OTHER", 18);
        world.install_market(
            addr(MONEY),
            Market::money(Underlying::Token(addr(UNDERLYING))),
        );
        world.install_market(
            addr(PROTECTION),
            Market::money(Underlying::Token(addr(0x05))),
        );

        let err = InvestAdapter::bind(
            &world,
            addr(ADAPTER),
            addr(MONEY),
            addr(PROTECTION),
            addr(POOL),
            addr(LP),
            addr(GAUGE),
        )
        .unwrap_err();
        assert_eq!(err.reason(), "markets lend different underlyings");
    }
}
