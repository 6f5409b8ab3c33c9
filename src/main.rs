//! Protection-market engine demo.
//!
//! Wires a full deployment from config (tokens, a trigger-gated protection
//! market beside a base money market, a liquidity pool, a reward gauge and
//! the invest adapter), then drives the canonical lifecycle:
//! - batch-invest (borrow from the protection market, deploy, stake)
//! - reward drip
//! - the protected condition occurs; the market forgives outstanding debt
//! - batch-divest with an optional reward-claim step

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bulwark_chain::abi::CalldataBuilder;
use bulwark_chain::{batch_calls, BatchBuilder, World};
use bulwark_core::{
    parse_address, Asset, DeploymentConfig, ManualCondition, Market, Trigger, TriggerMetadata,
    Underlying,
};
use bulwark_invest::{InvestAdapter, LiquidityPool, RewardGauge};

fn main() -> Result<()> {
    print_banner();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,bulwark_core=debug,bulwark_chain=debug,bulwark_invest=debug")
        }))
        .init();

    let config = DeploymentConfig::from_env();
    config.log_config();

    let deployment = build_deployment(&config)?;
    run_scenario(deployment)?;

    Ok(())
}

/// Resolved deployment: the world plus every address the scenario touches.
struct Deployment {
    world: World,
    condition: Arc<ManualCondition>,
    underlying: Address,
    receipt: Address,
    reward: Address,
    protection_market: Address,
    gauge: Address,
    adapter: Address,
    proxy: Address,
    recipient: Address,
    invest_amount: U256,
    reward_drip: U256,
}

/// Build the world described by a deployment config.
fn build_deployment(config: &DeploymentConfig) -> Result<Deployment> {
    info!("Initializing deployment...");
    let mut world = World::new();

    // Tokens
    let underlying = parse_address(&config.tokens.underlying.address)?;
    let lp = parse_address(&config.tokens.lp.address)?;
    let receipt = parse_address(&config.tokens.receipt.address)?;
    let reward = parse_address(&config.tokens.reward.address)?;
    for (address, entry) in [
        (underlying, &config.tokens.underlying),
        (lp, &config.tokens.lp),
        (receipt, &config.tokens.receipt),
        (reward, &config.tokens.reward),
    ] {
        world.create_token(address, &entry.symbol, entry.decimals);
    }

    // Trigger with a manually armed condition
    let trigger_address = parse_address(&config.trigger.address)?;
    let condition = ManualCondition::new();
    world.install_trigger(
        trigger_address,
        Trigger::new(
            TriggerMetadata {
                name: config.trigger.name.clone(),
                symbol: config.trigger.symbol.clone(),
                description: config.trigger.description.clone(),
                platform_ids: config.trigger.platform_ids.iter().copied().collect(),
                recipient: parse_address(&config.trigger.recipient)?,
            },
            condition.clone(),
        ),
    );

    // Markets, seeded with cash
    let money_market = parse_address(&config.markets.money)?;
    let protection_market = parse_address(&config.markets.protection)?;
    world.install_market(money_market, Market::money(Underlying::Token(underlying)));
    world.install_market(
        protection_market,
        Market::protection(Underlying::Token(underlying), trigger_address),
    );
    let cash = U256::from(config.markets.cash);
    world.mint(underlying, money_market, cash)?;
    world.mint(underlying, protection_market, cash)?;

    // Venue: pool + gauge
    let pool_address = parse_address(&config.venue.pool)?;
    let gauge_address = parse_address(&config.venue.gauge)?;
    let pool = LiquidityPool::new(
        pool_address,
        underlying,
        lp,
        config.venue.deposit_rate_bps,
        config.venue.withdraw_fee_bps,
    )
    .map_err(|err| anyhow::anyhow!("invalid pool configuration: {err}"))?;
    let gauge = RewardGauge::new(gauge_address, lp, receipt, reward);
    world.mint(reward, gauge_address, U256::from(config.venue.reward_funding))?;

    // Adapter bound to both markets and the venue
    let adapter_address = parse_address(&config.adapter.address)?;
    let adapter = InvestAdapter::bind(
        &world,
        adapter_address,
        money_market,
        protection_market,
        pool_address,
        lp,
        gauge_address,
    )
    .map_err(|err| anyhow::anyhow!("invalid adapter configuration: {err}"))?;

    world.install_logic(pool_address, Arc::new(pool));
    world.install_logic(gauge_address, Arc::new(gauge));
    world.install_logic(adapter_address, Arc::new(adapter));

    // Actor wallet
    let proxy = parse_address(&config.actor.proxy)?;
    let recipient = parse_address(&config.actor.recipient)?;
    world.mint_native(proxy, U256::from(config.actor.native_funding));

    info!(
        money_market = %money_market,
        protection_market = %protection_market,
        trigger = %trigger_address,
        adapter = %adapter_address,
        "Deployment initialized"
    );

    // 1000 units of the underlying, 0.5 units of the reward token.
    let invest_amount =
        U256::from(1_000u64) * U256::from(10u64).pow(U256::from(config.tokens.underlying.decimals));
    let reward_drip = U256::from(5u64)
        * U256::from(10u64).pow(U256::from(config.tokens.reward.decimals.saturating_sub(1)));

    Ok(Deployment {
        world,
        condition,
        underlying,
        receipt,
        reward,
        protection_market,
        gauge: gauge_address,
        adapter: adapter_address,
        proxy,
        recipient,
        invest_amount,
        reward_drip,
    })
}

fn run_scenario(deployment: Deployment) -> Result<()> {
    let Deployment {
        mut world,
        condition,
        underlying,
        receipt,
        reward,
        protection_market,
        gauge,
        adapter,
        proxy,
        recipient,
        invest_amount,
        reward_drip,
    } = deployment;

    // Step 1: borrow from the protection market and deploy into the venue,
    // as one atomic batch from the proxy.
    info!(amount = %invest_amount, "Step 1: invest");
    let invest = CalldataBuilder::new("invest(address,uint256,uint256)")
        .address(protection_market)
        .uint(invest_amount)
        .uint(invest_amount)
        .build();
    let calls = BatchBuilder::new()
        .external(adapter, invest, U256::ZERO)
        .build();
    batch_calls(&mut world, proxy, &calls).context("invest batch failed")?;
    info!(
        staked = %world.balance_of(Asset::Token(receipt), proxy),
        debt = %world.borrow_balance_current(protection_market, proxy)?,
        "Position opened"
    );

    // Step 2: the venue pays out rewards.
    info!(amount = %reward_drip, "Step 2: reward drip");
    let drip = CalldataBuilder::new("notifyReward(address,uint256)")
        .address(proxy)
        .uint(reward_drip)
        .build();
    world.call(recipient, gauge, &drip, U256::ZERO)?;

    // Step 3: the protected condition occurs off-chain.
    info!("Step 3: protected condition occurs, arming trigger");
    condition.arm();

    // Step 4: unwind. The divest is mandatory; an invest against a market
    // outside the whitelist rides along as a deliberately failing optional
    // step to show fail-and-record semantics.
    info!("Step 4: divest");
    let divest = CalldataBuilder::new("divest(address,address,uint256,uint256)")
        .address(protection_market)
        .address(recipient)
        .uint(world.balance_of(Asset::Token(receipt), proxy))
        .uint(U256::ZERO)
        .build();
    let bad_invest = CalldataBuilder::new("invest(address,uint256,uint256)")
        .address(Address::repeat_byte(0xde))
        .uint(U256::ZERO)
        .uint(U256::ZERO)
        .build();
    let calls = BatchBuilder::new()
        .external(adapter, divest, U256::ZERO)
        .external_optional(adapter, bad_invest, U256::ZERO)
        .build();
    let outcomes = batch_calls(&mut world, proxy, &calls).context("divest batch failed")?;
    info!(
        divest_ok = outcomes[0].success,
        optional_ok = outcomes[1].success,
        "Divest batch done"
    );

    // Final accounting: the trigger fired, so the debt was forgiven and the
    // full position (plus rewards) landed with the recipient.
    info!(
        recipient_underlying = %world.balance_of(Asset::Token(underlying), recipient),
        recipient_rewards = %world.balance_of(Asset::Token(reward), recipient),
        remaining_debt = %world.borrow_balance_current(protection_market, proxy)?,
        staked = %world.balance_of(Asset::Token(receipt), proxy),
        events = world.events().len(),
        "Scenario complete"
    );
    for event in world.events().all() {
        info!(?event, "emitted");
    }

    Ok(())
}

/// Print startup banner.
fn print_banner() {
    println!(
        r#"
    ╔╗ ┬ ┬┬  ┬ ┬┌─┐┬─┐┬┌─
    ╠╩╗│ ││  │││├─┤├┬┘├┴┐
    ╚═╝└─┘┴─┘└┴┘┴ ┴┴└─┴ ┴
    protection markets / batched executor / invest adapters
"#
    );
}
