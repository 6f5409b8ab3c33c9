//! Invest adapters and venue models.
//!
//! This crate provides the composition layer over the protection-market
//! engine:
//! - [`LiquidityPool`]: single-asset deposit-zap venue with slippage floors
//! - [`RewardGauge`]: LP staking venue; the gauge receipt-token balance is
//!   the position, and pending rewards are claimed per account
//! - [`InvestAdapter`]: stateless borrow → deploy → stake strategy with a
//!   symmetric best-effort unwind
//!
//! All three register as contract logic in the execution environment and
//! run with the calling proxy's identity.

mod adapter;
mod gauge;
mod pool;

pub use adapter::InvestAdapter;
pub use gauge::RewardGauge;
pub use pool::LiquidityPool;

/// Wire selectors for the venue and adapter surfaces.
pub(crate) mod sel {
    use std::sync::LazyLock;

    use bulwark_chain::abi::selector;

    pub static DEPOSIT: LazyLock<[u8; 4]> = LazyLock::new(|| selector("deposit(uint256,uint256)"));
    pub static WITHDRAW: LazyLock<[u8; 4]> =
        LazyLock::new(|| selector("withdraw(uint256,uint256)"));

    pub static STAKE: LazyLock<[u8; 4]> = LazyLock::new(|| selector("stake(uint256)"));
    pub static UNSTAKE: LazyLock<[u8; 4]> = LazyLock::new(|| selector("unstake(uint256)"));
    pub static CLAIM: LazyLock<[u8; 4]> = LazyLock::new(|| selector("claim(address)"));
    pub static NOTIFY_REWARD: LazyLock<[u8; 4]> =
        LazyLock::new(|| selector("notifyReward(address,uint256)"));
    pub static PENDING_REWARD: LazyLock<[u8; 4]> =
        LazyLock::new(|| selector("pendingReward(address)"));

    pub static INVEST: LazyLock<[u8; 4]> =
        LazyLock::new(|| selector("invest(address,uint256,uint256)"));
    pub static DIVEST: LazyLock<[u8; 4]> =
        LazyLock::new(|| selector("divest(address,address,uint256,uint256)"));
    pub static CLAIM_REWARDS: LazyLock<[u8; 4]> =
        LazyLock::new(|| selector("claimRewards(address)"));
}
