//! Reward gauge model.
//!
//! Staking venue for pool LP tokens. Staking mints a gauge receipt token to
//! the staker: the receipt balance in the ledger *is* the position; no
//! separate position book exists anywhere. Pending rewards accumulate per
//! account in gauge storage and are paid out of the gauge's reward-token
//! balance on claim.
//!
//! `notifyReward` is a trusted distributor surface: reward top-ups come
//! from the deployment's operator, not from untrusted callers.

use alloy::primitives::{Address, Bytes, U256};
use tracing::debug;

use bulwark_chain::abi::{encode_uint, CalldataReader};
use bulwark_chain::{CallContext, ContractLogic, StorageSlot, World};
use bulwark_core::{Asset, CallError, Event};

use crate::sel;

/// Storage topic for per-account pending rewards.
const SLOT_PENDING_REWARD: u8 = 1;

/// A staking gauge paying rewards on deposited LP tokens.
#[derive(Debug, Clone)]
pub struct RewardGauge {
    address: Address,
    lp_token: Address,
    receipt_token: Address,
    reward_token: Address,
}

impl RewardGauge {
    /// Configure a gauge.
    pub fn new(
        address: Address,
        lp_token: Address,
        receipt_token: Address,
        reward_token: Address,
    ) -> Self {
        Self {
            address,
            lp_token,
            receipt_token,
            reward_token,
        }
    }

    /// Gauge address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Receipt token address; its balance is the staked position.
    pub fn receipt_token(&self) -> Address {
        self.receipt_token
    }

    /// Reward token address.
    pub fn reward_token(&self) -> Address {
        self.reward_token
    }

    fn pending_slot(&self, account: Address) -> StorageSlot {
        StorageSlot {
            contract: self.address,
            topic: SLOT_PENDING_REWARD,
            subject: account,
        }
    }

    /// Pull `amount` LP from `actor` and mint the staking receipt.
    pub fn stake(&self, world: &mut World, actor: Address, amount: U256) -> Result<(), CallError> {
        world.transfer_from(self.lp_token, self.address, actor, self.address, amount)?;
        world.mint(self.receipt_token, actor, amount)?;
        debug!(gauge = %self.address, actor = %actor, amount = %amount, "stake");
        world.emit(Event::Staked {
            gauge: self.address,
            account: actor,
            amount,
        });
        Ok(())
    }

    /// Burn `amount` of the staking receipt and return the LP.
    pub fn unstake(&self, world: &mut World, actor: Address, amount: U256) -> Result<(), CallError> {
        world.burn(self.receipt_token, actor, amount)?;
        world.transfer_asset(Asset::Token(self.lp_token), self.address, actor, amount)?;
        debug!(gauge = %self.address, actor = %actor, amount = %amount, "unstake");
        world.emit(Event::Unstaked {
            gauge: self.address,
            account: actor,
            amount,
        });
        Ok(())
    }

    /// Pay `actor`'s pending rewards to `to`. Returns the paid amount;
    /// zero pending pays nothing and emits nothing.
    pub fn claim(&self, world: &mut World, actor: Address, to: Address) -> Result<U256, CallError> {
        let pending = world.storage_take(self.pending_slot(actor));
        if pending.is_zero() {
            return Ok(U256::ZERO);
        }
        world.transfer_asset(Asset::Token(self.reward_token), self.address, to, pending)?;
        debug!(gauge = %self.address, actor = %actor, to = %to, amount = %pending, "claim");
        world.emit(Event::RewardsClaimed {
            gauge: self.address,
            account: actor,
            to,
            amount: pending,
        });
        Ok(pending)
    }

    /// Credit pending rewards to an account (trusted distributor surface).
    pub fn notify_reward(&self, world: &mut World, account: Address, amount: U256) {
        world.storage_add(self.pending_slot(account), amount);
    }

    /// Pending rewards of an account.
    pub fn pending_reward(&self, world: &World, account: Address) -> U256 {
        world.storage_get(self.pending_slot(account))
    }
}

impl ContractLogic for RewardGauge {
    fn execute(
        &self,
        world: &mut World,
        ctx: CallContext,
        data: &[u8],
    ) -> Result<Bytes, CallError> {
        let mut reader = CalldataReader::parse(data)?;
        let s = reader.selector();
        if s == *sel::STAKE {
            let amount = reader.uint()?;
            self.stake(world, ctx.caller, amount)?;
            Ok(Bytes::new())
        } else if s == *sel::UNSTAKE {
            let amount = reader.uint()?;
            self.unstake(world, ctx.caller, amount)?;
            Ok(Bytes::new())
        } else if s == *sel::CLAIM {
            let to = reader.address()?;
            self.claim(world, ctx.caller, to).map(encode_uint)
        } else if s == *sel::NOTIFY_REWARD {
            let account = reader.address()?;
            let amount = reader.uint()?;
            self.notify_reward(world, account, amount);
            Ok(Bytes::new())
        } else if s == *sel::PENDING_REWARD {
            let account = reader.address()?;
            Ok(encode_uint(self.pending_reward(world, account)))
        } else {
            Err(CallError::UnknownSelector(s))
        }
    }
}
