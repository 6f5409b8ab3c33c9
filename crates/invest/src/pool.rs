//! Single-asset liquidity pool model.
//!
//! A deposit-zap style venue: deposit the underlying, receive the LP token
//! at a configured rate net of fees, withdraw symmetrically. Slippage
//! floors are enforced on both legs. The pool is the minter of its own LP
//! token; composing code treats the whole thing as a black box that returns
//! amounts and honors floors.

use alloy::primitives::{Address, Bytes, U256};
use tracing::debug;

use bulwark_chain::abi::{encode_uint, CalldataReader};
use bulwark_chain::{CallContext, ContractLogic, World};
use bulwark_core::{Asset, CallError};

use crate::sel;

const BPS_SCALE: u64 = 10_000;

/// A single-asset liquidity pool.
#[derive(Debug, Clone)]
pub struct LiquidityPool {
    address: Address,
    underlying: Address,
    lp_token: Address,
    deposit_rate_bps: u64,
    withdraw_fee_bps: u64,
}

impl LiquidityPool {
    /// Configure a pool. The deposit rate must be nonzero; the withdrawal
    /// fee must stay below 100%.
    pub fn new(
        address: Address,
        underlying: Address,
        lp_token: Address,
        deposit_rate_bps: u64,
        withdraw_fee_bps: u64,
    ) -> Result<Self, CallError> {
        if deposit_rate_bps == 0 {
            return Err(CallError::revert("deposit rate must be nonzero"));
        }
        if withdraw_fee_bps >= BPS_SCALE {
            return Err(CallError::revert("withdraw fee must be below 100%"));
        }
        Ok(Self {
            address,
            underlying,
            lp_token,
            deposit_rate_bps,
            withdraw_fee_bps,
        })
    }

    /// Pool address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// LP token address.
    pub fn lp_token(&self) -> Address {
        self.lp_token
    }

    /// LP minted for a deposit of `amount`.
    pub fn quote_deposit(&self, amount: U256) -> U256 {
        amount * U256::from(self.deposit_rate_bps) / U256::from(BPS_SCALE)
    }

    /// Underlying returned for burning `lp_amount`, net of the fee.
    pub fn quote_withdraw(&self, lp_amount: U256) -> U256 {
        let gross = lp_amount * U256::from(BPS_SCALE) / U256::from(self.deposit_rate_bps);
        gross * U256::from(BPS_SCALE - self.withdraw_fee_bps) / U256::from(BPS_SCALE)
    }

    /// Pull `amount` of the underlying from `actor` and mint LP, enforcing
    /// `min_out` as the slippage floor.
    pub fn deposit(
        &self,
        world: &mut World,
        actor: Address,
        amount: U256,
        min_out: U256,
    ) -> Result<U256, CallError> {
        let out = self.quote_deposit(amount);
        if out < min_out {
            return Err(CallError::revert("insufficient output amount"));
        }
        world.transfer_from(self.underlying, self.address, actor, self.address, amount)?;
        world.mint(self.lp_token, actor, out)?;
        debug!(pool = %self.address, actor = %actor, amount = %amount, lp_out = %out, "deposit");
        Ok(out)
    }

    /// Burn `lp_amount` from `actor` and return the underlying, enforcing
    /// `min_out` as the slippage floor.
    pub fn withdraw(
        &self,
        world: &mut World,
        actor: Address,
        lp_amount: U256,
        min_out: U256,
    ) -> Result<U256, CallError> {
        let out = self.quote_withdraw(lp_amount);
        if out < min_out {
            return Err(CallError::revert("insufficient output amount"));
        }
        world.burn(self.lp_token, actor, lp_amount)?;
        world.transfer_asset(Asset::Token(self.underlying), self.address, actor, out)?;
        debug!(pool = %self.address, actor = %actor, lp_amount = %lp_amount, out = %out, "withdraw");
        Ok(out)
    }
}

impl ContractLogic for LiquidityPool {
    fn execute(
        &self,
        world: &mut World,
        ctx: CallContext,
        data: &[u8],
    ) -> Result<Bytes, CallError> {
        let mut reader = CalldataReader::parse(data)?;
        let s = reader.selector();
        if s == *sel::DEPOSIT {
            let amount = reader.uint()?;
            let min_out = reader.uint()?;
            self.deposit(world, ctx.caller, amount, min_out).map(encode_uint)
        } else if s == *sel::WITHDRAW {
            let lp_amount = reader.uint()?;
            let min_out = reader.uint()?;
            self.withdraw(world, ctx.caller, lp_amount, min_out)
                .map(encode_uint)
        } else {
            Err(CallError::UnknownSelector(s))
        }
    }
}
