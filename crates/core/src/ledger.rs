//! Fungible-token and native-currency ledger.
//!
//! All transferable balances, allowances and supplies live here. The ledger
//! enforces balance and allowance sufficiency and nothing else; market and
//! venue policy lives with their owners. Reverts carry ERC-20-style reason
//! strings so batch callers see familiar messages.

use alloy::primitives::{Address, U256};
use std::collections::HashMap;

use crate::error::CallError;

/// A transferable asset: the chain's native currency or a fungible token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Asset {
    /// The native currency.
    Native,
    /// A fungible token at the given address.
    Token(Address),
}

/// State of one fungible token.
#[derive(Debug, Clone, Default)]
pub struct TokenState {
    /// Display symbol.
    pub symbol: String,
    /// Token decimals.
    pub decimals: u8,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    total_supply: U256,
}

/// Balance, allowance and supply state for every asset.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    native: HashMap<Address, U256>,
    tokens: HashMap<Address, TokenState>,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token. Idempotent on the address; metadata from the first
    /// registration wins.
    pub fn create_token(&mut self, address: Address, symbol: &str, decimals: u8) {
        self.tokens.entry(address).or_insert_with(|| TokenState {
            symbol: symbol.to_string(),
            decimals,
            ..TokenState::default()
        });
    }

    /// Whether a token is registered at this address.
    pub fn has_token(&self, address: Address) -> bool {
        self.tokens.contains_key(&address)
    }

    /// Token metadata, if registered.
    pub fn token(&self, address: Address) -> Option<&TokenState> {
        self.tokens.get(&address)
    }

    /// Current balance of `account` in `asset`. Zero for unknown tokens.
    pub fn balance_of(&self, asset: Asset, account: Address) -> U256 {
        match asset {
            Asset::Native => self.native.get(&account).copied().unwrap_or(U256::ZERO),
            Asset::Token(token) => self
                .tokens
                .get(&token)
                .and_then(|t| t.balances.get(&account))
                .copied()
                .unwrap_or(U256::ZERO),
        }
    }

    /// Total minted supply of a token. Zero for unknown tokens.
    pub fn total_supply(&self, token: Address) -> U256 {
        self.tokens
            .get(&token)
            .map(|t| t.total_supply)
            .unwrap_or(U256::ZERO)
    }

    /// Remaining allowance from `owner` to `spender`. Zero for unknown
    /// tokens or when none was granted.
    pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.tokens
            .get(&token)
            .and_then(|t| t.allowances.get(&(owner, spender)))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// Credit native currency out of thin air (deployment/admin only).
    pub fn mint_native(&mut self, to: Address, amount: U256) {
        let balance = self.native.entry(to).or_insert(U256::ZERO);
        *balance += amount;
    }

    /// Mint `amount` of `token` to `to`.
    pub fn mint(&mut self, token: Address, to: Address, amount: U256) -> Result<(), CallError> {
        let state = self
            .tokens
            .get_mut(&token)
            .ok_or(CallError::UnknownAccount(token))?;
        let balance = state.balances.entry(to).or_insert(U256::ZERO);
        *balance += amount;
        state.total_supply += amount;
        Ok(())
    }

    /// Burn `amount` of `token` from `from`.
    pub fn burn(&mut self, token: Address, from: Address, amount: U256) -> Result<(), CallError> {
        let state = self
            .tokens
            .get_mut(&token)
            .ok_or(CallError::UnknownAccount(token))?;
        let balance = state.balances.entry(from).or_insert(U256::ZERO);
        if *balance < amount {
            return Err(CallError::revert("burn amount exceeds balance"));
        }
        *balance -= amount;
        state.total_supply -= amount;
        Ok(())
    }

    /// Move native currency between accounts.
    pub fn transfer_native(
        &mut self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), CallError> {
        if amount.is_zero() {
            return Ok(());
        }
        let from_balance = self.native.entry(from).or_insert(U256::ZERO);
        if *from_balance < amount {
            return Err(CallError::revert("insufficient native balance"));
        }
        *from_balance -= amount;
        let to_balance = self.native.entry(to).or_insert(U256::ZERO);
        *to_balance += amount;
        Ok(())
    }

    /// Move tokens between accounts.
    pub fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), CallError> {
        let state = self
            .tokens
            .get_mut(&token)
            .ok_or(CallError::UnknownAccount(token))?;
        let from_balance = state.balances.entry(from).or_insert(U256::ZERO);
        if *from_balance < amount {
            return Err(CallError::revert("transfer amount exceeds balance"));
        }
        *from_balance -= amount;
        let to_balance = state.balances.entry(to).or_insert(U256::ZERO);
        *to_balance += amount;
        Ok(())
    }

    /// Move either kind of asset between accounts.
    pub fn transfer_asset(
        &mut self,
        asset: Asset,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), CallError> {
        match asset {
            Asset::Native => self.transfer_native(from, to, amount),
            Asset::Token(token) => self.transfer(token, from, to, amount),
        }
    }

    /// Set the allowance from `owner` to `spender`.
    pub fn approve(
        &mut self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<(), CallError> {
        let state = self
            .tokens
            .get_mut(&token)
            .ok_or(CallError::UnknownAccount(token))?;
        state.allowances.insert((owner, spender), amount);
        Ok(())
    }

    /// Spend `owner`'s allowance to move tokens. An unlimited (max)
    /// allowance is not decremented.
    pub fn transfer_from(
        &mut self,
        token: Address,
        spender: Address,
        owner: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), CallError> {
        let allowance = self.allowance(token, owner, spender);
        if allowance < amount {
            return Err(CallError::revert("insufficient allowance"));
        }
        self.transfer(token, owner, to, amount)?;
        if allowance != U256::MAX {
            // transfer cannot fail past this point for this token
            if let Some(state) = self.tokens.get_mut(&token) {
                state.allowances.insert((owner, spender), allowance - amount);
            }
        }
        Ok(())
    }
}
