//! Deployment configuration.
//!
//! A deployment names every account in a simulated protection-market
//! installation: tokens, the money and protection markets, the trigger, the
//! venue contracts, the adapter, and the actor wallet. Loaded from TOML with
//! per-field defaults so a missing file or sparse config still yields a
//! runnable installation.

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Environment variable naming the deployment TOML path.
pub const DEPLOYMENT_ENV: &str = "BULWARK_DEPLOYMENT";

/// Full deployment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Deployment name (for logging/identification).
    #[serde(default = "default_deployment_name")]
    pub name: String,

    /// Token roles.
    #[serde(default)]
    pub tokens: TokensConfig,

    /// Market addresses and seeding.
    #[serde(default)]
    pub markets: MarketsConfig,

    /// Trigger metadata and address.
    #[serde(default)]
    pub trigger: TriggerSettings,

    /// Venue contracts and parameters.
    #[serde(default)]
    pub venue: VenueSettings,

    /// Adapter address.
    #[serde(default)]
    pub adapter: AdapterSettings,

    /// Actor wallet and funding.
    #[serde(default)]
    pub actor: ActorSettings,
}

fn default_deployment_name() -> String {
    "local-sim".to_string()
}

/// One token role in the deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEntry {
    /// Token address.
    pub address: String,
    /// Display symbol.
    pub symbol: String,
    /// Token decimals.
    pub decimals: u8,
}

/// The four token roles the venue flow touches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokensConfig {
    /// Borrowed/lent underlying.
    #[serde(default = "default_underlying_token")]
    pub underlying: TokenEntry,
    /// Venue receipt (LP) token.
    #[serde(default = "default_lp_token")]
    pub lp: TokenEntry,
    /// Gauge receipt token; its balance is the staked position.
    #[serde(default = "default_receipt_token")]
    pub receipt: TokenEntry,
    /// Gauge reward token.
    #[serde(default = "default_reward_token")]
    pub reward: TokenEntry,
}

fn default_underlying_token() -> TokenEntry {
    TokenEntry {
        address: "0x0000000000000000000000000000000000000101".to_string(),
        symbol: "USDQ".to_string(),
        decimals: 6,
    }
}
fn default_lp_token() -> TokenEntry {
    TokenEntry {
        address: "0x0000000000000000000000000000000000000102".to_string(),
        symbol: "QLP".to_string(),
        decimals: 18,
    }
}
fn default_receipt_token() -> TokenEntry {
    TokenEntry {
        address: "0x0000000000000000000000000000000000000103".to_string(),
        symbol: "stQLP".to_string(),
        decimals: 18,
    }
}
fn default_reward_token() -> TokenEntry {
    TokenEntry {
        address: "0x0000000000000000000000000000000000000104".to_string(),
        symbol: "VNE".to_string(),
        decimals: 18,
    }
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            underlying: default_underlying_token(),
            lp: default_lp_token(),
            receipt: default_receipt_token(),
            reward: default_reward_token(),
        }
    }
}

/// Money and protection market configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketsConfig {
    /// Money market address (no trigger).
    #[serde(default = "default_money_market")]
    pub money: String,

    /// Protection market address (gated by the trigger).
    #[serde(default = "default_protection_market")]
    pub protection: String,

    /// Cash each market is seeded with, in underlying base units.
    #[serde(default = "default_market_cash")]
    pub cash: u128,
}

fn default_money_market() -> String {
    "0x0000000000000000000000000000000000000201".to_string()
}
fn default_protection_market() -> String {
    "0x0000000000000000000000000000000000000202".to_string()
}
fn default_market_cash() -> u128 {
    1_000_000_000_000
}

impl Default for MarketsConfig {
    fn default() -> Self {
        Self {
            money: default_money_market(),
            protection: default_protection_market(),
            cash: default_market_cash(),
        }
    }
}

/// Trigger deployment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerSettings {
    /// Trigger address.
    #[serde(default = "default_trigger_address")]
    pub address: String,

    /// Human-readable name.
    #[serde(default = "default_trigger_name")]
    pub name: String,

    /// Short symbol.
    #[serde(default = "default_trigger_symbol")]
    pub symbol: String,

    /// What condition the trigger protects against.
    #[serde(default = "default_trigger_description")]
    pub description: String,

    /// Ordered platform identifiers covered.
    #[serde(default = "default_platform_ids")]
    pub platform_ids: Vec<u16>,

    /// Subsidy beneficiary address.
    #[serde(default = "default_trigger_recipient")]
    pub recipient: String,
}

fn default_trigger_address() -> String {
    "0x0000000000000000000000000000000000000301".to_string()
}
fn default_trigger_name() -> String {
    "Venue Failure Trigger".to_string()
}
fn default_trigger_symbol() -> String {
    "VFT".to_string()
}
fn default_trigger_description() -> String {
    "Fires when the protected venue fails".to_string()
}
fn default_platform_ids() -> Vec<u16> {
    vec![3]
}
fn default_trigger_recipient() -> String {
    "0x0000000000000000000000000000000000000303".to_string()
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            address: default_trigger_address(),
            name: default_trigger_name(),
            symbol: default_trigger_symbol(),
            description: default_trigger_description(),
            platform_ids: default_platform_ids(),
            recipient: default_trigger_recipient(),
        }
    }
}

/// Venue contract settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueSettings {
    /// Liquidity pool address.
    #[serde(default = "default_pool_address")]
    pub pool: String,

    /// Reward gauge address.
    #[serde(default = "default_gauge_address")]
    pub gauge: String,

    /// LP minted per unit deposited, in basis points.
    #[serde(default = "default_deposit_rate_bps")]
    pub deposit_rate_bps: u64,

    /// Withdrawal fee in basis points.
    #[serde(default = "default_withdraw_fee_bps")]
    pub withdraw_fee_bps: u64,

    /// Reward tokens the gauge is seeded with, in reward base units.
    #[serde(default = "default_reward_funding")]
    pub reward_funding: u128,
}

fn default_pool_address() -> String {
    "0x0000000000000000000000000000000000000401".to_string()
}
fn default_gauge_address() -> String {
    "0x0000000000000000000000000000000000000402".to_string()
}
fn default_deposit_rate_bps() -> u64 {
    10_000
}
fn default_withdraw_fee_bps() -> u64 {
    0
}
fn default_reward_funding() -> u128 {
    1_000_000_000_000_000_000
}

impl Default for VenueSettings {
    fn default() -> Self {
        Self {
            pool: default_pool_address(),
            gauge: default_gauge_address(),
            deposit_rate_bps: default_deposit_rate_bps(),
            withdraw_fee_bps: default_withdraw_fee_bps(),
            reward_funding: default_reward_funding(),
        }
    }
}

/// Adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterSettings {
    /// Adapter address.
    #[serde(default = "default_adapter_address")]
    pub address: String,
}

fn default_adapter_address() -> String {
    "0x0000000000000000000000000000000000000501".to_string()
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            address: default_adapter_address(),
        }
    }
}

/// Actor wallet settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorSettings {
    /// The proxy wallet that executes batches.
    #[serde(default = "default_proxy_address")]
    pub proxy: String,

    /// Where divest proceeds and rewards are sent.
    #[serde(default = "default_recipient_address")]
    pub recipient: String,

    /// Native currency the proxy starts with.
    #[serde(default = "default_native_funding")]
    pub native_funding: u128,
}

fn default_proxy_address() -> String {
    "0x0000000000000000000000000000000000000601".to_string()
}
fn default_recipient_address() -> String {
    "0x0000000000000000000000000000000000000602".to_string()
}
fn default_native_funding() -> u128 {
    1_000_000_000_000_000_000
}

impl Default for ActorSettings {
    fn default() -> Self {
        Self {
            proxy: default_proxy_address(),
            recipient: default_recipient_address(),
            native_funding: default_native_funding(),
        }
    }
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            name: default_deployment_name(),
            tokens: TokensConfig::default(),
            markets: MarketsConfig::default(),
            trigger: TriggerSettings::default(),
            venue: VenueSettings::default(),
            adapter: AdapterSettings::default(),
            actor: ActorSettings::default(),
        }
    }
}

impl DeploymentConfig {
    /// Load from the path named by `BULWARK_DEPLOYMENT`, falling back to the
    /// built-in default deployment when unset or unreadable.
    pub fn from_env() -> Self {
        match std::env::var(DEPLOYMENT_ENV) {
            Ok(path) => load_deployment(&path).unwrap_or_else(|err| {
                warn!(path = %path, error = %err, "Failed to load deployment config, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Log the resolved configuration.
    pub fn log_config(&self) {
        info!(deployment = %self.name, "Loaded deployment configuration");
        if let Ok(json) = serde_json::to_string_pretty(self) {
            tracing::debug!("{json}");
        }
    }
}

/// Parse a `0x`-prefixed address string.
pub fn parse_address(s: &str) -> Result<Address> {
    s.parse::<Address>()
        .with_context(|| format!("invalid address: {s}"))
}

/// Load a deployment config from a TOML file.
pub fn load_deployment(path: impl AsRef<Path>) -> Result<DeploymentConfig> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read deployment config {}", path.display()))?;
    toml::from_str(&raw)
        .with_context(|| format!("failed to parse deployment config {}", path.display()))
}
