//! Configuration types

use alloy_primitives::{Address, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::units::{ether_to_wei, gwei_to_wei, MAX_DECIMALS};
use crate::{CoreError, CoreResult, FeeBid, ThresholdConfig};

/// RPC endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub http_url: String,
    /// Expected chain id; checked at startup when set
    pub chain_id: Option<u64>,
    pub request_timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            http_url: String::new(),
            chain_id: None,
            request_timeout_ms: 10_000,
        }
    }
}

/// Price oracle contract
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractConfig {
    pub address: Address,
}

/// Bot wallet.
///
/// With `private_key` set, transactions are signed in-process and sent
/// raw. Without it, signing is left to the node.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub address: Address,
    /// Hex-encoded secp256k1 key
    #[serde(skip_serializing)]
    pub private_key: Option<String>,
    /// Balance below which a low-funds warning is logged
    pub min_balance_eth: Decimal,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            address: Address::ZERO,
            private_key: None,
            min_balance_eth: Decimal::new(2, 4), // 0.0002 ETH
        }
    }
}

impl WalletConfig {
    pub fn min_balance_wei(&self) -> CoreResult<U256> {
        ether_to_wei(self.min_balance_eth)
    }

    pub fn signs_locally(&self) -> bool {
        self.private_key.as_deref().is_some_and(|key| !key.trim().is_empty())
    }
}

impl fmt::Debug for WalletConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletConfig")
            .field("address", &self.address)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("min_balance_eth", &self.min_balance_eth)
            .finish()
    }
}

/// Token metadata, display only apart from `decimals`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub name: String,
    pub symbol: String,
    /// Fixed-point scale of the on-chain price
    pub decimals: u8,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            name: "Token".to_string(),
            symbol: "SYM".to_string(),
            decimals: 8,
        }
    }
}

/// How samples are obtained from the price source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    /// Push: WebSocket stream
    Stream,
    /// Pull: HTTP GET on a fixed interval
    Poll,
}

/// Price source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub mode: FeedMode,
    pub url: String,
    /// JSON pointer to the price inside a payload
    pub price_pointer: Option<String>,
    /// Sent once after each WebSocket connect
    pub subscribe_message: Option<String>,
    pub poll_interval_ms: u64,
    pub reconnect_delay_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            mode: FeedMode::Stream,
            url: "wss://stream.binance.com:9443/ws/ethusdt@trade".to_string(),
            price_pointer: None,
            subscribe_message: None,
            poll_interval_ms: 60_000,
            reconnect_delay_ms: 1_000,
            request_timeout_ms: 10_000,
        }
    }
}

impl FeedConfig {
    /// Configured pointer, or the conventional one for the mode
    pub fn pointer(&self) -> &str {
        match (&self.price_pointer, self.mode) {
            (Some(pointer), _) => pointer,
            (None, FeedMode::Stream) => "/p",
            (None, FeedMode::Poll) => "/data/price",
        }
    }
}

/// Transaction fee style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeMode {
    Legacy,
    Eip1559,
}

/// Fee bidding and escalation bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    pub mode: FeeMode,
    pub initial_gas_price_gwei: Decimal,
    pub max_priority_fee_gwei: Decimal,
    pub increment_gwei: Decimal,
    /// Legacy floor used after the node rejects the fee fields
    pub fallback_gas_price_gwei: Decimal,
    pub max_gas_price_gwei: Decimal,
    /// Start from the node's estimate instead of the configured bid
    pub use_chain_estimate: bool,
    pub gas_limit: u64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            mode: FeeMode::Legacy,
            initial_gas_price_gwei: Decimal::new(10, 0),
            max_priority_fee_gwei: Decimal::new(2, 0),
            increment_gwei: Decimal::ONE,
            fallback_gas_price_gwei: Decimal::new(20, 0),
            max_gas_price_gwei: Decimal::new(100, 0),
            use_chain_estimate: false,
            gas_limit: 50_000,
        }
    }
}

impl FeeConfig {
    /// Configured starting bid
    pub fn initial_bid(&self) -> CoreResult<FeeBid> {
        let max_fee = gwei_to_wei(self.initial_gas_price_gwei)?;
        Ok(match self.mode {
            FeeMode::Legacy => FeeBid::legacy(max_fee),
            FeeMode::Eip1559 => {
                FeeBid::eip1559(max_fee, gwei_to_wei(self.max_priority_fee_gwei)?)
            }
        })
    }

    pub fn fallback_bid(&self) -> CoreResult<FeeBid> {
        Ok(FeeBid::legacy(gwei_to_wei(self.fallback_gas_price_gwei)?))
    }

    pub fn increment_wei(&self) -> CoreResult<U256> {
        gwei_to_wei(self.increment_gwei)
    }

    pub fn cap_wei(&self) -> CoreResult<U256> {
        gwei_to_wei(self.max_gas_price_gwei)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.gas_limit == 0 {
            return Err(CoreError::InvalidConfig("gas limit must be non-zero".to_string()));
        }
        if self.increment_wei()?.is_zero() {
            return Err(CoreError::InvalidConfig("fee increment must be non-zero".to_string()));
        }

        let cap = self.cap_wei()?;
        if self.initial_bid()?.ceiling() > cap {
            return Err(CoreError::InvalidConfig(format!(
                "initial gas price {} gwei exceeds cap {} gwei",
                self.initial_gas_price_gwei, self.max_gas_price_gwei
            )));
        }
        if self.fallback_bid()?.ceiling() > cap {
            return Err(CoreError::InvalidConfig(format!(
                "fallback gas price {} gwei exceeds cap {} gwei",
                self.fallback_gas_price_gwei, self.max_gas_price_gwei
            )));
        }
        Ok(())
    }
}

/// Submission and confirmation behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Total broadcast attempts per logical update
    pub max_attempts: u32,
    pub confirmation_poll_ms: u64,
    pub confirmation_timeout_ms: u64,
    /// Re-run the latest deferred sample once the in-flight update ends
    pub reevaluate_latest: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            confirmation_poll_ms: 1_000,
            confirmation_timeout_ms: 120_000,
            reevaluate_latest: true,
        }
    }
}

/// Logging and status output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub json: bool,
    pub status_interval_secs: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            json: false,
            status_interval_secs: 60,
        }
    }
}

/// Complete bot configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub rpc: RpcConfig,
    pub contract: ContractConfig,
    pub wallet: WalletConfig,
    pub token: TokenConfig,
    pub feed: FeedConfig,
    pub threshold: ThresholdConfig,
    pub fees: FeeConfig,
    pub execution: ExecutionConfig,
    pub log: LogConfig,
}

impl BotConfig {
    /// Reject configurations the bot cannot run with
    pub fn validate(&self) -> CoreResult<()> {
        if self.rpc.http_url.trim().is_empty() {
            return Err(CoreError::InvalidConfig("rpc.http_url is required".to_string()));
        }
        if self.contract.address == Address::ZERO {
            return Err(CoreError::InvalidConfig("contract.address is required".to_string()));
        }
        if self.wallet.address == Address::ZERO {
            return Err(CoreError::InvalidConfig("wallet.address is required".to_string()));
        }
        if self.token.decimals > MAX_DECIMALS {
            return Err(CoreError::InvalidConfig(format!(
                "token decimals {} exceed {}",
                self.token.decimals, MAX_DECIMALS
            )));
        }
        if self.feed.url.trim().is_empty() {
            return Err(CoreError::InvalidConfig("feed.url is required".to_string()));
        }
        if self.feed.mode == FeedMode::Poll && self.feed.poll_interval_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "feed.poll_interval_ms must be non-zero".to_string(),
            ));
        }
        if self.execution.max_attempts == 0 {
            return Err(CoreError::InvalidConfig(
                "execution.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.execution.confirmation_poll_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "execution.confirmation_poll_ms must be non-zero".to_string(),
            ));
        }

        self.threshold.validate()?;
        self.fees.validate()?;
        self.wallet.min_balance_wei()?;
        Ok(())
    }
}
