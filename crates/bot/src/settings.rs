//! Configuration loading
//!
//! Sources, lowest precedence first:
//! 1. `oracle.toml` (or the file named by `ORACLE_CONFIG`), optional
//! 2. `ORACLE__SECTION__KEY` environment variables
//! 3. Flat variables from earlier deployments (`RPC_URL`, `CONTRACT_ADDRESS`, ...)

use anyhow::Context;
use config::{Config, Environment, File, Source};
use std::collections::HashMap;
use std::env;

use oracle_core::BotConfig;

pub const DEFAULT_CONFIG_FILE: &str = "oracle.toml";
pub const CONFIG_PATH_VAR: &str = "ORACLE_CONFIG";

/// Flat variable -> config key
const LEGACY_VARS: &[(&str, &str)] = &[
    ("RPC_URL", "rpc.http_url"),
    ("CONTRACT_ADDRESS", "contract.address"),
    ("BOT_WALLET_ADDRESS", "wallet.address"),
    ("BOT_PRIVATE_KEY", "wallet.private_key"),
    ("WEBSOCKET_URL", "feed.url"),
    ("TOKEN_NAME", "token.name"),
    ("TOKEN_SYMBOL", "token.symbol"),
    ("TOKEN_DECIMALS", "token.decimals"),
    ("PRICE_CHANGE_THRESHOLD", "threshold.numerator"),
    ("SCALE_FACTOR", "threshold.denominator"),
    ("DEFAULT_GAS_LIMIT", "fees.gas_limit"),
    ("MAX_FEE_PER_GAS_GWEI", "fees.initial_gas_price_gwei"),
    ("MAX_PRIORITY_FEE_PER_GAS_GWEI", "fees.max_priority_fee_gwei"),
];

/// Load from the process environment and the configured file
pub fn load() -> anyhow::Result<BotConfig> {
    let path = env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    let vars: HashMap<String, String> = env::vars().collect();

    from_sources(File::with_name(&path).required(false), vars)
        .with_context(|| format!("failed to load configuration (file {})", path))
}

/// Layer `file`, prefixed variables and legacy variables from `vars`
pub fn from_sources<S>(file: S, vars: HashMap<String, String>) -> anyhow::Result<BotConfig>
where
    S: Source + Send + Sync + 'static,
{
    let mut builder = Config::builder().add_source(file).add_source(
        Environment::with_prefix("ORACLE")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .source(Some(vars.clone())),
    );

    for (var, key) in LEGACY_VARS {
        let value = vars.get(*var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        builder = builder.set_override_option(*key, value)?;
    }

    let settings = builder.build()?;
    Ok(settings.try_deserialize()?)
}
