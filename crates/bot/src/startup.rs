//! Startup preflight
//!
//! Anything the bot cannot run without fails here, before the main loop.

use alloy_primitives::{Address, U256};
use anyhow::{bail, Context};
use tracing::{info, warn};

use oracle_core::{format_units, BotConfig, PublishedPrice, ETHER_DECIMALS};
use oracle_executor::{ChainClient, UpdateCoordinator};

/// What the chain looked like at startup
#[derive(Debug, Clone)]
pub struct PreflightReport {
    pub chain_id: u64,
    pub published: PublishedPrice,
    pub balance: Option<U256>,
    pub owner: Option<Address>,
    pub warnings: Vec<String>,
}

/// Check connectivity and read the published price into the coordinator
pub async fn preflight(
    chain: &dyn ChainClient,
    coordinator: &UpdateCoordinator,
    config: &BotConfig,
) -> anyhow::Result<PreflightReport> {
    let chain_id = chain
        .chain_id()
        .await
        .context("RPC endpoint unreachable")?;

    if let Some(expected) = config.rpc.chain_id {
        if expected != chain_id {
            bail!("connected to chain {} but chain {} is configured", chain_id, expected);
        }
    }
    info!("Connected to chain {}", chain_id);

    let published = coordinator
        .refresh_published()
        .await
        .context("failed to read the published price")?;
    info!("On-chain price: {} {}", published, config.token.symbol);

    let mut warnings = Vec::new();

    let balance = match chain.balance(config.wallet.address).await {
        Ok(balance) => {
            let minimum = config.wallet.min_balance_wei()?;
            info!(
                "Bot wallet {} balance: {} ETH",
                config.wallet.address,
                format_units(balance, ETHER_DECIMALS)
            );
            if balance < minimum {
                warnings.push(format!(
                    "wallet balance {} ETH is below {} ETH",
                    format_units(balance, ETHER_DECIMALS),
                    config.wallet.min_balance_eth
                ));
            }
            Some(balance)
        }
        Err(e) => {
            warnings.push(format!("could not read wallet balance: {}", e));
            None
        }
    };

    let owner = match chain.owner().await {
        Ok(owner) => {
            if owner != config.wallet.address {
                warnings.push(format!(
                    "contract owner {} is not the bot wallet {}; updates may revert",
                    owner, config.wallet.address
                ));
            }
            Some(owner)
        }
        Err(e) => {
            warnings.push(format!("could not read contract owner: {}", e));
            None
        }
    };

    for warning in &warnings {
        warn!("{}", warning);
    }

    Ok(PreflightReport {
        chain_id,
        published,
        balance,
        owner,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, wallet};
    use oracle_core::ChainError;
    use oracle_executor::testing::ScriptedChain;
    use oracle_executor::CoordinatorConfig;
    use std::sync::Arc;

    fn coordinator(chain: &Arc<ScriptedChain>, config: &BotConfig) -> UpdateCoordinator {
        UpdateCoordinator::new(
            chain.clone(),
            CoordinatorConfig::from_config(config).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_preflight_caches_published_price() {
        let config = test_config();
        let chain = Arc::new(ScriptedChain::new(2650_00000000, 8));
        let coordinator = coordinator(&chain, &config);

        let report = preflight(chain.as_ref(), &coordinator, &config).await.unwrap();

        assert_eq!(report.chain_id, 31337);
        assert_eq!(report.published.value, U256::from(2650_00000000u64));
        assert!(report.warnings.is_empty());
        assert_eq!(report.owner, Some(wallet()));
        assert_eq!(
            coordinator.published().unwrap().value,
            U256::from(2650_00000000u64)
        );
    }

    #[tokio::test]
    async fn test_preflight_warns_on_low_balance_and_foreign_owner() {
        let config = test_config();
        let chain = Arc::new(
            ScriptedChain::new(1, 8)
                .with_balance(U256::from(1u8))
                .with_owner(Address::repeat_byte(0x99)),
        );
        let coordinator = coordinator(&chain, &config);

        let report = preflight(chain.as_ref(), &coordinator, &config).await.unwrap();
        assert_eq!(report.warnings.len(), 2);
    }

    #[tokio::test]
    async fn test_preflight_rejects_wrong_chain() {
        let mut config = test_config();
        config.rpc.chain_id = Some(1);
        let chain = Arc::new(ScriptedChain::new(1, 8));
        let coordinator = coordinator(&chain, &config);

        assert!(preflight(chain.as_ref(), &coordinator, &config).await.is_err());
    }

    #[tokio::test]
    async fn test_preflight_fails_when_price_unreadable() {
        let config = test_config();
        let chain = Arc::new(ScriptedChain::new(1, 8));
        chain.fail_price_read(ChainError::Other("execution reverted".to_string()));
        let coordinator = coordinator(&chain, &config);

        assert!(preflight(chain.as_ref(), &coordinator, &config).await.is_err());
    }
}
