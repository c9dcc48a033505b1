//! Oracle Bot - publishes significant price moves to an on-chain oracle
//!
//! Main entry point

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use oracle_bot::{preflight, settings, status, Runner, RunnerConfig};
use oracle_core::LogConfig;
use oracle_executor::{
    ChainClient, CoordinatorConfig, JsonRpcChainClient, RpcClientConfig, UpdateCoordinator,
};
use oracle_price_feed::FeedSupervisor;

fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        }
        _ = terminate => {
            info!("Received termination signal");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let config = settings::load()?;
    init_logging(&config.log);

    info!("Starting Oracle Bot v{}", env!("CARGO_PKG_VERSION"));

    config.validate().context("invalid configuration")?;
    status::log_header(&config);

    let chain: Arc<dyn ChainClient> =
        Arc::new(JsonRpcChainClient::new(RpcClientConfig::from_config(&config))?);
    let coordinator = Arc::new(UpdateCoordinator::new(
        Arc::clone(&chain),
        CoordinatorConfig::from_config(&config)?,
    ));

    preflight(chain.as_ref(), &coordinator, &config).await?;

    let (supervisor, feed) = FeedSupervisor::from_config(&config.feed, config.token.decimals)?;

    let runner = Runner::new(
        RunnerConfig {
            status_interval: (config.log.status_interval_secs > 0)
                .then(|| Duration::from_secs(config.log.status_interval_secs)),
            symbol: config.token.symbol.clone(),
        },
        coordinator,
        supervisor,
        feed,
    );

    info!("Press Ctrl+C to shutdown");
    runner.run(shutdown_signal()).await?;

    info!("Shutdown complete");
    Ok(())
}
