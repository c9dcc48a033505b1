//! Main event loop: feed events in, decision cycles out

use anyhow::anyhow;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use oracle_executor::UpdateCoordinator;
use oracle_price_feed::{FeedEvent, FeedSource, FeedSupervisor};

use crate::status;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// `None` disables the periodic summary
    pub status_interval: Option<Duration>,
    pub symbol: String,
}

/// Owns the feed and dispatches samples to the coordinator
pub struct Runner {
    config: RunnerConfig,
    coordinator: Arc<UpdateCoordinator>,
    supervisor: FeedSupervisor,
    feed: Option<Box<dyn FeedSource>>,
}

impl Runner {
    pub fn new(
        config: RunnerConfig,
        coordinator: Arc<UpdateCoordinator>,
        supervisor: FeedSupervisor,
        feed: Box<dyn FeedSource>,
    ) -> Self {
        Self {
            config,
            coordinator,
            supervisor,
            feed: Some(feed),
        }
    }

    /// Run until `shutdown` resolves or the feed ends.
    ///
    /// In-flight updates run to completion before this returns.
    pub async fn run<F>(mut self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut events = self
            .supervisor
            .take_event_receiver()
            .ok_or_else(|| anyhow!("feed event receiver already taken"))?;
        let feed = self
            .feed
            .take()
            .ok_or_else(|| anyhow!("runner already started"))?;
        self.supervisor.start(feed);

        let health = self.supervisor.health();
        let mut cycles = JoinSet::new();

        let status_enabled = self.config.status_interval.is_some();
        let mut status_timer =
            tokio::time::interval(self.config.status_interval.unwrap_or(Duration::from_secs(60)));
        // First tick completes immediately
        status_timer.tick().await;

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = status_timer.tick(), if status_enabled => {
                    status::log_summary(&self.coordinator, &health, &self.config.symbol);
                }
                event = events.recv() => match event {
                    Some(FeedEvent::Sample(sample)) => {
                        debug!("Sample {}", sample);
                        let coordinator = Arc::clone(&self.coordinator);
                        cycles.spawn(async move {
                            coordinator.on_sample(sample).await;
                        });
                    }
                    Some(FeedEvent::Error(e)) => {
                        warn!("Skipping feed sample: {}", e);
                    }
                    Some(FeedEvent::Disconnected { reason }) => {
                        warn!("Feed disconnected: {}", reason);
                    }
                    None => {
                        warn!("Feed ended");
                        break;
                    }
                },
                Some(joined) = cycles.join_next() => {
                    if let Err(e) = joined {
                        error!("Decision cycle task failed: {}", e);
                    }
                }
            }
        }

        self.supervisor.stop().await;

        if self.coordinator.is_in_flight() {
            info!("Waiting for in-flight update to finish");
        }
        while let Some(joined) = cycles.join_next().await {
            if let Err(e) = joined {
                error!("Decision cycle task failed: {}", e);
            }
        }

        status::log_summary(&self.coordinator, &health, &self.config.symbol);
        Ok(())
    }
}
