//! Feed supervisor - owns the feed task and its shutdown signal

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use oracle_core::{FeedConfig, FeedMode, PriceFeedResult};

use crate::feeds::{FeedEvent, FeedSource, StreamConfig, WebSocketFeed};
use crate::parse::PayloadParser;
use crate::poll::{HttpPollSource, PollingFeed};
use crate::state::{FeedHealth, FeedStats};

const EVENT_CHANNEL_CAPACITY: usize = 1_024;

/// Build the configured feed
pub fn build_feed(
    config: &FeedConfig,
    decimals: u8,
    health: Arc<FeedHealth>,
) -> PriceFeedResult<Box<dyn FeedSource>> {
    let parser = PayloadParser::new(config.pointer(), decimals);

    let feed: Box<dyn FeedSource> = match config.mode {
        FeedMode::Stream => Box::new(WebSocketFeed::new(
            StreamConfig {
                url: config.url.clone(),
                subscribe_message: config.subscribe_message.clone(),
                reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
            },
            parser,
            health,
        )),
        FeedMode::Poll => {
            let source = HttpPollSource::new(
                config.url.clone(),
                parser,
                Duration::from_millis(config.request_timeout_ms),
            )?;
            Box::new(PollingFeed::new(
                source,
                Duration::from_millis(config.poll_interval_ms),
                health,
            ))
        }
    };

    Ok(feed)
}

/// Runs one feed and hands its events to a single consumer
pub struct FeedSupervisor {
    health: Arc<FeedHealth>,
    events_rx: Option<mpsc::Receiver<FeedEvent>>,
    /// Moved into the feed task on start, so the channel closes when it ends
    events_tx: Option<mpsc::Sender<FeedEvent>>,
    handle: Option<JoinHandle<()>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl FeedSupervisor {
    pub fn new(health: Arc<FeedHealth>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            health,
            events_rx: Some(events_rx),
            events_tx: Some(events_tx),
            handle: None,
            shutdown: None,
        }
    }

    /// Supervisor for the configured feed, not yet started
    pub fn from_config(config: &FeedConfig, decimals: u8) -> PriceFeedResult<(Self, Box<dyn FeedSource>)> {
        let health = Arc::new(FeedHealth::new());
        let feed = build_feed(config, decimals, Arc::clone(&health))?;
        Ok((Self::new(health), feed))
    }

    pub fn health(&self) -> Arc<FeedHealth> {
        Arc::clone(&self.health)
    }

    /// Event receiver (can only be taken once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<FeedEvent>> {
        self.events_rx.take()
    }

    pub fn start(&mut self, feed: Box<dyn FeedSource>) {
        let Some(events) = self.events_tx.take() else {
            warn!("Feed already started, ignoring start");
            return;
        };

        info!("Starting {} price feed", feed.name());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        self.handle = Some(tokio::spawn(async move {
            feed.run(events, shutdown_rx).await;
        }));
        self.shutdown = Some(shutdown_tx);
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the feed and wait for its task to end
    pub async fn stop(&mut self) {
        info!("Stopping price feed");

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Feed task ended abnormally: {}", e);
            }
        }
    }

    pub fn stats(&self) -> FeedStats {
        self.health.stats()
    }
}
