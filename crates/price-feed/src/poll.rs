//! Pull feed on a cancellable periodic timer

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use oracle_core::{PriceFeedError, PriceFeedResult, PriceSample};

use crate::feeds::{FeedEvent, FeedSource};
use crate::parse::PayloadParser;
use crate::state::FeedHealth;

/// One-shot price fetch
#[async_trait]
pub trait PollSource: Send + Sync {
    async fn fetch_once(&self) -> PriceFeedResult<PriceSample>;
}

/// HTTP GET returning a JSON payload
pub struct HttpPollSource {
    http: reqwest::Client,
    url: String,
    parser: PayloadParser,
}

impl HttpPollSource {
    pub fn new(url: impl Into<String>, parser: PayloadParser, timeout: Duration) -> PriceFeedResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PriceFeedError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            http,
            url: url.into(),
            parser,
        })
    }
}

#[async_trait]
impl PollSource for HttpPollSource {
    async fn fetch_once(&self) -> PriceFeedResult<PriceSample> {
        let response = self
            .http
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| PriceFeedError::ConnectionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PriceFeedError::HttpStatus(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PriceFeedError::InvalidMessage(e.to_string()))?;
        self.parser.parse(&body)
    }
}

/// Runs a `PollSource` every `interval`, first tick immediately
pub struct PollingFeed<S> {
    source: S,
    interval: Duration,
    health: Arc<FeedHealth>,
}

impl<S: PollSource> PollingFeed<S> {
    pub fn new(source: S, interval: Duration, health: Arc<FeedHealth>) -> Self {
        Self {
            source,
            interval,
            health,
        }
    }

    async fn tick(&self) -> FeedEvent {
        match self.source.fetch_once().await {
            Ok(sample) => {
                self.health.set_connected(true);
                self.health.record_sample(&sample);
                FeedEvent::Sample(sample)
            }
            Err(e) => {
                match &e {
                    PriceFeedError::ConnectionFailed(_) | PriceFeedError::HttpStatus(_) => {
                        self.health.set_connected(false);
                        self.health.record_error();
                    }
                    _ => self.health.record_malformed(),
                }
                FeedEvent::Error(e)
            }
        }
    }
}

#[async_trait]
impl<S: PollSource> FeedSource for PollingFeed<S> {
    fn name(&self) -> &str {
        "poll"
    }

    async fn run(&self, events: mpsc::Sender<FeedEvent>, mut shutdown: oneshot::Receiver<()>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Polling price source every {:?}", self.interval);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Price polling stopped");
                    return;
                }
                _ = interval.tick() => {}
            }

            let event = self.tick().await;
            if let FeedEvent::Error(e) = &event {
                warn!("Price fetch failed: {}", e);
            }
            if events.send(event).await.is_err() {
                debug!("Feed event channel closed");
                return;
            }
        }
    }
}
