//! Push feed over WebSocket

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use oracle_core::{PriceFeedError, PriceSample};

use crate::parse::{is_control_message, PayloadParser};
use crate::state::FeedHealth;

/// Event delivered by a feed
#[derive(Debug)]
pub enum FeedEvent {
    Sample(PriceSample),
    /// Skip this cycle; the feed keeps running
    Error(PriceFeedError),
    Disconnected { reason: String },
}

/// A source of price samples, push or pull.
///
/// `run` delivers events until `shutdown` fires or the receiver is gone.
#[async_trait]
pub trait FeedSource: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, events: mpsc::Sender<FeedEvent>, shutdown: oneshot::Receiver<()>);
}

/// Why a connection ended
enum SessionEnd {
    Shutdown,
    ReceiverClosed,
    Disconnected(String),
}

/// WebSocket stream configuration
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: String,
    /// Sent once after each connect
    pub subscribe_message: Option<String>,
    pub reconnect_delay: Duration,
}

/// WebSocket feed with indefinite fixed-delay reconnection
pub struct WebSocketFeed {
    config: StreamConfig,
    parser: PayloadParser,
    health: Arc<FeedHealth>,
}

impl WebSocketFeed {
    pub fn new(config: StreamConfig, parser: PayloadParser, health: Arc<FeedHealth>) -> Self {
        Self {
            config,
            parser,
            health,
        }
    }

    async fn connect_and_listen(
        &self,
        events: &mpsc::Sender<FeedEvent>,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> SessionEnd {
        info!("Connecting to price stream at {}", self.config.url);

        let ws_stream = tokio::select! {
            _ = &mut *shutdown => return SessionEnd::Shutdown,
            result = connect_async(self.config.url.as_str()) => match result {
                Ok((stream, _)) => stream,
                Err(e) => {
                    self.health.record_error();
                    let error = PriceFeedError::ConnectionFailed(e.to_string());
                    let reason = error.to_string();
                    if events.send(FeedEvent::Error(error)).await.is_err() {
                        return SessionEnd::ReceiverClosed;
                    }
                    return SessionEnd::Disconnected(reason);
                }
            },
        };
        let (mut write, mut read) = ws_stream.split();

        self.health.set_connected(true);
        info!("Connected to price stream");

        if let Some(subscribe) = &self.config.subscribe_message {
            if let Err(e) = write.send(Message::Text(subscribe.clone())).await {
                self.health.set_connected(false);
                return SessionEnd::Disconnected(format!("subscribe failed: {}", e));
            }
        }

        let end = loop {
            let msg = tokio::select! {
                _ = &mut *shutdown => {
                    let _ = write.send(Message::Close(None)).await;
                    break SessionEnd::Shutdown;
                }
                msg = read.next() => msg,
            };

            match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = self.handle_text(&text) {
                        if events.send(event).await.is_err() {
                            debug!("Feed event channel closed");
                            break SessionEnd::ReceiverClosed;
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = write.send(Message::Pong(data)).await {
                        break SessionEnd::Disconnected(format!("pong failed: {}", e));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("Price stream closed by server");
                    break SessionEnd::Disconnected(
                        frame.map_or_else(|| "closed by server".to_string(), |f| f.reason.to_string()),
                    );
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("Price stream error: {}", e);
                    self.health.record_error();
                    break SessionEnd::Disconnected(e.to_string());
                }
                None => break SessionEnd::Disconnected("stream ended".to_string()),
            }
        };

        self.health.set_connected(false);
        end
    }

    /// Turn one text frame into an event, or nothing for control frames
    fn handle_text(&self, text: &str) -> Option<FeedEvent> {
        let payload: Value = match serde_json::from_str(text) {
            Ok(payload) => payload,
            Err(e) => {
                self.health.record_malformed();
                return Some(FeedEvent::Error(PriceFeedError::InvalidMessage(e.to_string())));
            }
        };

        if is_control_message(&payload) {
            debug!("Ignoring control message: {}", text);
            return None;
        }

        match self.parser.parse_value(&payload) {
            Ok(sample) => {
                self.health.record_sample(&sample);
                Some(FeedEvent::Sample(sample))
            }
            Err(e) => {
                self.health.record_malformed();
                Some(FeedEvent::Error(e))
            }
        }
    }
}

#[async_trait]
impl FeedSource for WebSocketFeed {
    fn name(&self) -> &str {
        "websocket"
    }

    async fn run(&self, events: mpsc::Sender<FeedEvent>, mut shutdown: oneshot::Receiver<()>) {
        loop {
            let reason = match self.connect_and_listen(&events, &mut shutdown).await {
                SessionEnd::Shutdown => {
                    info!("Price stream stopped");
                    return;
                }
                SessionEnd::ReceiverClosed => return,
                SessionEnd::Disconnected(reason) => reason,
            };

            if events
                .send(FeedEvent::Disconnected {
                    reason: reason.clone(),
                })
                .await
                .is_err()
            {
                return;
            }

            warn!(
                "Price stream disconnected ({}), reconnecting in {:?}",
                reason, self.config.reconnect_delay
            );

            tokio::select! {
                _ = &mut shutdown => return,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
            self.health.record_reconnect();
        }
    }
}
