//! Price feed ingestion
//!
//! Features:
//! - WebSocket stream feed with indefinite fixed-delay reconnection
//! - HTTP poll feed on a cancellable periodic timer
//! - JSON payload parsing straight to fixed point
//! - Feed health counters

pub mod feeds;
pub mod parse;
pub mod poll;
pub mod state;
pub mod supervisor;

pub use feeds::{FeedEvent, FeedSource, StreamConfig, WebSocketFeed};
pub use parse::PayloadParser;
pub use poll::{HttpPollSource, PollSource, PollingFeed};
pub use state::{FeedHealth, FeedStats};
pub use supervisor::{build_feed, FeedSupervisor};
