//! Startup header and periodic session summary

use chrono::{DateTime, Utc};
use std::fmt;
use tracing::info;

use oracle_core::{BotConfig, FeedMode, SessionState};
use oracle_executor::{CoordinatorPhase, UpdateCoordinator};
use oracle_price_feed::{FeedHealth, FeedStats};

/// Lines printed once at startup
pub fn header_lines(config: &BotConfig) -> Vec<String> {
    let feed_mode = match config.feed.mode {
        FeedMode::Stream => "stream".to_string(),
        FeedMode::Poll => format!("poll every {}s", config.feed.poll_interval_ms / 1_000),
    };

    vec![
        format!("Token:     {} ({})", config.token.name, config.token.symbol),
        format!(
            "Threshold: {}% ({}/{})",
            config.threshold.percent().normalize(),
            config.threshold.numerator,
            config.threshold.denominator
        ),
        format!("Contract:  {}", config.contract.address),
        format!("Wallet:    {}", config.wallet.address),
        format!("Feed:      {} ({})", config.feed.url, feed_mode),
        format!(
            "Fees:      {:?}, start {} gwei, cap {} gwei, {} attempts",
            config.fees.mode,
            config.fees.initial_gas_price_gwei,
            config.fees.max_gas_price_gwei,
            config.execution.max_attempts
        ),
    ]
}

pub fn log_header(config: &BotConfig) {
    for line in header_lines(config) {
        info!("{}", line);
    }
}

/// Point-in-time view of the session
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session: SessionState,
    pub phase: CoordinatorPhase,
    pub feed: FeedStats,
    pub symbol: String,
}

impl SessionSummary {
    pub fn capture(coordinator: &UpdateCoordinator, health: &FeedHealth, symbol: &str) -> Self {
        Self {
            session: coordinator.session(),
            phase: coordinator.phase(),
            feed: health.stats(),
            symbol: symbol.to_string(),
        }
    }
}

fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(|| "never".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let latest = match (&self.feed.last_sample, self.feed.last_sample_age_ms) {
            (Some(sample), Some(age)) => format!("{} {} ({}ms ago)", sample, self.symbol, age),
            _ => "none".to_string(),
        };

        write!(
            f,
            "confirmed={} failed={} cycles={} phase={} last_confirmed={} | feed messages={} malformed={} reconnects={} connected={} latest={}",
            self.session.transactions_confirmed,
            self.session.transactions_failed,
            self.session.cycles,
            self.phase,
            format_time(self.session.last_confirmed_at),
            self.feed.messages,
            self.feed.malformed,
            self.feed.reconnects,
            self.feed.connected,
            latest
        )
    }
}

pub fn log_summary(coordinator: &UpdateCoordinator, health: &FeedHealth, symbol: &str) {
    let summary = SessionSummary::capture(coordinator, health, symbol);
    info!(
        confirmed = summary.session.transactions_confirmed,
        failed = summary.session.transactions_failed,
        cycles = summary.session.cycles,
        "Session: {}",
        summary
    );
}
