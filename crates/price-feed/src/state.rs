//! Feed health state
//!
//! Counters are atomics; the latest sample sits behind a parking_lot lock.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use oracle_core::PriceSample;

/// Process-lifetime feed counters
#[derive(Debug, Default)]
pub struct FeedHealth {
    messages: AtomicU64,
    malformed: AtomicU64,
    errors: AtomicU64,
    reconnects: AtomicU64,
    connected: AtomicBool,
    last_sample: RwLock<Option<PriceSample>>,
}

impl FeedHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sample(&self, sample: &PriceSample) {
        self.messages.fetch_add(1, Ordering::Relaxed);
        *self.last_sample.write() = Some(sample.clone());
    }

    /// Payload that arrived but held no usable price
    pub fn record_malformed(&self) {
        self.messages.fetch_add(1, Ordering::Relaxed);
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// Transport-level failure (connect, HTTP status, read error)
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn last_sample(&self) -> Option<PriceSample> {
        self.last_sample.read().clone()
    }

    pub fn stats(&self) -> FeedStats {
        self.stats_at(Utc::now())
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> FeedStats {
        let last_sample = self.last_sample();
        FeedStats {
            messages: self.messages.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            connected: self.is_connected(),
            last_sample_age_ms: last_sample.as_ref().map(|s| s.age_ms(now)),
            last_sample,
        }
    }
}

/// Snapshot of feed health
#[derive(Debug, Clone)]
pub struct FeedStats {
    pub messages: u64,
    pub malformed: u64,
    pub errors: u64,
    pub reconnects: u64,
    pub connected: bool,
    pub last_sample: Option<PriceSample>,
    pub last_sample_age_ms: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use chrono::Duration;
    use std::sync::Arc;

    #[test]
    fn test_sample_age() {
        let health = FeedHealth::new();
        let observed = Utc::now();
        health.record_sample(&PriceSample::at(U256::from(1u8), 8, observed));

        let stats = health.stats_at(observed + Duration::milliseconds(250));
        assert_eq!(stats.messages, 1);
        assert_eq!(stats.last_sample_age_ms, Some(250));
    }

    #[test]
    fn test_malformed_counts_as_message() {
        let health = FeedHealth::new();
        health.record_malformed();
        health.record_malformed();

        let stats = health.stats();
        assert_eq!(stats.messages, 2);
        assert_eq!(stats.malformed, 2);
        assert!(stats.last_sample.is_none());
    }

    #[test]
    fn test_concurrent_updates() {
        use std::thread;

        let health = Arc::new(FeedHealth::new());
        let handles: Vec<_> = (0..4u64)
            .map(|i| {
                let health = Arc::clone(&health);
                thread::spawn(move || {
                    for j in 0..100u64 {
                        health.record_sample(&PriceSample::new(U256::from(i * 100 + j), 8));
                    }
                    health.record_reconnect();
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        let stats = health.stats();
        assert_eq!(stats.messages, 400);
        assert_eq!(stats.reconnects, 4);
    }
}
