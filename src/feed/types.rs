//! Price feed types

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single price tick from the market data feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    /// Trading symbol (e.g., "BTCUSDT")
    pub symbol: String,
    /// Mark price
    pub price: Decimal,
    /// Feed timestamp of the price
    pub timestamp: DateTime<Utc>,
}

impl PriceTick {
    /// Create a tick stamped now
    pub fn new(symbol: impl Into<String>, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            timestamp: Utc::now(),
        }
    }

    /// Override the feed timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Age relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }
}

/// Whether data produced at `timestamp` is older than `max_age`
pub fn is_stale(timestamp: DateTime<Utc>, now: DateTime<Utc>, max_age: Duration) -> bool {
    now - timestamp > max_age
}
