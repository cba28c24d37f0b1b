//! Signal types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Latest Signal Center reading for a symbol/timeframe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    /// Trading symbol (e.g., "BTCUSDT")
    pub symbol: String,
    /// Timeframe the score was computed on (e.g., "15m")
    pub timeframe: String,
    /// Normalized score in [0, 1]
    pub score: Decimal,
    /// Number of agreeing signals
    pub consensus_count: u32,
    /// When the Signal Center produced the reading
    pub timestamp: DateTime<Utc>,
}

impl SignalSnapshot {
    /// Create a signal stamped now
    pub fn new(symbol: impl Into<String>, score: Decimal, consensus_count: u32) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe: "15m".to_string(),
            score,
            consensus_count,
            timestamp: Utc::now(),
        }
    }

    /// Set the timeframe
    pub fn with_timeframe(mut self, timeframe: impl Into<String>) -> Self {
        self.timeframe = timeframe.into();
        self
    }

    /// Override the production timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
