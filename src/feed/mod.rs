//! Market data inputs
//!
//! Price ticks with staleness checks and optional pairwise correlations

mod correlation;
mod synthetic;
mod types;

pub use correlation::{CorrelationMatrix, CorrelationSource};
pub use synthetic::SyntheticFeed;
pub use types::{is_stale, PriceTick};

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Trait for price feed implementations
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Subscribe to price updates
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<PriceTick>>;
}
