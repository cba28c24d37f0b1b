//! Synthetic price path feed for simulations

use super::{PriceFeed, PriceTick};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::sync::mpsc;

/// Replays a piecewise-linear price path
#[derive(Debug, Clone)]
pub struct SyntheticFeed {
    symbol: String,
    start: Decimal,
    legs: Vec<(Decimal, u32)>,
    interval: Duration,
}

impl SyntheticFeed {
    /// Start a path at `start`
    pub fn new(symbol: impl Into<String>, start: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            start,
            legs: vec![],
            interval: Duration::ZERO,
        }
    }

    /// Move linearly to `target` over `steps` ticks
    pub fn ramp_to(mut self, target: Decimal, steps: u32) -> Self {
        self.legs.push((target, steps.max(1)));
        self
    }

    /// Pause between ticks
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Every price of the path, starting price included
    pub fn prices(&self) -> Vec<Decimal> {
        let mut prices = vec![self.start];
        let mut from = self.start;
        for &(target, steps) in &self.legs {
            let step = (target - from) / Decimal::from(steps);
            for i in 1..=steps {
                let price = if i == steps {
                    target
                } else {
                    from + step * Decimal::from(i)
                };
                prices.push(price.round_dp(8));
            }
            from = target;
        }
        prices
    }
}

#[async_trait]
impl PriceFeed for SyntheticFeed {
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<PriceTick>> {
        let prices = self.prices();
        let (tick_tx, tick_rx) = mpsc::channel(prices.len().max(1));
        let symbol = self.symbol.clone();
        let interval = self.interval;

        tokio::spawn(async move {
            for price in prices {
                if tick_tx.send(PriceTick::new(symbol.clone(), price)).await.is_err() {
                    tracing::debug!("Tick receiver dropped, stopping synthetic feed");
                    break;
                }
                if !interval.is_zero() {
                    tokio::time::sleep(interval).await;
                }
            }
        });

        Ok(tick_rx)
    }
}
