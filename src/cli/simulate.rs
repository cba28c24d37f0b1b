//! Simulate command implementation

use crate::config::Config;
use crate::engine::{Engine, TickOutcome};
use crate::execution::PaperAdapter;
use crate::feed::{PriceFeed, SyntheticFeed};
use crate::position::{Direction, PositionSnapshot};
use crate::signal::SignalSnapshot;
use anyhow::Context;
use clap::Args;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Symbol to trade
    #[arg(long, default_value = "BTCUSDT")]
    pub symbol: String,

    /// Position direction: long or short
    #[arg(long, default_value = "long")]
    pub direction: Direction,

    /// Starting price of the path
    #[arg(long, default_value = "100")]
    pub start: Decimal,

    /// Path legs as PRICE:STEPS, applied in order
    #[arg(
        long = "leg",
        value_name = "PRICE:STEPS",
        default_values = ["100:3", "115:15", "120:5", "117:3", "105:12"]
    )]
    pub legs: Vec<String>,

    /// Signal score on the first tick
    #[arg(long, default_value = "0.65")]
    pub score: Decimal,

    /// Score added on every tick, capped at 1
    #[arg(long, default_value = "0.06")]
    pub score_step: Decimal,

    /// Consensus count reported by every signal
    #[arg(long, default_value = "3")]
    pub consensus: u32,

    /// Paper adapter slippage
    #[arg(long, default_value = "0")]
    pub slippage: Decimal,

    /// Share of every request the paper adapter fills
    #[arg(long, default_value = "1")]
    pub fill_ratio: Decimal,

    /// Output format: json or table
    #[arg(long, default_value = "table")]
    pub format: String,
}

/// One simulated step
#[derive(Debug, Serialize)]
struct SimulationRow {
    tick: usize,
    price: Decimal,
    outcomes: Vec<String>,
    snapshot: PositionSnapshot,
}

impl SimulateArgs {
    fn feed(&self) -> anyhow::Result<SyntheticFeed> {
        let mut feed = SyntheticFeed::new(self.symbol.clone(), self.start);
        for leg in &self.legs {
            let (price, steps) = leg
                .split_once(':')
                .with_context(|| format!("leg {leg} is not PRICE:STEPS"))?;
            let price: Decimal = price.trim().parse().with_context(|| format!("bad price in leg {leg}"))?;
            let steps: u32 = steps.trim().parse().with_context(|| format!("bad steps in leg {leg}"))?;
            feed = feed.ramp_to(price, steps);
        }
        Ok(feed)
    }

    fn signal(&self, tick: usize) -> SignalSnapshot {
        let score = (self.score + self.score_step * Decimal::from(tick)).min(dec!(1));
        SignalSnapshot::new(self.symbol.clone(), score, self.consensus)
    }

    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let settings = config.validate()?;
        let adapter = Arc::new(PaperAdapter::new(self.slippage).with_fill_ratio(self.fill_ratio));
        let engine = Engine::new(settings, adapter, None);

        let mut ticks = self.feed()?.subscribe().await?;
        let first = ticks.recv().await.context("empty price path")?;
        let price = first.price;
        let handle = engine
            .open(&self.symbol, self.direction, self.signal(0), first)
            .await?;

        let snapshot = handle.snapshot().await?;
        let opened = if snapshot.on_hold {
            TickOutcome::OnHold
        } else {
            TickOutcome::StageAdded {
                stage_index: snapshot.stage_index,
            }
        };
        let mut rows = vec![SimulationRow {
            tick: 0,
            price,
            outcomes: vec![format!("{opened:?}")],
            snapshot,
        }];

        let mut index = 0;
        while let Some(tick) = ticks.recv().await {
            index += 1;
            let price = tick.price;
            let mut outcomes = vec![];
            for result in [
                handle.on_tick(tick).await,
                handle.on_signal(self.signal(index)).await,
            ] {
                match result {
                    Ok(TickOutcome::NoAction | TickOutcome::Inactive) => {}
                    Ok(outcome) => outcomes.push(format!("{outcome:?}")),
                    Err(err) if err.is_recoverable() => outcomes.push(format!("skipped: {err}")),
                    Err(err) => return Err(err.into()),
                }
            }

            let snapshot = handle.snapshot().await?;
            let done = snapshot.status.is_terminal();
            rows.push(SimulationRow {
                tick: index,
                price,
                outcomes,
                snapshot,
            });
            if done {
                break;
            }
        }

        match self.format.as_str() {
            "json" => println!("{}", serde_json::to_string_pretty(&rows)?),
            _ => print_table(&rows),
        }
        println!(
            "Vault {}: bankroll {}, exposure {}",
            engine.vault().id(),
            engine.vault().bankroll(),
            engine.vault().aggregate_exposure()
        );
        Ok(())
    }
}

fn print_table(rows: &[SimulationRow]) {
    println!(
        "{:>4}  {:>10}  {:>5}  {:>10}  {:>10}  {:>9}  {:<16}  outcome",
        "tick", "price", "stage", "invested", "margin", "remaining", "status"
    );
    for row in rows {
        let s = &row.snapshot;
        println!(
            "{:>4}  {:>10}  {:>5}  {:>10}  {:>10}  {:>9}  {:<16}  {}",
            row.tick,
            row.price.round_dp(4),
            s.stage_index,
            s.total_invested.round_dp(2),
            s.current_margin.round_dp(2),
            s.remaining_fraction,
            s.status.to_string(),
            row.outcomes.join(", ")
        );
    }
}
