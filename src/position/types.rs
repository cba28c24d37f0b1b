//! Position and stage types

use super::math::StageTotals;
use crate::profit::TrailingStop;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short
    pub fn sign(self) -> Decimal {
        match self {
            Direction::Long => Decimal::ONE,
            Direction::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "long" | "buy" => Ok(Direction::Long),
            "short" | "sell" => Ok(Direction::Short),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

/// Why a stage was added
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerReason {
    /// First stage of the position
    Initial,
    /// Signal score improved beyond the configured delta
    BetterScore,
    /// Price retraced against the position with the thesis intact
    PriceRetrace,
}

/// Position lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    /// Admitted, no stage filled yet
    Opening,
    /// A stage request is in flight
    Scaling,
    /// Holding stages, watching for profit or further scaling
    Monitoring,
    TakingProfit1,
    Trailing1,
    TakingProfit2,
    Trailing2,
    Closed,
    Liquidated,
}

impl PositionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PositionStatus::Closed | PositionStatus::Liquidated)
    }

    /// States in which new stages may be evaluated
    pub fn accepts_scaling(self) -> bool {
        matches!(
            self,
            PositionStatus::Opening | PositionStatus::Scaling | PositionStatus::Monitoring
        )
    }

    /// States belonging to the profit-taking cascade
    pub fn is_taking_profit(self) -> bool {
        matches!(
            self,
            PositionStatus::TakingProfit1
                | PositionStatus::Trailing1
                | PositionStatus::TakingProfit2
                | PositionStatus::Trailing2
        )
    }

    /// Guarded transition table
    pub fn can_transition_to(self, next: PositionStatus) -> bool {
        use PositionStatus::*;
        match (self, next) {
            (Closed | Liquidated, _) => false,
            (_, Closed) => true,
            (Opening, Scaling) => true,
            (Opening, Liquidated) => false,
            (Scaling, Monitoring | Opening | Liquidated) => true,
            (Monitoring, Scaling | TakingProfit1 | Liquidated) => true,
            (TakingProfit1, Trailing1 | Liquidated) => true,
            (Trailing1, TakingProfit2 | Liquidated) => true,
            (TakingProfit2, Trailing2 | Liquidated) => true,
            (Trailing2, Liquidated) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PositionStatus::Opening => "OPENING",
            PositionStatus::Scaling => "SCALING",
            PositionStatus::Monitoring => "MONITORING",
            PositionStatus::TakingProfit1 => "TAKING_PROFIT_1",
            PositionStatus::Trailing1 => "TRAILING_1",
            PositionStatus::TakingProfit2 => "TAKING_PROFIT_2",
            PositionStatus::Trailing2 => "TRAILING_2",
            PositionStatus::Closed => "CLOSED",
            PositionStatus::Liquidated => "LIQUIDATED",
        };
        f.write_str(name)
    }
}

/// One executed capital commitment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingStage {
    /// 1-based stage number
    pub stage_index: u8,
    pub bankroll_pct: Decimal,
    pub leverage: Decimal,
    /// Margin committed by this stage
    pub investment_amount: Decimal,
    /// investment_amount × leverage
    pub position_notional: Decimal,
    /// Filled price
    pub entry_price: Decimal,
    /// Signal score when the stage was taken
    pub signal_score: Decimal,
    pub trigger_reason: TriggerReason,
    pub timestamp: DateTime<Utc>,
}

/// A stage the scaler wants to add, before execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageProposal {
    pub stage_index: u8,
    pub bankroll_pct: Decimal,
    pub leverage: Decimal,
    pub investment_amount: Decimal,
    pub position_notional: Decimal,
    pub reference_price: Decimal,
    pub signal_score: Decimal,
    pub trigger_reason: TriggerReason,
}

/// Operation awaiting an execution confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PendingOperation {
    /// Bankroll is reserved for this stage
    StageAdd {
        proposal: StageProposal,
        previous_status: PositionStatus,
    },
    /// Partial close at the given profit level (1-based)
    ProfitTake { level: usize, close_fraction: Decimal },
    /// Close of everything that remains
    Close,
}

/// HOLD sub-state: automated action is frozen until confirmed or cancelled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldState {
    pub pending: PendingOperation,
    pub since: DateTime<Utc>,
}

/// A leveraged position built from one or more stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub vault_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub stages: Vec<ScalingStage>,
    pub status: PositionStatus,
    pub total_invested: Decimal,
    pub total_position_value: Decimal,
    /// Notional-weighted average entry price
    pub entry_price: Decimal,
    pub liquidation_price: Option<Decimal>,
    pub profit_threshold: Decimal,
    pub take_profit_trigger: Decimal,
    /// Fraction of the original size still open
    pub remaining_fraction: Decimal,
    pub realized_pnl: Decimal,
    pub trailing: Option<TrailingStop>,
    pub hold: Option<HoldState>,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Create an empty position awaiting its first stage
    pub fn new(vault_id: impl Into<String>, symbol: impl Into<String>, direction: Direction) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            vault_id: vault_id.into(),
            symbol: symbol.into(),
            direction,
            stages: vec![],
            status: PositionStatus::Opening,
            total_invested: Decimal::ZERO,
            total_position_value: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            liquidation_price: None,
            profit_threshold: Decimal::ZERO,
            take_profit_trigger: Decimal::ZERO,
            remaining_fraction: Decimal::ONE,
            realized_pnl: Decimal::ZERO,
            trailing: None,
            hold: None,
            opened_at: now,
            updated_at: now,
        }
    }

    /// Number of executed stages
    pub fn stage_index(&self) -> u8 {
        self.stages.len() as u8
    }

    pub fn last_stage(&self) -> Option<&ScalingStage> {
        self.stages.last()
    }

    pub fn is_on_hold(&self) -> bool {
        self.hold.is_some()
    }

    /// Move to `next`, refusing transitions the lifecycle does not allow
    pub fn transition(&mut self, next: PositionStatus) -> Result<(), InvalidTransition> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        tracing::debug!(position_id = %self.id, from = %self.status, to = %next, "Status transition");
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Append an executed stage and recompute every derived invariant
    pub fn push_stage(
        &mut self,
        stage: ScalingStage,
        profit_threshold_pct: Decimal,
        liquidation_buffer_pct: Decimal,
    ) {
        debug_assert_eq!(stage.stage_index, self.stage_index() + 1);
        self.stages.push(stage);

        let totals = StageTotals::from_stages(
            self.direction,
            &self.stages,
            profit_threshold_pct,
            liquidation_buffer_pct,
        );
        self.apply_totals(&totals);
    }

    fn apply_totals(&mut self, totals: &StageTotals) {
        self.total_invested = totals.total_invested;
        self.total_position_value = totals.total_position_value;
        self.entry_price = totals.entry_price;
        self.profit_threshold = totals.profit_threshold;
        self.take_profit_trigger = totals.take_profit_trigger;
        self.liquidation_price = totals.liquidation_price;
        self.updated_at = Utc::now();
    }

    /// Unrealized P&L of the original size at `price`
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        super::math::unrealized_pnl(
            self.direction,
            self.entry_price,
            self.total_position_value,
            price,
        )
    }

    /// Margin of the still-open part of the position at `price`
    pub fn current_margin(&self, price: Decimal) -> Decimal {
        (self.total_invested + self.unrealized_pnl(price)) * self.remaining_fraction
    }

    /// Capital still committed to the open part of the position
    pub fn committed_capital(&self) -> Decimal {
        self.total_invested * self.remaining_fraction
    }

    /// Whether `price` has crossed the liquidation price
    pub fn is_liquidated_at(&self, price: Decimal) -> bool {
        match self.liquidation_price {
            Some(liq) if !self.stages.is_empty() => {
                super::math::crosses_liquidation(self.direction, price, liq)
            }
            _ => false,
        }
    }

    /// Reduce the open size by `fraction` of the original
    pub fn reduce(&mut self, fraction: Decimal) {
        let fraction = fraction.min(self.remaining_fraction).max(Decimal::ZERO);
        self.remaining_fraction -= fraction;
        self.updated_at = Utc::now();
    }

    /// Read-only reporting view
    pub fn snapshot(&self, price: Option<Decimal>) -> PositionSnapshot {
        let current_margin = match price {
            Some(p) if !self.stages.is_empty() && !self.status.is_terminal() => {
                self.current_margin(p)
            }
            _ => self.committed_capital(),
        };
        PositionSnapshot {
            position_id: self.id,
            symbol: self.symbol.clone(),
            direction: self.direction,
            stage_index: self.stage_index(),
            total_invested: self.total_invested,
            profit_threshold: self.profit_threshold,
            take_profit_trigger: self.take_profit_trigger,
            liquidation_price: self.liquidation_price,
            current_margin,
            remaining_fraction: self.remaining_fraction,
            realized_pnl: self.realized_pnl,
            status: self.status,
            on_hold: self.is_on_hold(),
        }
    }
}

/// Refused lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: PositionStatus,
    pub to: PositionStatus,
}

/// Read-only snapshot exposed to reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub position_id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub stage_index: u8,
    pub total_invested: Decimal,
    pub profit_threshold: Decimal,
    pub take_profit_trigger: Decimal,
    pub liquidation_price: Option<Decimal>,
    pub current_margin: Decimal,
    pub remaining_fraction: Decimal,
    pub realized_pnl: Decimal,
    pub status: PositionStatus,
    pub on_hold: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn stage(index: u8, invest: Decimal, leverage: Decimal, price: Decimal) -> ScalingStage {
        ScalingStage {
            stage_index: index,
            bankroll_pct: dec!(0.01),
            leverage,
            investment_amount: invest,
            position_notional: invest * leverage,
            entry_price: price,
            signal_score: dec!(0.7),
            trigger_reason: TriggerReason::Initial,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_new_position_is_opening() {
        let position = Position::new("main", "BTCUSDT", Direction::Long);
        assert_eq!(position.status, PositionStatus::Opening);
        assert_eq!(position.stage_index(), 0);
        assert_eq!(position.remaining_fraction, dec!(1));
        assert!(position.liquidation_price.is_none());
        assert!(!position.is_liquidated_at(dec!(0.0001)));
    }

    #[test]
    fn test_worked_example_invariants() {
        let mut position = Position::new("main", "BTCUSDT", Direction::Long);
        let stages = [
            (dec!(100), dec!(20)),
            (dec!(200), dec!(10)),
            (dec!(400), dec!(5)),
            (dec!(800), dec!(2)),
        ];
        for (i, (invest, lev)) in stages.into_iter().enumerate() {
            position.push_stage(stage(i as u8 + 1, invest, lev, dec!(100)), dec!(0.75), dec!(0.02));
        }

        assert_eq!(position.total_invested, dec!(1500));
        assert_eq!(position.total_position_value, dec!(7600));
        assert_eq!(position.profit_threshold, dec!(1125));
        assert_eq!(position.take_profit_trigger, dec!(2625));
        assert_eq!(position.entry_price, dec!(100));
    }

    #[test]
    fn test_current_margin_tracks_remaining_fraction() {
        let mut position = Position::new("main", "ETHUSDT", Direction::Long);
        position.push_stage(stage(1, dec!(100), dec!(10), dec!(100)), dec!(0.75), dec!(0.02));

        // notional 1000, +5% => +50
        assert_eq!(position.current_margin(dec!(105)), dec!(150));

        position.reduce(dec!(0.30));
        assert_eq!(position.remaining_fraction, dec!(0.70));
        assert_eq!(position.current_margin(dec!(105)), dec!(105));
    }

    #[test]
    fn test_short_pnl_sign() {
        let mut position = Position::new("main", "ETHUSDT", Direction::Short);
        position.push_stage(stage(1, dec!(100), dec!(10), dec!(100)), dec!(0.75), dec!(0.02));

        assert_eq!(position.unrealized_pnl(dec!(95)), dec!(50));
        assert_eq!(position.unrealized_pnl(dec!(110)), dec!(-100));
    }

    #[test]
    fn test_reduce_never_goes_negative() {
        let mut position = Position::new("main", "BTCUSDT", Direction::Long);
        position.reduce(dec!(0.8));
        position.reduce(dec!(0.5));
        assert_eq!(position.remaining_fraction, dec!(0));
    }

    #[test]
    fn test_transition_guard() {
        let mut position = Position::new("main", "BTCUSDT", Direction::Long);
        assert!(position.transition(PositionStatus::TakingProfit1).is_err());
        position.transition(PositionStatus::Scaling).unwrap();
        position.transition(PositionStatus::Monitoring).unwrap();
        position.transition(PositionStatus::TakingProfit1).unwrap();
        assert!(position.transition(PositionStatus::TakingProfit2).is_err());
        position.transition(PositionStatus::Liquidated).unwrap();
        assert!(position.transition(PositionStatus::Closed).is_err());
    }

    #[test]
    fn test_transition_table_terminal_states() {
        use PositionStatus::*;
        let all = [
            Opening,
            Scaling,
            Monitoring,
            TakingProfit1,
            Trailing1,
            TakingProfit2,
            Trailing2,
            Closed,
            Liquidated,
        ];
        for next in all {
            assert!(!Closed.can_transition_to(next));
            assert!(!Liquidated.can_transition_to(next));
        }
        for from in all.iter().filter(|s| !s.is_terminal()) {
            assert!(from.can_transition_to(Closed));
        }
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("LONG".parse::<Direction>().unwrap(), Direction::Long);
        assert_eq!("sell".parse::<Direction>().unwrap(), Direction::Short);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_snapshot_fields() {
        let mut position = Position::new("main", "BTCUSDT", Direction::Long);
        position.push_stage(stage(1, dec!(100), dec!(20), dec!(100)), dec!(0.75), dec!(0.02));

        let snapshot = position.snapshot(Some(dec!(101)));
        assert_eq!(snapshot.stage_index, 1);
        assert_eq!(snapshot.total_invested, dec!(100));
        assert_eq!(snapshot.take_profit_trigger, dec!(175));
        assert_eq!(snapshot.current_margin, dec!(120));
        assert!(!snapshot.on_hold);
    }
}
