//! Prometheus metrics through the `metrics` facade

use crate::position::PositionSnapshot;
use crate::vault::LedgerSnapshot;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Per-position gauges
#[derive(Debug, Clone, Copy)]
pub enum PositionGauge {
    TotalInvested,
    CurrentMargin,
    RemainingFraction,
    StageIndex,
    RealizedPnl,
}

impl PositionGauge {
    pub fn name(self) -> &'static str {
        match self {
            PositionGauge::TotalInvested => "scale_engine_total_invested",
            PositionGauge::CurrentMargin => "scale_engine_current_margin",
            PositionGauge::RemainingFraction => "scale_engine_remaining_fraction",
            PositionGauge::StageIndex => "scale_engine_stage_index",
            PositionGauge::RealizedPnl => "scale_engine_realized_pnl",
        }
    }
}

/// Per-vault gauges
#[derive(Debug, Clone, Copy)]
pub enum VaultGauge {
    Bankroll,
    AggregateExposure,
    OpenPositions,
    DrawdownPct,
}

impl VaultGauge {
    pub fn name(self) -> &'static str {
        match self {
            VaultGauge::Bankroll => "scale_engine_bankroll",
            VaultGauge::AggregateExposure => "scale_engine_aggregate_exposure",
            VaultGauge::OpenPositions => "scale_engine_open_positions",
            VaultGauge::DrawdownPct => "scale_engine_drawdown_pct",
        }
    }
}

/// Gauges are exported as f64; all bookkeeping stays in Decimal
fn as_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

pub fn record_stage(symbol: &str) {
    ::metrics::counter!("scale_engine_stages_total", "symbol" => symbol.to_string()).increment(1);
}

pub fn record_rejection(reason: &'static str) {
    ::metrics::counter!("scale_engine_rejections_total", "reason" => reason).increment(1);
}

pub fn record_profit_take(symbol: &str, level: usize) {
    ::metrics::counter!(
        "scale_engine_profit_takes_total",
        "symbol" => symbol.to_string(),
        "level" => level.to_string()
    )
    .increment(1);
}

pub fn record_liquidation(symbol: &str) {
    ::metrics::counter!("scale_engine_liquidations_total", "symbol" => symbol.to_string()).increment(1);
}

pub fn record_execution_failure(op: &'static str) {
    ::metrics::counter!("scale_engine_execution_failures_total", "op" => op).increment(1);
}

pub fn record_hold(op: &'static str) {
    ::metrics::counter!("scale_engine_holds_total", "op" => op).increment(1);
}

pub fn set_position_gauges(snapshot: &PositionSnapshot) {
    let values = [
        (PositionGauge::TotalInvested, snapshot.total_invested),
        (PositionGauge::CurrentMargin, snapshot.current_margin),
        (PositionGauge::RemainingFraction, snapshot.remaining_fraction),
        (PositionGauge::StageIndex, Decimal::from(snapshot.stage_index)),
        (PositionGauge::RealizedPnl, snapshot.realized_pnl),
    ];
    for (gauge, value) in values {
        ::metrics::gauge!(gauge.name(), "position_id" => snapshot.position_id.to_string(), "symbol" => snapshot.symbol.clone())
            .set(as_f64(value));
    }
}

pub fn set_vault_gauges(vault_id: &str, ledger: &LedgerSnapshot) {
    let values = [
        (VaultGauge::Bankroll, ledger.bankroll()),
        (VaultGauge::AggregateExposure, ledger.aggregate_exposure()),
        (VaultGauge::OpenPositions, Decimal::from(ledger.open_positions())),
        (VaultGauge::DrawdownPct, ledger.drawdown()),
    ];
    for (gauge, value) in values {
        ::metrics::gauge!(gauge.name(), "vault" => vault_id.to_string()).set(as_f64(value));
    }
}
