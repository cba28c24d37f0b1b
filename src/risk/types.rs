//! Risk management types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Policy decline with a structured reason code
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskRejection {
    /// Investment exceeds uncommitted bankroll
    #[error("insufficient bankroll: need {required}, uncommitted {available}")]
    InsufficientBankroll { required: Decimal, available: Decimal },
    /// Exposure would exceed the vault's risk limit
    #[error("risk ceiling exceeded: projected {projected_pct} > limit {limit_pct}")]
    RiskCeilingExceeded {
        projected_pct: Decimal,
        limit_pct: Decimal,
    },
    /// Too correlated with another open position
    #[error("correlation with {other_symbol} is {correlation}, limit {limit}")]
    CorrelationTooHigh {
        other_symbol: String,
        correlation: Decimal,
        limit: Decimal,
    },
    /// Projected liquidation price too close to the market
    #[error("liquidation buffer violated: distance {distance} <= buffer {buffer}")]
    LiquidationBufferViolated { distance: Decimal, buffer: Decimal },
    /// Vault already holds max_positions open positions
    #[error("position limit of {max_positions} reached")]
    PositionLimitExceeded { max_positions: usize },
    /// Signal below the confidence or consensus minimums
    #[error("signal too weak: score {score}, consensus {consensus_count}")]
    SignalTooWeak { score: Decimal, consensus_count: u32 },
    /// Vault drawdown from peak bankroll is beyond the limit
    #[error("drawdown {drawdown} beyond limit {limit}")]
    DrawdownLimitReached { drawdown: Decimal, limit: Decimal },
    /// Ledger compare-and-commit kept losing races
    #[error("ledger contention after {attempts} attempts")]
    LedgerContention { attempts: u32 },
}

impl RiskRejection {
    /// Stable reason code for logs and metrics
    pub fn code(&self) -> &'static str {
        match self {
            RiskRejection::InsufficientBankroll { .. } => "INSUFFICIENT_BANKROLL",
            RiskRejection::RiskCeilingExceeded { .. } => "RISK_CEILING_EXCEEDED",
            RiskRejection::CorrelationTooHigh { .. } => "CORRELATION_TOO_HIGH",
            RiskRejection::LiquidationBufferViolated { .. } => "LIQUIDATION_BUFFER_VIOLATED",
            RiskRejection::PositionLimitExceeded { .. } => "POSITION_LIMIT_EXCEEDED",
            RiskRejection::SignalTooWeak { .. } => "SIGNAL_TOO_WEAK",
            RiskRejection::DrawdownLimitReached { .. } => "DRAWDOWN_LIMIT_REACHED",
            RiskRejection::LedgerContention { .. } => "LEDGER_CONTENTION",
        }
    }
}
