//! Risk parameters and drawdown

use crate::config::{check_pct, ConfigError, RiskConfig};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

/// Validated risk policy parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskParameters {
    /// Maximum (exposure + new notional) / bankroll
    pub max_risk_per_vault_pct: Decimal,
    /// Minimum relative distance between price and liquidation price
    pub liquidation_buffer_pct: Decimal,
    /// Maximum absolute pairwise correlation with other open positions
    pub correlation_threshold_pct: Decimal,
    /// Maximum drawdown from peak bankroll before new positions are refused
    pub max_drawdown_pct: Decimal,
    /// Minimum normalized signal score
    pub min_signal_confidence: Decimal,
    /// Minimum number of agreeing signals
    pub min_consensus_signals: u32,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            max_risk_per_vault_pct: dec!(0.50),
            liquidation_buffer_pct: dec!(0.02),
            correlation_threshold_pct: dec!(0.80),
            max_drawdown_pct: dec!(0.20),
            min_signal_confidence: dec!(0.60),
            min_consensus_signals: 2,
        }
    }
}

impl TryFrom<&RiskConfig> for RiskParameters {
    type Error = ConfigError;

    fn try_from(config: &RiskConfig) -> Result<Self, Self::Error> {
        let liquidation_buffer_pct = config.liquidation_buffer_pct;
        if liquidation_buffer_pct < Decimal::ZERO || liquidation_buffer_pct >= Decimal::ONE {
            return Err(ConfigError::PercentOutOfRange {
                field: "liquidation_buffer_pct",
                value: liquidation_buffer_pct,
            });
        }
        Ok(Self {
            max_risk_per_vault_pct: check_pct(
                "max_risk_per_vault_pct",
                config.max_risk_per_vault_pct,
            )?,
            liquidation_buffer_pct,
            correlation_threshold_pct: check_pct(
                "correlation_threshold_pct",
                config.correlation_threshold_pct,
            )?,
            max_drawdown_pct: check_pct("max_drawdown_pct", config.max_drawdown_pct)?,
            min_signal_confidence: check_pct(
                "min_signal_confidence",
                config.min_signal_confidence,
            )?,
            min_consensus_signals: config.min_consensus_signals,
        })
    }
}

/// Drawdown of `current` from `peak` as a fraction of the peak
pub fn drawdown(peak: Decimal, current: Decimal) -> Decimal {
    if peak <= Decimal::ZERO || current >= peak {
        return Decimal::ZERO;
    }
    (peak - current) / peak
}
