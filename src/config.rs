//! Configuration types for scale-engine

use crate::position::{ScalingProgression, ScalingTriggers};
use crate::profit::{ProfitLevel, ProfitPlan};
use crate::risk::RiskParameters;
use crate::vault::VaultLimits;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Malformed configuration. Fatal at load time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("bankroll must be positive, got {0}")]
    NonPositiveBankroll(Decimal),
    #[error("max_positions must be at least 1")]
    ZeroMaxPositions,
    #[error("{field} must be in (0, 1], got {value}")]
    PercentOutOfRange { field: &'static str, value: Decimal },
    #[error("bankroll_pcts has {pcts} entries but leverages has {leverages}")]
    SequenceLengthMismatch { pcts: usize, leverages: usize },
    #[error("scaling progression must have between 1 and 255 stages, got {0}")]
    StageCount(usize),
    #[error("leverage must be at least 1, got {0}")]
    LeverageBelowOne(Decimal),
    #[error("leverage must be strictly decreasing: stage {stage} has {current} after {previous}")]
    NonDecreasingLeverage {
        stage: usize,
        previous: Decimal,
        current: Decimal,
    },
    #[error("bankroll pct must be strictly increasing: stage {stage} has {current} after {previous}")]
    NonIncreasingBankrollPct {
        stage: usize,
        previous: Decimal,
        current: Decimal,
    },
    #[error("profit plan needs exactly {expected} partial levels, got {actual}")]
    ProfitLevelCount { expected: usize, actual: usize },
    #[error("profit plan close fractions sum to {0}, must leave a remainder below 1")]
    CloseFractionsExhausted(Decimal),
    #[error("retrace_pct {retrace} must be below max_retrace_pct {max}")]
    RetraceBounds { retrace: Decimal, max: Decimal },
    #[error("{0} must be non-zero")]
    ZeroDuration(&'static str),
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub vault: VaultConfig,
    #[serde(default)]
    pub scaling: ScalingConfig,
    #[serde(default)]
    pub profit: ProfitConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Vault custody configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub id: String,
    pub bankroll: Decimal,
    pub max_positions: usize,
    pub risk_ceiling_pct: Decimal,
}

/// Stage progression and scaling trigger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingConfig {
    /// Target profit as a fraction of total invested
    #[serde(default = "default_profit_threshold_pct")]
    pub profit_threshold_pct: Decimal,

    /// Bankroll fraction committed by each stage
    #[serde(default = "default_bankroll_pcts")]
    pub bankroll_pcts: Vec<Decimal>,

    /// Leverage applied to each stage
    #[serde(default = "default_leverages")]
    pub leverages: Vec<Decimal>,

    /// Score gain over the prior stage that triggers BETTER_SCORE
    #[serde(default = "default_score_improvement_delta")]
    pub score_improvement_delta: Decimal,

    /// Adverse move from the prior stage entry that triggers PRICE_RETRACE
    #[serde(default = "default_retrace_pct")]
    pub retrace_pct: Decimal,

    /// Adverse move beyond which the original thesis is considered broken
    #[serde(default = "default_max_retrace_pct")]
    pub max_retrace_pct: Decimal,
}

fn default_profit_threshold_pct() -> Decimal {
    Decimal::new(75, 2) // 0.75
}
fn default_bankroll_pcts() -> Vec<Decimal> {
    vec![
        Decimal::new(1, 2),
        Decimal::new(2, 2),
        Decimal::new(4, 2),
        Decimal::new(8, 2),
    ]
}
fn default_leverages() -> Vec<Decimal> {
    vec![
        Decimal::from(20),
        Decimal::from(10),
        Decimal::from(5),
        Decimal::from(2),
    ]
}
fn default_score_improvement_delta() -> Decimal {
    Decimal::new(5, 2) // 0.05
}
fn default_retrace_pct() -> Decimal {
    Decimal::new(2, 2) // 2%
}
fn default_max_retrace_pct() -> Decimal {
    Decimal::new(10, 2) // 10%
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            profit_threshold_pct: default_profit_threshold_pct(),
            bankroll_pcts: default_bankroll_pcts(),
            leverages: default_leverages(),
            score_improvement_delta: default_score_improvement_delta(),
            retrace_pct: default_retrace_pct(),
            max_retrace_pct: default_max_retrace_pct(),
        }
    }
}

/// Profit-taking cascade configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfitConfig {
    #[serde(default = "default_profit_levels")]
    pub levels: Vec<ProfitLevel>,
}

fn default_profit_levels() -> Vec<ProfitLevel> {
    vec![
        ProfitLevel {
            close_fraction: Decimal::new(30, 2),
            trailing_stop_pct: Decimal::new(5, 2),
        },
        ProfitLevel {
            close_fraction: Decimal::new(25, 2),
            trailing_stop_pct: Decimal::new(3, 2),
        },
    ]
}

impl Default for ProfitConfig {
    fn default() -> Self {
        Self {
            levels: default_profit_levels(),
        }
    }
}

/// Risk policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_max_risk_per_vault_pct")]
    pub max_risk_per_vault_pct: Decimal,
    #[serde(default = "default_liquidation_buffer_pct")]
    pub liquidation_buffer_pct: Decimal,
    #[serde(default = "default_correlation_threshold_pct")]
    pub correlation_threshold_pct: Decimal,
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: Decimal,
    #[serde(default = "default_min_signal_confidence")]
    pub min_signal_confidence: Decimal,
    #[serde(default = "default_min_consensus_signals")]
    pub min_consensus_signals: u32,
}

fn default_max_risk_per_vault_pct() -> Decimal {
    Decimal::new(50, 2)
}
fn default_liquidation_buffer_pct() -> Decimal {
    Decimal::new(2, 2)
}
fn default_correlation_threshold_pct() -> Decimal {
    Decimal::new(80, 2)
}
fn default_max_drawdown_pct() -> Decimal {
    Decimal::new(20, 2)
}
fn default_min_signal_confidence() -> Decimal {
    Decimal::new(60, 2)
}
fn default_min_consensus_signals() -> u32 {
    2
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_risk_per_vault_pct: default_max_risk_per_vault_pct(),
            liquidation_buffer_pct: default_liquidation_buffer_pct(),
            correlation_threshold_pct: default_correlation_threshold_pct(),
            max_drawdown_pct: default_max_drawdown_pct(),
            min_signal_confidence: default_min_signal_confidence(),
            min_consensus_signals: default_min_consensus_signals(),
        }
    }
}

/// Engine timing and concurrency configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Prices and signals older than this are skipped
    #[serde(default = "default_max_data_age_secs")]
    pub max_data_age_secs: u64,

    /// How long to wait for an execution confirmation before HOLD
    #[serde(default = "default_confirmation_timeout_ms")]
    pub confirmation_timeout_ms: u64,

    /// Ledger compare-and-commit attempts before giving up
    #[serde(default = "default_max_commit_retries")]
    pub max_commit_retries: u32,

    /// Per-position mailbox depth
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

fn default_max_data_age_secs() -> u64 {
    30
}
fn default_confirmation_timeout_ms() -> u64 {
    5_000
}
fn default_max_commit_retries() -> u32 {
    8
}
fn default_mailbox_capacity() -> usize {
    64
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_data_age_secs: default_max_data_age_secs(),
            confirmation_timeout_ms: default_confirmation_timeout_ms(),
            max_commit_retries: default_max_commit_retries(),
            mailbox_capacity: default_mailbox_capacity(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON log lines instead of the human-readable format
    #[serde(default)]
    pub json: bool,
    /// Serve Prometheus metrics on this port when set
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
            metrics_port: None,
        }
    }
}

/// Engine timing after validation
#[derive(Debug, Clone)]
pub struct EngineTiming {
    pub max_data_age: chrono::Duration,
    pub confirmation_timeout: Duration,
    pub max_commit_retries: u32,
    pub mailbox_capacity: usize,
}

impl Default for EngineTiming {
    fn default() -> Self {
        Self {
            max_data_age: chrono::Duration::seconds(default_max_data_age_secs() as i64),
            confirmation_timeout: Duration::from_millis(default_confirmation_timeout_ms()),
            max_commit_retries: default_max_commit_retries(),
            mailbox_capacity: default_mailbox_capacity(),
        }
    }
}

/// Fully validated settings the engine is built from
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub vault: VaultLimits,
    pub bankroll: Decimal,
    pub progression: ScalingProgression,
    pub triggers: ScalingTriggers,
    pub profit_threshold_pct: Decimal,
    pub plan: ProfitPlan,
    pub risk: RiskParameters,
    pub timing: EngineTiming,
}

pub(crate) fn check_pct(field: &'static str, value: Decimal) -> Result<Decimal, ConfigError> {
    if value <= Decimal::ZERO || value > Decimal::ONE {
        return Err(ConfigError::PercentOutOfRange { field, value });
    }
    Ok(value)
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate every section and build the engine settings
    pub fn validate(&self) -> Result<EngineSettings, ConfigError> {
        if self.vault.bankroll <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveBankroll(self.vault.bankroll));
        }
        if self.vault.max_positions == 0 {
            return Err(ConfigError::ZeroMaxPositions);
        }
        let vault = VaultLimits {
            id: self.vault.id.clone(),
            max_positions: self.vault.max_positions,
            risk_ceiling_pct: check_pct("risk_ceiling_pct", self.vault.risk_ceiling_pct)?,
        };

        let progression =
            ScalingProgression::new(&self.scaling.bankroll_pcts, &self.scaling.leverages)?;
        let triggers = ScalingTriggers {
            score_improvement_delta: check_pct(
                "score_improvement_delta",
                self.scaling.score_improvement_delta,
            )?,
            retrace_pct: check_pct("retrace_pct", self.scaling.retrace_pct)?,
            max_retrace_pct: check_pct("max_retrace_pct", self.scaling.max_retrace_pct)?,
        };
        if triggers.retrace_pct >= triggers.max_retrace_pct {
            return Err(ConfigError::RetraceBounds {
                retrace: triggers.retrace_pct,
                max: triggers.max_retrace_pct,
            });
        }
        let profit_threshold_pct =
            check_pct("profit_threshold_pct", self.scaling.profit_threshold_pct)?;

        let plan = ProfitPlan::new(&self.profit.levels)?;
        let risk = RiskParameters::try_from(&self.risk)?;

        if self.engine.max_data_age_secs == 0 {
            return Err(ConfigError::ZeroDuration("max_data_age_secs"));
        }
        if self.engine.confirmation_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration("confirmation_timeout_ms"));
        }
        if self.engine.max_commit_retries == 0 {
            return Err(ConfigError::ZeroDuration("max_commit_retries"));
        }
        if self.engine.mailbox_capacity == 0 {
            return Err(ConfigError::ZeroDuration("mailbox_capacity"));
        }
        let timing = EngineTiming {
            max_data_age: chrono::Duration::seconds(self.engine.max_data_age_secs as i64),
            confirmation_timeout: Duration::from_millis(self.engine.confirmation_timeout_ms),
            max_commit_retries: self.engine.max_commit_retries,
            mailbox_capacity: self.engine.mailbox_capacity,
        };

        Ok(EngineSettings {
            vault,
            bankroll: self.vault.bankroll,
            progression,
            triggers,
            profit_threshold_pct,
            plan,
            risk,
            timing,
        })
    }
}
