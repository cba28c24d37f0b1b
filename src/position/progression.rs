//! Validated stage progression

use crate::config::{check_pct, ConfigError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

/// Sizing of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageSpec {
    /// Fraction of the vault bankroll committed
    pub bankroll_pct: Decimal,
    pub leverage: Decimal,
}

/// Ordered stage sizing: bankroll pct strictly increasing, leverage strictly decreasing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScalingProgression {
    steps: Vec<StageSpec>,
}

impl ScalingProgression {
    /// Build from parallel sequences, rejecting non-monotonic progressions
    pub fn new(bankroll_pcts: &[Decimal], leverages: &[Decimal]) -> Result<Self, ConfigError> {
        if bankroll_pcts.len() != leverages.len() {
            return Err(ConfigError::SequenceLengthMismatch {
                pcts: bankroll_pcts.len(),
                leverages: leverages.len(),
            });
        }
        if bankroll_pcts.is_empty() || bankroll_pcts.len() > u8::MAX as usize {
            return Err(ConfigError::StageCount(bankroll_pcts.len()));
        }

        let mut steps: Vec<StageSpec> = Vec::with_capacity(bankroll_pcts.len());
        for (i, (&pct, &leverage)) in bankroll_pcts.iter().zip(leverages).enumerate() {
            let bankroll_pct = check_pct("bankroll_pcts", pct)?;
            if leverage < Decimal::ONE {
                return Err(ConfigError::LeverageBelowOne(leverage));
            }
            if let Some(prev) = steps.last() {
                if leverage >= prev.leverage {
                    return Err(ConfigError::NonDecreasingLeverage {
                        stage: i + 1,
                        previous: prev.leverage,
                        current: leverage,
                    });
                }
                if bankroll_pct <= prev.bankroll_pct {
                    return Err(ConfigError::NonIncreasingBankrollPct {
                        stage: i + 1,
                        previous: prev.bankroll_pct,
                        current: bankroll_pct,
                    });
                }
            }
            steps.push(StageSpec {
                bankroll_pct,
                leverage,
            });
        }

        Ok(Self { steps })
    }

    /// Maximum number of stages (N)
    pub fn max_stages(&self) -> u8 {
        self.steps.len() as u8
    }

    /// Spec for a 1-based stage index
    pub fn step(&self, stage_index: u8) -> Option<&StageSpec> {
        if stage_index == 0 {
            return None;
        }
        self.steps.get(stage_index as usize - 1)
    }

    pub fn first(&self) -> &StageSpec {
        &self.steps[0]
    }

    pub fn steps(&self) -> &[StageSpec] {
        &self.steps
    }
}

impl Default for ScalingProgression {
    /// Bankroll 1/2/4/8%, leverage 20/10/5/2x
    fn default() -> Self {
        Self {
            steps: vec![
                StageSpec {
                    bankroll_pct: dec!(0.01),
                    leverage: dec!(20),
                },
                StageSpec {
                    bankroll_pct: dec!(0.02),
                    leverage: dec!(10),
                },
                StageSpec {
                    bankroll_pct: dec!(0.04),
                    leverage: dec!(5),
                },
                StageSpec {
                    bankroll_pct: dec!(0.08),
                    leverage: dec!(2),
                },
            ],
        }
    }
}
