//! Profit-taking plan

use crate::config::ConfigError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Number of partial-close levels before the final close
pub const PARTIAL_LEVELS: usize = 2;

/// One partial close of the cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfitLevel {
    /// Fraction of the original position closed at this level
    pub close_fraction: Decimal,
    /// Trailing stop armed after the close, as a fraction of the margin high-water mark
    pub trailing_stop_pct: Decimal,
}

/// Validated cascade: two partial levels, then whatever remains
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfitPlan {
    levels: [ProfitLevel; PARTIAL_LEVELS],
}

impl ProfitPlan {
    pub fn new(levels: &[ProfitLevel]) -> Result<Self, ConfigError> {
        let levels: [ProfitLevel; PARTIAL_LEVELS] =
            levels.try_into().map_err(|_| ConfigError::ProfitLevelCount {
                expected: PARTIAL_LEVELS,
                actual: levels.len(),
            })?;

        for level in &levels {
            open_unit("close_fraction", level.close_fraction)?;
            open_unit("trailing_stop_pct", level.trailing_stop_pct)?;
        }
        let total: Decimal = levels.iter().map(|l| l.close_fraction).sum();
        if total >= Decimal::ONE {
            return Err(ConfigError::CloseFractionsExhausted(total));
        }

        Ok(Self { levels })
    }

    /// Level by 1-based number; out-of-range numbers clamp to the nearest level
    pub fn level(&self, level: usize) -> &ProfitLevel {
        &self.levels[level.clamp(1, PARTIAL_LEVELS) - 1]
    }

    pub fn levels(&self) -> &[ProfitLevel] {
        &self.levels
    }

    /// Fraction of the original size closed on the final stop
    pub fn final_fraction(&self) -> Decimal {
        Decimal::ONE - self.levels.iter().map(|l| l.close_fraction).sum::<Decimal>()
    }
}

impl Default for ProfitPlan {
    fn default() -> Self {
        Self {
            levels: [
                ProfitLevel {
                    close_fraction: dec!(0.30),
                    trailing_stop_pct: dec!(0.05),
                },
                ProfitLevel {
                    close_fraction: dec!(0.25),
                    trailing_stop_pct: dec!(0.03),
                },
            ],
        }
    }
}

fn open_unit(field: &'static str, value: Decimal) -> Result<(), ConfigError> {
    if value <= Decimal::ZERO || value >= Decimal::ONE {
        return Err(ConfigError::PercentOutOfRange { field, value });
    }
    Ok(())
}
