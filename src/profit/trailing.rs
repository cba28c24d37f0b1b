//! Margin trailing stop

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Stop that ratchets up with the margin high-water mark and never moves down
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingStop {
    pub trail_pct: Decimal,
    pub high_water_mark: Decimal,
    pub stop_level: Decimal,
    /// Latched once the stop is hit
    pub triggered: bool,
}

impl TrailingStop {
    /// Arm a stop `trail_pct` below `margin`
    pub fn new(margin: Decimal, trail_pct: Decimal) -> Self {
        Self {
            trail_pct,
            high_water_mark: margin,
            stop_level: margin * (Decimal::ONE - trail_pct),
            triggered: false,
        }
    }

    /// Feed the current margin; returns true once the stop has been hit
    pub fn update(&mut self, margin: Decimal) -> bool {
        if margin > self.high_water_mark {
            self.high_water_mark = margin;
            self.stop_level = margin * (Decimal::ONE - self.trail_pct);
        }
        if margin <= self.stop_level {
            self.triggered = true;
        }
        self.triggered
    }
}
