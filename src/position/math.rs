//! Stage accounting: entry averaging, liquidation price, P&L

use super::types::{Direction, ScalingStage};
use rust_decimal::Decimal;

/// Derived invariants of a set of stages
#[derive(Debug, Clone, PartialEq)]
pub struct StageTotals {
    pub total_invested: Decimal,
    pub total_position_value: Decimal,
    pub entry_price: Decimal,
    pub profit_threshold: Decimal,
    pub take_profit_trigger: Decimal,
    pub liquidation_price: Option<Decimal>,
}

/// The three inputs each stage contributes to the totals
#[derive(Debug, Clone, Copy)]
pub struct StageLeg {
    pub investment: Decimal,
    pub notional: Decimal,
    pub price: Decimal,
}

impl From<&ScalingStage> for StageLeg {
    fn from(stage: &ScalingStage) -> Self {
        Self {
            investment: stage.investment_amount,
            notional: stage.position_notional,
            price: stage.entry_price,
        }
    }
}

impl StageTotals {
    pub fn from_stages(
        direction: Direction,
        stages: &[ScalingStage],
        profit_threshold_pct: Decimal,
        liquidation_buffer_pct: Decimal,
    ) -> Self {
        Self::from_legs(
            direction,
            stages.iter().map(StageLeg::from),
            profit_threshold_pct,
            liquidation_buffer_pct,
        )
    }

    /// Totals after adding one more leg to existing stages
    pub fn projected(
        direction: Direction,
        stages: &[ScalingStage],
        extra: StageLeg,
        profit_threshold_pct: Decimal,
        liquidation_buffer_pct: Decimal,
    ) -> Self {
        Self::from_legs(
            direction,
            stages.iter().map(StageLeg::from).chain(std::iter::once(extra)),
            profit_threshold_pct,
            liquidation_buffer_pct,
        )
    }

    pub fn from_legs(
        direction: Direction,
        legs: impl IntoIterator<Item = StageLeg>,
        profit_threshold_pct: Decimal,
        liquidation_buffer_pct: Decimal,
    ) -> Self {
        let mut total_invested = Decimal::ZERO;
        let mut total_position_value = Decimal::ZERO;
        let mut weighted_price = Decimal::ZERO;

        for leg in legs {
            total_invested += leg.investment;
            total_position_value += leg.notional;
            weighted_price += leg.notional * leg.price;
        }

        let entry_price = if total_position_value.is_zero() {
            Decimal::ZERO
        } else {
            weighted_price / total_position_value
        };

        let profit_threshold = total_invested * profit_threshold_pct;

        Self {
            total_invested,
            total_position_value,
            entry_price,
            profit_threshold,
            take_profit_trigger: total_invested + profit_threshold,
            liquidation_price: liquidation_price(
                direction,
                entry_price,
                total_invested,
                total_position_value,
                liquidation_buffer_pct,
            ),
        }
    }
}

/// Price at which the position is treated as liquidated.
///
/// The adverse move that wipes the margin is `invested / notional`; liquidation is marked
/// `buffer` of that move early. Returns `None` for an empty position.
pub fn liquidation_price(
    direction: Direction,
    entry_price: Decimal,
    total_invested: Decimal,
    total_notional: Decimal,
    liquidation_buffer_pct: Decimal,
) -> Option<Decimal> {
    if total_notional.is_zero() || entry_price.is_zero() {
        return None;
    }
    let margin_move = total_invested / total_notional * (Decimal::ONE - liquidation_buffer_pct);
    let liq = entry_price * (Decimal::ONE - direction.sign() * margin_move);
    Some(liq.max(Decimal::ZERO))
}

/// Relative distance between `price` and `liquidation`
pub fn liquidation_distance(price: Decimal, liquidation: Decimal) -> Decimal {
    if price.is_zero() {
        return Decimal::ZERO;
    }
    ((price - liquidation) / price).abs()
}

pub fn crosses_liquidation(direction: Direction, price: Decimal, liquidation: Decimal) -> bool {
    match direction {
        Direction::Long => price <= liquidation,
        Direction::Short => price >= liquidation,
    }
}

/// P&L of `notional` opened at `entry` marked at `price`
pub fn unrealized_pnl(direction: Direction, entry: Decimal, notional: Decimal, price: Decimal) -> Decimal {
    if entry.is_zero() {
        return Decimal::ZERO;
    }
    notional * (price - entry) / entry * direction.sign()
}

/// Signed adverse move from `reference` to `price`; positive means against the position
pub fn adverse_move(direction: Direction, reference: Decimal, price: Decimal) -> Decimal {
    if reference.is_zero() {
        return Decimal::ZERO;
    }
    (reference - price) / reference * direction.sign()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn leg(investment: Decimal, leverage: Decimal, price: Decimal) -> StageLeg {
        StageLeg {
            investment,
            notional: investment * leverage,
            price,
        }
    }

    #[test]
    fn test_notional_weighted_entry() {
        let totals = StageTotals::from_legs(
            Direction::Long,
            [leg(dec!(100), dec!(20), dec!(100)), leg(dec!(200), dec!(10), dec!(90))],
            dec!(0.75),
            dec!(0.02),
        );
        // equal notionals of 2000 => simple average
        assert_eq!(totals.entry_price, dec!(95));
        assert_eq!(totals.total_invested, dec!(300));
        assert_eq!(totals.total_position_value, dec!(4000));
    }

    #[test]
    fn test_liquidation_price_long_single_stage() {
        // 20x: margin gone after 5%, buffer marks 2% of that early => 4.9%
        let liq = liquidation_price(Direction::Long, dec!(100), dec!(100), dec!(2000), dec!(0.02));
        assert_eq!(liq, Some(dec!(95.1)));
    }

    #[test]
    fn test_liquidation_price_short_single_stage() {
        let liq = liquidation_price(Direction::Short, dec!(100), dec!(100), dec!(1000), dec!(0));
        assert_eq!(liq, Some(dec!(110)));
    }

    #[test]
    fn test_liquidation_moves_away_as_leverage_decreases() {
        let one = StageTotals::from_legs(
            Direction::Long,
            [leg(dec!(100), dec!(20), dec!(100))],
            dec!(0.75),
            dec!(0.02),
        );
        let two = StageTotals::from_legs(
            Direction::Long,
            [leg(dec!(100), dec!(20), dec!(100)), leg(dec!(200), dec!(10), dec!(100))],
            dec!(0.75),
            dec!(0.02),
        );
        assert!(two.liquidation_price.unwrap() < one.liquidation_price.unwrap());
    }

    #[test]
    fn test_empty_totals() {
        let totals = StageTotals::from_legs(
            Direction::Long,
            std::iter::empty::<StageLeg>(),
            dec!(0.75),
            dec!(0.02),
        );
        assert_eq!(totals.total_invested, dec!(0));
        assert!(totals.liquidation_price.is_none());
    }

    #[test]
    fn test_crosses_liquidation() {
        assert!(crosses_liquidation(Direction::Long, dec!(95), dec!(95.1)));
        assert!(!crosses_liquidation(Direction::Long, dec!(96), dec!(95.1)));
        assert!(crosses_liquidation(Direction::Short, dec!(110), dec!(110)));
        assert!(!crosses_liquidation(Direction::Short, dec!(109), dec!(110)));
    }

    #[test]
    fn test_adverse_move() {
        assert_eq!(adverse_move(Direction::Long, dec!(100), dec!(97)), dec!(0.03));
        assert_eq!(adverse_move(Direction::Short, dec!(100), dec!(97)), dec!(-0.03));
    }

    #[test]
    fn test_liquidation_distance() {
        assert_eq!(liquidation_distance(dec!(100), dec!(95.1)), dec!(0.049));
    }
}
