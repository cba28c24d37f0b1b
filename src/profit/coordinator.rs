//! Profit-taking coordinator: the close and trailing-stop cascade

use super::plan::ProfitPlan;
use super::trailing::TrailingStop;
use crate::execution::FillConfirmation;
use crate::position::{InvalidTransition, Position, PositionStatus};
use crate::vault::{VaultError, VaultManager};
use rust_decimal::Decimal;
use serde::Serialize;

/// What the cascade wants done on this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProfitAction {
    NoAction,
    /// Liquidation price crossed; pre-empts everything else
    Liquidate,
    /// Partial close at the 1-based level
    TakeProfit { level: usize, close_fraction: Decimal },
    /// Final stop hit: close what remains
    CloseRemaining,
}

/// Result of settling a close against the vault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    /// Fraction of the original size actually closed
    pub fraction: Decimal,
    /// P&L booked to the bankroll
    pub pnl: Decimal,
}

#[derive(Debug, Clone)]
pub struct ProfitTakingCoordinator {
    plan: ProfitPlan,
}

impl ProfitTakingCoordinator {
    pub fn new(plan: ProfitPlan) -> Self {
        Self { plan }
    }

    pub fn plan(&self) -> &ProfitPlan {
        &self.plan
    }

    /// Decide the action for a tick at `price`.
    ///
    /// Moves TAKING_PROFIT_n to TRAILING_n and ratchets the armed stop; no
    /// other state changes. Liquidation is checked even while on HOLD.
    pub fn evaluate(&self, position: &mut Position, price: Decimal) -> Result<ProfitAction, InvalidTransition> {
        if position.status.is_terminal() || position.stages.is_empty() {
            return Ok(ProfitAction::NoAction);
        }
        if position.is_liquidated_at(price) {
            tracing::warn!(
                position_id = %position.id,
                %price,
                liquidation_price = ?position.liquidation_price,
                status = %position.status,
                "Liquidation price crossed"
            );
            return Ok(ProfitAction::Liquidate);
        }
        if position.is_on_hold() {
            return Ok(ProfitAction::NoAction);
        }

        let margin = position.current_margin(price);
        let action = match position.status {
            PositionStatus::Monitoring if margin >= position.take_profit_trigger => {
                let level = self.plan.level(1);
                tracing::info!(
                    position_id = %position.id,
                    %margin,
                    trigger = %position.take_profit_trigger,
                    "Take-profit trigger reached"
                );
                ProfitAction::TakeProfit {
                    level: 1,
                    close_fraction: level.close_fraction,
                }
            }
            PositionStatus::TakingProfit1 => {
                position.transition(PositionStatus::Trailing1)?;
                self.trail(position, margin, 2)
            }
            PositionStatus::Trailing1 => self.trail(position, margin, 2),
            PositionStatus::TakingProfit2 => {
                position.transition(PositionStatus::Trailing2)?;
                self.trail(position, margin, 3)
            }
            PositionStatus::Trailing2 => self.trail(position, margin, 3),
            _ => ProfitAction::NoAction,
        };
        Ok(action)
    }

    /// Ratchet the stop; on hit, request the next level (3 means the final close)
    fn trail(&self, position: &mut Position, margin: Decimal, next_level: usize) -> ProfitAction {
        let Some(stop) = position.trailing.as_mut() else {
            // nothing armed yet: arm at the current margin
            let pct = self.plan.level(next_level - 1).trailing_stop_pct;
            position.trailing = Some(TrailingStop::new(margin, pct));
            return ProfitAction::NoAction;
        };
        if !stop.update(margin) {
            return ProfitAction::NoAction;
        }

        tracing::info!(
            position_id = %position.id,
            %margin,
            high_water_mark = %stop.high_water_mark,
            stop_level = %stop.stop_level,
            "Trailing stop hit"
        );
        if next_level > self.plan.levels().len() {
            ProfitAction::CloseRemaining
        } else {
            ProfitAction::TakeProfit {
                level: next_level,
                close_fraction: self.plan.level(next_level).close_fraction,
            }
        }
    }

    /// Settle a confirmed partial close and arm the level's trailing stop
    pub fn apply_take_profit(
        &self,
        position: &mut Position,
        level: usize,
        fill: &FillConfirmation,
        vault: &VaultManager,
    ) -> Result<Settlement, VaultError> {
        let next = if level <= 1 {
            PositionStatus::TakingProfit1
        } else {
            PositionStatus::TakingProfit2
        };
        if !position.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: position.status,
                to: next,
            }
            .into());
        }

        let requested = self.plan.level(level).close_fraction;
        let fraction = closed_fraction(position, fill, requested);
        let pnl = fraction * position.unrealized_pnl(fill.filled_price);
        let released = position.total_invested * fraction;

        let booked = vault.realize(position.id, released, pnl)?;
        position.transition(next)?;
        position.reduce(fraction);
        position.realized_pnl += booked;

        let margin = position.current_margin(fill.filled_price);
        let stop = TrailingStop::new(margin, self.plan.level(level).trailing_stop_pct);
        tracing::info!(
            position_id = %position.id,
            level,
            closed = %fraction,
            pnl = %booked,
            remaining = %position.remaining_fraction,
            stop_level = %stop.stop_level,
            "Profit taken, trailing stop armed"
        );
        position.trailing = Some(stop);

        Ok(Settlement { fraction, pnl: booked })
    }

    /// Settle a confirmed close of the remainder.
    ///
    /// A partial fill keeps the position open with the stop still latched, so
    /// the next tick asks for the rest.
    pub fn apply_final_close(
        &self,
        position: &mut Position,
        fill: &FillConfirmation,
        vault: &VaultManager,
    ) -> Result<Settlement, VaultError> {
        let remaining = position.remaining_fraction;
        let fraction = closed_fraction(position, fill, remaining);
        let pnl = fraction * position.unrealized_pnl(fill.filled_price);

        if fraction >= remaining {
            let booked = vault.close_position(position, PositionStatus::Closed, pnl)?;
            return Ok(Settlement { fraction, pnl: booked });
        }

        let released = position.total_invested * fraction;
        let booked = vault.realize(position.id, released, pnl)?;
        position.reduce(fraction);
        position.realized_pnl += booked;
        tracing::warn!(
            position_id = %position.id,
            closed = %fraction,
            remaining = %position.remaining_fraction,
            "Final close partially filled"
        );
        Ok(Settlement { fraction, pnl: booked })
    }

    /// Book the loss of everything still committed and mark the position liquidated
    pub fn apply_liquidation(&self, position: &mut Position, vault: &VaultManager) -> Result<Settlement, VaultError> {
        let fraction = position.remaining_fraction;
        let loss = -position.committed_capital();
        let booked = vault.close_position(position, PositionStatus::Liquidated, loss)?;
        tracing::warn!(position_id = %position.id, pnl = %booked, "Position liquidated");
        Ok(Settlement { fraction, pnl: booked })
    }
}

/// Fraction of the original size a fill closed, capped at `requested` and the open remainder
fn closed_fraction(position: &Position, fill: &FillConfirmation, requested: Decimal) -> Decimal {
    if position.total_position_value <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (fill.filled_amount / position.total_position_value)
        .min(requested)
        .min(position.remaining_fraction)
        .max(Decimal::ZERO)
}
