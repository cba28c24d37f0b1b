//! Position scaler: stage eligibility and sizing

use super::math::adverse_move;
use super::progression::ScalingProgression;
use super::types::{Position, PositionStatus, ScalingStage, StageProposal, TriggerReason};
use crate::execution::FillConfirmation;
use crate::feed::CorrelationSource;
use crate::risk::{RiskGuard, RiskRejection};
use crate::signal::SignalSnapshot;
use crate::vault::LedgerSnapshot;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Trigger thresholds for adding stages
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalingTriggers {
    /// Score gain over the prior stage that must be exceeded (BETTER_SCORE)
    pub score_improvement_delta: Decimal,
    /// Minimum adverse move from the prior stage entry (PRICE_RETRACE)
    pub retrace_pct: Decimal,
    /// Adverse move beyond which the thesis no longer holds
    pub max_retrace_pct: Decimal,
}

impl Default for ScalingTriggers {
    fn default() -> Self {
        Self {
            score_improvement_delta: dec!(0.05),
            retrace_pct: dec!(0.02),
            max_retrace_pct: dec!(0.10),
        }
    }
}

/// Why no stage was proposed
#[derive(Debug, Clone, PartialEq)]
pub enum NoActionReason {
    /// Status does not accept scaling
    Status(PositionStatus),
    /// Waiting for an execution confirmation
    OnHold,
    /// All N stages are taken
    MaxStages,
    /// Signal degraded below the minimums; existing stages are kept
    SignalFrozen(RiskRejection),
    /// Neither trigger fired
    NoTrigger,
    /// Retrace too deep to keep adding
    ThesisInvalidated { adverse_move: Decimal },
}

/// Outcome of a scaling evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum ScalingDecision {
    NoAction(NoActionReason),
    /// Approved by the risk guard, ready for reservation and execution
    Scale(StageProposal),
    Rejected(RiskRejection),
}

/// Errors applying a fill to a position
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScaleError {
    #[error("fill reported no filled amount")]
    EmptyFill,
    #[error("stage {got} does not follow stage {current}")]
    StageOutOfOrder { current: u8, got: u8 },
}

/// Computes stage eligibility and applies confirmed stages
#[derive(Debug, Clone)]
pub struct PositionScaler {
    progression: ScalingProgression,
    triggers: ScalingTriggers,
    profit_threshold_pct: Decimal,
    guard: Arc<RiskGuard>,
}

impl PositionScaler {
    pub fn new(
        progression: ScalingProgression,
        triggers: ScalingTriggers,
        profit_threshold_pct: Decimal,
        guard: Arc<RiskGuard>,
    ) -> Self {
        Self {
            progression,
            triggers,
            profit_threshold_pct,
            guard,
        }
    }

    pub fn progression(&self) -> &ScalingProgression {
        &self.progression
    }

    pub fn max_stages(&self) -> u8 {
        self.progression.max_stages()
    }

    pub fn profit_threshold_pct(&self) -> Decimal {
        self.profit_threshold_pct
    }

    /// Decide whether to add the next stage. Never mutates state.
    pub fn evaluate_scaling(
        &self,
        position: &Position,
        vault: &LedgerSnapshot,
        current_price: Decimal,
        signal: &SignalSnapshot,
        correlations: Option<&dyn CorrelationSource>,
    ) -> ScalingDecision {
        if !position.status.accepts_scaling() {
            return ScalingDecision::NoAction(NoActionReason::Status(position.status));
        }
        if position.is_on_hold() {
            return ScalingDecision::NoAction(NoActionReason::OnHold);
        }
        if position.stage_index() >= self.max_stages() {
            return ScalingDecision::NoAction(NoActionReason::MaxStages);
        }
        if let Err(rejection) = self.guard.check_signal(signal) {
            tracing::debug!(position_id = %position.id, %rejection, "Scaling frozen by weak signal");
            return ScalingDecision::NoAction(NoActionReason::SignalFrozen(rejection));
        }

        let trigger_reason = match position.last_stage() {
            None => TriggerReason::Initial,
            Some(last) => match self.trigger(position, last, current_price, signal) {
                Ok(reason) => reason,
                Err(reason) => return ScalingDecision::NoAction(reason),
            },
        };

        let stage_index = position.stage_index() + 1;
        let Some(spec) = self.progression.step(stage_index) else {
            return ScalingDecision::NoAction(NoActionReason::MaxStages);
        };

        let investment_amount = vault.bankroll() * spec.bankroll_pct;
        let proposal = StageProposal {
            stage_index,
            bankroll_pct: spec.bankroll_pct,
            leverage: spec.leverage,
            investment_amount,
            position_notional: investment_amount * spec.leverage,
            reference_price: current_price,
            signal_score: signal.score,
            trigger_reason,
        };

        match self.guard.approve(vault, position, &proposal, correlations) {
            Ok(()) => {
                tracing::info!(
                    position_id = %position.id,
                    stage = stage_index,
                    trigger = ?trigger_reason,
                    investment = %investment_amount,
                    leverage = %spec.leverage,
                    "Scaling stage proposed"
                );
                ScalingDecision::Scale(proposal)
            }
            Err(rejection) => {
                tracing::warn!(position_id = %position.id, stage = stage_index, %rejection, "Scaling rejected");
                ScalingDecision::Rejected(rejection)
            }
        }
    }

    fn trigger(
        &self,
        position: &Position,
        last: &ScalingStage,
        current_price: Decimal,
        signal: &SignalSnapshot,
    ) -> Result<TriggerReason, NoActionReason> {
        if signal.score - last.signal_score > self.triggers.score_improvement_delta {
            return Ok(TriggerReason::BetterScore);
        }

        let adverse_move = adverse_move(position.direction, last.entry_price, current_price);
        if adverse_move > self.triggers.max_retrace_pct {
            return Err(NoActionReason::ThesisInvalidated { adverse_move });
        }
        if adverse_move >= self.triggers.retrace_pct {
            return Ok(TriggerReason::PriceRetrace);
        }
        Err(NoActionReason::NoTrigger)
    }

    /// Append a confirmed stage; returns the unfilled part of the reservation
    pub fn apply_fill(
        &self,
        position: &mut Position,
        proposal: &StageProposal,
        fill: &FillConfirmation,
    ) -> Result<Decimal, ScaleError> {
        if proposal.stage_index != position.stage_index() + 1 {
            return Err(ScaleError::StageOutOfOrder {
                current: position.stage_index(),
                got: proposal.stage_index,
            });
        }
        let filled = fill.filled_amount.min(proposal.investment_amount);
        if filled <= Decimal::ZERO {
            return Err(ScaleError::EmptyFill);
        }

        let stage = ScalingStage {
            stage_index: proposal.stage_index,
            bankroll_pct: proposal.bankroll_pct,
            leverage: proposal.leverage,
            investment_amount: filled,
            position_notional: filled * proposal.leverage,
            entry_price: fill.filled_price,
            signal_score: proposal.signal_score,
            trigger_reason: proposal.trigger_reason,
            timestamp: Utc::now(),
        };
        position.push_stage(
            stage,
            self.profit_threshold_pct,
            self.guard.params().liquidation_buffer_pct,
        );

        tracing::info!(
            position_id = %position.id,
            stage = proposal.stage_index,
            filled = %filled,
            price = %fill.filled_price,
            total_invested = %position.total_invested,
            take_profit_trigger = %position.take_profit_trigger,
            liquidation_price = ?position.liquidation_price,
            "Stage executed"
        );
        Ok(proposal.investment_amount - filled)
    }
}
