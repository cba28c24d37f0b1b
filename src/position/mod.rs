//! Positions, scaling stages and the position scaler
//!
//! A position is built from up to N stages, each smaller in leverage and
//! larger in bankroll share than the one before. Derived totals (weighted
//! entry, profit threshold, take-profit trigger, liquidation price) are
//! recomputed whenever a stage is appended.

pub mod math;
mod progression;
mod scaler;
mod types;

pub use progression::{ScalingProgression, StageSpec};
pub use scaler::{NoActionReason, PositionScaler, ScaleError, ScalingDecision, ScalingTriggers};
pub use types::{
    Direction, HoldState, InvalidTransition, PendingOperation, Position, PositionSnapshot,
    PositionStatus, ScalingStage, StageProposal, TriggerReason,
};
