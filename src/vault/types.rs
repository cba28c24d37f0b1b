//! Vault types

use crate::position::{InvalidTransition, PositionStatus};
use crate::risk::RiskRejection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Static limits of a vault
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultLimits {
    pub id: String,
    /// Maximum concurrently open positions
    pub max_positions: usize,
    /// Maximum aggregate committed capital as a fraction of bankroll
    pub risk_ceiling_pct: Decimal,
}

/// Vault manager errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VaultError {
    /// Declined by risk policy
    #[error("rejected: {0}")]
    Rejected(#[from] RiskRejection),
    #[error("unknown position {0}")]
    UnknownPosition(Uuid),
    /// Settlement would leave the bankroll below zero
    #[error("bankroll {bankroll} cannot absorb pnl {pnl}")]
    NegativeBankroll { bankroll: Decimal, pnl: Decimal },
    #[error("position must be closed or liquidated, got {0}")]
    NotTerminal(PositionStatus),
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}
