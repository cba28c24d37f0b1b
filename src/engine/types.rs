//! Engine types: errors, tick outcomes and actor commands

use crate::config::ConfigError;
use crate::execution::{ExecutionRejection, FillConfirmation};
use crate::feed::PriceTick;
use crate::position::{InvalidTransition, PositionSnapshot, ScaleError};
use crate::risk::RiskRejection;
use crate::signal::SignalSnapshot;
use crate::vault::VaultError;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Broad error classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Declined by risk policy
    Policy,
    /// Failed at the exchange
    Execution,
    StaleData,
    Validation,
    /// Ledger contention exhausted its retries
    Concurrency,
    /// Operation does not fit the position's lifecycle state
    State,
}

/// Errors surfaced by the engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Validation(#[from] ConfigError),

    #[error("rejected: {0}")]
    Risk(RiskRejection),

    #[error("{op} failed: {source}")]
    Execution {
        op: &'static str,
        #[source]
        source: ExecutionRejection,
    },

    #[error("stale {what}: {}ms old", .age.num_milliseconds())]
    StaleData {
        what: &'static str,
        age: chrono::Duration,
    },

    #[error(transparent)]
    Vault(VaultError),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("position {0} no longer accepts commands")]
    ActorGone(Uuid),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::Risk(RiskRejection::LedgerContention { .. }) => ErrorKind::Concurrency,
            EngineError::Risk(_) => ErrorKind::Policy,
            EngineError::Execution { .. } => ErrorKind::Execution,
            EngineError::StaleData { .. } => ErrorKind::StaleData,
            EngineError::Vault(VaultError::NegativeBankroll { .. }) => ErrorKind::Policy,
            EngineError::Vault(_) | EngineError::InvalidState(_) | EngineError::ActorGone(_) => {
                ErrorKind::State
            }
        }
    }

    /// Whether the engine can simply carry on with the next tick
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EngineError::Risk(_) | EngineError::StaleData { .. })
    }
}

impl From<RiskRejection> for EngineError {
    fn from(rejection: RiskRejection) -> Self {
        EngineError::Risk(rejection)
    }
}

impl From<VaultError> for EngineError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::Rejected(rejection) => EngineError::Risk(rejection),
            other => EngineError::Vault(other),
        }
    }
}

impl From<InvalidTransition> for EngineError {
    fn from(err: InvalidTransition) -> Self {
        EngineError::InvalidState(err.to_string())
    }
}

impl From<ScaleError> for EngineError {
    fn from(err: ScaleError) -> Self {
        EngineError::InvalidState(err.to_string())
    }
}

/// What processing one command did to a position
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    NoAction,
    /// Position already closed or liquidated
    Inactive,
    StageAdded { stage_index: u8 },
    ProfitTaken { level: usize, fraction: Decimal },
    /// Final close only partly filled; the rest is requested next tick
    PartiallyClosed { fraction: Decimal },
    Closed { pnl: Decimal },
    Liquidated { pnl: Decimal },
    /// Confirmation timed out; waiting for an operator
    OnHold,
    /// Pending operation cancelled by an operator
    Cancelled,
}

pub(crate) type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

/// Messages processed by a position actor, in arrival order
pub(crate) enum PositionCommand {
    Tick {
        tick: PriceTick,
        reply: Reply<TickOutcome>,
    },
    Signal {
        signal: SignalSnapshot,
        reply: Reply<TickOutcome>,
    },
    ConfirmPending {
        fill: FillConfirmation,
        reply: Reply<TickOutcome>,
    },
    CancelPending {
        reply: Reply<TickOutcome>,
    },
    CloseNow {
        price: Decimal,
        reply: Reply<TickOutcome>,
    },
    Snapshot {
        reply: oneshot::Sender<PositionSnapshot>,
    },
}
