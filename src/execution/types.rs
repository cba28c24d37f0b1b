//! Execution types

use crate::position::Direction;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Open or grow a position by one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageAddRequest {
    pub symbol: String,
    pub direction: Direction,
    /// Margin to commit
    pub investment_amount: Decimal,
    pub leverage: Decimal,
    /// Price the decision was made at
    pub reference_price: Decimal,
}

impl StageAddRequest {
    pub fn notional(&self) -> Decimal {
        self.investment_amount * self.leverage
    }
}

/// Partially close a position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitTakeRequest {
    pub symbol: String,
    pub direction: Direction,
    /// Fraction of the original position size
    pub close_fraction: Decimal,
    /// Notional to close
    pub notional: Decimal,
    pub reference_price: Decimal,
}

/// Close whatever remains of a position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseRequest {
    pub symbol: String,
    pub direction: Direction,
    /// Remaining notional to close
    pub notional: Decimal,
    pub reference_price: Decimal,
}

/// Any request sent to an exchange adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionRequest {
    StageAdd(StageAddRequest),
    ProfitTake(ProfitTakeRequest),
    Close(CloseRequest),
}

impl ExecutionRequest {
    pub fn symbol(&self) -> &str {
        match self {
            ExecutionRequest::StageAdd(r) => &r.symbol,
            ExecutionRequest::ProfitTake(r) => &r.symbol,
            ExecutionRequest::Close(r) => &r.symbol,
        }
    }
}

/// Exchange acknowledgement of a (possibly partial) fill.
///
/// `filled_amount` is margin for stage adds and notional for closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillConfirmation {
    pub filled_price: Decimal,
    pub filled_amount: Decimal,
}

/// The exchange refused or failed the request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("execution rejected: {reason}")]
pub struct ExecutionRejection {
    pub reason: String,
}

impl ExecutionRejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
