//! Execution module
//!
//! Exchange adapters receive stage-add, profit-take and close requests and
//! answer with a fill confirmation or a rejection.

mod paper;
mod types;

pub use paper::PaperAdapter;
pub use types::{
    CloseRequest, ExecutionRejection, ExecutionRequest, FillConfirmation, ProfitTakeRequest,
    StageAddRequest,
};

use async_trait::async_trait;

/// Trait for exchange adapter implementations
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Add one stage (margin at leverage)
    async fn add_stage(&self, request: StageAddRequest) -> Result<FillConfirmation, ExecutionRejection>;
    /// Partially close a position
    async fn take_profit(&self, request: ProfitTakeRequest) -> Result<FillConfirmation, ExecutionRejection>;
    /// Close the remainder of a position
    async fn close(&self, request: CloseRequest) -> Result<FillConfirmation, ExecutionRejection>;
}
