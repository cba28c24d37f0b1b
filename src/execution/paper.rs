//! Paper exchange adapter with simulated fills

use super::{
    CloseRequest, ExchangeAdapter, ExecutionRejection, ExecutionRequest, FillConfirmation,
    ProfitTakeRequest, StageAddRequest,
};
use crate::position::Direction;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// In-process adapter: fills at the reference price moved against the trader by `slippage`
pub struct PaperAdapter {
    slippage: Decimal,
    fill_ratio: Decimal,
    latency: Option<Duration>,
    requests: Arc<RwLock<Vec<ExecutionRequest>>>,
    scripted_failures: Arc<RwLock<VecDeque<String>>>,
}

impl PaperAdapter {
    /// Create a paper adapter with the given relative slippage
    pub fn new(slippage: Decimal) -> Self {
        Self {
            slippage,
            fill_ratio: Decimal::ONE,
            latency: None,
            requests: Arc::new(RwLock::new(vec![])),
            scripted_failures: Arc::new(RwLock::new(VecDeque::new())),
        }
    }

    /// Fill only this share of each request
    pub fn with_fill_ratio(mut self, fill_ratio: Decimal) -> Self {
        self.fill_ratio = fill_ratio.clamp(Decimal::ZERO, Decimal::ONE);
        self
    }

    /// Delay every response
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Reject the next request with `reason`
    pub async fn fail_next(&self, reason: impl Into<String>) {
        self.scripted_failures.write().await.push_back(reason.into());
    }

    /// Every request received so far
    pub async fn requests(&self) -> Vec<ExecutionRequest> {
        self.requests.read().await.clone()
    }

    fn fill_price(&self, direction: Direction, opening: bool, reference: Decimal) -> Decimal {
        // buying pays up, selling gives up
        let buying = matches!(
            (direction, opening),
            (Direction::Long, true) | (Direction::Short, false)
        );
        if buying {
            reference * (Decimal::ONE + self.slippage)
        } else {
            reference * (Decimal::ONE - self.slippage)
        }
    }

    async fn execute(
        &self,
        request: ExecutionRequest,
        direction: Direction,
        opening: bool,
        reference_price: Decimal,
        amount: Decimal,
    ) -> Result<FillConfirmation, ExecutionRejection> {
        let symbol = request.symbol().to_string();
        self.requests.write().await.push(request);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(reason) = self.scripted_failures.write().await.pop_front() {
            tracing::warn!(%symbol, %reason, "Paper request rejected");
            return Err(ExecutionRejection::new(reason));
        }

        let fill = FillConfirmation {
            filled_price: self.fill_price(direction, opening, reference_price),
            filled_amount: amount * self.fill_ratio,
        };
        tracing::info!(
            %symbol,
            price = %fill.filled_price,
            amount = %fill.filled_amount,
            "Paper request filled"
        );
        Ok(fill)
    }
}

#[async_trait]
impl ExchangeAdapter for PaperAdapter {
    async fn add_stage(&self, request: StageAddRequest) -> Result<FillConfirmation, ExecutionRejection> {
        tracing::debug!(
            symbol = %request.symbol,
            notional = %request.notional(),
            leverage = %request.leverage,
            "Paper stage add"
        );
        let (direction, price, amount) = (
            request.direction,
            request.reference_price,
            request.investment_amount,
        );
        self.execute(ExecutionRequest::StageAdd(request), direction, true, price, amount)
            .await
    }

    async fn take_profit(&self, request: ProfitTakeRequest) -> Result<FillConfirmation, ExecutionRejection> {
        let (direction, price, amount) = (request.direction, request.reference_price, request.notional);
        self.execute(ExecutionRequest::ProfitTake(request), direction, false, price, amount)
            .await
    }

    async fn close(&self, request: CloseRequest) -> Result<FillConfirmation, ExecutionRejection> {
        let (direction, price, amount) = (request.direction, request.reference_price, request.notional);
        self.execute(ExecutionRequest::Close(request), direction, false, price, amount)
            .await
    }
}
