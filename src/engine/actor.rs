//! Per-position actor
//!
//! Each position is owned by one task. Ticks, signals and operator commands
//! arrive through an mpsc mailbox and are handled strictly one at a time, so
//! no two evaluations of the same position ever overlap. The only state shared
//! between actors is the vault ledger.

use super::types::{EngineError, PositionCommand, TickOutcome};
use crate::config::EngineTiming;
use crate::execution::{
    CloseRequest, ExchangeAdapter, ExecutionRejection, FillConfirmation, ProfitTakeRequest,
    StageAddRequest,
};
use crate::feed::{is_stale, CorrelationSource, PriceTick};
use crate::position::{
    HoldState, PendingOperation, Position, PositionScaler, PositionSnapshot, PositionStatus,
    ScalingDecision, StageProposal,
};
use crate::profit::{ProfitAction, ProfitTakingCoordinator};
use crate::signal::SignalSnapshot;
use crate::telemetry::metrics;
use crate::vault::VaultManager;
use chrono::Utc;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Components shared by every position actor of an engine
pub(crate) struct EngineContext {
    pub vault: Arc<VaultManager>,
    pub scaler: PositionScaler,
    pub coordinator: ProfitTakingCoordinator,
    pub adapter: Arc<dyn ExchangeAdapter>,
    pub correlations: Option<Arc<dyn CorrelationSource>>,
    pub timing: EngineTiming,
}

/// Exchange call result after applying the confirmation timeout
enum Confirmation {
    Filled(FillConfirmation),
    Failed(ExecutionRejection),
    TimedOut,
}

pub(crate) struct PositionActor {
    ctx: Arc<EngineContext>,
    position: Position,
    last_price: Option<Decimal>,
    last_signal: Option<SignalSnapshot>,
    /// Raised once the position is CLOSED or LIQUIDATED
    finished: Arc<AtomicBool>,
}

impl PositionActor {
    pub fn new(ctx: Arc<EngineContext>, position: Position, signal: SignalSnapshot) -> Self {
        Self {
            ctx,
            position,
            last_price: None,
            last_signal: Some(signal),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn finished_flag(&self) -> Arc<AtomicBool> {
        self.finished.clone()
    }

    /// Process commands until every handle is dropped
    pub async fn run(mut self, mut mailbox: mpsc::Receiver<PositionCommand>) {
        tracing::debug!(position_id = %self.position.id, "Position actor started");
        while let Some(command) = mailbox.recv().await {
            self.handle(command).await;
        }
        tracing::debug!(position_id = %self.position.id, "Position actor stopped");
    }

    async fn handle(&mut self, command: PositionCommand) {
        match command {
            PositionCommand::Tick { tick, reply } => {
                let result = self.on_tick(tick).await;
                self.publish();
                let _ = reply.send(result);
            }
            PositionCommand::Signal { signal, reply } => {
                let result = self.on_signal(signal).await;
                self.publish();
                let _ = reply.send(result);
            }
            PositionCommand::ConfirmPending { fill, reply } => {
                let result = self.confirm_pending(fill);
                self.publish();
                let _ = reply.send(result);
            }
            PositionCommand::CancelPending { reply } => {
                let result = self.cancel_pending();
                self.publish();
                let _ = reply.send(result);
            }
            PositionCommand::CloseNow { price, reply } => {
                let result = self.close_now(price).await;
                self.publish();
                let _ = reply.send(result);
            }
            PositionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    /// Update gauges and raise the finished flag before the caller sees the reply
    fn publish(&self) {
        metrics::set_position_gauges(&self.snapshot());
        if self.position.status.is_terminal() && !self.finished.swap(true, Ordering::AcqRel) {
            tracing::info!(position_id = %self.position.id, status = %self.position.status, "Position finished");
        }
    }

    pub fn snapshot(&self) -> PositionSnapshot {
        self.position.snapshot(self.last_price)
    }

    pub async fn on_tick(&mut self, tick: PriceTick) -> Result<TickOutcome, EngineError> {
        if self.position.status.is_terminal() {
            return Ok(TickOutcome::Inactive);
        }
        let now = Utc::now();
        if is_stale(tick.timestamp, now, self.ctx.timing.max_data_age) {
            tracing::warn!(position_id = %self.position.id, price = %tick.price, "Stale price tick skipped");
            return Err(EngineError::StaleData {
                what: "price",
                age: tick.age(now),
            });
        }
        self.last_price = Some(tick.price);
        self.evaluate(tick.price).await
    }

    pub async fn on_signal(&mut self, signal: SignalSnapshot) -> Result<TickOutcome, EngineError> {
        if self.position.status.is_terminal() {
            return Ok(TickOutcome::Inactive);
        }
        let now = Utc::now();
        if is_stale(signal.timestamp, now, self.ctx.timing.max_data_age) {
            tracing::warn!(position_id = %self.position.id, score = %signal.score, "Stale signal skipped");
            return Err(EngineError::StaleData {
                what: "signal",
                age: now - signal.timestamp,
            });
        }
        self.last_signal = Some(signal);
        match self.last_price {
            Some(price) => self.evaluate(price).await,
            None => Ok(TickOutcome::NoAction),
        }
    }

    /// Profit-taking first, then scaling
    async fn evaluate(&mut self, price: Decimal) -> Result<TickOutcome, EngineError> {
        let ctx = self.ctx.clone();
        match ctx.coordinator.evaluate(&mut self.position, price)? {
            ProfitAction::Liquidate => return self.liquidate(),
            ProfitAction::TakeProfit {
                level,
                close_fraction,
            } => return self.take_profit(level, close_fraction, price).await,
            ProfitAction::CloseRemaining => return self.close_remaining(price).await,
            ProfitAction::NoAction => {}
        }
        if self.position.is_on_hold() {
            return Ok(TickOutcome::OnHold);
        }

        let Some(signal) = self.last_signal.clone() else {
            return Ok(TickOutcome::NoAction);
        };
        if is_stale(signal.timestamp, Utc::now(), ctx.timing.max_data_age) {
            tracing::debug!(position_id = %self.position.id, "Signal stale, scaling not evaluated");
            return Ok(TickOutcome::NoAction);
        }

        let snapshot = ctx.vault.snapshot();
        let decision = ctx.scaler.evaluate_scaling(
            &self.position,
            &snapshot,
            price,
            &signal,
            ctx.correlations.as_deref(),
        );
        match decision {
            ScalingDecision::NoAction(reason) => {
                tracing::debug!(position_id = %self.position.id, ?reason, "No scaling action");
                Ok(TickOutcome::NoAction)
            }
            ScalingDecision::Rejected(rejection) => {
                metrics::record_rejection(rejection.code());
                Err(rejection.into())
            }
            ScalingDecision::Scale(proposal) => self.add_stage(proposal).await,
        }
    }

    /// Reserve, request, then confirm or roll back
    async fn add_stage(&mut self, proposal: StageProposal) -> Result<TickOutcome, EngineError> {
        let ctx = self.ctx.clone();
        if let Err(err) = ctx
            .vault
            .reserve_stage(&self.position, &proposal, ctx.correlations.as_deref())
        {
            let err = EngineError::from(err);
            if let EngineError::Risk(rejection) = &err {
                metrics::record_rejection(rejection.code());
            }
            return Err(err);
        }

        let previous_status = self.position.status;
        if let Err(err) = self.position.transition(PositionStatus::Scaling) {
            ctx.vault
                .release_reservation(self.position.id, proposal.investment_amount)?;
            return Err(err.into());
        }

        let request = StageAddRequest {
            symbol: self.position.symbol.clone(),
            direction: self.position.direction,
            investment_amount: proposal.investment_amount,
            leverage: proposal.leverage,
            reference_price: proposal.reference_price,
        };
        match self.confirm(ctx.adapter.add_stage(request)).await {
            Confirmation::Filled(fill) => self.apply_stage_fill(&proposal, &fill),
            Confirmation::Failed(rejection) => {
                ctx.vault
                    .release_reservation(self.position.id, proposal.investment_amount)?;
                self.position.transition(previous_status)?;
                metrics::record_execution_failure("add_stage");
                tracing::warn!(
                    position_id = %self.position.id,
                    stage = proposal.stage_index,
                    %rejection,
                    "Stage execution failed, reservation rolled back"
                );
                Err(EngineError::Execution {
                    op: "add_stage",
                    source: rejection,
                })
            }
            Confirmation::TimedOut => {
                self.hold(
                    "add_stage",
                    PendingOperation::StageAdd {
                        proposal,
                        previous_status,
                    },
                );
                Ok(TickOutcome::OnHold)
            }
        }
    }

    fn apply_stage_fill(
        &mut self,
        proposal: &StageProposal,
        fill: &FillConfirmation,
    ) -> Result<TickOutcome, EngineError> {
        let ctx = self.ctx.clone();
        let unfilled = match ctx.scaler.apply_fill(&mut self.position, proposal, fill) {
            Ok(unfilled) => unfilled,
            Err(err) => {
                ctx.vault
                    .release_reservation(self.position.id, proposal.investment_amount)?;
                let fallback = if self.position.stages.is_empty() {
                    PositionStatus::Opening
                } else {
                    PositionStatus::Monitoring
                };
                self.position.transition(fallback)?;
                return Err(err.into());
            }
        };
        if unfilled > Decimal::ZERO {
            ctx.vault.release_reservation(self.position.id, unfilled)?;
            tracing::info!(position_id = %self.position.id, %unfilled, "Partial stage fill, remainder released");
        }
        self.position.transition(PositionStatus::Monitoring)?;
        metrics::record_stage(&self.position.symbol);
        metrics::set_vault_gauges(ctx.vault.id(), &ctx.vault.snapshot());
        Ok(TickOutcome::StageAdded {
            stage_index: proposal.stage_index,
        })
    }

    async fn take_profit(
        &mut self,
        level: usize,
        close_fraction: Decimal,
        price: Decimal,
    ) -> Result<TickOutcome, EngineError> {
        let ctx = self.ctx.clone();
        let request = ProfitTakeRequest {
            symbol: self.position.symbol.clone(),
            direction: self.position.direction,
            close_fraction,
            notional: self.position.total_position_value * close_fraction,
            reference_price: price,
        };
        match self.confirm(ctx.adapter.take_profit(request)).await {
            Confirmation::Filled(fill) => self.apply_profit_fill(level, &fill),
            Confirmation::Failed(rejection) => {
                metrics::record_execution_failure("take_profit");
                tracing::warn!(position_id = %self.position.id, level, %rejection, "Profit take failed");
                Err(EngineError::Execution {
                    op: "take_profit",
                    source: rejection,
                })
            }
            Confirmation::TimedOut => {
                self.hold(
                    "take_profit",
                    PendingOperation::ProfitTake {
                        level,
                        close_fraction,
                    },
                );
                Ok(TickOutcome::OnHold)
            }
        }
    }

    fn apply_profit_fill(&mut self, level: usize, fill: &FillConfirmation) -> Result<TickOutcome, EngineError> {
        let ctx = self.ctx.clone();
        let settlement = ctx
            .coordinator
            .apply_take_profit(&mut self.position, level, fill, &ctx.vault)?;
        metrics::record_profit_take(&self.position.symbol, level);
        metrics::set_vault_gauges(ctx.vault.id(), &ctx.vault.snapshot());
        Ok(TickOutcome::ProfitTaken {
            level,
            fraction: settlement.fraction,
        })
    }

    async fn close_remaining(&mut self, price: Decimal) -> Result<TickOutcome, EngineError> {
        let ctx = self.ctx.clone();
        let request = CloseRequest {
            symbol: self.position.symbol.clone(),
            direction: self.position.direction,
            notional: self.position.total_position_value * self.position.remaining_fraction,
            reference_price: price,
        };
        match self.confirm(ctx.adapter.close(request)).await {
            Confirmation::Filled(fill) => self.apply_close_fill(&fill),
            Confirmation::Failed(rejection) => {
                metrics::record_execution_failure("close");
                tracing::warn!(position_id = %self.position.id, %rejection, "Close failed");
                Err(EngineError::Execution {
                    op: "close",
                    source: rejection,
                })
            }
            Confirmation::TimedOut => {
                self.hold("close", PendingOperation::Close);
                Ok(TickOutcome::OnHold)
            }
        }
    }

    fn apply_close_fill(&mut self, fill: &FillConfirmation) -> Result<TickOutcome, EngineError> {
        let ctx = self.ctx.clone();
        let settlement = ctx
            .coordinator
            .apply_final_close(&mut self.position, fill, &ctx.vault)?;
        metrics::set_vault_gauges(ctx.vault.id(), &ctx.vault.snapshot());
        if self.position.status.is_terminal() {
            Ok(TickOutcome::Closed {
                pnl: self.position.realized_pnl,
            })
        } else {
            Ok(TickOutcome::PartiallyClosed {
                fraction: settlement.fraction,
            })
        }
    }

    fn liquidate(&mut self) -> Result<TickOutcome, EngineError> {
        let ctx = self.ctx.clone();
        let settlement = ctx.coordinator.apply_liquidation(&mut self.position, &ctx.vault)?;
        metrics::record_liquidation(&self.position.symbol);
        metrics::set_vault_gauges(ctx.vault.id(), &ctx.vault.snapshot());
        Ok(TickOutcome::Liquidated {
            pnl: settlement.pnl,
        })
    }

    /// Operator supplies the fill of the operation that timed out
    pub fn confirm_pending(&mut self, fill: FillConfirmation) -> Result<TickOutcome, EngineError> {
        let Some(hold) = self.position.hold.take() else {
            return Err(EngineError::InvalidState("no pending operation".to_string()));
        };
        tracing::info!(position_id = %self.position.id, pending = ?hold.pending, "Pending operation confirmed");

        let result = match &hold.pending {
            PendingOperation::StageAdd { proposal, .. } => self.apply_stage_fill(proposal, &fill),
            PendingOperation::ProfitTake { level, .. } => self.apply_profit_fill(*level, &fill),
            PendingOperation::Close => self.apply_close_fill(&fill),
        };
        // a failed stage fill has already rolled back its reservation
        let keep_pending = !matches!(hold.pending, PendingOperation::StageAdd { .. });
        if result.is_err() && keep_pending && !self.position.status.is_terminal() {
            self.position.hold = Some(hold);
        }
        result
    }

    /// Operator abandons the operation that timed out; a reserved stage is rolled back
    pub fn cancel_pending(&mut self) -> Result<TickOutcome, EngineError> {
        let Some(hold) = self.position.hold.take() else {
            return Err(EngineError::InvalidState("no pending operation".to_string()));
        };
        let ctx = self.ctx.clone();

        if let PendingOperation::StageAdd {
            proposal,
            previous_status,
        } = &hold.pending
        {
            ctx.vault
                .release_reservation(self.position.id, proposal.investment_amount)?;
            self.position.transition(*previous_status)?;
            if self.position.stages.is_empty() {
                ctx.vault.abandon_position(&mut self.position)?;
                tracing::info!(position_id = %self.position.id, "First stage cancelled, position abandoned");
                return Ok(TickOutcome::Closed { pnl: Decimal::ZERO });
            }
        }
        tracing::info!(position_id = %self.position.id, pending = ?hold.pending, "Pending operation cancelled");
        Ok(TickOutcome::Cancelled)
    }

    /// Operator-requested close of everything still open
    pub async fn close_now(&mut self, price: Decimal) -> Result<TickOutcome, EngineError> {
        if self.position.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "position already {}",
                self.position.status
            )));
        }
        if self.position.is_on_hold() {
            return Err(EngineError::InvalidState(
                "operation pending: confirm or cancel it first".to_string(),
            ));
        }
        self.last_price = Some(price);
        if self.position.stages.is_empty() {
            self.ctx.vault.abandon_position(&mut self.position)?;
            return Ok(TickOutcome::Closed { pnl: Decimal::ZERO });
        }
        tracing::info!(position_id = %self.position.id, %price, "Manual close requested");
        self.close_remaining(price).await
    }

    /// Abandon a position whose first stage never filled
    pub fn abandon(&mut self) -> Result<(), EngineError> {
        self.ctx.vault.abandon_position(&mut self.position)?;
        Ok(())
    }

    async fn confirm(
        &self,
        request: impl Future<Output = Result<FillConfirmation, ExecutionRejection>>,
    ) -> Confirmation {
        match tokio::time::timeout(self.ctx.timing.confirmation_timeout, request).await {
            Ok(Ok(fill)) => Confirmation::Filled(fill),
            Ok(Err(rejection)) => Confirmation::Failed(rejection),
            Err(_) => Confirmation::TimedOut,
        }
    }

    fn hold(&mut self, op: &'static str, pending: PendingOperation) {
        tracing::warn!(
            position_id = %self.position.id,
            op,
            timeout_ms = self.ctx.timing.confirmation_timeout.as_millis() as u64,
            "Confirmation timed out, position on HOLD"
        );
        metrics::record_hold(op);
        self.position.hold = Some(HoldState {
            pending,
            since: Utc::now(),
        });
    }
}

/// Cloneable request/reply handle to a position actor
#[derive(Debug, Clone)]
pub struct PositionHandle {
    id: Uuid,
    symbol: String,
    sender: mpsc::Sender<PositionCommand>,
    finished: Arc<AtomicBool>,
}

impl PositionHandle {
    pub(crate) fn new(
        id: Uuid,
        symbol: String,
        sender: mpsc::Sender<PositionCommand>,
        finished: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            symbol,
            sender,
            finished,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// True once the position is CLOSED or LIQUIDATED, or its actor has stopped
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire) || self.sender.is_closed()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> PositionCommand,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| EngineError::ActorGone(self.id))?;
        reply_rx.await.map_err(|_| EngineError::ActorGone(self.id))
    }

    pub async fn on_tick(&self, tick: PriceTick) -> Result<TickOutcome, EngineError> {
        self.request(|reply| PositionCommand::Tick { tick, reply }).await?
    }

    pub async fn on_signal(&self, signal: SignalSnapshot) -> Result<TickOutcome, EngineError> {
        self.request(|reply| PositionCommand::Signal { signal, reply }).await?
    }

    pub async fn confirm_pending(&self, fill: FillConfirmation) -> Result<TickOutcome, EngineError> {
        self.request(|reply| PositionCommand::ConfirmPending { fill, reply })
            .await?
    }

    pub async fn cancel_pending(&self) -> Result<TickOutcome, EngineError> {
        self.request(|reply| PositionCommand::CancelPending { reply }).await?
    }

    pub async fn close_now(&self, price: Decimal) -> Result<TickOutcome, EngineError> {
        self.request(|reply| PositionCommand::CloseNow { price, reply }).await?
    }

    pub async fn snapshot(&self) -> Result<PositionSnapshot, EngineError> {
        self.request(|reply| PositionCommand::Snapshot { reply }).await
    }
}
