//! Vault manager: bankroll custody and position admission

use super::ledger::{BankrollLedger, LedgerSnapshot};
use super::types::{VaultError, VaultLimits};
use crate::feed::CorrelationSource;
use crate::position::{Direction, Position, PositionStatus, StageProposal, StageSpec};
use crate::risk::RiskGuard;
use crate::signal::SignalSnapshot;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Owns a vault's bankroll ledger and its set of open positions
#[derive(Debug)]
pub struct VaultManager {
    limits: VaultLimits,
    ledger: BankrollLedger,
    guard: Arc<RiskGuard>,
}

impl VaultManager {
    pub fn new(limits: VaultLimits, bankroll: Decimal, guard: Arc<RiskGuard>, max_commit_retries: u32) -> Self {
        tracing::info!(vault = %limits.id, %bankroll, max_positions = limits.max_positions, "Vault created");
        Self {
            limits,
            ledger: BankrollLedger::new(bankroll, max_commit_retries),
            guard,
        }
    }

    pub fn id(&self) -> &str {
        &self.limits.id
    }

    pub fn limits(&self) -> &VaultLimits {
        &self.limits
    }

    pub fn guard(&self) -> &RiskGuard {
        &self.guard
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.ledger.snapshot()
    }

    pub fn bankroll(&self) -> Decimal {
        self.ledger.snapshot().bankroll()
    }

    /// Sum of committed capital across open positions
    pub fn aggregate_exposure(&self) -> Decimal {
        self.ledger.snapshot().aggregate_exposure()
    }

    pub fn uncommitted(&self) -> Decimal {
        self.ledger.snapshot().uncommitted()
    }

    pub fn open_count(&self) -> usize {
        self.ledger.snapshot().open_positions()
    }

    /// Admit a new position. The slot is taken atomically with the admission checks.
    pub fn open_position(
        &self,
        symbol: &str,
        direction: Direction,
        initial_signal: &SignalSnapshot,
        first_stage: &StageSpec,
    ) -> Result<Position, VaultError> {
        let position = Position::new(self.limits.id.clone(), symbol, direction);
        let id = position.id;

        self.ledger.update("open_position", |draft| {
            let first_investment = draft.bankroll() * first_stage.bankroll_pct;
            self.guard
                .admit(draft, &self.limits, initial_signal, first_investment)?;
            draft.admit(id, symbol, direction);
            Ok(())
        })?;

        tracing::info!(vault = %self.limits.id, position_id = %id, symbol, %direction, "Position admitted");
        Ok(position)
    }

    /// Reserve bankroll for a proposed stage after Risk Guard approval
    pub fn reserve_stage(
        &self,
        position: &Position,
        proposal: &StageProposal,
        correlations: Option<&dyn CorrelationSource>,
    ) -> Result<(), VaultError> {
        self.ledger.update("reserve_stage", |draft| {
            self.guard.approve(draft, position, proposal, correlations)?;
            draft.commit_capital(position.id, proposal.investment_amount)
        })?;
        tracing::debug!(
            position_id = %position.id,
            stage = proposal.stage_index,
            amount = %proposal.investment_amount,
            "Bankroll reserved"
        );
        Ok(())
    }

    /// Compensating transaction for a reservation that did not (fully) fill
    pub fn release_reservation(&self, position_id: Uuid, amount: Decimal) -> Result<Decimal, VaultError> {
        let released = self
            .ledger
            .update("release_reservation", |draft| draft.release_capital(position_id, amount))?;
        tracing::debug!(%position_id, %released, "Reservation released");
        Ok(released)
    }

    /// Settle a partial close: free `released` capital and book `pnl`
    pub fn realize(&self, position_id: Uuid, released: Decimal, pnl: Decimal) -> Result<Decimal, VaultError> {
        let booked = self.ledger.update("realize", |draft| {
            let freed = draft.release_capital(position_id, released)?;
            let booked = pnl.max(-freed);
            draft.apply_pnl(booked)?;
            Ok(booked)
        })?;
        tracing::info!(%position_id, %released, pnl = %booked, "PnL realized");
        Ok(booked)
    }

    /// Remove a position from the open set and settle its final P&L.
    ///
    /// Losses are bounded by the capital still committed to the position.
    pub fn close_position(
        &self,
        position: &mut Position,
        status: PositionStatus,
        final_pnl: Decimal,
    ) -> Result<Decimal, VaultError> {
        if !status.is_terminal() {
            return Err(VaultError::NotTerminal(status));
        }
        if !position.status.can_transition_to(status) {
            return Err(crate::position::InvalidTransition {
                from: position.status,
                to: status,
            }
            .into());
        }

        let id = position.id;
        let booked = self.ledger.update("close_position", |draft| {
            let exposure = draft.remove(id)?;
            let booked = final_pnl.max(-exposure.committed);
            draft.apply_pnl(booked)?;
            Ok(booked)
        })?;

        position.transition(status)?;
        position.realized_pnl += booked;
        position.remaining_fraction = Decimal::ZERO;
        position.trailing = None;
        position.hold = None;

        tracing::info!(
            vault = %self.limits.id,
            position_id = %id,
            %status,
            pnl = %booked,
            realized_total = %position.realized_pnl,
            "Position closed"
        );
        Ok(booked)
    }

    /// Free the slot of a position whose first stage never filled
    pub fn abandon_position(&self, position: &mut Position) -> Result<(), VaultError> {
        if !position.stages.is_empty() {
            return Err(VaultError::NotTerminal(position.status));
        }
        let id = position.id;
        self.ledger.update("abandon_position", |draft| draft.remove(id).map(|_| ()))?;
        position.transition(PositionStatus::Closed)?;
        position.remaining_fraction = Decimal::ZERO;
        position.hold = None;
        tracing::info!(position_id = %id, "Position abandoned before first fill");
        Ok(())
    }
}
