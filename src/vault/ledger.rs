//! Per-vault bankroll ledger with compare-and-commit semantics

use super::types::VaultError;
use crate::position::Direction;
use crate::risk::{drawdown, RiskRejection};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use uuid::Uuid;

/// Capital committed to one open position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exposure {
    pub symbol: String,
    pub direction: Direction,
    /// Margin currently committed (confirmed stages plus reservations)
    pub committed: Decimal,
}

/// Versioned, consistent view of the ledger.
///
/// Also used as the draft of a pending commit: mutations only land if the
/// ledger version is still the one the draft was read at.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSnapshot {
    version: u64,
    bankroll: Decimal,
    peak_bankroll: Decimal,
    exposures: HashMap<Uuid, Exposure>,
}

impl LedgerSnapshot {
    fn new(bankroll: Decimal) -> Self {
        Self {
            version: 0,
            bankroll,
            peak_bankroll: bankroll,
            exposures: HashMap::new(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn bankroll(&self) -> Decimal {
        self.bankroll
    }

    pub fn peak_bankroll(&self) -> Decimal {
        self.peak_bankroll
    }

    /// Sum of committed capital across open positions
    pub fn aggregate_exposure(&self) -> Decimal {
        self.exposures.values().map(|e| e.committed).sum()
    }

    pub fn uncommitted(&self) -> Decimal {
        self.bankroll - self.aggregate_exposure()
    }

    pub fn open_positions(&self) -> usize {
        self.exposures.len()
    }

    pub fn exposure(&self, position_id: &Uuid) -> Option<&Exposure> {
        self.exposures.get(position_id)
    }

    pub fn exposures(&self) -> impl Iterator<Item = (&Uuid, &Exposure)> {
        self.exposures.iter()
    }

    /// Current drawdown from peak bankroll
    pub fn drawdown(&self) -> Decimal {
        drawdown(self.peak_bankroll, self.bankroll)
    }

    pub(crate) fn admit(&mut self, position_id: Uuid, symbol: &str, direction: Direction) {
        self.exposures.insert(
            position_id,
            Exposure {
                symbol: symbol.to_string(),
                direction,
                committed: Decimal::ZERO,
            },
        );
    }

    pub(crate) fn commit_capital(&mut self, position_id: Uuid, amount: Decimal) -> Result<(), VaultError> {
        if amount > self.uncommitted() {
            return Err(RiskRejection::InsufficientBankroll {
                required: amount,
                available: self.uncommitted(),
            }
            .into());
        }
        let exposure = self
            .exposures
            .get_mut(&position_id)
            .ok_or(VaultError::UnknownPosition(position_id))?;
        exposure.committed += amount;
        Ok(())
    }

    /// Release up to `amount`; returns what was actually released
    pub(crate) fn release_capital(&mut self, position_id: Uuid, amount: Decimal) -> Result<Decimal, VaultError> {
        let exposure = self
            .exposures
            .get_mut(&position_id)
            .ok_or(VaultError::UnknownPosition(position_id))?;
        let released = amount.min(exposure.committed).max(Decimal::ZERO);
        exposure.committed -= released;
        Ok(released)
    }

    pub(crate) fn remove(&mut self, position_id: Uuid) -> Result<Exposure, VaultError> {
        self.exposures
            .remove(&position_id)
            .ok_or(VaultError::UnknownPosition(position_id))
    }

    /// Credit or debit the bankroll; never lets it go negative
    pub(crate) fn apply_pnl(&mut self, pnl: Decimal) -> Result<(), VaultError> {
        let next = self.bankroll + pnl;
        if next < Decimal::ZERO {
            return Err(VaultError::NegativeBankroll {
                bankroll: self.bankroll,
                pnl,
            });
        }
        self.bankroll = next;
        if next > self.peak_bankroll {
            self.peak_bankroll = next;
        }
        Ok(())
    }
}

/// Commit attempted against a stale snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("ledger conflict: draft at version {expected}, ledger at {actual}")]
pub struct LedgerConflict {
    pub expected: u64,
    pub actual: u64,
}

/// Shared bankroll ledger of a vault
#[derive(Debug)]
pub struct BankrollLedger {
    state: Mutex<LedgerSnapshot>,
    max_retries: u32,
}

impl BankrollLedger {
    pub fn new(bankroll: Decimal, max_retries: u32) -> Self {
        Self {
            state: Mutex::new(LedgerSnapshot::new(bankroll)),
            max_retries: max_retries.max(1),
        }
    }

    /// Consistent read of the current state
    pub fn snapshot(&self) -> LedgerSnapshot {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Commit `draft` only if nothing was committed since it was read
    pub fn commit(&self, mut draft: LedgerSnapshot) -> Result<u64, LedgerConflict> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.version != draft.version {
            return Err(LedgerConflict {
                expected: draft.version,
                actual: state.version,
            });
        }
        draft.version += 1;
        let version = draft.version;
        *state = draft;
        Ok(version)
    }

    /// Read, apply `op` to a draft, commit; retry on conflict with fresh state.
    ///
    /// `op` must be free of side effects outside the draft: it can run once per
    /// attempt. Exhausted retries escalate to a `LedgerContention` rejection.
    pub fn update<T>(
        &self,
        name: &'static str,
        mut op: impl FnMut(&mut LedgerSnapshot) -> Result<T, VaultError>,
    ) -> Result<T, VaultError> {
        for attempt in 1..=self.max_retries {
            let mut draft = self.snapshot();
            let value = op(&mut draft)?;
            match self.commit(draft) {
                Ok(_) => return Ok(value),
                Err(conflict) => {
                    tracing::debug!(op = name, attempt, %conflict, "Ledger commit conflict, retrying");
                }
            }
        }
        tracing::warn!(op = name, attempts = self.max_retries, "Ledger contention, giving up");
        Err(RiskRejection::LedgerContention {
            attempts: self.max_retries,
        }
        .into())
    }
}
