//! Risk guard: the single gate for every bankroll-consuming action

use super::{RiskParameters, RiskRejection};
use crate::feed::CorrelationSource;
use crate::position::math::{liquidation_distance, StageLeg, StageTotals};
use crate::position::{Position, StageProposal};
use crate::signal::SignalSnapshot;
use crate::vault::{LedgerSnapshot, VaultLimits};
use rust_decimal::Decimal;

/// Stateless policy gate
#[derive(Debug, Clone)]
pub struct RiskGuard {
    params: RiskParameters,
}

impl RiskGuard {
    pub fn new(params: RiskParameters) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RiskParameters {
        &self.params
    }

    /// Signal must meet the confidence and consensus minimums
    pub fn check_signal(&self, signal: &SignalSnapshot) -> Result<(), RiskRejection> {
        if signal.score < self.params.min_signal_confidence
            || signal.consensus_count < self.params.min_consensus_signals
        {
            return Err(RiskRejection::SignalTooWeak {
                score: signal.score,
                consensus_count: signal.consensus_count,
            });
        }
        Ok(())
    }

    /// Admission policy for a new position
    pub fn admit(
        &self,
        vault: &LedgerSnapshot,
        limits: &VaultLimits,
        signal: &SignalSnapshot,
        first_investment: Decimal,
    ) -> Result<(), RiskRejection> {
        if vault.open_positions() >= limits.max_positions {
            return Err(RiskRejection::PositionLimitExceeded {
                max_positions: limits.max_positions,
            });
        }

        self.check_signal(signal)?;

        let drawdown = vault.drawdown();
        if drawdown > self.params.max_drawdown_pct {
            return Err(RiskRejection::DrawdownLimitReached {
                drawdown,
                limit: self.params.max_drawdown_pct,
            });
        }

        if first_investment > vault.uncommitted() {
            return Err(RiskRejection::InsufficientBankroll {
                required: first_investment,
                available: vault.uncommitted(),
            });
        }

        let projected_pct = ratio(vault.aggregate_exposure() + first_investment, vault.bankroll());
        if projected_pct > limits.risk_ceiling_pct {
            return Err(RiskRejection::RiskCeilingExceeded {
                projected_pct,
                limit_pct: limits.risk_ceiling_pct,
            });
        }

        Ok(())
    }

    /// Approve a stage; checks short-circuit on the first failure
    pub fn approve(
        &self,
        vault: &LedgerSnapshot,
        position: &Position,
        proposal: &StageProposal,
        correlations: Option<&dyn CorrelationSource>,
    ) -> Result<(), RiskRejection> {
        let investment = proposal.investment_amount;

        // 1. bankroll
        if investment > vault.uncommitted() {
            return Err(RiskRejection::InsufficientBankroll {
                required: investment,
                available: vault.uncommitted(),
            });
        }

        // 2. vault risk
        let projected_pct = ratio(
            vault.aggregate_exposure() + investment * proposal.leverage,
            vault.bankroll(),
        );
        if projected_pct > self.params.max_risk_per_vault_pct {
            return Err(RiskRejection::RiskCeilingExceeded {
                projected_pct,
                limit_pct: self.params.max_risk_per_vault_pct,
            });
        }

        // 3. correlation, best-effort
        self.check_correlation(vault, position, correlations)?;

        // 4. liquidation buffer
        let projected = StageTotals::projected(
            position.direction,
            &position.stages,
            StageLeg {
                investment,
                notional: proposal.position_notional,
                price: proposal.reference_price,
            },
            Decimal::ZERO,
            self.params.liquidation_buffer_pct,
        );
        if let Some(liq) = projected.liquidation_price {
            let distance = liquidation_distance(proposal.reference_price, liq);
            if distance <= self.params.liquidation_buffer_pct {
                return Err(RiskRejection::LiquidationBufferViolated {
                    distance,
                    buffer: self.params.liquidation_buffer_pct,
                });
            }
        }

        Ok(())
    }

    fn check_correlation(
        &self,
        vault: &LedgerSnapshot,
        position: &Position,
        correlations: Option<&dyn CorrelationSource>,
    ) -> Result<(), RiskRejection> {
        let others = vault.exposures().filter(|(id, _)| **id != position.id);

        let Some(source) = correlations else {
            if vault.open_positions() > 1 {
                tracing::warn!(
                    position_id = %position.id,
                    "Correlation data unavailable, skipping correlation check"
                );
            }
            return Ok(());
        };

        for (_, other) in others {
            match source.correlation(&position.symbol, &other.symbol) {
                Some(correlation) if correlation.abs() > self.params.correlation_threshold_pct => {
                    return Err(RiskRejection::CorrelationTooHigh {
                        other_symbol: other.symbol.clone(),
                        correlation,
                        limit: self.params.correlation_threshold_pct,
                    });
                }
                Some(_) => {}
                None => {
                    tracing::warn!(
                        symbol = %position.symbol,
                        other = %other.symbol,
                        "No correlation for pair, skipping"
                    );
                }
            }
        }
        Ok(())
    }
}

fn ratio(numerator: Decimal, bankroll: Decimal) -> Decimal {
    if bankroll <= Decimal::ZERO {
        return Decimal::MAX;
    }
    numerator / bankroll
}
