//! Property tests for position and vault invariants.
//!
//! Uses proptest to verify:
//! 1. Stage totals are consistent after every appended stage
//! 2. The scaler never exceeds the configured stage count
//! 3. The risk guard never approves beyond the vault risk limit
//! 4. Remaining size only shrinks through the profit cascade
//! 5. Trailing stops only ratchet up

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use scale_engine::execution::FillConfirmation;
use scale_engine::position::{
    Direction, Position, PositionScaler, PositionStatus, ScalingDecision, ScalingProgression,
    ScalingStage, ScalingTriggers, StageProposal, TriggerReason,
};
use scale_engine::profit::{ProfitAction, ProfitPlan, ProfitTakingCoordinator, TrailingStop};
use scale_engine::risk::{RiskGuard, RiskParameters};
use scale_engine::signal::SignalSnapshot;
use scale_engine::vault::{VaultLimits, VaultManager};
use std::sync::Arc;

// ── Strategies ───────────────────────────────────────────────────────

fn arb_direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Long), Just(Direction::Short)]
}

/// (investment, leverage, entry price) of one stage
fn arb_leg() -> impl Strategy<Value = (Decimal, Decimal, Decimal)> {
    (1u32..5_000, 1u32..50, 1_000u32..200_000).prop_map(|(invest, lev, price)| {
        (
            Decimal::from(invest),
            Decimal::from(lev),
            Decimal::new(price as i64, 2),
        )
    })
}

fn arb_score() -> impl Strategy<Value = Decimal> {
    (40u32..=100).prop_map(|s| Decimal::new(s as i64, 2))
}

fn new_vault(bankroll: Decimal) -> (VaultManager, Arc<RiskGuard>) {
    let guard = Arc::new(RiskGuard::new(RiskParameters::default()));
    let vault = VaultManager::new(
        VaultLimits {
            id: "prop".to_string(),
            max_positions: 4,
            risk_ceiling_pct: dec!(0.5),
        },
        bankroll,
        guard.clone(),
        8,
    );
    (vault, guard)
}

fn stage(index: u8, (invest, leverage, price): (Decimal, Decimal, Decimal)) -> ScalingStage {
    ScalingStage {
        stage_index: index,
        bankroll_pct: dec!(0.01),
        leverage,
        investment_amount: invest,
        position_notional: invest * leverage,
        entry_price: price,
        signal_score: dec!(0.7),
        trigger_reason: TriggerReason::BetterScore,
        timestamp: chrono::Utc::now(),
    }
}

/// Four stages at 100 reserved against a 10000 bankroll
fn funded_long(vault: &VaultManager) -> Position {
    let signal = SignalSnapshot::new("BTCUSDT", dec!(0.8), 3);
    let progression = ScalingProgression::default();
    let mut position = vault
        .open_position("BTCUSDT", Direction::Long, &signal, progression.first())
        .unwrap();

    for (i, spec) in progression.steps().iter().enumerate() {
        let investment = vault.bankroll() * spec.bankroll_pct;
        let proposal = StageProposal {
            stage_index: i as u8 + 1,
            bankroll_pct: spec.bankroll_pct,
            leverage: spec.leverage,
            investment_amount: investment,
            position_notional: investment * spec.leverage,
            reference_price: dec!(100),
            signal_score: dec!(0.8),
            trigger_reason: TriggerReason::BetterScore,
        };
        vault.reserve_stage(&position, &proposal, None).unwrap();
        position.push_stage(
            stage(proposal.stage_index, (investment, spec.leverage, dec!(100))),
            dec!(0.75),
            dec!(0.02),
        );
    }
    position.status = PositionStatus::Monitoring;
    position
}

// ── 1. Stage totals ──────────────────────────────────────────────────

proptest! {
    /// Totals, threshold and trigger follow the stages; the trigger never drops.
    #[test]
    fn stage_totals_consistent(
        direction in arb_direction(),
        legs in prop::collection::vec(arb_leg(), 1..8),
    ) {
        let mut position = Position::new("prop", "BTCUSDT", direction);
        let mut previous_trigger = Decimal::ZERO;

        for (i, leg) in legs.iter().enumerate() {
            position.push_stage(stage(i as u8 + 1, *leg), dec!(0.75), dec!(0.02));

            let invested: Decimal = position.stages.iter().map(|s| s.investment_amount).sum();
            let notional: Decimal = position.stages.iter().map(|s| s.position_notional).sum();
            prop_assert_eq!(position.total_invested, invested);
            prop_assert_eq!(position.total_position_value, notional);
            prop_assert_eq!(position.profit_threshold, invested * dec!(0.75));
            prop_assert_eq!(position.take_profit_trigger, invested + position.profit_threshold);
            prop_assert!(position.take_profit_trigger >= previous_trigger);
            prop_assert_eq!(position.stage_index() as usize, i + 1);
            previous_trigger = position.take_profit_trigger;

            // liquidation sits on the losing side of the weighted entry
            let liquidation = position.liquidation_price.unwrap();
            match direction {
                Direction::Long => prop_assert!(liquidation < position.entry_price),
                Direction::Short => prop_assert!(liquidation > position.entry_price),
            }
        }
    }
}

// ── 2. Stage cap ─────────────────────────────────────────────────────

proptest! {
    /// However signals and prices move, stages stay within 1..=N and in order.
    #[test]
    fn scaler_respects_stage_cap(
        steps in prop::collection::vec((arb_score(), 90u32..=110), 1..40),
    ) {
        let (vault, guard) = new_vault(dec!(10000));
        let scaler = PositionScaler::new(
            ScalingProgression::default(),
            ScalingTriggers::default(),
            dec!(0.75),
            guard,
        );
        let mut position = Position::new("prop", "BTCUSDT", Direction::Long);

        for (score, price) in steps {
            let price = Decimal::from(price);
            let signal = SignalSnapshot::new("BTCUSDT", score, 3);
            let decision = scaler.evaluate_scaling(&position, &vault.snapshot(), price, &signal, None);
            if let ScalingDecision::Scale(proposal) = decision {
                let fill = FillConfirmation {
                    filled_price: price,
                    filled_amount: proposal.investment_amount,
                };
                scaler.apply_fill(&mut position, &proposal, &fill).unwrap();
            }
            prop_assert!(position.stage_index() <= scaler.max_stages());
        }

        for (i, stage) in position.stages.iter().enumerate() {
            prop_assert_eq!(stage.stage_index as usize, i + 1);
        }
        for pair in position.stages.windows(2) {
            prop_assert!(pair[1].leverage < pair[0].leverage);
            prop_assert!(pair[1].investment_amount > pair[0].investment_amount);
        }
    }
}

// ── 3. Vault risk limit ──────────────────────────────────────────────

proptest! {
    /// A reservation is only ever granted inside bankroll and risk limits.
    #[test]
    fn guard_never_exceeds_risk_limit(
        bankroll in 1_000u32..1_000_000,
        requests in prop::collection::vec((1u32..5_000, 1u32..40), 1..20),
    ) {
        let bankroll = Decimal::from(bankroll);
        let (vault, guard) = new_vault(bankroll);
        let signal = SignalSnapshot::new("BTCUSDT", dec!(0.8), 3);
        let position = vault
            .open_position("BTCUSDT", Direction::Long, &signal, ScalingProgression::default().first())
            .unwrap();
        let limit = guard.params().max_risk_per_vault_pct;

        for (invest, leverage) in requests {
            let investment = Decimal::from(invest);
            let leverage = Decimal::from(leverage);
            let proposal = StageProposal {
                stage_index: 1,
                bankroll_pct: investment / bankroll,
                leverage,
                investment_amount: investment,
                position_notional: investment * leverage,
                reference_price: dec!(100),
                signal_score: dec!(0.8),
                trigger_reason: TriggerReason::Initial,
            };

            let before = vault.snapshot();
            if vault.reserve_stage(&position, &proposal, None).is_ok() {
                prop_assert!(investment <= before.uncommitted());
                prop_assert!((before.aggregate_exposure() + investment * leverage) / before.bankroll() <= limit);
                prop_assert_eq!(vault.aggregate_exposure(), before.aggregate_exposure() + investment);
            } else {
                prop_assert_eq!(vault.aggregate_exposure(), before.aggregate_exposure());
            }
            prop_assert!(vault.aggregate_exposure() <= vault.bankroll());
        }
    }
}

// ── 4. Profit cascade ────────────────────────────────────────────────

proptest! {
    /// Remaining size never grows and is zero once the position is terminal.
    #[test]
    fn remaining_fraction_never_grows(
        prices in prop::collection::vec(75u32..=130, 1..60),
    ) {
        let (vault, _) = new_vault(dec!(10000));
        let coordinator = ProfitTakingCoordinator::new(ProfitPlan::default());
        let mut position = funded_long(&vault);
        let mut previous = position.remaining_fraction;

        for price in prices {
            let price = Decimal::from(price);
            match coordinator.evaluate(&mut position, price).unwrap() {
                ProfitAction::NoAction => {}
                ProfitAction::Liquidate => {
                    coordinator.apply_liquidation(&mut position, &vault).unwrap();
                }
                ProfitAction::TakeProfit { level, close_fraction } => {
                    let fill = FillConfirmation {
                        filled_price: price,
                        filled_amount: position.total_position_value * close_fraction,
                    };
                    coordinator.apply_take_profit(&mut position, level, &fill, &vault).unwrap();
                }
                ProfitAction::CloseRemaining => {
                    let fill = FillConfirmation {
                        filled_price: price,
                        filled_amount: position.total_position_value * position.remaining_fraction,
                    };
                    coordinator.apply_final_close(&mut position, &fill, &vault).unwrap();
                }
            }

            prop_assert!(position.remaining_fraction <= previous);
            prop_assert!(position.remaining_fraction >= Decimal::ZERO);
            prop_assert!(vault.bankroll() >= Decimal::ZERO);
            previous = position.remaining_fraction;

            if position.status.is_terminal() {
                prop_assert_eq!(position.remaining_fraction, Decimal::ZERO);
                prop_assert_eq!(vault.open_count(), 0);
                prop_assert_eq!(vault.aggregate_exposure(), Decimal::ZERO);
                break;
            }
        }
    }
}

// ── 5. Trailing stop ─────────────────────────────────────────────────

proptest! {
    /// The stop level never loosens and a hit stays latched.
    #[test]
    fn trailing_stop_only_tightens(
        start in 100u32..10_000,
        margins in prop::collection::vec(1u32..20_000, 1..50),
        pct in 1u32..20,
    ) {
        let mut stop = TrailingStop::new(Decimal::from(start), Decimal::new(pct as i64, 2));
        let mut level = stop.stop_level;
        let mut hit = false;

        for margin in margins {
            let now_hit = stop.update(Decimal::from(margin));
            prop_assert!(stop.stop_level >= level);
            prop_assert!(!hit || now_hit);
            level = stop.stop_level;
            hit = now_hit;
        }
    }
}
