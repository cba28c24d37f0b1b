//! End-to-end flows through the engine and the paper adapter

use futures_util::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use scale_engine::config::Config;
use scale_engine::engine::{Engine, EngineError, ErrorKind, PositionHandle, TickOutcome};
use scale_engine::execution::{ExecutionRequest, PaperAdapter};
use scale_engine::feed::{CorrelationMatrix, CorrelationSource, PriceTick};
use scale_engine::position::{Direction, PositionStatus};
use scale_engine::risk::RiskRejection;
use scale_engine::signal::SignalSnapshot;
use std::sync::Arc;

fn config(max_positions: usize) -> Config {
    toml::from_str(&format!(
        r#"
        [vault]
        id = "main"
        bankroll = 10000
        max_positions = {max_positions}
        risk_ceiling_pct = 0.5

        [engine]
        confirmation_timeout_ms = 500
        "#
    ))
    .unwrap()
}

fn engine(max_positions: usize, adapter: Arc<PaperAdapter>) -> Engine {
    Engine::new(config(max_positions).validate().unwrap(), adapter, None)
}

fn signal(symbol: &str, score: Decimal) -> SignalSnapshot {
    SignalSnapshot::new(symbol, score, 3)
}

fn tick(symbol: &str, price: Decimal) -> PriceTick {
    PriceTick::new(symbol, price)
}

/// Open at 100 and scale to four stages on scores improving by 0.06
async fn four_stage_long(engine: &Engine) -> PositionHandle {
    let handle = engine
        .open("BTCUSDT", Direction::Long, signal("BTCUSDT", dec!(0.65)), tick("BTCUSDT", dec!(100)))
        .await
        .unwrap();
    for (score, stage) in [(dec!(0.71), 2), (dec!(0.77), 3), (dec!(0.83), 4)] {
        let outcome = handle.on_signal(signal("BTCUSDT", score)).await.unwrap();
        assert_eq!(outcome, TickOutcome::StageAdded { stage_index: stage });
    }
    handle
}

#[tokio::test]
async fn test_four_stage_build_up() {
    let engine = engine(2, Arc::new(PaperAdapter::new(dec!(0))));
    let handle = four_stage_long(&engine).await;

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.stage_index, 4);
    assert_eq!(snapshot.total_invested, dec!(1500));
    assert_eq!(snapshot.profit_threshold, dec!(1125));
    assert_eq!(snapshot.take_profit_trigger, dec!(2625));
    assert_eq!(snapshot.liquidation_price.unwrap().round_dp(3), dec!(80.658));
    assert_eq!(engine.vault().aggregate_exposure(), dec!(1500));

    // stage cap reached, a better score adds nothing
    let outcome = handle.on_signal(signal("BTCUSDT", dec!(0.95))).await.unwrap();
    assert_eq!(outcome, TickOutcome::NoAction);
}

#[tokio::test]
async fn test_profit_cascade_to_second_level() {
    let engine = engine(2, Arc::new(PaperAdapter::new(dec!(0))));
    let handle = four_stage_long(&engine).await;

    let outcome = handle.on_tick(tick("BTCUSDT", dec!(115))).await.unwrap();
    assert_eq!(
        outcome,
        TickOutcome::ProfitTaken {
            level: 1,
            fraction: dec!(0.30)
        }
    );
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.remaining_fraction, dec!(0.70));
    assert_eq!(snapshot.realized_pnl, dec!(342));
    assert_eq!(snapshot.current_margin, dec!(1848));
    assert_eq!(engine.vault().bankroll(), dec!(10342));
    assert_eq!(engine.vault().aggregate_exposure(), dec!(1050));

    // new high, stop ratchets up
    let outcome = handle.on_tick(tick("BTCUSDT", dec!(120))).await.unwrap();
    assert_eq!(outcome, TickOutcome::NoAction);
    assert_eq!(handle.snapshot().await.unwrap().status, PositionStatus::Trailing1);

    // margin 1954.4 is below the 2008.3 stop
    let outcome = handle.on_tick(tick("BTCUSDT", dec!(117))).await.unwrap();
    assert_eq!(
        outcome,
        TickOutcome::ProfitTaken {
            level: 2,
            fraction: dec!(0.25)
        }
    );
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.remaining_fraction, dec!(0.45));
    assert_eq!(snapshot.realized_pnl, dec!(665));
    assert_eq!(snapshot.status, PositionStatus::TakingProfit2);
}

#[tokio::test]
async fn test_trailing_stop_closes_remainder() {
    let engine = engine(2, Arc::new(PaperAdapter::new(dec!(0))));
    let handle = four_stage_long(&engine).await;
    handle.on_tick(tick("BTCUSDT", dec!(115))).await.unwrap();
    handle.on_tick(tick("BTCUSDT", dec!(120))).await.unwrap();
    handle.on_tick(tick("BTCUSDT", dec!(117))).await.unwrap();

    // 3% stop below 1256.4; a drop to 110 takes margin to 1017
    let outcome = handle.on_tick(tick("BTCUSDT", dec!(110))).await.unwrap();
    let TickOutcome::Closed { pnl } = outcome else {
        panic!("expected close, got {outcome:?}");
    };
    // 342 + 323 + 0.45 × 760
    assert_eq!(pnl, dec!(1007));
    assert_eq!(engine.vault().open_count(), 0);
    assert_eq!(engine.vault().aggregate_exposure(), dec!(0));
    assert_eq!(engine.vault().bankroll(), dec!(11007));

    let outcome = handle.on_tick(tick("BTCUSDT", dec!(130))).await.unwrap();
    assert_eq!(outcome, TickOutcome::Inactive);
}

#[tokio::test]
async fn test_liquidation_after_first_profit_take() {
    let engine = engine(2, Arc::new(PaperAdapter::new(dec!(0))));
    let handle = four_stage_long(&engine).await;
    handle.on_tick(tick("BTCUSDT", dec!(115))).await.unwrap();

    let outcome = handle.on_tick(tick("BTCUSDT", dec!(80))).await.unwrap();
    assert_eq!(outcome, TickOutcome::Liquidated { pnl: dec!(-1050) });
    assert_eq!(engine.vault().bankroll(), dec!(9292));
    assert_eq!(engine.vault().open_count(), 0);

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.status, PositionStatus::Liquidated);
    assert_eq!(snapshot.remaining_fraction, dec!(0));
}

#[tokio::test]
async fn test_execution_failure_rolls_back_reservation() {
    let adapter = Arc::new(PaperAdapter::new(dec!(0)));
    let engine = engine(2, adapter.clone());
    let handle = engine
        .open("BTCUSDT", Direction::Long, signal("BTCUSDT", dec!(0.65)), tick("BTCUSDT", dec!(100)))
        .await
        .unwrap();

    adapter.fail_next("insufficient margin at venue").await;
    let err = handle.on_signal(signal("BTCUSDT", dec!(0.71))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);
    assert!(!err.is_recoverable());

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.stage_index, 1);
    assert_eq!(snapshot.status, PositionStatus::Monitoring);
    assert_eq!(engine.vault().aggregate_exposure(), dec!(100));

    // not retried automatically; the next qualifying signal tries again
    assert_eq!(adapter.requests().await.len(), 2);
    let outcome = handle.on_signal(signal("BTCUSDT", dec!(0.71))).await.unwrap();
    assert_eq!(outcome, TickOutcome::StageAdded { stage_index: 2 });
    assert_eq!(engine.vault().aggregate_exposure(), dec!(300));
}

#[tokio::test]
async fn test_concurrent_signals_add_one_stage() {
    let adapter = Arc::new(PaperAdapter::new(dec!(0)));
    let engine = engine(2, adapter.clone());
    let handle = engine
        .open("BTCUSDT", Direction::Long, signal("BTCUSDT", dec!(0.65)), tick("BTCUSDT", dec!(100)))
        .await
        .unwrap();

    let other = handle.clone();
    let (a, b) = tokio::join!(
        handle.on_signal(signal("BTCUSDT", dec!(0.71))),
        other.on_signal(signal("BTCUSDT", dec!(0.71))),
    );
    let added = [a.unwrap(), b.unwrap()]
        .into_iter()
        .filter(|o| matches!(o, TickOutcome::StageAdded { .. }))
        .count();

    assert_eq!(added, 1);
    assert_eq!(handle.snapshot().await.unwrap().stage_index, 2);
    assert_eq!(engine.vault().aggregate_exposure(), dec!(300));
    assert_eq!(adapter.requests().await.len(), 2);
}

#[tokio::test]
async fn test_concurrent_burst_never_double_counts() {
    let adapter = Arc::new(PaperAdapter::new(dec!(0)));
    let engine = engine(2, adapter.clone());
    let handle = engine
        .open("BTCUSDT", Direction::Long, signal("BTCUSDT", dec!(0.65)), tick("BTCUSDT", dec!(100)))
        .await
        .unwrap();

    // 50 arrivals: ticks wander 97..=101, scores climb to 0.95
    let arrivals = (0..50).map(|i| {
        let handle = handle.clone();
        async move {
            if i % 2 == 0 {
                let price = Decimal::from(97 + (i * 7) % 5);
                handle.on_tick(tick("BTCUSDT", price)).await
            } else {
                let score = dec!(0.65) + Decimal::new(i, 2) * dec!(0.6);
                handle.on_signal(signal("BTCUSDT", score.min(dec!(0.95)))).await
            }
        }
    });
    let outcomes = join_all(arrivals).await;

    let mut added: Vec<u8> = outcomes
        .iter()
        .filter_map(|o| match o {
            Ok(TickOutcome::StageAdded { stage_index }) => Some(*stage_index),
            _ => None,
        })
        .collect();
    for err in outcomes.iter().filter_map(|o| o.as_ref().err()) {
        assert!(err.is_recoverable(), "unexpected error {err}");
    }

    let snapshot = handle.snapshot().await.unwrap();
    added.sort_unstable();
    let expected: Vec<u8> = (2..=snapshot.stage_index).collect();
    assert_eq!(added, expected);

    // every stage appears once in the books: 100, 200, 400, 800
    let committed = [dec!(0), dec!(100), dec!(300), dec!(700), dec!(1500)];
    assert_eq!(snapshot.total_invested, committed[snapshot.stage_index as usize]);
    let requested: Decimal = adapter
        .requests()
        .await
        .iter()
        .filter_map(|r| match r {
            ExecutionRequest::StageAdd(stage) => Some(stage.investment_amount),
            _ => None,
        })
        .sum();
    assert_eq!(snapshot.total_invested, requested);
    assert_eq!(engine.vault().aggregate_exposure(), snapshot.total_invested);
    assert_eq!(engine.vault().open_count(), 1);
}

#[tokio::test]
async fn test_concurrent_opens_respect_position_limit() {
    let engine = engine(3, Arc::new(PaperAdapter::new(dec!(0))));
    let symbols = ["BTCUSDT", "ETHUSDT", "SOLUSDT", "BNBUSDT", "XRPUSDT", "ADAUSDT"];

    let results = join_all(symbols.iter().map(|symbol| {
        engine.open(symbol, Direction::Long, signal(symbol, dec!(0.65)), tick(symbol, dec!(100)))
    }))
    .await;

    let opened = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(opened, 3);
    for err in results.into_iter().filter_map(Result::err) {
        assert!(matches!(
            err,
            EngineError::Risk(RiskRejection::PositionLimitExceeded { max_positions: 3 })
        ));
    }
    assert_eq!(engine.vault().open_count(), 3);
    assert_eq!(engine.vault().aggregate_exposure(), dec!(300));
    assert_eq!(engine.snapshots().await.len(), 3);
}

#[tokio::test]
async fn test_correlated_position_rejected() {
    let correlations: Arc<dyn CorrelationSource> =
        Arc::new(CorrelationMatrix::new().with("BTCUSDT", "ETHUSDT", dec!(0.92)));
    let engine = Engine::new(
        config(3).validate().unwrap(),
        Arc::new(PaperAdapter::new(dec!(0))),
        Some(correlations),
    );

    engine
        .open("BTCUSDT", Direction::Long, signal("BTCUSDT", dec!(0.65)), tick("BTCUSDT", dec!(100)))
        .await
        .unwrap();
    let err = engine
        .open("ETHUSDT", Direction::Long, signal("ETHUSDT", dec!(0.65)), tick("ETHUSDT", dec!(100)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Risk(RiskRejection::CorrelationTooHigh { ref other_symbol, .. }) if other_symbol == "BTCUSDT"
    ));
    assert_eq!(engine.vault().open_count(), 1);

    // unknown pairs are not blocked
    engine
        .open("SOLUSDT", Direction::Long, signal("SOLUSDT", dec!(0.65)), tick("SOLUSDT", dec!(100)))
        .await
        .unwrap();
    assert_eq!(engine.vault().open_count(), 2);
}

#[tokio::test]
async fn test_ticks_route_by_symbol() {
    let engine = engine(3, Arc::new(PaperAdapter::new(dec!(0))));
    let btc = engine
        .open("BTCUSDT", Direction::Long, signal("BTCUSDT", dec!(0.65)), tick("BTCUSDT", dec!(100)))
        .await
        .unwrap();
    let eth = engine
        .open("ETHUSDT", Direction::Short, signal("ETHUSDT", dec!(0.65)), tick("ETHUSDT", dec!(100)))
        .await
        .unwrap();

    // short, 2% adverse move up from 100 triggers a retrace stage
    let results = engine.on_tick(tick("ETHUSDT", dec!(102))).await;
    assert_eq!(results.len(), 1);
    let (id, outcome) = &results[0];
    assert_eq!(*id, eth.id());
    assert!(matches!(outcome, Ok(TickOutcome::StageAdded { stage_index: 2 })));

    assert_eq!(btc.snapshot().await.unwrap().stage_index, 1);
    assert!(engine.on_tick(tick("DOGEUSDT", dec!(1))).await.is_empty());
}

#[tokio::test]
async fn test_stale_signal_is_skipped() {
    let engine = engine(2, Arc::new(PaperAdapter::new(dec!(0))));
    let handle = engine
        .open("BTCUSDT", Direction::Long, signal("BTCUSDT", dec!(0.65)), tick("BTCUSDT", dec!(100)))
        .await
        .unwrap();

    let old = signal("BTCUSDT", dec!(0.9)).at(chrono::Utc::now() - chrono::Duration::minutes(5));
    let err = handle.on_signal(old).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StaleData);
    assert!(err.is_recoverable());
    assert_eq!(handle.snapshot().await.unwrap().stage_index, 1);
}
