//! Engine: position registry and command routing
//!
//! Builds the shared components from validated settings, admits positions
//! through the vault, and spawns one actor per position.

mod actor;
mod types;

pub use actor::PositionHandle;
pub use types::{EngineError, ErrorKind, TickOutcome};

use crate::config::EngineSettings;
use crate::execution::ExchangeAdapter;
use crate::feed::{is_stale, CorrelationSource, PriceTick};
use crate::position::{Direction, PositionScaler, PositionSnapshot};
use crate::profit::ProfitTakingCoordinator;
use crate::risk::RiskGuard;
use crate::signal::SignalSnapshot;
use crate::vault::VaultManager;
use actor::{EngineContext, PositionActor};
use chrono::Utc;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

pub struct Engine {
    ctx: Arc<EngineContext>,
    positions: RwLock<HashMap<Uuid, PositionHandle>>,
}

impl Engine {
    pub fn new(
        settings: EngineSettings,
        adapter: Arc<dyn ExchangeAdapter>,
        correlations: Option<Arc<dyn CorrelationSource>>,
    ) -> Self {
        let guard = Arc::new(RiskGuard::new(settings.risk));
        let vault = Arc::new(VaultManager::new(
            settings.vault,
            settings.bankroll,
            guard.clone(),
            settings.timing.max_commit_retries,
        ));
        let scaler = PositionScaler::new(
            settings.progression,
            settings.triggers,
            settings.profit_threshold_pct,
            guard,
        );
        let ctx = EngineContext {
            vault,
            scaler,
            coordinator: ProfitTakingCoordinator::new(settings.plan),
            adapter,
            correlations,
            timing: settings.timing,
        };
        Self {
            ctx: Arc::new(ctx),
            positions: RwLock::new(HashMap::new()),
        }
    }

    pub fn vault(&self) -> &VaultManager {
        &self.ctx.vault
    }

    /// Admit a position and execute its first stage.
    ///
    /// A first stage that is rejected or fails releases the slot again; a
    /// timed-out first stage leaves the position on HOLD.
    pub async fn open(
        &self,
        symbol: &str,
        direction: Direction,
        signal: SignalSnapshot,
        tick: PriceTick,
    ) -> Result<PositionHandle, EngineError> {
        let now = Utc::now();
        if is_stale(signal.timestamp, now, self.ctx.timing.max_data_age) {
            return Err(EngineError::StaleData {
                what: "signal",
                age: now - signal.timestamp,
            });
        }
        if is_stale(tick.timestamp, now, self.ctx.timing.max_data_age) {
            return Err(EngineError::StaleData {
                what: "price",
                age: tick.age(now),
            });
        }

        let position = self.ctx.vault.open_position(
            symbol,
            direction,
            &signal,
            self.ctx.scaler.progression().first(),
        )?;
        let id = position.id;

        let mut actor = PositionActor::new(self.ctx.clone(), position, signal);
        match actor.on_tick(tick).await {
            Ok(TickOutcome::StageAdded { .. }) | Ok(TickOutcome::OnHold) => {}
            Ok(outcome) => {
                actor.abandon()?;
                return Err(EngineError::InvalidState(format!(
                    "first stage not added: {outcome:?}"
                )));
            }
            Err(err) => {
                actor.abandon()?;
                return Err(err);
            }
        }

        let (sender, mailbox) = mpsc::channel(self.ctx.timing.mailbox_capacity);
        let handle = PositionHandle::new(id, symbol.to_string(), sender, actor.finished_flag());
        tokio::spawn(actor.run(mailbox));
        self.positions.write().await.insert(id, handle.clone());

        tracing::info!(position_id = %id, symbol, %direction, "Position opened");
        Ok(handle)
    }

    pub async fn handle(&self, id: Uuid) -> Option<PositionHandle> {
        self.live_handles()
            .await
            .into_iter()
            .find(|h| h.id() == id)
    }

    /// Drop finished positions from the registry and return the rest.
    ///
    /// The actor stops once the last outside handle is dropped.
    async fn live_handles(&self) -> Vec<PositionHandle> {
        let mut positions = self.positions.write().await;
        positions.retain(|id, handle| {
            let finished = handle.is_finished();
            if finished {
                tracing::debug!(position_id = %id, "Finished position removed from registry");
            }
            !finished
        });
        positions.values().cloned().collect()
    }

    async fn handles_for(&self, symbol: &str) -> Vec<PositionHandle> {
        self.live_handles()
            .await
            .into_iter()
            .filter(|h| h.symbol() == symbol)
            .collect()
    }

    /// Number of positions still registered
    pub async fn position_count(&self) -> usize {
        self.live_handles().await.len()
    }

    /// Route a tick to every position on its symbol; positions run concurrently
    pub async fn on_tick(&self, tick: PriceTick) -> Vec<(Uuid, Result<TickOutcome, EngineError>)> {
        let handles = self.handles_for(&tick.symbol).await;
        join_all(handles.iter().map(|h| {
            let tick = tick.clone();
            async move { (h.id(), h.on_tick(tick).await) }
        }))
        .await
    }

    /// Route a signal to every position on its symbol
    pub async fn on_signal(&self, signal: SignalSnapshot) -> Vec<(Uuid, Result<TickOutcome, EngineError>)> {
        let handles = self.handles_for(&signal.symbol).await;
        join_all(handles.iter().map(|h| {
            let signal = signal.clone();
            async move { (h.id(), h.on_signal(signal).await) }
        }))
        .await
    }

    /// Snapshots of every live position, gathered concurrently
    pub async fn snapshots(&self) -> Vec<PositionSnapshot> {
        let handles = self.live_handles().await;
        join_all(handles.iter().map(|h| h.snapshot()))
            .await
            .into_iter()
            .filter_map(Result::ok)
            .filter(|s| !s.status.is_terminal())
            .collect()
    }
}
