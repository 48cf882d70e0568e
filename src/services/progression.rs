//! Progression Engine: one ticking task per running tournament.
//!
//! The engine observes the clock store. Whenever a change leaves a clock
//! running under a new cadence generation it replaces the tournament's ticker;
//! whenever a clock stops running the ticker is aborted. Each ticker lets one
//! clock second elapse per `tick_interval` and stops on its own as soon as a
//! tick is refused (stale generation, paused, finished or removed clock).

use std::{
    sync::{Arc, OnceLock, Weak},
    time::Duration,
};

use dashmap::DashMap;
use tokio::{
    task::JoinHandle,
    time::{Instant, interval_at},
};
use tracing::{debug, warn};

use crate::state::{
    clock::{RunStatus, TournamentId},
    store::{ClockChange, ClockObserver, ClockStateStore},
};

struct Ticker {
    epoch: u64,
    handle: JoinHandle<()>,
}

/// Registry of ticking tasks keyed by tournament.
pub struct ProgressionEngine {
    tick_interval: Duration,
    tickers: DashMap<TournamentId, Ticker>,
    store: OnceLock<Weak<ClockStateStore>>,
}

impl ProgressionEngine {
    /// Create an engine whose clock second lasts `tick_interval`.
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            tick_interval,
            tickers: DashMap::new(),
            store: OnceLock::new(),
        }
    }

    /// Attach the store the tickers drive. Only the first call has an effect.
    pub fn bind(&self, store: &Arc<ClockStateStore>) {
        if self.store.set(Arc::downgrade(store)).is_err() {
            warn!("progression engine already bound to a clock store");
        }
    }

    /// Whether a ticker is registered for the tournament.
    pub fn is_ticking(&self, tournament_id: TournamentId) -> bool {
        self.tickers
            .get(&tournament_id)
            .is_some_and(|ticker| !ticker.handle.is_finished())
    }

    /// Number of live tickers.
    pub fn active_tickers(&self) -> usize {
        self.tickers
            .iter()
            .filter(|ticker| !ticker.handle.is_finished())
            .count()
    }

    /// Abort every ticker, e.g. on shutdown.
    pub fn shutdown(&self) {
        self.tickers.retain(|tournament_id, ticker| {
            debug!(%tournament_id, "stopping ticker");
            ticker.handle.abort();
            false
        });
    }

    fn spawn_ticker(&self, tournament_id: TournamentId, epoch: u64) {
        let Some(store) = self.store.get().cloned() else {
            warn!(%tournament_id, "progression engine not bound; clock will not tick");
            return;
        };

        let handle = tokio::spawn(run_ticker(store, tournament_id, epoch, self.tick_interval));
        if let Some(previous) = self.tickers.insert(tournament_id, Ticker { epoch, handle }) {
            previous.handle.abort();
        }
        debug!(%tournament_id, epoch, "ticker started");
    }

    fn cancel(&self, tournament_id: TournamentId) {
        if let Some((_, ticker)) = self.tickers.remove(&tournament_id) {
            ticker.handle.abort();
            debug!(%tournament_id, epoch = ticker.epoch, "ticker cancelled");
        }
    }
}

impl ClockObserver for ProgressionEngine {
    fn on_change(&self, change: &ClockChange) {
        let tournament_id = change.snapshot.state.tournament_id;
        if change.snapshot.state.run_status != RunStatus::Running {
            self.cancel(tournament_id);
            return;
        }

        let current = self.tickers.get(&tournament_id).map(|ticker| ticker.epoch);
        if current != Some(change.epoch) {
            self.spawn_ticker(tournament_id, change.epoch);
        }
    }
}

impl Drop for ProgressionEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_ticker(
    store: Weak<ClockStateStore>,
    tournament_id: TournamentId,
    epoch: u64,
    period: Duration,
) {
    let mut ticks = interval_at(Instant::now() + period, period);

    loop {
        ticks.tick().await;

        let Some(store) = store.upgrade() else {
            break;
        };

        match store.tick_epoch(tournament_id, epoch, 1).await {
            Ok(Some(change)) if change.snapshot.state.run_status == RunStatus::Running => {}
            Ok(_) => break,
            Err(err) => {
                debug!(%tournament_id, error = %err, "ticker stopped");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::state::clock::{
        ChangeReason, ClockState, ControlOp, LevelTable,
        tests::{level, two_levels},
    };

    fn setup() -> (Arc<ClockStateStore>, Arc<ProgressionEngine>) {
        let engine = Arc::new(ProgressionEngine::new(Duration::from_secs(1)));
        let store = Arc::new(ClockStateStore::new(vec![
            engine.clone() as Arc<dyn ClockObserver>
        ]));
        engine.bind(&store);
        (store, engine)
    }

    async fn armed(store: &ClockStateStore, levels: LevelTable) -> TournamentId {
        let id = Uuid::new_v4();
        store
            .insert(ClockState::armed(id, &levels), levels, ChangeReason::Armed)
            .await;
        id
    }

    async fn wait(secs: u64, millis: u64) {
        tokio::time::sleep(Duration::from_secs(secs) + Duration::from_millis(millis)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn level_advances_after_its_duration() {
        let (store, engine) = setup();
        let id = armed(&store, two_levels()).await;
        assert!(!engine.is_ticking(id));

        store.apply(id, ControlOp::Start).await.unwrap();
        assert!(engine.is_ticking(id));

        wait(1200, 500).await;
        let state = store.get(id).await.unwrap();
        assert_eq!(state.current_level_index, 1);
        assert_eq!(state.time_remaining_seconds, 1200);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_freezes_and_resume_continues() {
        let (store, engine) = setup();
        let id = armed(&store, two_levels()).await;
        store.apply(id, ControlOp::Start).await.unwrap();

        wait(400, 500).await;
        store.apply(id, ControlOp::Pause).await.unwrap();
        assert!(!engine.is_ticking(id));
        assert_eq!(store.get(id).await.unwrap().time_remaining_seconds, 800);

        wait(300, 0).await;
        assert_eq!(store.get(id).await.unwrap().time_remaining_seconds, 800);

        store.apply(id, ControlOp::Resume).await.unwrap();
        wait(10, 250).await;
        assert_eq!(store.get(id).await.unwrap().time_remaining_seconds, 790);
    }

    #[tokio::test(start_paused = true)]
    async fn last_level_finishes_and_stops_ticking() {
        let (store, engine) = setup();
        let levels = LevelTable::new(vec![level(0, 10, 20, 3), level(1, 20, 40, 2)]).unwrap();
        let id = armed(&store, levels).await;
        store.apply(id, ControlOp::Start).await.unwrap();

        wait(10, 0).await;
        let state = store.get(id).await.unwrap();
        assert_eq!(state.run_status, RunStatus::Finished);
        assert_eq!(state.current_level_index, 1);
        assert_eq!(state.time_remaining_seconds, 0);
        assert_eq!(engine.active_tickers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_jump_restarts_the_cadence() {
        let (store, _engine) = setup();
        let id = armed(&store, two_levels()).await;
        store.apply(id, ControlOp::Start).await.unwrap();

        wait(5, 900).await;
        store.apply(id, ControlOp::NextLevel).await.unwrap();
        // The old cadence would have ticked at 6s; the new one starts from the jump.
        wait(0, 500).await;
        assert_eq!(store.get(id).await.unwrap().time_remaining_seconds, 1200);
        wait(0, 600).await;
        assert_eq!(store.get(id).await.unwrap().time_remaining_seconds, 1199);
    }

    #[tokio::test(start_paused = true)]
    async fn tickers_run_per_tournament() {
        let (store, engine) = setup();
        let first = armed(&store, two_levels()).await;
        let second = armed(&store, two_levels()).await;
        store.apply(first, ControlOp::Start).await.unwrap();
        wait(2, 0).await;
        store.apply(second, ControlOp::Start).await.unwrap();
        assert_eq!(engine.active_tickers(), 2);

        wait(3, 500).await;
        assert_eq!(store.get(first).await.unwrap().time_remaining_seconds, 1195);
        assert_eq!(store.get(second).await.unwrap().time_remaining_seconds, 1197);

        store.remove(first).await.unwrap();
        assert!(!engine.is_ticking(first));
        assert!(engine.is_ticking(second));
    }
}
