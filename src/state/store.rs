//! Clock State Store: the single owner of every live tournament clock.
//!
//! Each clock sits behind its own async mutex so that ticks and control calls
//! for the same tournament are linearized while different tournaments proceed
//! independently. Every committed change is handed to the registered
//! [`ClockObserver`]s while the per-tournament lock is still held, which keeps
//! broadcast order identical to mutation order.

use std::{sync::Arc, time::SystemTime};

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::Mutex;
use tracing::debug;

use super::clock::{
    ChangeReason, ClockError, ClockSnapshot, ClockState, ControlOp, LevelTable, RunStatus,
    TournamentId,
};

/// A committed clock mutation as seen by observers.
#[derive(Debug, Clone)]
pub struct ClockChange {
    /// State before the change (`None` when the clock was just inserted).
    pub previous: Option<ClockState>,
    /// State after the change.
    pub snapshot: ClockSnapshot,
    /// Why the state changed.
    pub reason: ChangeReason,
    /// Cadence generation of the clock; bumped whenever a running clock rebases
    /// its one-second cadence.
    pub epoch: u64,
    /// Commit time.
    pub at: SystemTime,
}

/// Synchronous hook invoked for every committed change, under the clock lock.
///
/// Implementations must not block: they enqueue, publish or spawn.
pub trait ClockObserver: Send + Sync {
    /// React to a committed change.
    fn on_change(&self, change: &ClockChange);
}

struct ClockEntry {
    state: ClockState,
    levels: LevelTable,
    epoch: u64,
    retired: bool,
}

/// Registry of live clocks keyed by tournament.
pub struct ClockStateStore {
    clocks: DashMap<TournamentId, Arc<Mutex<ClockEntry>>>,
    observers: Vec<Arc<dyn ClockObserver>>,
}

impl ClockStateStore {
    /// Build a store notifying `observers` in order for every change.
    pub fn new(observers: Vec<Arc<dyn ClockObserver>>) -> Self {
        Self {
            clocks: DashMap::new(),
            observers,
        }
    }

    /// Whether a clock is currently held for the tournament.
    pub fn contains(&self, tournament_id: TournamentId) -> bool {
        self.clocks.contains_key(&tournament_id)
    }

    /// Identifiers of every live clock.
    pub fn tournament_ids(&self) -> Vec<TournamentId> {
        self.clocks.iter().map(|entry| *entry.key()).collect()
    }

    /// Current authoritative state.
    pub async fn get(&self, tournament_id: TournamentId) -> Result<ClockState, ClockError> {
        self.with_locked(tournament_id, |snapshot| snapshot.state.clone())
            .await
    }

    /// Current state together with the level table.
    pub async fn snapshot(&self, tournament_id: TournamentId) -> Result<ClockSnapshot, ClockError> {
        self.with_locked(tournament_id, |snapshot| snapshot.clone())
            .await
    }

    /// Run `read` against the clock while holding its lock.
    ///
    /// No change can be committed (and therefore broadcast) while `read` runs,
    /// which lets subscribers attach to a room without missing an event.
    pub async fn with_locked<R>(
        &self,
        tournament_id: TournamentId,
        read: impl FnOnce(&ClockSnapshot) -> R,
    ) -> Result<R, ClockError> {
        let entry = self.entry(tournament_id)?;
        let guard = entry.lock().await;
        if guard.retired {
            return Err(ClockError::NotFound(tournament_id));
        }
        let snapshot = ClockSnapshot {
            state: guard.state.clone(),
            levels: guard.levels.clone(),
        };
        Ok(read(&snapshot))
    }

    /// Insert a clock unless one already exists.
    ///
    /// Returns the live state and whether it was inserted. Observers are only
    /// notified on insertion, with `reason` (`Armed` or `Restored`).
    pub async fn insert(
        &self,
        state: ClockState,
        levels: LevelTable,
        reason: ChangeReason,
    ) -> (ClockState, bool) {
        let tournament_id = state.tournament_id;
        let entry = Arc::new(Mutex::new(ClockEntry {
            state: state.clone(),
            levels: levels.clone(),
            epoch: 0,
            retired: false,
        }));
        // Lock before publishing the entry so nobody observes it before the
        // insertion change went out.
        let mut guard = entry.clone().lock_owned().await;

        let existing = match self.clocks.entry(tournament_id) {
            Entry::Occupied(occupied) => Some(occupied.get().clone()),
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                None
            }
        };

        if let Some(existing) = existing {
            drop(guard);
            let current = existing.lock().await;
            return (current.state.clone(), false);
        }

        if state.run_status == RunStatus::Running {
            guard.epoch = 1;
        }
        let change = ClockChange {
            previous: None,
            snapshot: ClockSnapshot { state, levels },
            reason,
            epoch: guard.epoch,
            at: SystemTime::now(),
        };
        self.notify(&change);
        (change.snapshot.state, true)
    }

    /// Apply a control operation atomically.
    pub async fn apply(
        &self,
        tournament_id: TournamentId,
        operation: ControlOp,
    ) -> Result<ClockChange, ClockError> {
        let entry = self.entry(tournament_id)?;
        let mut guard = entry.lock().await;
        if guard.retired {
            return Err(ClockError::NotFound(tournament_id));
        }

        let (next, reason) = guard.state.apply(operation, &guard.levels)?;
        Ok(self.commit(&mut guard, next, reason))
    }

    /// Let `seconds` of clock time pass, regardless of cadence generation.
    ///
    /// Returns `Ok(None)` when the clock is not running. Used to simulate the
    /// passage of time.
    pub async fn tick(
        &self,
        tournament_id: TournamentId,
        seconds: u32,
    ) -> Result<Option<ClockChange>, ClockError> {
        self.tick_inner(tournament_id, None, seconds).await
    }

    /// Tick issued by the cadence of generation `epoch`; stale cadences are ignored.
    pub(crate) async fn tick_epoch(
        &self,
        tournament_id: TournamentId,
        epoch: u64,
        seconds: u32,
    ) -> Result<Option<ClockChange>, ClockError> {
        self.tick_inner(tournament_id, Some(epoch), seconds).await
    }

    async fn tick_inner(
        &self,
        tournament_id: TournamentId,
        epoch: Option<u64>,
        seconds: u32,
    ) -> Result<Option<ClockChange>, ClockError> {
        let entry = self.entry(tournament_id)?;
        let mut guard = entry.lock().await;
        if guard.retired {
            return Err(ClockError::NotFound(tournament_id));
        }

        if let Some(epoch) = epoch {
            if epoch != guard.epoch {
                debug!(%tournament_id, epoch, current = guard.epoch, "ignoring stale tick");
                return Ok(None);
            }
        }

        let Some((next, reason)) = guard.state.elapse(seconds, &guard.levels) else {
            return Ok(None);
        };
        Ok(Some(self.commit(&mut guard, next, reason)))
    }

    /// Remove the clock, emitting a final `Cancelled` change.
    ///
    /// The final state is reported as finished with the last index kept.
    pub async fn remove(&self, tournament_id: TournamentId) -> Result<ClockState, ClockError> {
        let entry = self.entry(tournament_id)?;
        let mut guard = entry.lock().await;
        if guard.retired {
            return Err(ClockError::NotFound(tournament_id));
        }

        let mut last = guard.state.clone();
        last.run_status = RunStatus::Finished;
        last.is_paused = false;
        let change = self.commit(&mut guard, last, ChangeReason::Cancelled);
        guard.retired = true;
        self.clocks.remove(&tournament_id);
        Ok(change.snapshot.state)
    }

    /// Drop a finished clock from memory without notifying observers.
    ///
    /// Storage keeps the final state, so the clock can be loaded again on
    /// demand. Returns `false` when the clock is missing or not finished.
    pub async fn evict_finished(&self, tournament_id: TournamentId) -> bool {
        let Ok(entry) = self.entry(tournament_id) else {
            return false;
        };
        let mut guard = entry.lock().await;
        if guard.retired || guard.state.run_status != RunStatus::Finished {
            return false;
        }

        guard.retired = true;
        self.clocks
            .remove_if(&tournament_id, |_, current| Arc::ptr_eq(current, &entry));
        debug!(%tournament_id, "finished clock evicted");
        true
    }

    fn entry(&self, tournament_id: TournamentId) -> Result<Arc<Mutex<ClockEntry>>, ClockError> {
        self.clocks
            .get(&tournament_id)
            .map(|entry| entry.value().clone())
            .ok_or(ClockError::NotFound(tournament_id))
    }

    fn commit(&self, entry: &mut ClockEntry, next: ClockState, reason: ChangeReason) -> ClockChange {
        let previous = std::mem::replace(&mut entry.state, next);
        if entry.state.run_status == RunStatus::Running && reason.rebases_timer() {
            entry.epoch += 1;
        }

        let change = ClockChange {
            previous: Some(previous),
            snapshot: ClockSnapshot {
                state: entry.state.clone(),
                levels: entry.levels.clone(),
            },
            reason,
            epoch: entry.epoch,
            at: SystemTime::now(),
        };
        self.notify(&change);
        change
    }

    fn notify(&self, change: &ClockChange) {
        for observer in &self.observers {
            observer.on_change(change);
        }
    }
}
