//! Write-behind persistence of clock states.
//!
//! Observers run under the per-tournament lock, so the persister only records
//! the latest command per tournament and wakes a background task that talks to
//! the storage backend. Older commands for the same tournament are overwritten
//! before they reach the database; pending writes survive degraded mode and are
//! flushed once storage comes back.

use std::{
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::{sync::Notify, task::JoinHandle, time::sleep};
use tracing::{debug, warn};

use crate::{
    dao::{
        models::{ClockStateEntity, RunStatusEntity},
        tournament_store::TournamentStore,
    },
    state::{
        StorageSlot,
        clock::{ChangeReason, TournamentId},
        store::{ClockChange, ClockObserver},
    },
};

const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
enum PersistCommand {
    Save(ClockStateEntity),
    Delete,
}

impl PersistCommand {
    fn saves_finished_clock(&self) -> bool {
        matches!(self, Self::Save(entity) if entity.run_status == RunStatusEntity::Finished)
    }
}

type Pending = Arc<Mutex<IndexMap<TournamentId, PersistCommand>>>;

/// Callback run once the final state of a finished clock reached storage.
pub type FinishedHook = Box<dyn Fn(TournamentId) -> BoxFuture<'static, ()> + Send + Sync>;
type FinishedSlot = Arc<OnceLock<FinishedHook>>;

/// Clock observer mirroring every committed change into the storage backend.
pub struct ClockPersister {
    pending: Pending,
    wake: Arc<Notify>,
    finished: FinishedSlot,
    task: JoinHandle<()>,
}

impl ClockPersister {
    /// Start the writer task against `storage`.
    pub fn spawn(storage: Arc<StorageSlot>) -> Arc<Self> {
        let pending: Pending = Arc::default();
        let wake = Arc::new(Notify::new());
        let finished: FinishedSlot = Arc::default();
        let task = tokio::spawn(run_writer(
            storage,
            pending.clone(),
            wake.clone(),
            finished.clone(),
        ));
        Arc::new(Self {
            pending,
            wake,
            finished,
            task,
        })
    }

    /// Install the callback run after a finished clock was written out. Only
    /// the first call has an effect.
    pub fn on_finished_flushed(&self, hook: FinishedHook) {
        if self.finished.set(hook).is_err() {
            warn!("finished clock hook already installed");
        }
    }

    /// Whether a write for the tournament has not reached storage yet.
    pub fn has_pending(&self, tournament_id: TournamentId) -> bool {
        lock(&self.pending).contains_key(&tournament_id)
    }

    /// Number of tournaments with unflushed writes.
    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    fn enqueue(&self, tournament_id: TournamentId, command: PersistCommand) {
        // Re-inserting moves nothing: the tournament keeps its queue position.
        lock(&self.pending).insert(tournament_id, command);
        self.wake.notify_one();
    }
}

impl ClockObserver for ClockPersister {
    fn on_change(&self, change: &ClockChange) {
        let state = &change.snapshot.state;
        let command = match change.reason {
            // Loaded from storage: already durable.
            ChangeReason::Restored => return,
            ChangeReason::Cancelled => PersistCommand::Delete,
            _ => PersistCommand::Save(state.clone().into()),
        };
        self.enqueue(state.tournament_id, command);
    }
}

impl Drop for ClockPersister {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn lock(pending: &Pending) -> std::sync::MutexGuard<'_, IndexMap<TournamentId, PersistCommand>> {
    pending
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn run_writer(
    storage: Arc<StorageSlot>,
    pending: Pending,
    wake: Arc<Notify>,
    finished: FinishedSlot,
) {
    let mut degraded = storage.degraded_watcher();

    loop {
        wake.notified().await;

        loop {
            let Some(store) = storage.store().await else {
                debug!("storage degraded; holding clock writes");
                if degraded.wait_for(|is_degraded| !*is_degraded).await.is_err() {
                    return;
                }
                continue;
            };

            // Commands stay queued while in flight so readers never see a
            // storage record older than the live state.
            let batch = lock(&pending).clone();
            if batch.is_empty() {
                break;
            }

            let mut failed = false;
            for (tournament_id, command) in batch {
                match execute(store.as_ref(), tournament_id, command.clone()).await {
                    Ok(()) => {
                        let settled = {
                            let mut queue = lock(&pending);
                            // A newer command queued meanwhile stays for the next round.
                            let unchanged = queue.get(&tournament_id) == Some(&command);
                            if unchanged {
                                queue.shift_remove(&tournament_id);
                            }
                            unchanged
                        };
                        if settled && command.saves_finished_clock() {
                            if let Some(hook) = finished.get() {
                                hook(tournament_id).await;
                            }
                        }
                    }
                    Err(err) => {
                        warn!(%tournament_id, error = %err, "failed to persist clock state; will retry");
                        failed = true;
                    }
                }
            }

            if failed {
                sleep(RETRY_DELAY).await;
            }
        }
    }
}

async fn execute(
    store: &dyn TournamentStore,
    tournament_id: TournamentId,
    command: PersistCommand,
) -> crate::dao::storage::StorageResult<()> {
    match command {
        PersistCommand::Save(entity) => store.save_clock_state(entity).await,
        PersistCommand::Delete => store.delete_clock_state(tournament_id).await.map(|_| ()),
    }
}
