//! Process-local store used when no database is configured and by tests.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{ClockStateEntity, RunStatusEntity, TournamentEntity},
    storage::StorageResult,
    tournament_store::TournamentStore,
};

/// [`TournamentStore`] keeping everything in memory; contents die with the process.
#[derive(Clone, Default)]
pub struct MemoryTournamentStore {
    tournaments: Arc<DashMap<Uuid, TournamentEntity>>,
    clocks: Arc<DashMap<Uuid, ClockStateEntity>>,
}

impl MemoryTournamentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TournamentStore for MemoryTournamentStore {
    fn save_tournament(&self, tournament: TournamentEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.tournaments.insert(tournament.id, tournament);
        Box::pin(async { Ok(()) })
    }

    fn find_tournament(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<TournamentEntity>>> {
        let found = self.tournaments.get(&id).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(found) })
    }

    fn load_clock_state(
        &self,
        tournament_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ClockStateEntity>>> {
        let found = self
            .clocks
            .get(&tournament_id)
            .map(|entry| entry.value().clone());
        Box::pin(async move { Ok(found) })
    }

    fn save_clock_state(&self, clock: ClockStateEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.clocks.insert(clock.tournament_id, clock);
        Box::pin(async { Ok(()) })
    }

    fn delete_clock_state(&self, tournament_id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let removed = self.clocks.remove(&tournament_id).is_some();
        Box::pin(async move { Ok(removed) })
    }

    fn list_clock_states(
        &self,
        status: Option<RunStatusEntity>,
    ) -> BoxFuture<'static, StorageResult<Vec<ClockStateEntity>>> {
        let clocks = self
            .clocks
            .iter()
            .filter(|entry| status.is_none_or(|wanted| entry.run_status == wanted))
            .map(|entry| entry.value().clone())
            .collect();
        Box::pin(async move { Ok(clocks) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
