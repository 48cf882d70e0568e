#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{BlindLevelEntity, ClockStateEntity, RunStatusEntity, TournamentEntity};
use crate::dao::storage::StorageResult;

/// Abstraction over the persistence layer for tournaments and their clocks.
pub trait TournamentStore: Send + Sync {
    fn save_tournament(&self, tournament: TournamentEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_tournament(&self, id: Uuid)
    -> BoxFuture<'static, StorageResult<Option<TournamentEntity>>>;
    fn load_clock_state(
        &self,
        tournament_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ClockStateEntity>>>;
    fn save_clock_state(&self, clock: ClockStateEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn delete_clock_state(&self, tournament_id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    fn list_clock_states(
        &self,
        status: Option<RunStatusEntity>,
    ) -> BoxFuture<'static, StorageResult<Vec<ClockStateEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;

    /// Ordered level table of a tournament, `None` when the tournament is unknown.
    fn load_levels(
        &self,
        tournament_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<Vec<BlindLevelEntity>>>> {
        let lookup = self.find_tournament(tournament_id);
        Box::pin(async move {
            Ok(lookup.await?.map(|tournament| {
                let mut levels = tournament.levels;
                levels.sort_by_key(|level| level.index);
                levels
            }))
        })
    }
}
