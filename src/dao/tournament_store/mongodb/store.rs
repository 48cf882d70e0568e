use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{Client, Collection, Database, bson::doc, options::IndexOptions};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoClockDocument, MongoTournamentDocument, doc_id, status_filter},
};
use crate::dao::{
    models::{ClockStateEntity, RunStatusEntity, TournamentEntity},
    storage::StorageResult,
    tournament_store::TournamentStore,
};

const TOURNAMENT_COLLECTION_NAME: &str = "tournaments";
const CLOCK_COLLECTION_NAME: &str = "clocks";

/// MongoDB-backed [`TournamentStore`].
#[derive(Clone)]
pub struct MongoTournamentStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    // Kept so the connection pool lives as long as the database handle.
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoTournamentStore {
    /// Connect to MongoDB and make sure the clock status index exists.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.clock_collection().await;
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"run_status": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("clock_status_idx".to_owned()))
                    .build(),
            )
            .build();

        collection
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: CLOCK_COLLECTION_NAME,
                index: "run_status",
                source,
            })?;
        Ok(())
    }

    async fn tournament_collection(&self) -> Collection<MongoTournamentDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoTournamentDocument>(TOURNAMENT_COLLECTION_NAME)
    }

    async fn clock_collection(&self) -> Collection<MongoClockDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoClockDocument>(CLOCK_COLLECTION_NAME)
    }

    async fn save_tournament(&self, tournament: TournamentEntity) -> MongoResult<()> {
        let id = tournament.id;
        let document: MongoTournamentDocument = tournament.into();
        self.tournament_collection()
            .await
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveTournament { id, source })?;
        Ok(())
    }

    async fn find_tournament(&self, id: Uuid) -> MongoResult<Option<TournamentEntity>> {
        let document = self
            .tournament_collection()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadTournament { id, source })?;
        document.map(TryInto::try_into).transpose()
    }

    async fn load_clock(&self, id: Uuid) -> MongoResult<Option<ClockStateEntity>> {
        let document = self
            .clock_collection()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadClock { id, source })?;
        document.map(TryInto::try_into).transpose()
    }

    async fn save_clock(&self, clock: ClockStateEntity) -> MongoResult<()> {
        let id = clock.tournament_id;
        let document: MongoClockDocument = clock.into();
        self.clock_collection()
            .await
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveClock { id, source })?;
        Ok(())
    }

    async fn delete_clock(&self, id: Uuid) -> MongoResult<bool> {
        let result = self
            .clock_collection()
            .await
            .delete_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::DeleteClock { id, source })?;
        Ok(result.deleted_count > 0)
    }

    async fn list_clocks(
        &self,
        status: Option<RunStatusEntity>,
    ) -> MongoResult<Vec<ClockStateEntity>> {
        let documents: Vec<MongoClockDocument> = self
            .clock_collection()
            .await
            .find(status_filter(status))
            .await
            .map_err(|source| MongoDaoError::ListClocks { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListClocks { source })?;

        documents.into_iter().map(TryInto::try_into).collect()
    }
}

impl TournamentStore for MongoTournamentStore {
    fn save_tournament(&self, tournament: TournamentEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_tournament(tournament).await.map_err(Into::into) })
    }

    fn find_tournament(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<TournamentEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_tournament(id).await.map_err(Into::into) })
    }

    fn load_clock_state(
        &self,
        tournament_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ClockStateEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.load_clock(tournament_id).await.map_err(Into::into) })
    }

    fn save_clock_state(&self, clock: ClockStateEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_clock(clock).await.map_err(Into::into) })
    }

    fn delete_clock_state(&self, tournament_id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_clock(tournament_id).await.map_err(Into::into) })
    }

    fn list_clock_states(
        &self,
        status: Option<RunStatusEntity>,
    ) -> BoxFuture<'static, StorageResult<Vec<ClockStateEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_clocks(status).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
