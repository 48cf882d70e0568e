pub mod clock;
pub mod rooms;
pub mod store;

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::{models::TournamentEntity, tournament_store::TournamentStore},
    error::ServiceError,
    services::{
        audit::{AuditSink, TracingAuditSink},
        authorization::{Authorizer, RosterAuthorizer},
        persistence::{ClockPersister, FinishedHook},
        progression::ProgressionEngine,
    },
};

use self::{
    clock::TournamentId,
    rooms::ClockRooms,
    store::{ClockObserver, ClockStateStore},
};

pub type SharedState = Arc<AppState>;

/// Currently installed storage backend plus the degraded-mode flag.
///
/// The application starts degraded until a backend is installed.
pub struct StorageSlot {
    store: RwLock<Option<Arc<dyn TournamentStore>>>,
    degraded: watch::Sender<bool>,
}

impl StorageSlot {
    /// Empty slot, degraded.
    pub fn new() -> Self {
        let (degraded, _rx) = watch::channel(true);
        Self {
            store: RwLock::new(None),
            degraded,
        }
    }

    /// Current backend, if any.
    pub async fn store(&self) -> Option<Arc<dyn TournamentStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Current backend or [`ServiceError::Degraded`].
    pub async fn require(&self) -> Result<Arc<dyn TournamentStore>, ServiceError> {
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a backend and leave degraded mode.
    pub async fn install(&self, store: Arc<dyn TournamentStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Drop the backend and enter degraded mode.
    pub async fn clear(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    ///
    /// Leaving degraded mode requires an installed backend.
    pub async fn update_degraded(&self, value: bool) {
        if !value && self.store().await.is_none() {
            return;
        }
        self.degraded.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });
    }
}

impl Default for StorageSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Central application state: live clocks, their observers and collaborators.
pub struct AppState {
    config: AppConfig,
    storage: Arc<StorageSlot>,
    clocks: Arc<ClockStateStore>,
    engine: Arc<ProgressionEngine>,
    rooms: Arc<ClockRooms>,
    persister: Arc<ClockPersister>,
    tournaments: Arc<DashMap<TournamentId, Arc<TournamentEntity>>>,
    authorizer: Arc<dyn Authorizer>,
    audit: Arc<dyn AuditSink>,
}

impl AppState {
    /// Build the state with the roster authorizer and the tracing audit sink.
    ///
    /// Must be called inside a Tokio runtime: the clock persister task is
    /// spawned here.
    pub fn new(config: AppConfig) -> SharedState {
        let authorizer = Arc::new(RosterAuthorizer::new(config.admins().iter().cloned()));
        Self::with_collaborators(config, authorizer, Arc::new(TracingAuditSink))
    }

    /// Build the state with explicit authorization and audit collaborators.
    pub fn with_collaborators(
        config: AppConfig,
        authorizer: Arc<dyn Authorizer>,
        audit: Arc<dyn AuditSink>,
    ) -> SharedState {
        let storage = Arc::new(StorageSlot::new());
        let rooms = Arc::new(ClockRooms::new(
            config.room_capacity(),
            config.sync_interval_secs(),
        ));
        let engine = Arc::new(ProgressionEngine::new(config.tick_interval()));
        let persister = ClockPersister::spawn(storage.clone());

        let observers: Vec<Arc<dyn ClockObserver>> = vec![
            persister.clone() as Arc<dyn ClockObserver>,
            rooms.clone() as Arc<dyn ClockObserver>,
            engine.clone() as Arc<dyn ClockObserver>,
        ];
        let clocks = Arc::new(ClockStateStore::new(observers));
        engine.bind(&clocks);

        let tournaments: Arc<DashMap<TournamentId, Arc<TournamentEntity>>> = Arc::default();
        persister.on_finished_flushed(evict_finished(&clocks, &tournaments));

        Arc::new(Self {
            config,
            storage,
            clocks,
            engine,
            rooms,
            persister,
            tournaments,
            authorizer,
            audit,
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Storage slot shared with the persister and the supervisor.
    pub fn storage(&self) -> &Arc<StorageSlot> {
        &self.storage
    }

    /// Live clocks.
    pub fn clocks(&self) -> &Arc<ClockStateStore> {
        &self.clocks
    }

    /// Ticker registry.
    pub fn engine(&self) -> &ProgressionEngine {
        &self.engine
    }

    /// Viewer rooms.
    pub fn rooms(&self) -> &Arc<ClockRooms> {
        &self.rooms
    }

    /// Write-behind clock persister.
    pub fn persister(&self) -> &ClockPersister {
        &self.persister
    }

    /// Tournaments already read from storage.
    pub fn tournaments(&self) -> &DashMap<TournamentId, Arc<TournamentEntity>> {
        &self.tournaments
    }

    /// Authorization collaborator.
    pub fn authorizer(&self) -> &dyn Authorizer {
        self.authorizer.as_ref()
    }

    /// Audit collaborator.
    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        self.storage.is_degraded()
    }
}

/// Once a finished clock is durable, drop it and its cached tournament from
/// memory; both are loaded back on demand.
fn evict_finished(
    clocks: &Arc<ClockStateStore>,
    tournaments: &Arc<DashMap<TournamentId, Arc<TournamentEntity>>>,
) -> FinishedHook {
    let clocks = Arc::downgrade(clocks);
    let tournaments = Arc::clone(tournaments);
    Box::new(move |tournament_id: TournamentId| -> BoxFuture<'static, ()> {
        let clocks = clocks.clone();
        let tournaments = tournaments.clone();
        Box::pin(async move {
            let Some(clocks) = clocks.upgrade() else {
                return;
            };
            if clocks.evict_finished(tournament_id).await {
                tournaments.remove(&tournament_id);
            }
        })
    })
}
