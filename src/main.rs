//! Blind Clock Back binary entrypoint wiring REST, WebSocket, SSE, and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blind_clock_back::{
    config::AppConfig,
    dao::{
        storage::StorageError,
        tournament_store::{TournamentStore, memory::MemoryTournamentStore},
    },
    routes,
    services::storage_supervisor,
    state::{AppState, SharedState},
};

/// Environment variable selecting the storage backend (`memory`, `mongo`, `couch`).
const STORE_BACKEND_ENV: &str = "STORE_BACKEND";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app_state = AppState::new(AppConfig::load());
    start_storage(app_state.clone()).await?;

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state.clone());

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    app_state.engine().shutdown();
    info!(
        pending = app_state.persister().pending_len(),
        "server stopped"
    );
    Ok(())
}

/// Install the configured storage backend; remote backends are supervised in
/// the background so the server starts in degraded mode until they connect.
async fn start_storage(state: SharedState) -> anyhow::Result<()> {
    let backend = env::var(STORE_BACKEND_ENV).unwrap_or_else(|_| "memory".into());
    info!(backend = %backend, "selecting storage backend");

    match backend.as_str() {
        "memory" => {
            warn!("using in-memory storage; clocks will not survive a restart");
            let store: Arc<dyn TournamentStore> = Arc::new(MemoryTournamentStore::new());
            storage_supervisor::install(&state, store).await;
        }
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            use blind_clock_back::dao::tournament_store::mongodb::{
                MongoConfig, MongoTournamentStore,
            };

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = MongoConfig::from_env().await?;
                let store = MongoTournamentStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn TournamentStore>)
            }));
        }
        #[cfg(feature = "couch-store")]
        "couch" => {
            use blind_clock_back::dao::tournament_store::couchdb::{
                CouchConfig, CouchTournamentStore,
            };

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = CouchConfig::from_env()?;
                let store = CouchTournamentStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn TournamentStore>)
            }));
        }
        other => anyhow::bail!("unsupported storage backend `{other}`"),
    }

    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
