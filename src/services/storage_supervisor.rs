use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{storage::StorageError, tournament_store::TournamentStore},
    services::clock_service,
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Install a connected backend and bring running clocks back.
pub async fn install(state: &SharedState, store: Arc<dyn TournamentStore>) {
    state.storage().install(store).await;
    info!("storage connection established; leaving degraded mode");
    recover(state).await;
}

async fn recover(state: &SharedState) {
    match clock_service::recover_running_clocks(state).await {
        Ok(restored) => info!(restored, "clock recovery finished"),
        Err(err) => warn!(error = %err, "clock recovery failed"),
    }
}

/// Retry `try_reconnect` with backoff; degraded mode is entered on the first failure.
async fn reconnect(state: &SharedState, store: &dyn TournamentStore) -> bool {
    let mut delay = INITIAL_DELAY;
    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded after health check failure");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(attempt, error = %err, "storage reconnect failed; entering degraded mode");
                    state.storage().update_degraded(true).await;
                } else {
                    warn!(attempt, error = %err, "storage reconnect attempt failed");
                }
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
    false
}

/// Keep the storage backend connected, toggling degraded mode as it comes and goes.
///
/// Clocks keep running in memory while degraded; queued writes are flushed once
/// the backend is healthy again. After repeated reconnect failures the backend
/// is dropped and `connect` is retried from scratch.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn TournamentStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        let store = match connect().await {
            Ok(store) => store,
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
                continue;
            }
        };

        install(&state, store.clone()).await;
        delay = INITIAL_DELAY;

        loop {
            if store.health_check().await.is_ok() {
                if state.is_degraded() {
                    info!("storage healthy again; leaving degraded mode");
                    state.storage().update_degraded(false).await;
                }
            } else if reconnect(&state, store.as_ref()).await {
                state.storage().update_degraded(false).await;
            } else {
                warn!(
                    pending = state.persister().pending_len(),
                    "exhausted storage reconnect attempts; staying in degraded mode"
                );
                state.storage().clear().await;
                break;
            }
            sleep(HEALTH_POLL_INTERVAL).await;
        }

        sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}
