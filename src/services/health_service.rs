use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report storage availability and clock counts while logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.storage().require().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    HealthResponse::new(
        state.is_degraded(),
        state.clocks().tournament_ids().len(),
        state.engine().active_tickers(),
    )
}
