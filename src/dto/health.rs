use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Number of clocks currently held in memory.
    pub live_clocks: usize,
    /// Number of clocks currently ticking.
    pub ticking_clocks: usize,
}

impl HealthResponse {
    /// Build a response for the given degraded flag and counters.
    pub fn new(degraded: bool, live_clocks: usize, ticking_clocks: usize) -> Self {
        let status = if degraded { "degraded" } else { "ok" };
        Self {
            status: status.to_string(),
            live_clocks,
            ticking_clocks,
        }
    }
}
