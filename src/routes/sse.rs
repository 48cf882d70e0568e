use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::Sse,
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{AppError, ErrorBody},
    services::{clock_service, sse_service},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/tournaments/{id}/clock/stream",
    tag = "sse",
    params(("id" = String, Path, description = "Tournament identifier")),
    responses(
        (status = 200, description = "Clock SSE stream: one `snapshot` then `clock` events", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown tournament or no clock armed", body = ErrorBody)
    )
)]
/// Stream clock changes of a tournament to a display.
pub async fn clock_stream(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>>, AppError> {
    let handle = clock_service::subscribe(&state, id).await?;
    info!(tournament_id = %id, connection_id = %handle.subscription().connection_id, "New clock SSE connection");
    Ok(sse_service::to_sse_stream(handle, state))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/tournaments/{id}/clock/stream", get(clock_stream))
}
