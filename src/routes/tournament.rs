use axum::{
    Json, Router,
    extract::{Path, State},
    routing::put,
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::tournament::{TournamentRequest, TournamentSummary},
    error::{AppError, ErrorBody},
    routes::caller::Caller,
    services::tournament_service,
    state::SharedState,
};

/// Tournament setup endpoints.
pub fn router() -> Router<SharedState> {
    Router::new().route(
        "/tournaments/{id}",
        put(put_tournament).get(get_tournament),
    )
}

/// Create or replace a tournament and its blind structure.
#[utoipa::path(
    put,
    path = "/tournaments/{id}",
    tag = "tournament",
    params(
        ("X-User-Id" = String, Header, description = "Acting user"),
        ("id" = String, Path, description = "Tournament identifier")
    ),
    request_body = TournamentRequest,
    responses(
        (status = 200, description = "Tournament saved", body = TournamentSummary),
        (status = 400, description = "Invalid blind structure", body = ErrorBody),
        (status = 409, description = "A clock is armed for this tournament", body = ErrorBody)
    )
)]
pub async fn put_tournament(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<TournamentRequest>>,
) -> Result<Json<TournamentSummary>, AppError> {
    let summary = tournament_service::upsert_tournament(&state, &caller.0, id, payload).await?;
    Ok(Json(summary))
}

/// Fetch a tournament and its blind structure.
#[utoipa::path(
    get,
    path = "/tournaments/{id}",
    tag = "tournament",
    params(("id" = String, Path, description = "Tournament identifier")),
    responses(
        (status = 200, description = "Tournament", body = TournamentSummary),
        (status = 404, description = "Unknown tournament", body = ErrorBody)
    )
)]
pub async fn get_tournament(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TournamentSummary>, AppError> {
    Ok(Json(tournament_service::get_tournament(&state, id).await?))
}
