use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::clock::ClockStateView,
    error::{AppError, ErrorBody},
    routes::caller::Caller,
    services::clock_service,
    state::{SharedState, clock::ControlOp},
};

/// Clock lifecycle and control endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/tournaments/{id}/clock",
            get(get_clock).post(arm_clock).delete(cancel_clock),
        )
        .route("/tournaments/{id}/clock/start", post(start_clock))
        .route("/tournaments/{id}/clock/pause", post(pause_clock))
        .route("/tournaments/{id}/clock/resume", post(resume_clock))
        .route("/tournaments/{id}/clock/next-level", post(next_level))
        .route("/tournaments/{id}/clock/previous-level", post(previous_level))
        .route("/tournaments/{id}/clock/reset-level", post(reset_level))
}

async fn control(
    state: SharedState,
    caller: Caller,
    id: Uuid,
    operation: ControlOp,
) -> Result<Json<ClockStateView>, AppError> {
    let snapshot = clock_service::control(&state, &caller.0, id, operation).await?;
    Ok(Json(ClockStateView::from(&snapshot)))
}

/// Current authoritative clock state.
#[utoipa::path(
    get,
    path = "/tournaments/{id}/clock",
    tag = "clock",
    params(("id" = String, Path, description = "Tournament identifier")),
    responses(
        (status = 200, description = "Clock state", body = ClockStateView),
        (status = 404, description = "Unknown tournament or no clock armed", body = ErrorBody)
    )
)]
pub async fn get_clock(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ClockStateView>, AppError> {
    let snapshot = clock_service::clock_state(&state, id).await?;
    Ok(Json(ClockStateView::from(&snapshot)))
}

/// Arm the clock from the tournament's level table.
#[utoipa::path(
    post,
    path = "/tournaments/{id}/clock",
    tag = "clock",
    params(
        ("X-User-Id" = String, Header, description = "Acting user"),
        ("id" = String, Path, description = "Tournament identifier")
    ),
    responses(
        (status = 201, description = "Clock armed", body = ClockStateView),
        (status = 200, description = "Clock already armed", body = ClockStateView),
        (status = 401, description = "Caller may not control the tournament", body = ErrorBody)
    )
)]
pub async fn arm_clock(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ClockStateView>), AppError> {
    let (snapshot, armed) = clock_service::arm(&state, &caller.0, id).await?;
    let status = if armed { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(ClockStateView::from(&snapshot))))
}

/// Cancel the clock; viewers receive a final `CANCELLED` event.
#[utoipa::path(
    delete,
    path = "/tournaments/{id}/clock",
    tag = "clock",
    params(
        ("X-User-Id" = String, Header, description = "Acting user"),
        ("id" = String, Path, description = "Tournament identifier")
    ),
    responses(
        (status = 204, description = "Clock cancelled"),
        (status = 404, description = "No clock armed", body = ErrorBody)
    )
)]
pub async fn cancel_clock(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    clock_service::cancel(&state, &caller.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Start counting down from the first level.
#[utoipa::path(
    post,
    path = "/tournaments/{id}/clock/start",
    tag = "clock",
    params(
        ("X-User-Id" = String, Header, description = "Acting user"),
        ("id" = String, Path, description = "Tournament identifier")
    ),
    responses(
        (status = 200, description = "Clock started", body = ClockStateView),
        (status = 409, description = "Invalid transition", body = ErrorBody)
    )
)]
pub async fn start_clock(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<ClockStateView>, AppError> {
    control(state, caller, id, ControlOp::Start).await
}

/// Halt the countdown.
#[utoipa::path(
    post,
    path = "/tournaments/{id}/clock/pause",
    tag = "clock",
    params(
        ("X-User-Id" = String, Header, description = "Acting user"),
        ("id" = String, Path, description = "Tournament identifier")
    ),
    responses(
        (status = 200, description = "Clock paused", body = ClockStateView),
        (status = 409, description = "Invalid transition", body = ErrorBody)
    )
)]
pub async fn pause_clock(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<ClockStateView>, AppError> {
    control(state, caller, id, ControlOp::Pause).await
}

/// Continue a paused countdown.
#[utoipa::path(
    post,
    path = "/tournaments/{id}/clock/resume",
    tag = "clock",
    params(
        ("X-User-Id" = String, Header, description = "Acting user"),
        ("id" = String, Path, description = "Tournament identifier")
    ),
    responses(
        (status = 200, description = "Clock resumed", body = ClockStateView),
        (status = 409, description = "Invalid transition", body = ErrorBody)
    )
)]
pub async fn resume_clock(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<ClockStateView>, AppError> {
    control(state, caller, id, ControlOp::Resume).await
}

/// Jump to the next level with its full duration.
#[utoipa::path(
    post,
    path = "/tournaments/{id}/clock/next-level",
    tag = "clock",
    params(
        ("X-User-Id" = String, Header, description = "Acting user"),
        ("id" = String, Path, description = "Tournament identifier")
    ),
    responses(
        (status = 200, description = "Level changed", body = ClockStateView),
        (status = 409, description = "Invalid transition", body = ErrorBody)
    )
)]
pub async fn next_level(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<ClockStateView>, AppError> {
    control(state, caller, id, ControlOp::NextLevel).await
}

/// Jump back to the previous level with its full duration.
#[utoipa::path(
    post,
    path = "/tournaments/{id}/clock/previous-level",
    tag = "clock",
    params(
        ("X-User-Id" = String, Header, description = "Acting user"),
        ("id" = String, Path, description = "Tournament identifier")
    ),
    responses(
        (status = 200, description = "Level changed", body = ClockStateView),
        (status = 409, description = "Invalid transition", body = ErrorBody)
    )
)]
pub async fn previous_level(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<ClockStateView>, AppError> {
    control(state, caller, id, ControlOp::PreviousLevel).await
}

/// Restore the full duration of the current level.
#[utoipa::path(
    post,
    path = "/tournaments/{id}/clock/reset-level",
    tag = "clock",
    params(
        ("X-User-Id" = String, Header, description = "Acting user"),
        ("id" = String, Path, description = "Tournament identifier")
    ),
    responses(
        (status = 200, description = "Level reset", body = ClockStateView),
        (status = 409, description = "Invalid transition", body = ErrorBody)
    )
)]
pub async fn reset_level(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<ClockStateView>, AppError> {
    control(state, caller, id, ControlOp::ResetLevel).await
}
