use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Blind Clock Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::tournament::put_tournament,
        crate::routes::tournament::get_tournament,
        crate::routes::clock::get_clock,
        crate::routes::clock::arm_clock,
        crate::routes::clock::cancel_clock,
        crate::routes::clock::start_clock,
        crate::routes::clock::pause_clock,
        crate::routes::clock::resume_clock,
        crate::routes::clock::next_level,
        crate::routes::clock::previous_level,
        crate::routes::clock::reset_level,
        crate::routes::sse::clock_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::tournament::TournamentRequest,
            crate::dto::tournament::BlindLevelInput,
            crate::dto::tournament::TournamentSummary,
            crate::dto::clock::BlindLevelDto,
            crate::dto::clock::RunStatusDto,
            crate::dto::clock::ChangeReasonDto,
            crate::dto::clock::ClockStateView,
            crate::dto::clock::ClockEventDto,
            crate::dto::ws::ViewerInboundMessage,
            crate::dto::ws::ViewerOutboundMessage,
            crate::error::ErrorBody,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "tournament", description = "Tournament and blind structure setup"),
        (name = "clock", description = "Clock lifecycle and control operations"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "viewers", description = "WebSocket stream for clock displays"),
    )
)]
pub struct ApiDoc;
