/// Audit trail of control operations.
pub mod audit;
/// Who may operate a tournament clock.
pub mod authorization;
/// Clock lifecycle and control operations.
pub mod clock_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Write-behind persistence of clock states.
pub mod persistence;
/// Per-tournament countdown tickers.
pub mod progression;
/// Server-Sent Events streaming of clock changes.
pub mod sse_service;
/// Storage connection supervisor with degraded mode handling.
pub mod storage_supervisor;
/// Tournament setup.
pub mod tournament_service;
/// WebSocket streaming of clock changes.
pub mod websocket_service;
