//! Best-effort audit trail of clock control actions.

use std::{sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{info, warn};

use crate::state::clock::TournamentId;

/// One "action performed" record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    /// User who performed the action.
    pub actor: String,
    /// Tournament acted upon.
    pub tournament_id: TournamentId,
    /// Operation name, e.g. `next_level`.
    pub operation: String,
    /// When the action was committed.
    pub at: SystemTime,
}

/// Failure reported by an audit sink; never surfaced to callers.
#[derive(Debug, Error)]
#[error("audit sink failed: {0}")]
pub struct AuditError(pub String);

/// Destination of audit records.
pub trait AuditSink: Send + Sync {
    /// Persist one record.
    fn record(&self, record: AuditRecord) -> BoxFuture<'static, Result<(), AuditError>>;
}

/// Writes audit records to the `audit` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) -> BoxFuture<'static, Result<(), AuditError>> {
        info!(
            target: "audit",
            actor = %record.actor,
            tournament_id = %record.tournament_id,
            operation = %record.operation,
            at = %crate::dto::format_system_time(record.at),
            "action performed"
        );
        Box::pin(async { Ok(()) })
    }
}

/// Hand a record to `sink` without waiting; failures are logged and dropped.
pub fn emit(sink: &Arc<dyn AuditSink>, record: AuditRecord) {
    let sink = Arc::clone(sink);
    tokio::spawn(async move {
        let operation = record.operation.clone();
        let tournament_id = record.tournament_id;
        if let Err(err) = sink.record(record).await {
            warn!(%tournament_id, %operation, error = %err, "audit record dropped");
        }
    });
}
