use std::{sync::Arc, time::SystemTime};

use tracing::info;

use crate::{
    dao::models::{BlindLevelEntity, TournamentEntity},
    dto::tournament::{TournamentRequest, TournamentSummary},
    error::ServiceError,
    state::{
        SharedState,
        clock::{LevelTable, RunStatus, TournamentId},
    },
};

/// Create or replace a tournament definition.
///
/// Creation is open to administrators and to the organizer named in the
/// request; updates to administrators and the current organizer. The level
/// table cannot change while a clock is armed and not finished.
pub async fn upsert_tournament(
    state: &SharedState,
    caller: &str,
    tournament_id: TournamentId,
    request: TournamentRequest,
) -> Result<TournamentSummary, ServiceError> {
    let store = state.storage().require().await?;
    let existing = store.find_tournament(tournament_id).await?;

    let is_admin = state.authorizer().is_admin(caller);
    let allowed = match &existing {
        Some(current) => is_admin || current.organizer_id == caller,
        None => is_admin || request.organizer_id == caller,
    };
    if caller.is_empty() || !allowed {
        return Err(ServiceError::Unauthorized(format!(
            "`{caller}` may not configure tournament `{tournament_id}`"
        )));
    }

    ensure_clock_idle(state, tournament_id).await?;

    let mut levels: Vec<BlindLevelEntity> = request.levels.into_iter().map(Into::into).collect();
    levels.sort_by_key(|level| level.index);
    LevelTable::new(levels.iter().cloned().map(Into::into).collect())
        .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;

    let now = SystemTime::now();
    let entity = TournamentEntity {
        id: tournament_id,
        name: request.name,
        organizer_id: request.organizer_id,
        staff_ids: request.staff_ids,
        levels,
        created_at: existing.as_ref().map_or(now, |current| current.created_at),
        updated_at: now,
    };

    store.save_tournament(entity.clone()).await?;
    state
        .tournaments()
        .insert(tournament_id, Arc::new(entity.clone()));
    info!(
        %tournament_id,
        caller,
        levels = entity.levels.len(),
        created = existing.is_none(),
        "tournament saved"
    );

    Ok(TournamentSummary::from(&entity))
}

/// Fetch a tournament definition.
pub async fn get_tournament(
    state: &SharedState,
    tournament_id: TournamentId,
) -> Result<TournamentSummary, ServiceError> {
    let tournament = super::clock_service::tournament(state, tournament_id).await?;
    Ok(TournamentSummary::from(tournament.as_ref()))
}

async fn ensure_clock_idle(
    state: &SharedState,
    tournament_id: TournamentId,
) -> Result<(), ServiceError> {
    let live = match state.clocks().get(tournament_id).await {
        Ok(clock) => Some(clock.run_status),
        Err(_) => None,
    };
    let status = match live {
        Some(status) => Some(status),
        None if state.persister().has_pending(tournament_id) => None,
        None => {
            let store = state.storage().require().await?;
            store
                .load_clock_state(tournament_id)
                .await?
                .map(|clock| RunStatus::from(clock.run_status))
        }
    };

    match status {
        Some(status) if status != RunStatus::Finished => Err(ServiceError::Conflict(format!(
            "tournament `{tournament_id}` has an armed clock ({status}); cancel it first"
        ))),
        _ => Ok(()),
    }
}
