//! Control surface of the tournament clock.
//!
//! Every operation resolves the tournament (memory first, then storage),
//! authorizes the caller, makes sure the clock is loaded and then hands the
//! mutation to the clock store, which linearizes it with the ticker and
//! notifies viewers. Storage I/O only ever happens before the per-tournament
//! lock is taken.

use std::{future::Future, sync::Arc, time::SystemTime};

use tracing::{debug, info, warn};

use crate::{
    dao::{
        models::{RunStatusEntity, TournamentEntity},
        tournament_store::TournamentStore,
    },
    error::ServiceError,
    services::audit::{self, AuditRecord},
    state::{
        SharedState,
        clock::{
            ChangeReason, ClockError, ClockSnapshot, ClockState, ControlOp, LevelTable,
            TournamentId,
        },
        rooms::{Resync, ViewerHandle},
    },
};

/// Resolve a tournament record, caching it once read from storage.
pub async fn tournament(
    state: &SharedState,
    tournament_id: TournamentId,
) -> Result<Arc<TournamentEntity>, ServiceError> {
    if let Some(cached) = state.tournaments().get(&tournament_id) {
        return Ok(cached.value().clone());
    }

    let store = state.storage().require().await?;
    let entity = store
        .find_tournament(tournament_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("tournament `{tournament_id}`")))?;

    let entity = Arc::new(entity);
    state.tournaments().insert(tournament_id, entity.clone());
    Ok(entity)
}

/// Read the ordered level table of a tournament from storage.
async fn load_level_table(
    store: &dyn TournamentStore,
    tournament_id: TournamentId,
) -> Result<LevelTable, ServiceError> {
    let levels = store
        .load_levels(tournament_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("tournament `{tournament_id}`")))?;
    LevelTable::new(levels.into_iter().map(Into::into).collect()).map_err(|err| {
        ServiceError::Conflict(format!(
            "tournament `{tournament_id}` has an unusable level table: {err}"
        ))
    })
}

fn authorize(
    state: &SharedState,
    caller: &str,
    tournament: &TournamentEntity,
) -> Result<(), ServiceError> {
    if state.authorizer().is_authorized(caller, tournament) {
        return Ok(());
    }
    warn!(tournament_id = %tournament.id, caller, "clock operation refused");
    Err(ServiceError::Unauthorized(format!(
        "`{caller}` may not control tournament `{}`",
        tournament.id
    )))
}

fn record(state: &SharedState, caller: &str, tournament_id: TournamentId, operation: &str) {
    audit::emit(
        state.audit(),
        AuditRecord {
            actor: caller.to_owned(),
            tournament_id,
            operation: operation.to_owned(),
            at: SystemTime::now(),
        },
    );
}

/// Load a persisted clock into memory unless it is already live.
///
/// Returns `false` when neither memory nor storage holds a clock.
async fn ensure_loaded(
    state: &SharedState,
    tournament: &TournamentEntity,
) -> Result<bool, ServiceError> {
    let tournament_id = tournament.id;
    if state.clocks().contains(tournament_id) {
        return Ok(true);
    }
    // A write still queued for this clock is newer than what storage holds.
    if state.persister().has_pending(tournament_id) {
        return Ok(false);
    }

    let store = state.storage().require().await?;
    let Some(entity) = store.load_clock_state(tournament_id).await? else {
        return Ok(false);
    };

    let levels = load_level_table(store.as_ref(), tournament_id).await?;
    let clock = entity.into_state(&levels);
    let (clock, inserted) = state
        .clocks()
        .insert(clock, levels, ChangeReason::Restored)
        .await;
    if inserted {
        info!(%tournament_id, status = %clock.run_status, "clock loaded from storage");
    }
    Ok(true)
}

async fn require_clock(
    state: &SharedState,
    tournament: &TournamentEntity,
) -> Result<(), ServiceError> {
    if ensure_loaded(state, tournament).await? {
        Ok(())
    } else {
        Err(ServiceError::NotFound(format!(
            "no clock armed for tournament `{}`",
            tournament.id
        )))
    }
}

/// Load the clock and run `call` against it.
///
/// A finished clock can be evicted between the load and the call; it is loaded
/// back once.
async fn with_clock<T, F, Fut>(
    state: &SharedState,
    tournament: &TournamentEntity,
    mut call: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClockError>>,
{
    require_clock(state, tournament).await?;
    match call().await {
        Err(ClockError::NotFound(_)) => {
            require_clock(state, tournament).await?;
            Ok(call().await?)
        }
        other => Ok(other?),
    }
}

/// Current authoritative clock of a tournament.
pub async fn clock_state(
    state: &SharedState,
    tournament_id: TournamentId,
) -> Result<ClockSnapshot, ServiceError> {
    let tournament = tournament(state, tournament_id).await?;
    with_clock(state, &tournament, || state.clocks().snapshot(tournament_id)).await
}

/// Apply one control operation on behalf of `caller`.
pub async fn control(
    state: &SharedState,
    caller: &str,
    tournament_id: TournamentId,
    operation: ControlOp,
) -> Result<ClockSnapshot, ServiceError> {
    let tournament = tournament(state, tournament_id).await?;
    authorize(state, caller, &tournament)?;

    let change = with_clock(state, &tournament, || {
        state.clocks().apply(tournament_id, operation)
    })
    .await?;
    info!(
        %tournament_id,
        caller,
        %operation,
        level = change.snapshot.state.current_level_index,
        remaining = change.snapshot.state.time_remaining_seconds,
        "clock control applied"
    );
    record(state, caller, tournament_id, operation.as_str());
    Ok(change.snapshot)
}

/// Create the clock of a tournament from its level table.
///
/// Idempotent: an existing clock (live or persisted) is returned unchanged and
/// the flag is `false`.
pub async fn arm(
    state: &SharedState,
    caller: &str,
    tournament_id: TournamentId,
) -> Result<(ClockSnapshot, bool), ServiceError> {
    let tournament = tournament(state, tournament_id).await?;
    authorize(state, caller, &tournament)?;

    let mut armed = false;
    if !ensure_loaded(state, &tournament).await? {
        let store = state.storage().require().await?;
        let levels = load_level_table(store.as_ref(), tournament_id).await?;
        let (_, inserted) = state
            .clocks()
            .insert(
                ClockState::armed(tournament_id, &levels),
                levels,
                ChangeReason::Armed,
            )
            .await;
        armed = inserted;
    }

    if armed {
        info!(%tournament_id, caller, "clock armed");
        record(state, caller, tournament_id, "arm");
    }
    let snapshot = with_clock(state, &tournament, || {
        state.clocks().snapshot(tournament_id)
    })
    .await?;
    Ok((snapshot, armed))
}

/// Stop and discard the clock of a tournament.
///
/// Viewers receive a final `CANCELLED` event; the persisted record is deleted.
pub async fn cancel(
    state: &SharedState,
    caller: &str,
    tournament_id: TournamentId,
) -> Result<ClockState, ServiceError> {
    let tournament = tournament(state, tournament_id).await?;
    authorize(state, caller, &tournament)?;

    let last = with_clock(state, &tournament, || state.clocks().remove(tournament_id)).await?;
    state.tournaments().remove(&tournament_id);
    info!(%tournament_id, caller, "clock cancelled");
    record(state, caller, tournament_id, "cancel");
    Ok(last)
}

/// Join the tournament room; the handle carries the snapshot to start from.
pub async fn subscribe(
    state: &SharedState,
    tournament_id: TournamentId,
) -> Result<ViewerHandle, ServiceError> {
    let tournament = tournament(state, tournament_id).await?;
    with_clock(state, &tournament, || {
        state.rooms().subscribe(state.clocks(), tournament_id)
    })
    .await
}

/// Restart a viewer from the current state, after it fell behind or asked.
///
/// Finished clocks leave memory once persisted; they are loaded back so the
/// viewer still gets a snapshot.
pub async fn resync(state: &SharedState, handle: &mut ViewerHandle) -> Resync {
    let tournament_id = handle.subscription().tournament_id;
    match handle.resync(state.clocks()).await {
        Resync::Gone => match clock_state(state, tournament_id).await {
            Ok(_) => handle.resync(state.clocks()).await,
            Err(err) => {
                debug!(%tournament_id, error = %err, "clock gone during viewer resync");
                Resync::Gone
            }
        },
        other => other,
    }
}

/// Bring every persisted running clock back into memory and resume ticking.
///
/// Remaining time continues from the persisted value; downtime is not
/// credited. Returns the number of clocks restored.
pub async fn recover_running_clocks(state: &SharedState) -> Result<usize, ServiceError> {
    let store = state.storage().require().await?;
    let running = store
        .list_clock_states(Some(RunStatusEntity::Running))
        .await?;

    let mut restored = 0;
    for entity in running {
        let tournament_id = entity.tournament_id;
        if state.clocks().contains(tournament_id) || state.persister().has_pending(tournament_id)
        {
            continue;
        }

        let levels = match load_level_table(store.as_ref(), tournament_id).await {
            Ok(levels) => levels,
            Err(err) => {
                warn!(%tournament_id, error = %err, "skipping running clock");
                continue;
            }
        };

        let clock = entity.into_state(&levels);
        let (_, inserted) = state
            .clocks()
            .insert(clock, levels, ChangeReason::Restored)
            .await;
        if inserted {
            restored += 1;
        }
    }

    if restored > 0 {
        info!(restored, "running clocks restored");
    }
    Ok(restored)
}
