//! End-to-end clock behaviour over the service API and the in-memory store.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use blind_clock_back::{
    config::AppConfig,
    dao::{
        models::{BlindLevelEntity, RunStatusEntity, TournamentEntity},
        tournament_store::{TournamentStore, memory::MemoryTournamentStore},
    },
    dto::tournament::{BlindLevelInput, TournamentRequest},
    error::ServiceError,
    services::{clock_service, storage_supervisor, tournament_service},
    state::{
        AppState, SharedState,
        clock::{ChangeReason, ControlOp, RunStatus},
    },
};
use uuid::Uuid;

const ORGANIZER: &str = "organizer";
const DEALER: &str = "dealer";
const ADMIN: &str = "admin";

fn level(index: u32, small_blind: u64, big_blind: u64, duration_seconds: u32) -> BlindLevelInput {
    BlindLevelInput {
        index,
        small_blind,
        big_blind,
        ante: 0,
        duration_seconds,
        is_pause: false,
    }
}

fn two_levels() -> Vec<BlindLevelInput> {
    vec![level(0, 25, 50, 1200), level(1, 50, 100, 1200)]
}

fn request(levels: Vec<BlindLevelInput>) -> TournamentRequest {
    TournamentRequest {
        name: "Friday Deepstack".into(),
        organizer_id: ORGANIZER.into(),
        staff_ids: vec![DEALER.into()],
        levels,
    }
}

fn new_state() -> SharedState {
    AppState::new(AppConfig::default().with_admins(vec![ADMIN.into()]))
}

async fn setup_with(store: MemoryTournamentStore, levels: Vec<BlindLevelInput>) -> (SharedState, Uuid) {
    let state = new_state();
    storage_supervisor::install(&state, Arc::new(store)).await;
    let id = Uuid::new_v4();
    tournament_service::upsert_tournament(&state, ORGANIZER, id, request(levels))
        .await
        .unwrap();
    (state, id)
}

async fn setup(levels: Vec<BlindLevelInput>) -> (SharedState, Uuid) {
    setup_with(MemoryTournamentStore::new(), levels).await
}

async fn flush(state: &SharedState) {
    for _ in 0..200 {
        if state.persister().pending_len() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("clock writes never reached storage");
}

async fn control(state: &SharedState, id: Uuid, operation: ControlOp) {
    clock_service::control(state, ORGANIZER, id, operation)
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn level_advances_when_duration_elapses() {
    let (state, id) = setup(two_levels()).await;
    clock_service::arm(&state, ORGANIZER, id).await.unwrap();
    let started = clock_service::control(&state, ORGANIZER, id, ControlOp::Start)
        .await
        .unwrap();
    assert_eq!(started.state.current_level_index, 0);
    assert_eq!(started.state.time_remaining_seconds, 1200);
    assert_eq!(started.state.run_status, RunStatus::Running);

    tokio::time::sleep(Duration::from_millis(1_200_500)).await;

    let clock = clock_service::clock_state(&state, id).await.unwrap().state;
    assert_eq!(clock.current_level_index, 1);
    assert_eq!(clock.time_remaining_seconds, 1200);
    assert_eq!(clock.run_status, RunStatus::Running);
}

#[tokio::test(start_paused = true)]
async fn last_level_finishes_the_clock() {
    let (state, id) = setup(vec![level(0, 100, 200, 60)]).await;
    clock_service::arm(&state, ORGANIZER, id).await.unwrap();
    control(&state, id, ControlOp::Start).await;

    tokio::time::sleep(Duration::from_millis(60_500)).await;

    let clock = clock_service::clock_state(&state, id).await.unwrap().state;
    assert_eq!(clock.run_status, RunStatus::Finished);
    assert_eq!(clock.time_remaining_seconds, 0);
    assert!(!state.engine().is_ticking(id));

    tokio::time::sleep(Duration::from_secs(10)).await;
    let later = clock_service::clock_state(&state, id).await.unwrap().state;
    assert_eq!(later, clock);

    let err = clock_service::control(&state, ORGANIZER, id, ControlOp::ResetLevel)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTransition(_)));
}

#[tokio::test(start_paused = true)]
async fn finished_clock_leaves_memory_once_persisted() {
    let (state, id) = setup(vec![level(0, 100, 200, 60)]).await;
    clock_service::arm(&state, ORGANIZER, id).await.unwrap();
    control(&state, id, ControlOp::Start).await;

    tokio::time::sleep(Duration::from_millis(60_500)).await;
    for _ in 0..200 {
        if !state.clocks().contains(id) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(!state.clocks().contains(id));
    assert!(state.tournaments().get(&id).is_none());

    let clock = clock_service::clock_state(&state, id).await.unwrap().state;
    assert_eq!(clock.run_status, RunStatus::Finished);
    assert_eq!(clock.time_remaining_seconds, 0);
    assert!(state.clocks().contains(id));
}

#[tokio::test]
async fn clock_uses_the_stored_level_table_in_index_order() {
    let store = MemoryTournamentStore::new();
    let id = Uuid::new_v4();
    let stored_level = |index: u32, big_blind: u64, duration_seconds: u32| BlindLevelEntity {
        index,
        small_blind: big_blind / 2,
        big_blind,
        ante: 0,
        duration_seconds,
        is_pause: false,
    };
    store
        .save_tournament(TournamentEntity {
            id,
            name: "Imported Series".into(),
            organizer_id: ORGANIZER.into(),
            staff_ids: vec![],
            levels: vec![stored_level(1, 100, 900), stored_level(0, 50, 600)],
            created_at: SystemTime::now(),
            updated_at: SystemTime::now(),
        })
        .await
        .unwrap();

    let state = new_state();
    storage_supervisor::install(&state, Arc::new(store)).await;

    let (snapshot, armed) = clock_service::arm(&state, ORGANIZER, id).await.unwrap();
    assert!(armed);
    assert_eq!(snapshot.state.current_level_index, 0);
    assert_eq!(snapshot.state.time_remaining_seconds, 600);
    assert_eq!(snapshot.levels.duration(1), 900);
}

#[tokio::test(start_paused = true)]
async fn pause_freezes_remaining_time() {
    let (state, id) = setup(two_levels()).await;
    clock_service::arm(&state, ORGANIZER, id).await.unwrap();
    control(&state, id, ControlOp::Start).await;

    tokio::time::sleep(Duration::from_millis(400_500)).await;
    let paused = clock_service::control(&state, DEALER, id, ControlOp::Pause)
        .await
        .unwrap();
    assert_eq!(paused.state.time_remaining_seconds, 800);
    assert!(paused.state.is_paused);
    assert!(!state.engine().is_ticking(id));

    tokio::time::sleep(Duration::from_secs(50)).await;
    let clock = clock_service::clock_state(&state, id).await.unwrap().state;
    assert_eq!(clock.time_remaining_seconds, 800);

    control(&state, id, ControlOp::Resume).await;
    tokio::time::sleep(Duration::from_millis(10_500)).await;
    let clock = clock_service::clock_state(&state, id).await.unwrap().state;
    assert_eq!(clock.time_remaining_seconds, 790);
    assert_eq!(clock.run_status, RunStatus::Running);
}

#[tokio::test]
async fn concurrent_next_level_advances_once() {
    let (state, id) = setup(two_levels()).await;
    clock_service::arm(&state, ORGANIZER, id).await.unwrap();

    let (first, second) = tokio::join!(
        clock_service::control(&state, ORGANIZER, id, ControlOp::NextLevel),
        clock_service::control(&state, DEALER, id, ControlOp::NextLevel),
    );

    let results = [first, second];
    let succeeded = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(succeeded, 1);
    assert!(results.iter().any(|result| matches!(
        result,
        Err(ServiceError::InvalidTransition(invalid)) if invalid.level_index == 1
    )));

    let clock = clock_service::clock_state(&state, id).await.unwrap().state;
    assert_eq!(clock.current_level_index, 1);
}

#[tokio::test]
async fn rejected_operation_changes_nothing_and_emits_nothing() {
    let (state, id) = setup(two_levels()).await;
    clock_service::arm(&state, ORGANIZER, id).await.unwrap();
    let mut viewer = clock_service::subscribe(&state, id).await.unwrap();

    control(&state, id, ControlOp::NextLevel).await;
    let before = clock_service::clock_state(&state, id).await.unwrap();

    let err = clock_service::control(&state, ORGANIZER, id, ControlOp::NextLevel)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTransition(_)));
    assert_eq!(clock_service::clock_state(&state, id).await.unwrap(), before);

    control(&state, id, ControlOp::ResetLevel).await;
    assert_eq!(viewer.recv().await.unwrap().reason, ChangeReason::ManualJump);
    assert_eq!(viewer.recv().await.unwrap().reason, ChangeReason::Reset);
}

#[tokio::test]
async fn only_roster_members_and_admins_control_the_clock() {
    let (state, id) = setup(two_levels()).await;
    clock_service::arm(&state, ORGANIZER, id).await.unwrap();

    let err = clock_service::control(&state, "stranger", id, ControlOp::Start)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)));
    let clock = clock_service::clock_state(&state, id).await.unwrap().state;
    assert_eq!(clock.run_status, RunStatus::NotStarted);

    let err = clock_service::cancel(&state, "stranger", id).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)));

    clock_service::control(&state, ADMIN, id, ControlOp::Start)
        .await
        .unwrap();
    clock_service::control(&state, DEALER, id, ControlOp::Pause)
        .await
        .unwrap();
}

#[tokio::test]
async fn unknown_tournament_and_missing_clock_are_not_found() {
    let (state, id) = setup(two_levels()).await;

    let err = clock_service::clock_state(&state, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let err = clock_service::control(&state, ORGANIZER, id, ControlOp::Start)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn arming_is_idempotent() {
    let (state, id) = setup(two_levels()).await;

    let (armed, created) = clock_service::arm(&state, ORGANIZER, id).await.unwrap();
    assert!(created);
    assert_eq!(armed.state.run_status, RunStatus::NotStarted);
    assert_eq!(armed.state.time_remaining_seconds, 1200);

    control(&state, id, ControlOp::NextLevel).await;
    let (again, created) = clock_service::arm(&state, ORGANIZER, id).await.unwrap();
    assert!(!created);
    assert_eq!(again.state.current_level_index, 1);
}

#[tokio::test]
async fn reconnecting_viewer_gets_current_snapshot() {
    let (state, id) = setup(two_levels()).await;
    clock_service::arm(&state, ORGANIZER, id).await.unwrap();

    let first = clock_service::subscribe(&state, id).await.unwrap();
    assert_eq!(state.rooms().viewers(id).len(), 1);
    drop(first);
    assert!(state.rooms().viewers(id).is_empty());

    control(&state, id, ControlOp::NextLevel).await;
    control(&state, id, ControlOp::Start).await;
    control(&state, id, ControlOp::Pause).await;

    let second = clock_service::subscribe(&state, id).await.unwrap();
    let current = clock_service::clock_state(&state, id).await.unwrap();
    assert_eq!(second.snapshot(), &current);
    assert_eq!(second.snapshot().state.current_level_index, 0);
    assert_eq!(second.snapshot().state.run_status, RunStatus::Paused);
}

#[tokio::test]
async fn cancel_notifies_viewers_and_deletes_the_record() {
    let store = MemoryTournamentStore::new();
    let (state, id) = setup_with(store.clone(), two_levels()).await;
    clock_service::arm(&state, ORGANIZER, id).await.unwrap();
    flush(&state).await;
    assert!(store.load_clock_state(id).await.unwrap().is_some());

    let mut viewer = clock_service::subscribe(&state, id).await.unwrap();
    let last = clock_service::cancel(&state, ORGANIZER, id).await.unwrap();
    assert_eq!(last.run_status, RunStatus::Finished);

    let event = viewer.recv().await.unwrap();
    assert_eq!(event.reason, ChangeReason::Cancelled);
    assert_eq!(event.snapshot.state.run_status, RunStatus::Finished);

    let err = clock_service::clock_state(&state, id).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    // Re-arming right away must not resurrect the cancelled record.
    let (fresh, created) = clock_service::arm(&state, ORGANIZER, id).await.unwrap();
    assert!(created);
    assert_eq!(fresh.state.run_status, RunStatus::NotStarted);

    clock_service::cancel(&state, ORGANIZER, id).await.unwrap();
    flush(&state).await;
    assert!(store.load_clock_state(id).await.unwrap().is_none());
}

#[tokio::test]
async fn level_table_is_locked_while_a_clock_is_armed() {
    let (state, id) = setup(two_levels()).await;
    clock_service::arm(&state, ORGANIZER, id).await.unwrap();

    let err = tournament_service::upsert_tournament(
        &state,
        ORGANIZER,
        id,
        request(vec![level(0, 10, 20, 600)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    clock_service::cancel(&state, ORGANIZER, id).await.unwrap();
    let summary = tournament_service::upsert_tournament(
        &state,
        ORGANIZER,
        id,
        request(vec![level(0, 10, 20, 600)]),
    )
    .await
    .unwrap();
    assert_eq!(summary.levels.len(), 1);

    let (armed, _) = clock_service::arm(&state, ORGANIZER, id).await.unwrap();
    assert_eq!(armed.state.time_remaining_seconds, 600);
}

#[tokio::test]
async fn tournament_setup_requires_the_organizer_or_an_admin() {
    let (state, id) = setup(two_levels()).await;

    let err = tournament_service::upsert_tournament(&state, DEALER, id, request(two_levels()))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)));

    let err =
        tournament_service::upsert_tournament(&state, "someone", Uuid::new_v4(), request(two_levels()))
            .await
            .unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)));

    tournament_service::upsert_tournament(&state, ADMIN, id, request(two_levels()))
        .await
        .unwrap();

    let mut bad = request(two_levels());
    bad.levels[1].index = 5;
    let err = tournament_service::upsert_tournament(&state, ORGANIZER, Uuid::new_v4(), bad)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));
}

#[tokio::test]
async fn paused_clock_is_lazily_loaded_after_restart() {
    let store = MemoryTournamentStore::new();
    let (before, id) = setup_with(store.clone(), two_levels()).await;
    clock_service::arm(&before, ORGANIZER, id).await.unwrap();
    control(&before, id, ControlOp::NextLevel).await;
    flush(&before).await;
    drop(before);

    let after = new_state();
    storage_supervisor::install(&after, Arc::new(store)).await;
    assert!(!after.clocks().contains(id));

    let clock = clock_service::clock_state(&after, id).await.unwrap().state;
    assert_eq!(clock.current_level_index, 1);
    assert_eq!(clock.run_status, RunStatus::NotStarted);
    assert!(!after.engine().is_ticking(id));
}

#[tokio::test(start_paused = true)]
async fn running_clocks_resume_after_restart() {
    let store = MemoryTournamentStore::new();
    let (before, id) = setup_with(store.clone(), two_levels()).await;
    clock_service::arm(&before, ORGANIZER, id).await.unwrap();
    control(&before, id, ControlOp::Start).await;
    before.engine().shutdown();
    flush(&before).await;

    let stored = store.load_clock_state(id).await.unwrap().unwrap();
    assert_eq!(stored.run_status, RunStatusEntity::Running);

    let after = new_state();
    storage_supervisor::install(&after, Arc::new(store)).await;
    assert!(after.clocks().contains(id));
    assert!(after.engine().is_ticking(id));

    let resumed = after.clocks().get(id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5_500)).await;
    let clock = after.clocks().get(id).await.unwrap();
    assert_eq!(
        clock.time_remaining_seconds,
        resumed.time_remaining_seconds - 5
    );
}

#[tokio::test]
async fn degraded_mode_rejects_storage_backed_calls() {
    let state = new_state();
    assert!(state.is_degraded());

    let err = clock_service::arm(&state, ORGANIZER, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Degraded));
}
