use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::{
    dto::{
        clock::{ClockEventDto, ClockStateView},
        sse::ServerEvent,
    },
    services::clock_service,
    state::{
        SharedState,
        clock::ChangeReason,
        rooms::{Resync, ViewerHandle},
    },
};

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

/// Convert a viewer subscription into an SSE response.
///
/// The stream opens with a `snapshot` event, then forwards one `clock` event
/// per broadcast. A viewer that falls behind receives a fresh `snapshot`
/// instead of the events it missed. The stream ends after the clock is
/// cancelled.
pub fn to_sse_stream(
    handle: ViewerHandle,
    state: SharedState,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = viewer_events(handle, state).map(|payload| Ok(to_event(payload)));
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Forward a viewer's clock events as SSE payloads from a background task.
///
/// The stream closes when the client goes away (the receiver is dropped) or
/// after the final `CANCELLED` event.
fn viewer_events(mut handle: ViewerHandle, state: SharedState) -> ReceiverStream<ServerEvent> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<ServerEvent>(8);

    tokio::spawn(async move {
        let tournament_id = handle.subscription().tournament_id;
        let connection_id = handle.subscription().connection_id;

        let initial = ClockStateView::from(handle.snapshot());
        if let Ok(payload) = ServerEvent::snapshot(&initial) {
            if tx.send(payload).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = handle.recv() => {
                    let (payload, last) = match recv_result {
                        Ok(event) => (
                            ServerEvent::clock(&ClockEventDto::from(&event)),
                            event.reason == ChangeReason::Cancelled,
                        ),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(%tournament_id, %connection_id, skipped, "viewer lagged, resending snapshot");
                            match clock_service::resync(&state, &mut handle).await {
                                Resync::Snapshot(snapshot) => {
                                    (ServerEvent::snapshot(&ClockStateView::from(&snapshot)), false)
                                }
                                Resync::Cancelled(event) => {
                                    (ServerEvent::clock(&ClockEventDto::from(&event)), true)
                                }
                                Resync::Gone => break,
                            }
                        }
                        Err(RecvError::Closed) => break,
                    };

                    match payload {
                        Ok(payload) => {
                            if tx.send(payload).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!(error = %err, "failed to serialize clock event"),
                    }
                    if last {
                        break;
                    }
                }
            }
        }

        info!(%tournament_id, %connection_id, "clock SSE stream disconnected");
    });

    ReceiverStream::new(rx)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use axum::response::IntoResponse;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::tournament_store::memory::MemoryTournamentStore,
        dto::{
            clock::{ChangeReasonDto, RunStatusDto},
            sse::{CLOCK_EVENT, SNAPSHOT_EVENT},
            tournament::{BlindLevelInput, TournamentRequest},
        },
        services::{storage_supervisor, tournament_service},
        state::{AppState, clock::ControlOp},
    };

    pub(crate) const ORGANIZER: &str = "organizer";

    fn level(index: u32, duration_seconds: u32) -> BlindLevelInput {
        BlindLevelInput {
            index,
            small_blind: 25 * u64::from(index + 1),
            big_blind: 50 * u64::from(index + 1),
            ante: 0,
            duration_seconds,
            is_pause: false,
        }
    }

    /// Armed clock whose ticker never fires during a test; time is driven by hand.
    pub(crate) async fn armed_clock(
        room_capacity: usize,
        sync_interval_secs: u32,
    ) -> (SharedState, Uuid) {
        let config = AppConfig::default()
            .with_tick_interval(Duration::from_secs(3_600))
            .with_room_capacity(room_capacity)
            .with_sync_interval_secs(sync_interval_secs);
        let state = AppState::new(config);
        storage_supervisor::install(&state, Arc::new(MemoryTournamentStore::new())).await;

        let id = Uuid::new_v4();
        let request = TournamentRequest {
            name: "Sunday Turbo".into(),
            organizer_id: ORGANIZER.into(),
            staff_ids: vec![],
            levels: vec![level(0, 1200), level(1, 1200)],
        };
        tournament_service::upsert_tournament(&state, ORGANIZER, id, request)
            .await
            .unwrap();
        clock_service::arm(&state, ORGANIZER, id).await.unwrap();
        (state, id)
    }

    fn snapshot_of(payload: &ServerEvent) -> ClockStateView {
        assert_eq!(payload.event.as_deref(), Some(SNAPSHOT_EVENT));
        serde_json::from_str(&payload.data).unwrap()
    }

    fn clock_of(payload: &ServerEvent) -> ClockEventDto {
        assert_eq!(payload.event.as_deref(), Some(CLOCK_EVENT));
        serde_json::from_str(&payload.data).unwrap()
    }

    #[tokio::test]
    async fn stream_opens_with_snapshot_and_ends_after_cancel() {
        let (state, id) = armed_clock(8, 0).await;
        let handle = clock_service::subscribe(&state, id).await.unwrap();
        let mut events = viewer_events(handle, state.clone());

        let opening = snapshot_of(&events.next().await.unwrap());
        assert_eq!(opening.run_status, RunStatusDto::NotStarted);
        assert_eq!(opening.time_remaining_seconds, 1200);

        clock_service::control(&state, ORGANIZER, id, ControlOp::Start)
            .await
            .unwrap();
        let started = clock_of(&events.next().await.unwrap());
        assert_eq!(started.reason, ChangeReasonDto::Started);
        assert_eq!(started.clock.run_status, RunStatusDto::Running);

        clock_service::cancel(&state, ORGANIZER, id).await.unwrap();
        let cancelled = clock_of(&events.next().await.unwrap());
        assert_eq!(cancelled.reason, ChangeReasonDto::Cancelled);
        assert_eq!(cancelled.clock.run_status, RunStatusDto::Finished);
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn lagging_viewer_gets_a_snapshot_then_only_newer_events() {
        let (state, id) = armed_clock(2, 1).await;
        let handle = clock_service::subscribe(&state, id).await.unwrap();

        // Overflow the room before the forwarder reads anything.
        state.clocks().apply(id, ControlOp::Start).await.unwrap();
        for _ in 0..5 {
            state.clocks().tick(id, 1).await.unwrap();
        }

        let mut events = viewer_events(handle, state.clone());
        let opening = snapshot_of(&events.next().await.unwrap());
        assert_eq!(opening.time_remaining_seconds, 1200);

        let recovered = snapshot_of(&events.next().await.unwrap());
        assert_eq!(recovered.run_status, RunStatusDto::Running);
        assert_eq!(recovered.time_remaining_seconds, 1195);

        state.clocks().tick(id, 1).await.unwrap();
        let next = clock_of(&events.next().await.unwrap());
        assert_eq!(next.reason, ChangeReasonDto::Sync);
        assert_eq!(next.clock.time_remaining_seconds, 1194);
    }

    #[tokio::test]
    async fn cancellation_missed_while_lagging_still_ends_the_stream() {
        let (state, id) = armed_clock(2, 0).await;
        let handle = clock_service::subscribe(&state, id).await.unwrap();

        state.clocks().apply(id, ControlOp::Start).await.unwrap();
        state.clocks().apply(id, ControlOp::NextLevel).await.unwrap();
        clock_service::cancel(&state, ORGANIZER, id).await.unwrap();

        let mut events = viewer_events(handle, state.clone());
        snapshot_of(&events.next().await.unwrap());
        let cancelled = clock_of(&events.next().await.unwrap());
        assert_eq!(cancelled.reason, ChangeReasonDto::Cancelled);
        assert_eq!(cancelled.clock.current_level_index, 1);
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn response_body_carries_named_events() {
        let (state, id) = armed_clock(8, 0).await;
        let handle = clock_service::subscribe(&state, id).await.unwrap();

        let mut body = to_sse_stream(handle, state.clone())
            .into_response()
            .into_body()
            .into_data_stream();
        let first = body.next().await.unwrap().unwrap();
        let text = String::from_utf8(first.to_vec()).unwrap();
        assert!(text.contains("event: snapshot"));
        assert!(text.contains("\"runStatus\":\"NOT_STARTED\""));
    }
}
