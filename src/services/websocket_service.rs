use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, Stream, StreamExt};
use tokio::{
    sync::{broadcast::error::RecvError, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    dto::{
        clock::{ClockEventDto, ClockStateView},
        ws::{ViewerInboundMessage, ViewerOutboundMessage},
    },
    services::clock_service,
    state::{
        SharedState,
        clock::{ChangeReason, TournamentId},
        rooms::{Resync, ViewerHandle},
    },
};

/// Writer channel closed; the connection should be torn down.
struct ConnectionClosed;

/// Handle the full lifecycle of a clock viewer WebSocket connection.
///
/// The viewer receives a `snapshot` message first, then one `clock` message per
/// broadcast. Sending `{"type":"resync"}` requests a fresh snapshot at any
/// time; lagging viewers get one automatically. The socket is closed after the
/// clock is cancelled.
pub async fn handle_socket(state: SharedState, socket: WebSocket, tournament_id: TournamentId) {
    let (mut sender, receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let handle = match clock_service::subscribe(&state, tournament_id).await {
        Ok(handle) => handle,
        Err(err) => {
            warn!(%tournament_id, error = %err, "rejecting clock viewer");
            let _ = send_message_to_websocket(
                &outbound_tx,
                &ViewerOutboundMessage::Error {
                    message: err.to_string(),
                },
            );
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };
    serve_viewer(&state, handle, receiver, &outbound_tx).await;
    finalize(writer_task, outbound_tx).await;
}

/// Pump clock events out and viewer requests in until either side is done.
async fn serve_viewer<S>(
    state: &SharedState,
    mut handle: ViewerHandle,
    mut receiver: S,
    outbound_tx: &mpsc::UnboundedSender<Message>,
) where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let tournament_id = handle.subscription().tournament_id;
    let connection_id = handle.subscription().connection_id;
    info!(%tournament_id, %connection_id, "clock viewer connected");

    let initial = ViewerOutboundMessage::Snapshot(ClockStateView::from(handle.snapshot()));
    if send_message_to_websocket(outbound_tx, &initial).is_err() {
        return;
    }

    loop {
        tokio::select! {
            recv_result = handle.recv() => {
                match recv_result {
                    Ok(event) => {
                        let message = ViewerOutboundMessage::Clock(ClockEventDto::from(&event));
                        if send_message_to_websocket(outbound_tx, &message).is_err() {
                            break;
                        }
                        if event.reason == ChangeReason::Cancelled {
                            let _ = outbound_tx.send(Message::Close(None));
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(%tournament_id, %connection_id, skipped, "viewer lagged, resending snapshot");
                        if !resync_viewer(state, &mut handle, outbound_tx).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ViewerInboundMessage>(&text) {
                            Ok(ViewerInboundMessage::Resync) => {
                                if !resync_viewer(state, &mut handle, outbound_tx).await {
                                    break;
                                }
                            }
                            Ok(ViewerInboundMessage::Unknown) => {
                                debug!(%tournament_id, payload = %text, "ignoring unknown viewer message");
                            }
                            Err(err) => {
                                warn!(%tournament_id, error = %err, "failed to parse viewer message");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = outbound_tx.send(Message::Pong(payload));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let _ = outbound_tx.send(Message::Close(frame));
                        break;
                    }
                    Some(Ok(Message::Binary(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Err(err)) => {
                        warn!(%tournament_id, error = %err, "websocket error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    drop(handle);
    info!(%tournament_id, %connection_id, "clock viewer disconnected");
}

/// Send the viewer a fresh snapshot, dropping the events it would otherwise
/// replay. Returns `false` once the connection should be closed.
async fn resync_viewer(
    state: &SharedState,
    handle: &mut ViewerHandle,
    tx: &mpsc::UnboundedSender<Message>,
) -> bool {
    match clock_service::resync(state, handle).await {
        Resync::Snapshot(snapshot) => send_message_to_websocket(
            tx,
            &ViewerOutboundMessage::Snapshot(ClockStateView::from(&snapshot)),
        )
        .is_ok(),
        Resync::Cancelled(event) => {
            let _ = send_message_to_websocket(
                tx,
                &ViewerOutboundMessage::Clock(ClockEventDto::from(&event)),
            );
            let _ = tx.send(Message::Close(None));
            false
        }
        Resync::Gone => {
            let _ = send_message_to_websocket(
                tx,
                &ViewerOutboundMessage::Error {
                    message: format!(
                        "clock of tournament `{}` is gone",
                        handle.subscription().tournament_id
                    ),
                },
            );
            let _ = tx.send(Message::Close(None));
            false
        }
    }
}

fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
) -> Result<(), ConnectionClosed>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}`");
            return Ok(());
        }
    };
    tx.send(Message::Text(payload.into()))
        .map_err(|_| ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use futures::channel::mpsc as inbound_channel;

    use super::*;
    use crate::{
        dto::clock::{ChangeReasonDto, RunStatusDto},
        services::sse_service::tests::{ORGANIZER, armed_clock},
        state::clock::ControlOp,
    };

    struct Viewer {
        inbound: inbound_channel::UnboundedSender<Result<Message, axum::Error>>,
        outbound: mpsc::UnboundedReceiver<Message>,
        task: JoinHandle<()>,
    }

    impl Viewer {
        fn spawn(state: &SharedState, handle: ViewerHandle) -> Self {
            let (inbound_tx, inbound_rx) = inbound_channel::unbounded();
            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            let state = state.clone();
            let task = tokio::spawn(async move {
                serve_viewer(&state, handle, inbound_rx, &outbound_tx).await;
            });
            Self {
                inbound: inbound_tx,
                outbound: outbound_rx,
                task,
            }
        }

        async fn next(&mut self) -> ViewerOutboundMessage {
            match self.outbound.recv().await {
                Some(Message::Text(text)) => serde_json::from_str(&text).unwrap(),
                other => panic!("expected a text message, got {other:?}"),
            }
        }

        fn send_text(&self, text: &str) {
            self.inbound
                .unbounded_send(Ok(Message::Text(text.into())))
                .unwrap();
        }
    }

    fn snapshot(message: ViewerOutboundMessage) -> ClockStateView {
        match message {
            ViewerOutboundMessage::Snapshot(view) => view,
            other => panic!("expected a snapshot, got {other:?}"),
        }
    }

    fn clock(message: ViewerOutboundMessage) -> ClockEventDto {
        match message {
            ViewerOutboundMessage::Clock(event) => event,
            other => panic!("expected a clock event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn resync_request_returns_the_current_state() {
        let (state, id) = armed_clock(8, 0).await;
        let handle = clock_service::subscribe(&state, id).await.unwrap();
        let mut viewer = Viewer::spawn(&state, handle);

        assert_eq!(snapshot(viewer.next().await).run_status, RunStatusDto::NotStarted);

        clock_service::control(&state, ORGANIZER, id, ControlOp::Start)
            .await
            .unwrap();
        assert_eq!(clock(viewer.next().await).reason, ChangeReasonDto::Started);

        // Plain ticks are not broadcast with sync disabled.
        state.clocks().tick(id, 7).await.unwrap();
        viewer.send_text(r#"{"type":"resync"}"#);
        let current = snapshot(viewer.next().await);
        assert_eq!(current.time_remaining_seconds, 1193);
        assert_eq!(current.run_status, RunStatusDto::Running);
    }

    #[tokio::test]
    async fn lagging_viewer_resumes_from_a_fresh_snapshot() {
        let (state, id) = armed_clock(2, 1).await;
        let handle = clock_service::subscribe(&state, id).await.unwrap();
        state.clocks().apply(id, ControlOp::Start).await.unwrap();
        for _ in 0..5 {
            state.clocks().tick(id, 1).await.unwrap();
        }

        let mut viewer = Viewer::spawn(&state, handle);
        assert_eq!(snapshot(viewer.next().await).time_remaining_seconds, 1200);
        assert_eq!(snapshot(viewer.next().await).time_remaining_seconds, 1195);

        state.clocks().tick(id, 1).await.unwrap();
        let next = clock(viewer.next().await);
        assert_eq!(next.reason, ChangeReasonDto::Sync);
        assert_eq!(next.clock.time_remaining_seconds, 1194);
    }

    #[tokio::test]
    async fn socket_closes_after_cancel() {
        let (state, id) = armed_clock(8, 0).await;
        let handle = clock_service::subscribe(&state, id).await.unwrap();
        let mut viewer = Viewer::spawn(&state, handle);
        snapshot(viewer.next().await);

        clock_service::cancel(&state, ORGANIZER, id).await.unwrap();
        assert_eq!(clock(viewer.next().await).reason, ChangeReasonDto::Cancelled);
        assert!(matches!(viewer.outbound.recv().await, Some(Message::Close(None))));
        viewer.task.await.unwrap();
        assert!(state.rooms().viewers(id).is_empty());
    }

    #[tokio::test]
    async fn unknown_messages_are_ignored() {
        let (state, id) = armed_clock(8, 0).await;
        let handle = clock_service::subscribe(&state, id).await.unwrap();
        let mut viewer = Viewer::spawn(&state, handle);
        snapshot(viewer.next().await);

        viewer.send_text(r#"{"type":"buzz"}"#);
        viewer.send_text("not json");
        viewer.send_text(r#"{"type":"resync"}"#);
        assert_eq!(snapshot(viewer.next().await).run_status, RunStatusDto::NotStarted);
    }
}
