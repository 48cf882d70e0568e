use std::{collections::HashMap, sync::Arc, time::SystemTime};

use dashmap::DashMap;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tracing::debug;
use uuid::Uuid;

use super::{
    clock::{ChangeReason, ClockError, ClockSnapshot, StateChangeEvent, TournamentId},
    store::{ClockChange, ClockObserver, ClockStateStore},
};

/// Ephemeral record of a viewer attached to a tournament room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerSubscription {
    /// Room the viewer joined.
    pub tournament_id: TournamentId,
    /// Connection identifier, unique per subscribe call.
    pub connection_id: Uuid,
    /// When the viewer joined.
    pub joined_at: SystemTime,
}

struct Room {
    sender: broadcast::Sender<StateChangeEvent>,
    viewers: HashMap<Uuid, ViewerSubscription>,
}

/// Per-tournament publish/subscribe rooms fanning clock events out to viewers.
pub struct ClockRooms {
    rooms: DashMap<TournamentId, Room>,
    capacity: usize,
    sync_interval_secs: u32,
}

impl ClockRooms {
    /// Build the room registry.
    ///
    /// `capacity` bounds each room's backlog per viewer; `sync_interval_secs`
    /// controls how often plain ticks are rebroadcast as `Sync` (0 disables).
    pub fn new(capacity: usize, sync_interval_secs: u32) -> Self {
        Self {
            rooms: DashMap::new(),
            capacity: capacity.max(1),
            sync_interval_secs,
        }
    }

    /// Attach a viewer to the tournament room.
    ///
    /// The snapshot is taken under the clock lock right after the receiver is
    /// registered, so every change committed afterwards reaches the viewer.
    pub async fn subscribe(
        self: &Arc<Self>,
        store: &ClockStateStore,
        tournament_id: TournamentId,
    ) -> Result<ViewerHandle, ClockError> {
        let connection_id = Uuid::new_v4();
        let (subscription, receiver, snapshot) = store
            .with_locked(tournament_id, |snapshot| {
                let subscription = ViewerSubscription {
                    tournament_id,
                    connection_id,
                    joined_at: SystemTime::now(),
                };
                let mut room = self.rooms.entry(tournament_id).or_insert_with(|| Room {
                    sender: broadcast::channel(self.capacity).0,
                    viewers: HashMap::new(),
                });
                room.viewers.insert(connection_id, subscription.clone());
                let receiver = room.sender.subscribe();
                (subscription, receiver, snapshot.clone())
            })
            .await?;

        debug!(%tournament_id, %connection_id, "viewer subscribed");
        Ok(ViewerHandle {
            subscription,
            snapshot,
            receiver,
            rooms: Arc::clone(self),
        })
    }

    /// Detach a viewer; empty rooms are dropped.
    pub fn unsubscribe(&self, tournament_id: TournamentId, connection_id: Uuid) {
        if let Some(mut room) = self.rooms.get_mut(&tournament_id) {
            room.viewers.remove(&connection_id);
        }
        self.rooms
            .remove_if(&tournament_id, |_, room| room.viewers.is_empty());
        debug!(%tournament_id, %connection_id, "viewer unsubscribed");
    }

    /// Deliver an event to every viewer currently in the tournament room.
    ///
    /// Returns the number of viewers reached; rooms without viewers are skipped.
    pub fn publish(&self, event: StateChangeEvent) -> usize {
        let tournament_id = event.snapshot.state.tournament_id;
        let Some(room) = self.rooms.get(&tournament_id) else {
            return 0;
        };
        room.sender.send(event).unwrap_or(0)
    }

    /// Viewers currently attached to the tournament room.
    pub fn viewers(&self, tournament_id: TournamentId) -> Vec<ViewerSubscription> {
        self.rooms
            .get(&tournament_id)
            .map(|room| room.viewers.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Map a committed change to the reason broadcast to viewers, if any.
    fn broadcast_reason(&self, change: &ClockChange) -> Option<ChangeReason> {
        match change.reason {
            ChangeReason::Tick => {
                let remaining = change.snapshot.state.time_remaining_seconds;
                let due = self.sync_interval_secs > 0 && remaining % self.sync_interval_secs == 0;
                due.then_some(ChangeReason::Sync)
            }
            other => Some(other),
        }
    }
}

impl ClockObserver for ClockRooms {
    fn on_change(&self, change: &ClockChange) {
        let Some(reason) = self.broadcast_reason(change) else {
            return;
        };
        self.publish(StateChangeEvent {
            snapshot: change.snapshot.clone(),
            reason,
            emitted_at: change.at,
        });
    }
}

/// Outcome of [`ViewerHandle::resync`].
#[derive(Debug, Clone)]
pub enum Resync {
    /// Current state; only changes committed after it are received from now on.
    Snapshot(ClockSnapshot),
    /// The clock was cancelled while the viewer was behind.
    Cancelled(StateChangeEvent),
    /// The clock is no longer held in memory.
    Gone,
}

/// A viewer's live subscription; dropping it leaves the room.
pub struct ViewerHandle {
    subscription: ViewerSubscription,
    snapshot: ClockSnapshot,
    receiver: broadcast::Receiver<StateChangeEvent>,
    rooms: Arc<ClockRooms>,
}

impl ViewerHandle {
    /// Subscription record of this viewer.
    pub fn subscription(&self) -> &ViewerSubscription {
        &self.subscription
    }

    /// Latest snapshot handed to the viewer (on join or resync).
    pub fn snapshot(&self) -> &ClockSnapshot {
        &self.snapshot
    }

    /// Restart the viewer from the current state.
    ///
    /// The snapshot is taken and the backlog discarded under the clock lock, so
    /// the next event received is the first change committed after the
    /// snapshot. When the clock is gone the backlog is searched for its
    /// cancellation instead.
    pub async fn resync(&mut self, store: &ClockStateStore) -> Resync {
        let tournament_id = self.subscription.tournament_id;
        let receiver = &mut self.receiver;
        let fresh = store
            .with_locked(tournament_id, |snapshot| {
                *receiver = receiver.resubscribe();
                snapshot.clone()
            })
            .await;

        match fresh {
            Ok(snapshot) => {
                self.snapshot = snapshot.clone();
                Resync::Snapshot(snapshot)
            }
            Err(_) => self.drain_until_cancelled(),
        }
    }

    fn drain_until_cancelled(&mut self) -> Resync {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if event.reason == ChangeReason::Cancelled => {
                    return Resync::Cancelled(event);
                }
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty | TryRecvError::Closed) => return Resync::Gone,
            }
        }
    }

    /// Wait for the next event; `Lagged` means events were missed and the
    /// viewer should refetch a snapshot.
    pub async fn recv(&mut self) -> Result<StateChangeEvent, RecvError> {
        self.receiver.recv().await
    }
}

impl Drop for ViewerHandle {
    fn drop(&mut self) {
        self.rooms.unsubscribe(
            self.subscription.tournament_id,
            self.subscription.connection_id,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::clock::{ClockState, ControlOp, RunStatus, tests::two_levels};

    fn setup(sync_interval_secs: u32) -> (Arc<ClockRooms>, ClockStateStore) {
        setup_with_capacity(8, sync_interval_secs)
    }

    fn setup_with_capacity(
        capacity: usize,
        sync_interval_secs: u32,
    ) -> (Arc<ClockRooms>, ClockStateStore) {
        let rooms = Arc::new(ClockRooms::new(capacity, sync_interval_secs));
        let store = ClockStateStore::new(vec![rooms.clone() as Arc<dyn ClockObserver>]);
        (rooms, store)
    }

    async fn armed(store: &ClockStateStore) -> TournamentId {
        let levels = two_levels();
        let id = Uuid::new_v4();
        store
            .insert(ClockState::armed(id, &levels), levels, ChangeReason::Armed)
            .await;
        id
    }

    #[tokio::test]
    async fn subscribe_returns_current_snapshot() {
        let (rooms, store) = setup(0);
        let id = armed(&store).await;
        store.apply(id, ControlOp::Start).await.unwrap();

        let viewer = rooms.subscribe(&store, id).await.unwrap();
        assert_eq!(viewer.snapshot().state, store.get(id).await.unwrap());
        assert_eq!(rooms.viewers(id).len(), 1);
    }

    #[tokio::test]
    async fn subscribe_unknown_tournament_fails() {
        let (rooms, store) = setup(0);
        let id = Uuid::new_v4();
        assert!(matches!(
            rooms.subscribe(&store, id).await,
            Err(ClockError::NotFound(_))
        ));
        assert!(rooms.viewers(id).is_empty());
    }

    #[tokio::test]
    async fn events_reach_every_viewer() {
        let (rooms, store) = setup(0);
        let id = armed(&store).await;
        let mut first = rooms.subscribe(&store, id).await.unwrap();
        let mut second = rooms.subscribe(&store, id).await.unwrap();

        store.apply(id, ControlOp::Start).await.unwrap();

        for viewer in [&mut first, &mut second] {
            let event = viewer.recv().await.unwrap();
            assert_eq!(event.reason, ChangeReason::Started);
            assert_eq!(event.snapshot.state.time_remaining_seconds, 1200);
        }
    }

    #[tokio::test]
    async fn plain_ticks_are_not_broadcast_unless_sync_due() {
        let (rooms, store) = setup(10);
        let id = armed(&store).await;
        store.apply(id, ControlOp::Start).await.unwrap();
        let mut viewer = rooms.subscribe(&store, id).await.unwrap();

        for _ in 0..10 {
            store.tick(id, 1).await.unwrap();
        }

        let event = viewer.recv().await.unwrap();
        assert_eq!(event.reason, ChangeReason::Sync);
        assert_eq!(event.snapshot.state.time_remaining_seconds, 1190);
    }

    #[tokio::test]
    async fn dropping_viewer_leaves_room() {
        let (rooms, store) = setup(0);
        let id = armed(&store).await;
        let viewer = rooms.subscribe(&store, id).await.unwrap();
        drop(viewer);
        assert!(rooms.viewers(id).is_empty());

        store.apply(id, ControlOp::Start).await.unwrap();
        assert_eq!(
            rooms.publish(StateChangeEvent {
                snapshot: store.snapshot(id).await.unwrap(),
                reason: ChangeReason::Sync,
                emitted_at: SystemTime::now(),
            }),
            0
        );
    }

    #[tokio::test]
    async fn resubscribe_sees_latest_state() {
        let (rooms, store) = setup(0);
        let id = armed(&store).await;
        let viewer = rooms.subscribe(&store, id).await.unwrap();
        store.apply(id, ControlOp::Start).await.unwrap();
        drop(viewer);

        store.tick(id, 30).await.unwrap();
        store.apply(id, ControlOp::NextLevel).await.unwrap();

        let rejoined = rooms.subscribe(&store, id).await.unwrap();
        assert_eq!(rejoined.snapshot().state, store.get(id).await.unwrap());
        assert_eq!(rejoined.snapshot().state.current_level_index, 1);
    }

    #[tokio::test]
    async fn lagging_viewer_never_moves_backwards() {
        let (rooms, store) = setup_with_capacity(2, 1);
        let id = armed(&store).await;
        let mut viewer = rooms.subscribe(&store, id).await.unwrap();
        store.apply(id, ControlOp::Start).await.unwrap();
        for _ in 0..5 {
            store.tick(id, 1).await.unwrap();
        }

        assert!(matches!(viewer.recv().await, Err(RecvError::Lagged(_))));
        let Resync::Snapshot(snapshot) = viewer.resync(&store).await else {
            panic!("clock should still be live");
        };
        assert_eq!(snapshot.state.time_remaining_seconds, 1195);

        store.tick(id, 1).await.unwrap();
        let next = viewer.recv().await.unwrap();
        assert_eq!(next.reason, ChangeReason::Sync);
        assert_eq!(next.snapshot.state.time_remaining_seconds, 1194);
    }

    #[tokio::test]
    async fn lag_across_a_level_change_resumes_on_the_new_level() {
        let (rooms, store) = setup_with_capacity(1, 0);
        let id = armed(&store).await;
        let mut viewer = rooms.subscribe(&store, id).await.unwrap();
        store.apply(id, ControlOp::Start).await.unwrap();
        store.apply(id, ControlOp::NextLevel).await.unwrap();
        store.apply(id, ControlOp::Pause).await.unwrap();

        assert!(matches!(viewer.recv().await, Err(RecvError::Lagged(_))));
        let Resync::Snapshot(snapshot) = viewer.resync(&store).await else {
            panic!("clock should still be live");
        };
        assert_eq!(snapshot.state.current_level_index, 1);
        assert_eq!(viewer.snapshot().state, snapshot.state);

        store.apply(id, ControlOp::Resume).await.unwrap();
        let next = viewer.recv().await.unwrap();
        assert_eq!(next.reason, ChangeReason::Resumed);
        assert_eq!(next.snapshot.state.current_level_index, 1);
    }

    #[tokio::test]
    async fn resync_after_removal_finds_the_cancellation() {
        let (rooms, store) = setup_with_capacity(2, 0);
        let id = armed(&store).await;
        let mut viewer = rooms.subscribe(&store, id).await.unwrap();
        store.apply(id, ControlOp::Start).await.unwrap();
        store.apply(id, ControlOp::Pause).await.unwrap();
        store.remove(id).await.unwrap();

        let Resync::Cancelled(event) = viewer.resync(&store).await else {
            panic!("cancellation should be found in the backlog");
        };
        assert_eq!(event.snapshot.state.run_status, RunStatus::Finished);
        assert!(matches!(viewer.resync(&store).await, Resync::Gone));
    }
}
