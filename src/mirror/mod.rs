//! Client-side countdown mirror used by clock displays.
//!
//! A display keeps the last authoritative clock it received and counts down
//! locally once per second for smooth rendering. Every authoritative update
//! (event or snapshot) overwrites the local copy; local ticks never cross a
//! level boundary, the server's `LEVEL_ADVANCED` event does that.

use std::time::Duration;

use tokio::{
    sync::{mpsc, watch},
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::dto::clock::{BlindLevelDto, ChangeReasonDto, ClockEventDto, ClockStateView, RunStatusDto};

/// Locally rendered clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorClock {
    /// Tournament being displayed.
    pub tournament_id: Uuid,
    /// Level being played.
    pub current_level_index: u32,
    /// Locally decremented remaining time.
    pub time_remaining_seconds: u32,
    /// Mirrors the server's pause flag.
    pub is_paused: bool,
    /// Lifecycle status as last reported.
    pub run_status: RunStatusDto,
    /// Blinds of the current level.
    pub current_level: Option<BlindLevelDto>,
    /// Blinds of the upcoming level.
    pub next_level: Option<BlindLevelDto>,
    /// Reason of the last authoritative update, `None` for snapshots.
    pub last_reason: Option<ChangeReasonDto>,
}

impl MirrorClock {
    fn from_view(view: ClockStateView, reason: Option<ChangeReasonDto>) -> Self {
        Self {
            tournament_id: view.tournament_id,
            current_level_index: view.current_level_index,
            time_remaining_seconds: view.time_remaining_seconds,
            is_paused: view.is_paused,
            run_status: view.run_status,
            current_level: view.current_level,
            next_level: view.next_level,
            last_reason: reason,
        }
    }

    /// `MM:SS` rendering of the remaining time.
    pub fn remaining_label(&self) -> String {
        let minutes = self.time_remaining_seconds / 60;
        let seconds = self.time_remaining_seconds % 60;
        format!("{minutes:02}:{seconds:02}")
    }
}

/// Authoritative input to the mirror.
#[derive(Debug, Clone)]
pub enum MirrorUpdate {
    /// Snapshot fetched on (re)connect or pushed after lag.
    Snapshot(ClockStateView),
    /// State-changed notification.
    Event(ClockEventDto),
}

/// Difference between the local countdown and an authoritative update on the
/// same level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drift {
    /// Remaining time shown locally before the update.
    pub local_seconds: u32,
    /// Remaining time reported by the server.
    pub authoritative_seconds: u32,
}

impl Drift {
    /// Positive when the local countdown ran slower than the server.
    pub fn seconds(&self) -> i64 {
        i64::from(self.local_seconds) - i64::from(self.authoritative_seconds)
    }
}

/// Local copy of the last authoritative clock.
#[derive(Debug, Default)]
pub struct CountdownMirror {
    clock: Option<MirrorClock>,
}

impl CountdownMirror {
    /// Empty mirror; renders nothing until the first update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently rendered clock, if any update arrived yet.
    pub fn clock(&self) -> Option<&MirrorClock> {
        self.clock.as_ref()
    }

    /// Overwrite the local state with an authoritative one.
    ///
    /// Returns the drift that was corrected when the update is for the level
    /// already displayed and the remaining time differed.
    pub fn apply_authoritative(
        &mut self,
        view: ClockStateView,
        reason: Option<ChangeReasonDto>,
    ) -> Option<Drift> {
        let drift = self.clock.as_ref().and_then(|local| {
            let same_level = local.tournament_id == view.tournament_id
                && local.current_level_index == view.current_level_index;
            (same_level && local.time_remaining_seconds != view.time_remaining_seconds).then_some(
                Drift {
                    local_seconds: local.time_remaining_seconds,
                    authoritative_seconds: view.time_remaining_seconds,
                },
            )
        });
        self.clock = Some(MirrorClock::from_view(view, reason));
        drift
    }

    /// Apply a snapshot or an event.
    pub fn apply(&mut self, update: MirrorUpdate) -> Option<Drift> {
        match update {
            MirrorUpdate::Snapshot(view) => self.apply_authoritative(view, None),
            MirrorUpdate::Event(event) => self.apply_authoritative(event.clock, Some(event.reason)),
        }
    }

    /// One local second. Returns whether the rendered clock changed.
    pub fn tick_local(&mut self) -> bool {
        match self.clock.as_mut() {
            Some(clock)
                if clock.run_status == RunStatusDto::Running && clock.time_remaining_seconds > 0 =>
            {
                clock.time_remaining_seconds -= 1;
                true
            }
            _ => false,
        }
    }
}

/// Run a mirror until `updates` closes, publishing every rendered change.
///
/// The local cadence restarts on each authoritative update so the first local
/// decrement happens one full `tick` after the server's value was applied.
pub async fn drive(
    mut updates: mpsc::Receiver<MirrorUpdate>,
    display: watch::Sender<Option<MirrorClock>>,
    tick: Duration,
) {
    let mut mirror = CountdownMirror::new();
    let mut ticker = interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(update) = update else {
                    info!("mirror update channel closed");
                    break;
                };
                if let Some(drift) = mirror.apply(update) {
                    debug!(drift = drift.seconds(), "local countdown corrected");
                }
                ticker.reset();
                display.send_replace(mirror.clock().cloned());
            }
            _ = ticker.tick() => {
                if mirror.tick_local() {
                    display.send_replace(mirror.clock().cloned());
                }
            }
        }
    }
}
