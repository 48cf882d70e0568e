//! Clock domain model: blind levels, the authoritative per-tournament clock
//! state and the pure transitions applied to it by control operations and by
//! the passage of time.

use std::{fmt, sync::Arc, time::SystemTime};

use thiserror::Error;
use uuid::Uuid;

/// Identifier of a tournament (and of its clock).
pub type TournamentId = Uuid;

/// A configured stage of a tournament.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlindLevel {
    /// Position of the level in the table (0-based, contiguous).
    pub index: usize,
    /// Small blind for the level.
    pub small_blind: u64,
    /// Big blind for the level.
    pub big_blind: u64,
    /// Ante paid by every player during the level.
    pub ante: u64,
    /// Length of the level in clock seconds.
    pub duration_seconds: u32,
    /// Whether the level is a break (blinds frozen).
    pub is_pause: bool,
}

/// Reasons a level table is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LevelTableError {
    /// The table has no level at all.
    #[error("level table must contain at least one level")]
    Empty,
    /// A level index does not match its position.
    #[error("level at position {position} has index {index}")]
    NonContiguous {
        /// Position of the offending level in the table.
        position: usize,
        /// Index carried by the level.
        index: usize,
    },
    /// A level has a zero duration.
    #[error("level {index} must last at least one second")]
    ZeroDuration {
        /// Index of the offending level.
        index: usize,
    },
    /// The big blind does not exceed the small blind.
    #[error("level {index}: big blind {big_blind} must exceed small blind {small_blind}")]
    BlindOrder {
        /// Index of the offending level.
        index: usize,
        /// Configured small blind.
        small_blind: u64,
        /// Configured big blind.
        big_blind: u64,
    },
}

/// Ordered, immutable sequence of blind levels shared by a running clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelTable {
    levels: Arc<[BlindLevel]>,
}

impl LevelTable {
    /// Validate and freeze a level table.
    pub fn new(levels: Vec<BlindLevel>) -> Result<Self, LevelTableError> {
        if levels.is_empty() {
            return Err(LevelTableError::Empty);
        }

        for (position, level) in levels.iter().enumerate() {
            if level.index != position {
                return Err(LevelTableError::NonContiguous {
                    position,
                    index: level.index,
                });
            }
            if level.duration_seconds == 0 {
                return Err(LevelTableError::ZeroDuration { index: position });
            }
            let both_zero = level.small_blind == 0 && level.big_blind == 0;
            if !both_zero && level.big_blind <= level.small_blind {
                return Err(LevelTableError::BlindOrder {
                    index: position,
                    small_blind: level.small_blind,
                    big_blind: level.big_blind,
                });
            }
        }

        Ok(Self {
            levels: levels.into(),
        })
    }

    /// Number of levels in the table (never zero).
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Whether the table has no level; never true for a validated table.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Level at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&BlindLevel> {
        self.levels.get(index)
    }

    /// Duration of the level at `index`, or zero when out of range.
    pub fn duration(&self, index: usize) -> u32 {
        self.get(index).map_or(0, |level| level.duration_seconds)
    }

    /// Iterate over the levels in order.
    pub fn iter(&self) -> impl Iterator<Item = &BlindLevel> {
        self.levels.iter()
    }
}

/// Coarse lifecycle of a tournament clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    /// Armed but the organizer has not started the clock yet.
    NotStarted,
    /// Counting down.
    Running,
    /// Halted by a control operation; remaining time is preserved.
    Paused,
    /// The last level elapsed (or the clock was cancelled). Terminal.
    Finished,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunStatus::NotStarted => "not started",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Finished => "finished",
        };
        f.write_str(label)
    }
}

/// Out-of-band operations an authorized actor can apply to a clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlOp {
    /// Start counting from the first level.
    Start,
    /// Halt the countdown.
    Pause,
    /// Continue a paused countdown.
    Resume,
    /// Jump to the next level.
    NextLevel,
    /// Jump back to the previous level.
    PreviousLevel,
    /// Restore the full duration of the current level.
    ResetLevel,
}

impl ControlOp {
    /// Stable identifier used in routes, audit records and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlOp::Start => "start",
            ControlOp::Pause => "pause",
            ControlOp::Resume => "resume",
            ControlOp::NextLevel => "next_level",
            ControlOp::PreviousLevel => "previous_level",
            ControlOp::ResetLevel => "reset_level",
        }
    }
}

impl fmt::Display for ControlOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a clock state changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeReason {
    /// Clock created from the level table.
    Armed,
    /// Start control operation.
    Started,
    /// Pause control operation.
    Paused,
    /// Resume control operation.
    Resumed,
    /// Next/previous level control operation.
    ManualJump,
    /// Reset level control operation.
    Reset,
    /// The current level elapsed and the next one began.
    LevelAdvanced,
    /// The last level elapsed.
    Finished,
    /// Plain countdown tick; persisted but not broadcast.
    Tick,
    /// Periodic resynchronisation broadcast of a running clock.
    Sync,
    /// Clock reloaded from persistence after a restart.
    Restored,
    /// Clock removed before reaching the end of the table.
    Cancelled,
}

impl ChangeReason {
    /// Reasons after which a running clock starts a fresh one-second cadence.
    pub fn rebases_timer(&self) -> bool {
        matches!(
            self,
            ChangeReason::Started
                | ChangeReason::Resumed
                | ChangeReason::ManualJump
                | ChangeReason::Reset
                | ChangeReason::Restored
        )
    }
}

/// Error returned when a control operation's precondition does not hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {operation} cannot be applied while {from} at level {level_index}")]
pub struct InvalidTransition {
    /// Run status when the operation was attempted.
    pub from: RunStatus,
    /// Level index when the operation was attempted.
    pub level_index: usize,
    /// The rejected operation.
    pub operation: ControlOp,
}

/// Errors surfaced by the clock state store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClockError {
    /// No clock exists for the tournament.
    #[error("no clock for tournament `{0}`")]
    NotFound(TournamentId),
    /// The operation's precondition is false.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

/// Authoritative clock record of a tournament.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockState {
    /// Owning tournament.
    pub tournament_id: TournamentId,
    /// Index of the level being played.
    pub current_level_index: usize,
    /// Clock seconds left in the current level.
    pub time_remaining_seconds: u32,
    /// Mirrors `run_status == Paused`.
    pub is_paused: bool,
    /// Lifecycle status.
    pub run_status: RunStatus,
}

impl ClockState {
    /// Fresh clock positioned at the first level, waiting for Start.
    pub fn armed(tournament_id: TournamentId, levels: &LevelTable) -> Self {
        Self {
            tournament_id,
            current_level_index: 0,
            time_remaining_seconds: levels.duration(0),
            is_paused: false,
            run_status: RunStatus::NotStarted,
        }
    }

    /// Compute the state produced by a control operation.
    ///
    /// `self` is never modified; on error the caller keeps the current state
    /// untouched.
    pub fn apply(
        &self,
        operation: ControlOp,
        levels: &LevelTable,
    ) -> Result<(ClockState, ChangeReason), InvalidTransition> {
        let invalid = || InvalidTransition {
            from: self.run_status,
            level_index: self.current_level_index,
            operation,
        };

        if self.run_status == RunStatus::Finished {
            return Err(invalid());
        }

        let mut next = self.clone();
        let reason = match operation {
            ControlOp::Start => {
                let unstarted_pause = self.run_status == RunStatus::Paused
                    && self.current_level_index == 0
                    && self.time_remaining_seconds == levels.duration(0);
                match self.run_status {
                    RunStatus::NotStarted => {
                        next.current_level_index = 0;
                        next.time_remaining_seconds = levels.duration(0);
                    }
                    RunStatus::Paused if unstarted_pause => {}
                    _ => return Err(invalid()),
                }
                next.run_status = RunStatus::Running;
                next.is_paused = false;
                ChangeReason::Started
            }
            ControlOp::Pause => {
                if self.run_status != RunStatus::Running {
                    return Err(invalid());
                }
                next.run_status = RunStatus::Paused;
                next.is_paused = true;
                ChangeReason::Paused
            }
            ControlOp::Resume => {
                if self.run_status != RunStatus::Paused {
                    return Err(invalid());
                }
                next.run_status = RunStatus::Running;
                next.is_paused = false;
                ChangeReason::Resumed
            }
            ControlOp::NextLevel => {
                let target = self.current_level_index + 1;
                if target >= levels.len() {
                    return Err(invalid());
                }
                next.current_level_index = target;
                next.time_remaining_seconds = levels.duration(target);
                ChangeReason::ManualJump
            }
            ControlOp::PreviousLevel => {
                let Some(target) = self.current_level_index.checked_sub(1) else {
                    return Err(invalid());
                };
                next.current_level_index = target;
                next.time_remaining_seconds = levels.duration(target);
                ChangeReason::ManualJump
            }
            ControlOp::ResetLevel => {
                next.time_remaining_seconds = levels.duration(self.current_level_index);
                ChangeReason::Reset
            }
        };

        Ok((next, reason))
    }

    /// Let `seconds` of clock time pass on a running clock.
    ///
    /// Returns `None` when the clock is not running. Expired levels roll over
    /// into the next one; expiring the last level finishes the clock.
    pub fn elapse(&self, seconds: u32, levels: &LevelTable) -> Option<(ClockState, ChangeReason)> {
        if self.run_status != RunStatus::Running {
            return None;
        }

        let mut next = self.clone();
        let mut left = seconds;
        let mut advanced = false;

        loop {
            if left < next.time_remaining_seconds {
                next.time_remaining_seconds -= left;
                break;
            }

            left -= next.time_remaining_seconds;
            let target = next.current_level_index + 1;
            if target >= levels.len() {
                next.time_remaining_seconds = 0;
                next.run_status = RunStatus::Finished;
                next.is_paused = false;
                return Some((next, ChangeReason::Finished));
            }

            next.current_level_index = target;
            next.time_remaining_seconds = levels.duration(target);
            advanced = true;
            if left == 0 {
                break;
            }
        }

        let reason = if advanced {
            ChangeReason::LevelAdvanced
        } else {
            ChangeReason::Tick
        };
        Some((next, reason))
    }

    /// Clock seconds played so far, derived from the level table.
    ///
    /// Display-only: it is computed from the authoritative index and remaining
    /// time, never from wall-clock time.
    pub fn elapsed_seconds(&self, levels: &LevelTable) -> u64 {
        let completed: u64 = levels
            .iter()
            .take(self.current_level_index)
            .map(|level| u64::from(level.duration_seconds))
            .sum();
        let current = levels
            .duration(self.current_level_index)
            .saturating_sub(self.time_remaining_seconds);
        completed + u64::from(current)
    }

    /// Check the structural invariants against the level table.
    pub fn is_consistent(&self, levels: &LevelTable) -> bool {
        let index_ok = self.current_level_index < levels.len();
        let time_ok = self.time_remaining_seconds <= levels.duration(self.current_level_index);
        let pause_ok = (self.run_status == RunStatus::Paused) == self.is_paused;
        index_ok && time_ok && pause_ok
    }
}

/// A clock state together with the level table it runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockSnapshot {
    /// Authoritative state.
    pub state: ClockState,
    /// Level table of the tournament.
    pub levels: LevelTable,
}

impl ClockSnapshot {
    /// Level currently being played.
    pub fn current_level(&self) -> Option<&BlindLevel> {
        self.levels.get(self.state.current_level_index)
    }

    /// Level that follows the current one, if any.
    pub fn next_level(&self) -> Option<&BlindLevel> {
        self.levels.get(self.state.current_level_index + 1)
    }

    /// Derived play time, see [`ClockState::elapsed_seconds`].
    pub fn elapsed_seconds(&self) -> u64 {
        self.state.elapsed_seconds(&self.levels)
    }
}

/// Broadcast payload: the state right after a change, tagged with its reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChangeEvent {
    /// Snapshot at the instant of change.
    pub snapshot: ClockSnapshot,
    /// Why the state changed.
    pub reason: ChangeReason,
    /// When the change was committed.
    pub emitted_at: SystemTime,
}
