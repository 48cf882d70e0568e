use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::format_system_time,
    state::clock::{BlindLevel, ChangeReason, ClockSnapshot, RunStatus, StateChangeEvent},
};

/// Blind level as shown to viewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlindLevelDto {
    pub index: u32,
    pub small_blind: u64,
    pub big_blind: u64,
    pub ante: u64,
    pub duration_seconds: u32,
    pub is_pause: bool,
}

impl From<&BlindLevel> for BlindLevelDto {
    fn from(level: &BlindLevel) -> Self {
        Self {
            index: level.index as u32,
            small_blind: level.small_blind,
            big_blind: level.big_blind,
            ante: level.ante,
            duration_seconds: level.duration_seconds,
            is_pause: level.is_pause,
        }
    }
}

/// Lifecycle status on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatusDto {
    NotStarted,
    Running,
    Paused,
    Finished,
}

impl From<RunStatus> for RunStatusDto {
    fn from(value: RunStatus) -> Self {
        match value {
            RunStatus::NotStarted => Self::NotStarted,
            RunStatus::Running => Self::Running,
            RunStatus::Paused => Self::Paused,
            RunStatus::Finished => Self::Finished,
        }
    }
}

impl From<RunStatusDto> for RunStatus {
    fn from(value: RunStatusDto) -> Self {
        match value {
            RunStatusDto::NotStarted => Self::NotStarted,
            RunStatusDto::Running => Self::Running,
            RunStatusDto::Paused => Self::Paused,
            RunStatusDto::Finished => Self::Finished,
        }
    }
}

/// Reason attached to a broadcast event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeReasonDto {
    Armed,
    Started,
    Paused,
    Resumed,
    ManualJump,
    Reset,
    LevelAdvanced,
    Finished,
    Sync,
    Restored,
    Cancelled,
}

impl From<ChangeReason> for ChangeReasonDto {
    fn from(value: ChangeReason) -> Self {
        match value {
            ChangeReason::Armed => Self::Armed,
            ChangeReason::Started => Self::Started,
            ChangeReason::Paused => Self::Paused,
            ChangeReason::Resumed => Self::Resumed,
            ChangeReason::ManualJump => Self::ManualJump,
            ChangeReason::Reset => Self::Reset,
            ChangeReason::LevelAdvanced => Self::LevelAdvanced,
            ChangeReason::Finished => Self::Finished,
            // Plain ticks only ever leave the store as sync heartbeats.
            ChangeReason::Tick | ChangeReason::Sync => Self::Sync,
            ChangeReason::Restored => Self::Restored,
            ChangeReason::Cancelled => Self::Cancelled,
        }
    }
}

/// Authoritative clock state as returned by the API and used as a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClockStateView {
    pub tournament_id: Uuid,
    pub current_level_index: u32,
    pub time_remaining_seconds: u32,
    pub is_paused: bool,
    pub run_status: RunStatusDto,
    /// Play time derived from the level table; display only.
    pub elapsed_seconds: u64,
    pub level_count: u32,
    #[serde(default)]
    pub current_level: Option<BlindLevelDto>,
    #[serde(default)]
    pub next_level: Option<BlindLevelDto>,
}

impl From<&ClockSnapshot> for ClockStateView {
    fn from(snapshot: &ClockSnapshot) -> Self {
        let state = &snapshot.state;
        Self {
            tournament_id: state.tournament_id,
            current_level_index: state.current_level_index as u32,
            time_remaining_seconds: state.time_remaining_seconds,
            is_paused: state.is_paused,
            run_status: state.run_status.into(),
            elapsed_seconds: snapshot.elapsed_seconds(),
            level_count: snapshot.levels.len() as u32,
            current_level: snapshot.current_level().map(Into::into),
            next_level: snapshot.next_level().map(Into::into),
        }
    }
}

/// State-changed notification pushed to viewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClockEventDto {
    #[serde(flatten)]
    pub clock: ClockStateView,
    pub reason: ChangeReasonDto,
    /// RFC 3339 commit time.
    pub emitted_at: String,
}

impl From<&StateChangeEvent> for ClockEventDto {
    fn from(event: &StateChangeEvent) -> Self {
        Self {
            clock: (&event.snapshot).into(),
            reason: event.reason.into(),
            emitted_at: format_system_time(event.emitted_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use serde_json::json;

    use super::*;
    use crate::state::clock::{ClockState, tests::two_levels};

    #[test]
    fn event_payload_is_flat_camel_case() {
        let levels = two_levels();
        let id = Uuid::new_v4();
        let event = StateChangeEvent {
            snapshot: ClockSnapshot {
                state: ClockState::armed(id, &levels),
                levels,
            },
            reason: ChangeReason::Armed,
            emitted_at: SystemTime::UNIX_EPOCH,
        };

        let value = serde_json::to_value(ClockEventDto::from(&event)).unwrap();
        assert_eq!(value["tournamentId"], json!(id));
        assert_eq!(value["currentLevelIndex"], 0);
        assert_eq!(value["timeRemainingSeconds"], 1200);
        assert_eq!(value["isPaused"], false);
        assert_eq!(value["runStatus"], "NOT_STARTED");
        assert_eq!(value["reason"], "ARMED");
        assert_eq!(value["emittedAt"], "1970-01-01T00:00:00Z");
        assert_eq!(value["nextLevel"]["bigBlind"], 100);
    }

    #[test]
    fn ticks_are_reported_as_sync() {
        assert_eq!(ChangeReasonDto::from(ChangeReason::Tick), ChangeReasonDto::Sync);
    }
}
