use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::clock::{BlindLevel, ClockState, LevelTable, RunStatus};

/// Blind level as stored alongside its tournament.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlindLevelEntity {
    /// Position of the level in the table.
    pub index: u32,
    /// Small blind.
    pub small_blind: u64,
    /// Big blind.
    pub big_blind: u64,
    /// Ante.
    pub ante: u64,
    /// Level length in seconds.
    pub duration_seconds: u32,
    /// Whether the level is a break.
    pub is_pause: bool,
}

/// Tournament record: access roster and the configured level table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TournamentEntity {
    /// Primary key of the tournament.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// User id of the organizer.
    pub organizer_id: String,
    /// User ids of the owning club's staff.
    pub staff_ids: Vec<String>,
    /// Ordered blind levels.
    pub levels: Vec<BlindLevelEntity>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last update timestamp.
    pub updated_at: SystemTime,
}

/// Persisted lifecycle status of a clock.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatusEntity {
    /// Armed, not started.
    NotStarted,
    /// Counting down.
    Running,
    /// Paused.
    Paused,
    /// Finished.
    Finished,
}

/// Persisted clock record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClockStateEntity {
    /// Owning tournament.
    pub tournament_id: Uuid,
    /// Index of the level being played.
    pub current_level_index: u32,
    /// Seconds left in the current level.
    pub time_remaining_seconds: u32,
    /// Paused flag.
    pub is_paused: bool,
    /// Lifecycle status.
    pub run_status: RunStatusEntity,
    /// Last time the record was written.
    pub updated_at: SystemTime,
}

impl From<BlindLevel> for BlindLevelEntity {
    fn from(value: BlindLevel) -> Self {
        Self {
            index: value.index as u32,
            small_blind: value.small_blind,
            big_blind: value.big_blind,
            ante: value.ante,
            duration_seconds: value.duration_seconds,
            is_pause: value.is_pause,
        }
    }
}

impl From<BlindLevelEntity> for BlindLevel {
    fn from(value: BlindLevelEntity) -> Self {
        Self {
            index: value.index as usize,
            small_blind: value.small_blind,
            big_blind: value.big_blind,
            ante: value.ante,
            duration_seconds: value.duration_seconds,
            is_pause: value.is_pause,
        }
    }
}

impl TournamentEntity {
    /// Whether `user_id` is the organizer or a staff member.
    pub fn is_roster_member(&self, user_id: &str) -> bool {
        self.organizer_id == user_id || self.staff_ids.iter().any(|staff| staff == user_id)
    }
}

impl From<RunStatus> for RunStatusEntity {
    fn from(value: RunStatus) -> Self {
        match value {
            RunStatus::NotStarted => RunStatusEntity::NotStarted,
            RunStatus::Running => RunStatusEntity::Running,
            RunStatus::Paused => RunStatusEntity::Paused,
            RunStatus::Finished => RunStatusEntity::Finished,
        }
    }
}

impl From<RunStatusEntity> for RunStatus {
    fn from(value: RunStatusEntity) -> Self {
        match value {
            RunStatusEntity::NotStarted => RunStatus::NotStarted,
            RunStatusEntity::Running => RunStatus::Running,
            RunStatusEntity::Paused => RunStatus::Paused,
            RunStatusEntity::Finished => RunStatus::Finished,
        }
    }
}

impl From<ClockState> for ClockStateEntity {
    fn from(value: ClockState) -> Self {
        Self {
            tournament_id: value.tournament_id,
            current_level_index: value.current_level_index as u32,
            time_remaining_seconds: value.time_remaining_seconds,
            is_paused: value.is_paused,
            run_status: value.run_status.into(),
            updated_at: SystemTime::now(),
        }
    }
}

impl ClockStateEntity {
    /// Rebuild the live state, clamping stored values into the level table so a
    /// table edited behind our back cannot produce an impossible clock.
    pub fn into_state(self, levels: &LevelTable) -> ClockState {
        let last_index = levels.len().saturating_sub(1);
        let index = (self.current_level_index as usize).min(last_index);
        let remaining = self.time_remaining_seconds.min(levels.duration(index));
        let run_status: RunStatus = self.run_status.into();
        ClockState {
            tournament_id: self.tournament_id,
            current_level_index: index,
            time_remaining_seconds: remaining,
            is_paused: run_status == RunStatus::Paused,
            run_status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::clock::tests::two_levels;

    #[test]
    fn stored_clock_is_clamped_into_table() {
        let levels = two_levels();
        let entity = ClockStateEntity {
            tournament_id: Uuid::new_v4(),
            current_level_index: 7,
            time_remaining_seconds: 99_999,
            is_paused: false,
            run_status: RunStatusEntity::Paused,
            updated_at: SystemTime::now(),
        };
        let state = entity.into_state(&levels);
        assert_eq!(state.current_level_index, 1);
        assert_eq!(state.time_remaining_seconds, 1200);
        assert!(state.is_paused);
        assert!(state.is_consistent(&levels));
    }

    #[test]
    fn roster_membership() {
        let tournament = TournamentEntity {
            id: Uuid::new_v4(),
            name: "Friday Deepstack".into(),
            organizer_id: "org-1".into(),
            staff_ids: vec!["dealer-2".into()],
            levels: vec![],
            created_at: SystemTime::now(),
            updated_at: SystemTime::now(),
        };
        assert!(tournament.is_roster_member("org-1"));
        assert!(tournament.is_roster_member("dealer-2"));
        assert!(!tournament.is_roster_member("player-3"));
    }
}
