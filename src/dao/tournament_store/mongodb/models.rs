use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::dao::models::{BlindLevelEntity, ClockStateEntity, RunStatusEntity, TournamentEntity};

// BSON has no unsigned integers: counters are stored as i64 and ids as strings.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct MongoLevelDocument {
    index: i64,
    small_blind: i64,
    big_blind: i64,
    ante: i64,
    duration_seconds: i64,
    is_pause: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct MongoTournamentDocument {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    organizer_id: String,
    #[serde(default)]
    staff_ids: Vec<String>,
    levels: Vec<MongoLevelDocument>,
    created_at: DateTime,
    updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct MongoClockDocument {
    #[serde(rename = "_id")]
    tournament_id: String,
    current_level_index: i64,
    time_remaining_seconds: i64,
    is_paused: bool,
    pub(super) run_status: RunStatusEntity,
    updated_at: DateTime,
}

pub(super) fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

fn parse_id(raw: &str) -> Result<Uuid, MongoDaoError> {
    Uuid::parse_str(raw).map_err(|err| MongoDaoError::Malformed {
        id: raw.to_owned(),
        reason: err.to_string(),
    })
}

fn non_negative<T: TryFrom<i64>>(owner: &str, field: &str, value: i64) -> Result<T, MongoDaoError> {
    T::try_from(value).map_err(|_| MongoDaoError::Malformed {
        id: owner.to_owned(),
        reason: format!("`{field}` out of range: {value}"),
    })
}

impl From<BlindLevelEntity> for MongoLevelDocument {
    fn from(value: BlindLevelEntity) -> Self {
        Self {
            index: i64::from(value.index),
            small_blind: value.small_blind as i64,
            big_blind: value.big_blind as i64,
            ante: value.ante as i64,
            duration_seconds: i64::from(value.duration_seconds),
            is_pause: value.is_pause,
        }
    }
}

impl MongoLevelDocument {
    fn into_entity(self, owner: &str) -> Result<BlindLevelEntity, MongoDaoError> {
        Ok(BlindLevelEntity {
            index: non_negative(owner, "index", self.index)?,
            small_blind: non_negative(owner, "small_blind", self.small_blind)?,
            big_blind: non_negative(owner, "big_blind", self.big_blind)?,
            ante: non_negative(owner, "ante", self.ante)?,
            duration_seconds: non_negative(owner, "duration_seconds", self.duration_seconds)?,
            is_pause: self.is_pause,
        })
    }
}

impl From<TournamentEntity> for MongoTournamentDocument {
    fn from(value: TournamentEntity) -> Self {
        Self {
            id: value.id.to_string(),
            name: value.name,
            organizer_id: value.organizer_id,
            staff_ids: value.staff_ids,
            levels: value.levels.into_iter().map(Into::into).collect(),
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoTournamentDocument> for TournamentEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoTournamentDocument) -> Result<Self, Self::Error> {
        let id = parse_id(&value.id)?;
        let levels = value
            .levels
            .into_iter()
            .map(|level| level.into_entity(&value.id))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            id,
            name: value.name,
            organizer_id: value.organizer_id,
            staff_ids: value.staff_ids,
            levels,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

impl From<ClockStateEntity> for MongoClockDocument {
    fn from(value: ClockStateEntity) -> Self {
        Self {
            tournament_id: value.tournament_id.to_string(),
            current_level_index: i64::from(value.current_level_index),
            time_remaining_seconds: i64::from(value.time_remaining_seconds),
            is_paused: value.is_paused,
            run_status: value.run_status,
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoClockDocument> for ClockStateEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoClockDocument) -> Result<Self, Self::Error> {
        let owner = value.tournament_id.as_str();
        Ok(Self {
            tournament_id: parse_id(owner)?,
            current_level_index: non_negative(owner, "current_level_index", value.current_level_index)?,
            time_remaining_seconds: non_negative(
                owner,
                "time_remaining_seconds",
                value.time_remaining_seconds,
            )?,
            is_paused: value.is_paused,
            run_status: value.run_status,
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

/// Filter matching clocks in `status`.
pub(super) fn status_filter(status: Option<RunStatusEntity>) -> Document {
    match status {
        Some(RunStatusEntity::NotStarted) => doc! {"run_status": "NOT_STARTED"},
        Some(RunStatusEntity::Running) => doc! {"run_status": "RUNNING"},
        Some(RunStatusEntity::Paused) => doc! {"run_status": "PAUSED"},
        Some(RunStatusEntity::Finished) => doc! {"run_status": "FINISHED"},
        None => doc! {},
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    #[test]
    fn negative_counters_are_rejected() {
        let id = Uuid::new_v4();
        let document = MongoClockDocument {
            tournament_id: id.to_string(),
            current_level_index: -1,
            time_remaining_seconds: 30,
            is_paused: false,
            run_status: RunStatusEntity::Running,
            updated_at: DateTime::from_system_time(SystemTime::now()),
        };
        assert!(matches!(
            ClockStateEntity::try_from(document),
            Err(MongoDaoError::Malformed { .. })
        ));
    }

    #[test]
    fn status_filter_uses_stored_names() {
        assert_eq!(
            status_filter(Some(RunStatusEntity::Running)),
            doc! {"run_status": "RUNNING"}
        );
        assert!(status_filter(None).is_empty());
    }
}
