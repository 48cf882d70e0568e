use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::CouchDaoError;
use crate::dao::models::{BlindLevelEntity, ClockStateEntity, RunStatusEntity, TournamentEntity};

pub const TOURNAMENT_PREFIX: &str = "tournament::";
pub const CLOCK_PREFIX: &str = "clock::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Minimal view used to fetch the current revision of any document.
#[derive(Debug, Deserialize)]
pub struct RevisionOnly {
    #[serde(rename = "_rev")]
    pub rev: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchTournamentDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub tournament: TournamentBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TournamentBody {
    pub name: String,
    pub organizer_id: String,
    #[serde(default)]
    pub staff_ids: Vec<String>,
    pub levels: Vec<BlindLevelEntity>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchClockDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub clock: ClockBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockBody {
    pub current_level_index: u32,
    pub time_remaining_seconds: u32,
    pub is_paused: bool,
    pub run_status: RunStatusEntity,
    pub updated_at: SystemTime,
}

pub fn tournament_doc_id(id: Uuid) -> String {
    format!("{TOURNAMENT_PREFIX}{id}")
}

pub fn clock_doc_id(id: Uuid) -> String {
    format!("{CLOCK_PREFIX}{id}")
}

fn parse_doc_id(doc_id: &str, prefix: &str) -> Result<Uuid, CouchDaoError> {
    doc_id
        .strip_prefix(prefix)
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| CouchDaoError::InvalidDocId {
            doc_id: doc_id.to_owned(),
        })
}

impl CouchTournamentDocument {
    pub fn from_entity(entity: TournamentEntity) -> Self {
        Self {
            id: tournament_doc_id(entity.id),
            rev: None,
            tournament: TournamentBody {
                name: entity.name,
                organizer_id: entity.organizer_id,
                staff_ids: entity.staff_ids,
                levels: entity.levels,
                created_at: entity.created_at,
                updated_at: entity.updated_at,
            },
        }
    }

    pub fn into_entity(self) -> Result<TournamentEntity, CouchDaoError> {
        let id = parse_doc_id(&self.id, TOURNAMENT_PREFIX)?;
        let body = self.tournament;
        Ok(TournamentEntity {
            id,
            name: body.name,
            organizer_id: body.organizer_id,
            staff_ids: body.staff_ids,
            levels: body.levels,
            created_at: body.created_at,
            updated_at: body.updated_at,
        })
    }
}

impl CouchClockDocument {
    pub fn from_entity(entity: ClockStateEntity) -> Self {
        Self {
            id: clock_doc_id(entity.tournament_id),
            rev: None,
            clock: ClockBody {
                current_level_index: entity.current_level_index,
                time_remaining_seconds: entity.time_remaining_seconds,
                is_paused: entity.is_paused,
                run_status: entity.run_status,
                updated_at: entity.updated_at,
            },
        }
    }

    pub fn into_entity(self) -> Result<ClockStateEntity, CouchDaoError> {
        let tournament_id = parse_doc_id(&self.id, CLOCK_PREFIX)?;
        let body = self.clock;
        Ok(ClockStateEntity {
            tournament_id,
            current_level_index: body.current_level_index,
            time_remaining_seconds: body.time_remaining_seconds,
            is_paused: body.is_paused,
            run_status: body.run_status,
            updated_at: body.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_document_keeps_couch_metadata_at_top_level() {
        let id = Uuid::new_v4();
        let document = CouchClockDocument::from_entity(ClockStateEntity {
            tournament_id: id,
            current_level_index: 2,
            time_remaining_seconds: 75,
            is_paused: true,
            run_status: RunStatusEntity::Paused,
            updated_at: SystemTime::now(),
        });
        let json = serde_json::to_value(&document).unwrap();
        assert_eq!(json["_id"], format!("clock::{id}"));
        assert!(json.get("_rev").is_none());
        assert_eq!(json["run_status"], "PAUSED");

        let entity = document.into_entity().unwrap();
        assert_eq!(entity.tournament_id, id);
        assert_eq!(entity.time_remaining_seconds, 75);
    }

    #[test]
    fn foreign_document_ids_are_rejected() {
        let mut document = CouchClockDocument::from_entity(ClockStateEntity {
            tournament_id: Uuid::new_v4(),
            current_level_index: 0,
            time_remaining_seconds: 10,
            is_paused: false,
            run_status: RunStatusEntity::Running,
            updated_at: SystemTime::now(),
        });
        document.id = "tournament::not-a-uuid".into();
        assert!(matches!(
            document.into_entity(),
            Err(CouchDaoError::InvalidDocId { .. })
        ));
    }
}
