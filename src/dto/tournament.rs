use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{BlindLevelEntity, TournamentEntity},
    dto::{clock::BlindLevelDto, format_system_time, validation::validate_blind_order},
    state::clock::BlindLevel,
};

/// Tournament definition submitted by the organizer.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TournamentRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(min = 1))]
    pub organizer_id: String,
    #[serde(default)]
    pub staff_ids: Vec<String>,
    /// Blind structure; indices must be 0..n once sorted.
    #[validate(length(min = 1), nested)]
    pub levels: Vec<BlindLevelInput>,
}

/// One level of a submitted blind structure.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_blind_order"))]
pub struct BlindLevelInput {
    pub index: u32,
    pub small_blind: u64,
    pub big_blind: u64,
    #[serde(default)]
    pub ante: u64,
    #[validate(range(min = 1))]
    pub duration_seconds: u32,
    #[serde(default)]
    pub is_pause: bool,
}

impl From<BlindLevelInput> for BlindLevelEntity {
    fn from(value: BlindLevelInput) -> Self {
        Self {
            index: value.index,
            small_blind: value.small_blind,
            big_blind: value.big_blind,
            ante: value.ante,
            duration_seconds: value.duration_seconds,
            is_pause: value.is_pause,
        }
    }
}

/// Tournament as returned after setup.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TournamentSummary {
    pub id: Uuid,
    pub name: String,
    pub organizer_id: String,
    pub staff_ids: Vec<String>,
    pub levels: Vec<BlindLevelDto>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&TournamentEntity> for TournamentSummary {
    fn from(entity: &TournamentEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name.clone(),
            organizer_id: entity.organizer_id.clone(),
            staff_ids: entity.staff_ids.clone(),
            levels: entity
                .levels
                .iter()
                .cloned()
                .map(|level| BlindLevelDto::from(&BlindLevel::from(level)))
                .collect(),
            created_at: format_system_time(entity.created_at),
            updated_at: format_system_time(entity.updated_at),
        }
    }
}
