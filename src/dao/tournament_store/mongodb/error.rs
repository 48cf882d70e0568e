use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures of the MongoDB backend.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save tournament `{id}`")]
    SaveTournament {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load tournament `{id}`")]
    LoadTournament {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to save clock of tournament `{id}`")]
    SaveClock {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load clock of tournament `{id}`")]
    LoadClock {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to delete clock of tournament `{id}`")]
    DeleteClock {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to list clocks")]
    ListClocks {
        #[source]
        source: MongoError,
    },
    #[error("stored document `{id}` is malformed: {reason}")]
    Malformed { id: String, reason: String },
}
