/// Database model definitions.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
/// Tournament and clock persistence backends.
pub mod tournament_store;
