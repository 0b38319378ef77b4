use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("database query failed: {0}")]
    Query(String),

    #[error("database migration failed: {0}")]
    Migration(String),

    #[error("stored value could not be decoded: {0}")]
    Decode(String),
}
