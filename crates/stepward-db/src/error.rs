//! Database-specific error types and conversions.

use stepward_core::error::StepwardError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Certificate store at {url} unavailable ({stage}): {source}")]
    Unavailable {
        url: String,
        stage: &'static str,
        #[source]
        source: surrealdb::Error,
    },

    /// Schema step `version` (0 is the `_migration` bookkeeping table).
    #[error("Schema migration v{version} ({name}) failed: {message}")]
    Migration {
        version: u32,
        name: &'static str,
        message: String,
    },

    /// A statement reached the database and was rejected there, e.g. by a
    /// field assertion on the `certificate` table.
    #[error("{operation} rejected by the database: {message}")]
    Query {
        operation: &'static str,
        message: String,
    },

    #[error("Stored value could not be decoded: {0}")]
    Decode(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

impl From<DbError> for StepwardError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => StepwardError::NotFound { entity, id },
            other => StepwardError::Database(other.to_string()),
        }
    }
}
