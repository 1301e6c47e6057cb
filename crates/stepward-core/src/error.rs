//! Error types for the stepward system.

use thiserror::Error;

/// Why certificate material could not be turned into an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailure {
    /// The PEM envelope itself could not be decoded.
    Malformed,
    /// The envelope decoded but serial or expiry could not be recovered.
    Unparseable,
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseFailure::Malformed => f.write_str("malformed"),
            ParseFailure::Unparseable => f.write_str("unparseable"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StepwardError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("CA operation '{operation}' failed (exit code {exit_code:?}): {output}")]
    CertificateAuthority {
        operation: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("CA operation '{operation}' timed out after {timeout_secs}s")]
    Timeout {
        operation: String,
        timeout_secs: u64,
    },

    #[error("Certificate material is {kind}: {message}")]
    Parse { kind: ParseFailure, message: String },

    #[error("Bundle assembly failed: {0}")]
    Assemble(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StepwardError {
    pub fn validation(message: impl Into<String>) -> Self {
        StepwardError::Validation {
            message: message.into(),
        }
    }

    /// HTTP status code the transport layer reports for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            StepwardError::Validation { .. } => 400,
            StepwardError::NotFound { .. } => 404,
            _ => 500,
        }
    }
}

pub type StepwardResult<T> = Result<T, StepwardError>;
