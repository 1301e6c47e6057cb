//! PKI error types.

use stepward_core::error::{ParseFailure, StepwardError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PkiError {
    /// Rejected before anything was handed to an external tool.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{operation}: failed to start {program}: {source}")]
    Spawn {
        operation: &'static str,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation}: {program} exited with code {exit_code:?}: {output}")]
    CommandFailed {
        operation: &'static str,
        program: String,
        exit_code: Option<i32>,
        /// Combined stdout and stderr, credentials redacted.
        output: String,
    },

    #[error("{operation}: {program} did not finish within {timeout_secs}s")]
    CommandTimeout {
        operation: &'static str,
        program: String,
        timeout_secs: u64,
    },

    #[error("{operation}: unexpected output: {message}")]
    UnexpectedOutput {
        operation: &'static str,
        message: String,
    },

    #[error("scratch workspace: {0}")]
    Workspace(#[from] std::io::Error),

    #[error("malformed certificate: {0}")]
    Malformed(String),

    #[error("unparseable certificate: {0}")]
    Unparseable(String),

    #[error("archive: {0}")]
    Archive(String),

    #[error("PKCS#12 packaging failed: {0}")]
    Pkcs12(String),
}

impl From<zip::result::ZipError> for PkiError {
    fn from(err: zip::result::ZipError) -> Self {
        PkiError::Archive(err.to_string())
    }
}

impl From<PkiError> for StepwardError {
    fn from(err: PkiError) -> Self {
        match err {
            PkiError::InvalidInput(message) => StepwardError::Validation { message },
            PkiError::Spawn {
                operation,
                program,
                source,
            } => StepwardError::CertificateAuthority {
                operation: operation.to_string(),
                exit_code: None,
                output: format!("failed to start {program}: {source}"),
            },
            PkiError::CommandFailed {
                operation,
                exit_code,
                output,
                ..
            } => StepwardError::CertificateAuthority {
                operation: operation.to_string(),
                exit_code,
                output,
            },
            PkiError::CommandTimeout {
                operation,
                timeout_secs,
                ..
            } => StepwardError::Timeout {
                operation: operation.to_string(),
                timeout_secs,
            },
            PkiError::UnexpectedOutput { operation, message } => {
                StepwardError::CertificateAuthority {
                    operation: operation.to_string(),
                    exit_code: Some(0),
                    output: message,
                }
            }
            PkiError::Workspace(err) => StepwardError::Internal(format!("scratch workspace: {err}")),
            PkiError::Malformed(message) => StepwardError::Parse {
                kind: ParseFailure::Malformed,
                message,
            },
            PkiError::Unparseable(message) => StepwardError::Parse {
                kind: ParseFailure::Unparseable,
                message,
            },
            PkiError::Archive(message) | PkiError::Pkcs12(message) => {
                StepwardError::Assemble(message)
            }
        }
    }
}
