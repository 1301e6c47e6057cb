//! Audit trail domain model.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StepwardError;

/// Lifecycle transition recorded by an [`AuditEvent`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Issued,
    SignedCsr,
    Renewed,
    Revoked,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Issued => "issued",
            AuditAction::SignedCsr => "signed_csr",
            AuditAction::Renewed => "renewed",
            AuditAction::Revoked => "revoked",
        }
    }
}

impl FromStr for AuditAction {
    type Err = StepwardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issued" => Ok(AuditAction::Issued),
            "signed_csr" => Ok(AuditAction::SignedCsr),
            "renewed" => Ok(AuditAction::Renewed),
            "revoked" => Ok(AuditAction::Revoked),
            other => Err(StepwardError::validation(format!(
                "unknown audit action: {other}"
            ))),
        }
    }
}

/// An append-only fact about a certificate. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub cert_id: Uuid,
    pub who: String,
    pub action: AuditAction,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAuditEvent {
    pub cert_id: Uuid,
    pub who: String,
    pub action: AuditAction,
    pub details: String,
}
