//! Certificate domain models.
//!
//! A [`Certificate`] is the metadata record for one leaf certificate
//! obtained from the external CA. Key material is never part of the
//! record; the private key (for server-side issuance) is delivered once
//! inside the download bundle and then discarded.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StepwardError;

/// Status of a certificate in its lifecycle.
///
/// `Revoked` is the only terminal state; an expired certificate can still
/// be renewed back to `Active`. `Expired` is advisory: no
/// writer asserts it, readers derive it with
/// [`Certificate::effective_status`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    Active,
    Revoked,
    Expired,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Active => "active",
            CertificateStatus::Revoked => "revoked",
            CertificateStatus::Expired => "expired",
        }
    }

    /// Whether the CA can no longer be asked to reissue for this record.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CertificateStatus::Revoked)
    }
}

impl FromStr for CertificateStatus {
    type Err = StepwardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CertificateStatus::Active),
            "revoked" => Ok(CertificateStatus::Revoked),
            "expired" => Ok(CertificateStatus::Expired),
            other => Err(StepwardError::validation(format!(
                "unknown certificate status: {other}"
            ))),
        }
    }
}

/// Where the private key behind a certificate came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyStrategy {
    /// Key generated by the CA agent on behalf of the caller.
    Server,
    /// Caller supplied a CSR over a key they hold; no key is ever seen.
    Csr,
}

impl KeyStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStrategy::Server => "server",
            KeyStrategy::Csr => "csr",
        }
    }
}

impl FromStr for KeyStrategy {
    type Err = StepwardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server" => Ok(KeyStrategy::Server),
            "csr" => Ok(KeyStrategy::Csr),
            other => Err(StepwardError::validation(format!(
                "unknown key strategy: {other}"
            ))),
        }
    }
}

/// Whether key material outlives the response that delivered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageRef {
    /// Not retained beyond the response.
    Ephemeral,
    /// Retained at an external location (e.g. a file path or vault key).
    #[serde(untagged)]
    External(String),
}

impl StorageRef {
    pub fn as_str(&self) -> &str {
        match self {
            StorageRef::Ephemeral => "ephemeral",
            StorageRef::External(location) => location,
        }
    }

    pub fn from_stored(value: &str) -> Self {
        match value {
            "ephemeral" => StorageRef::Ephemeral,
            other => StorageRef::External(other.to_string()),
        }
    }
}

/// Metadata record of one CA-issued certificate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Certificate {
    pub id: Uuid,
    /// Subject common name.
    pub cn: String,
    /// Subject alternative names, in the order they were requested.
    pub sans: Vec<String>,
    /// CA serial number exactly as reported by the inspection tool.
    pub serial: Option<String>,
    /// Expiry recovered from the issued certificate.
    pub not_after: DateTime<Utc>,
    pub status: CertificateStatus,
    pub key_strategy: KeyStrategy,
    pub storage_ref: StorageRef,
    pub owner_user: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Certificate {
    /// Status as a reader should present it at `now`.
    ///
    /// An active certificate whose validity has lapsed reads as
    /// `Expired`; revocation always wins.
    pub fn effective_status(&self, now: DateTime<Utc>) -> CertificateStatus {
        match self.status {
            CertificateStatus::Active if now > self.not_after => CertificateStatus::Expired,
            status => status,
        }
    }
}

/// Fields required to record a newly issued certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCertificate {
    pub cn: String,
    pub sans: Vec<String>,
    pub serial: Option<String>,
    pub not_after: DateTime<Utc>,
    pub key_strategy: KeyStrategy,
    pub storage_ref: StorageRef,
    pub owner_user: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(status: CertificateStatus, not_after: DateTime<Utc>) -> Certificate {
        let now = Utc::now();
        Certificate {
            id: Uuid::new_v4(),
            cn: "a.example.com".into(),
            sans: vec![],
            serial: None,
            not_after,
            status,
            key_strategy: KeyStrategy::Server,
            storage_ref: StorageRef::Ephemeral,
            owner_user: "system".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn lapsed_active_certificate_reads_as_expired() {
        let now = Utc::now();
        let cert = record(CertificateStatus::Active, now - Duration::days(1));
        assert_eq!(cert.effective_status(now), CertificateStatus::Expired);
    }

    #[test]
    fn revoked_stays_revoked_after_expiry() {
        let now = Utc::now();
        let cert = record(CertificateStatus::Revoked, now - Duration::days(1));
        assert_eq!(cert.effective_status(now), CertificateStatus::Revoked);
    }

    #[test]
    fn only_revoked_is_terminal() {
        assert!(CertificateStatus::Revoked.is_terminal());
        assert!(!CertificateStatus::Active.is_terminal());
        assert!(!CertificateStatus::Expired.is_terminal());
    }

    #[test]
    fn status_strings_roundtrip() {
        for status in [
            CertificateStatus::Active,
            CertificateStatus::Revoked,
            CertificateStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<CertificateStatus>().unwrap(), status);
        }
        assert!("Active".parse::<CertificateStatus>().is_err());
    }

    #[test]
    fn storage_ref_keeps_external_locations() {
        assert_eq!(StorageRef::from_stored("ephemeral"), StorageRef::Ephemeral);
        assert_eq!(
            StorageRef::from_stored("/var/lib/keys/a.pem").as_str(),
            "/var/lib/keys/a.pem"
        );
    }
}
