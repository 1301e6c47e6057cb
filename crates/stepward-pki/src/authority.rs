//! Capabilities the lifecycle workflows need from a certificate
//! authority.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::PkiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRequest {
    pub common_name: String,
    pub sans: Vec<String>,
    pub validity_days: u32,
}

/// Everything the CA handed back for one certificate.
#[derive(Debug, Clone)]
pub struct CertificateBundle {
    pub cert_pem: Vec<u8>,
    /// Present only when the CA generated the key.
    pub key_pem: Option<Vec<u8>>,
    pub chain_pem: Vec<u8>,
    pub serial: String,
    pub not_after: DateTime<Utc>,
}

pub trait CertificateAuthority: Send + Sync {
    /// Generate a key pair and a certificate for it.
    fn issue(
        &self,
        request: &IssueRequest,
    ) -> impl Future<Output = Result<CertificateBundle, PkiError>> + Send;

    /// Sign a caller-supplied CSR. The returned bundle carries no key.
    fn sign_csr(
        &self,
        csr_pem: &str,
        validity_days: u32,
    ) -> impl Future<Output = Result<CertificateBundle, PkiError>> + Send;

    fn revoke(&self, serial: &str) -> impl Future<Output = Result<(), PkiError>> + Send;

    /// Issuing chain for `cert_pem`, as concatenated PEM.
    fn fetch_chain(
        &self,
        cert_pem: &[u8],
    ) -> impl Future<Output = Result<Vec<u8>, PkiError>> + Send;
}

pub trait Pkcs12Packager: Send + Sync {
    /// Package certificate and key into a password-protected PKCS#12.
    fn package(
        &self,
        cert_pem: &[u8],
        key_pem: &[u8],
        password: &str,
    ) -> impl Future<Output = Result<Vec<u8>, PkiError>> + Send;
}

/// Reject names that are empty, contain control characters, or would be
/// read as a command-line flag.
pub fn validate_name(what: &str, value: &str) -> Result<(), PkiError> {
    if value.trim().is_empty() {
        return Err(PkiError::InvalidInput(format!("{what} must not be empty")));
    }
    if value.starts_with('-') {
        return Err(PkiError::InvalidInput(format!(
            "{what} '{value}' must not start with '-'"
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(PkiError::InvalidInput(format!(
            "{what} must not contain control characters"
        )));
    }
    Ok(())
}

pub fn validate_validity_days(days: u32) -> Result<(), PkiError> {
    if days == 0 {
        return Err(PkiError::InvalidInput(
            "validity must be at least one day".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_that_look_like_flags_are_rejected() {
        assert!(validate_name("common name", "svc.internal").is_ok());
        assert!(validate_name("common name", "").is_err());
        assert!(validate_name("common name", "   ").is_err());
        assert!(validate_name("SAN", "--root=/etc/passwd").is_err());
        assert!(validate_name("SAN", "a\nb").is_err());
    }

    #[test]
    fn zero_validity_is_rejected() {
        assert!(validate_validity_days(0).is_err());
        assert!(validate_validity_days(1).is_ok());
    }
}
