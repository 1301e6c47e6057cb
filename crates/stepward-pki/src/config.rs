//! CA agent and lifecycle configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::PkiError;

/// Which certificate-inspection strategy recovers serial and expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InspectorKind {
    /// Shell out to `openssl x509 -noout -serial -enddate`.
    #[default]
    Openssl,
    /// Decode the DER in-process with `x509-parser`.
    Native,
}

impl FromStr for InspectorKind {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openssl" => Ok(InspectorKind::Openssl),
            "native" => Ok(InspectorKind::Native),
            other => Err(PkiError::InvalidInput(format!(
                "unknown certificate inspector '{other}', expected 'openssl' or 'native'"
            ))),
        }
    }
}

/// Configuration for the step CA agent.
///
/// Built once at startup and handed to [`crate::StepCliAuthority`];
/// nothing here is mutated afterwards.
#[derive(Debug, Clone)]
pub struct CaConfig {
    /// Path or name of the `step` binary.
    pub step_binary: PathBuf,
    /// Path or name of the `openssl` binary (openssl inspector only).
    pub openssl_binary: PathBuf,
    /// Base URL of the step-ca server.
    pub ca_url: String,
    /// Root certificate used to trust the CA, if not already in the
    /// step context.
    pub root_cert: Option<PathBuf>,
    /// JWK provisioner used to authorize issuance and revocation.
    pub provisioner_name: String,
    /// File holding the provisioner password.
    pub provisioner_password_file: Option<PathBuf>,
    /// Deadline for every external invocation (default: 60 seconds).
    pub command_timeout_secs: u64,
    pub inspector: InspectorKind,
}

impl CaConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// ACME directory advertised by step-ca's default ACME provisioner.
    pub fn acme_directory(&self) -> String {
        format!("{}/acme/acme/directory", self.ca_url.trim_end_matches('/'))
    }
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            step_binary: PathBuf::from("step"),
            openssl_binary: PathBuf::from("openssl"),
            ca_url: String::new(),
            root_cert: None,
            provisioner_name: "ui-admin".into(),
            provisioner_password_file: None,
            command_timeout_secs: 60,
            inspector: InspectorKind::default(),
        }
    }
}

/// Policy knobs for the lifecycle workflows.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Validity requested when renewing (default: 90 days).
    pub renewal_validity_days: u32,
    /// Principal recorded as owner and audit actor (default: `system`).
    pub owner: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            renewal_validity_days: 90,
            owner: "system".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inspector_kind_parses_case_insensitively() {
        assert_eq!("OpenSSL".parse::<InspectorKind>().unwrap(), InspectorKind::Openssl);
        assert_eq!("native".parse::<InspectorKind>().unwrap(), InspectorKind::Native);
        assert!("gnutls".parse::<InspectorKind>().is_err());
    }

    #[test]
    fn acme_directory_ignores_trailing_slash() {
        let config = CaConfig {
            ca_url: "https://ca.internal:9000/".into(),
            ..Default::default()
        };
        assert_eq!(
            config.acme_directory(),
            "https://ca.internal:9000/acme/acme/directory"
        );
    }
}
