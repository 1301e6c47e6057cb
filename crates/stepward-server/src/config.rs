//! Server configuration loaded from environment variables.
//!
//! ```bash
//! # CA agent
//! CA_URL=https://ca.internal:9000          # required
//! CA_ROOT=/etc/step/certs/root_ca.crt
//! PROVISIONER_NAME=ui-admin
//! PROVISIONER_PASSWORD_FILE=/run/secrets/provisioner
//! STEP_BIN=step
//! OPENSSL_BIN=openssl
//! CERT_INSPECTOR=openssl                   # or "native"
//! CA_COMMAND_TIMEOUT_SECS=60
//! RENEWAL_VALIDITY_DAYS=90
//!
//! # Store
//! SURREAL_URL=127.0.0.1:8000
//! SURREAL_NS=stepward
//! SURREAL_DB=certs
//! SURREAL_USER=root
//! SURREAL_PASS=root
//!
//! # HTTP
//! PORT=8080
//! ```
//!
//! Empty values count as unset.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use stepward_db::DbConfig;
use stepward_pki::{CaConfig, InspectorKind, LifecycleConfig};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db: DbConfig,
    pub ca: CaConfig,
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name
    /// to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let ca_defaults = CaConfig::default();
        let ca = CaConfig {
            step_binary: get("STEP_BIN")
                .map(PathBuf::from)
                .unwrap_or(ca_defaults.step_binary),
            openssl_binary: get("OPENSSL_BIN")
                .map(PathBuf::from)
                .unwrap_or(ca_defaults.openssl_binary),
            ca_url: get("CA_URL").ok_or(ConfigError::MissingEnvVar("CA_URL"))?,
            root_cert: get("CA_ROOT").map(PathBuf::from),
            provisioner_name: get("PROVISIONER_NAME").unwrap_or(ca_defaults.provisioner_name),
            provisioner_password_file: get("PROVISIONER_PASSWORD_FILE").map(PathBuf::from),
            command_timeout_secs: parse_positive(
                "CA_COMMAND_TIMEOUT_SECS",
                get("CA_COMMAND_TIMEOUT_SECS"),
                ca_defaults.command_timeout_secs,
            )?,
            inspector: match get("CERT_INSPECTOR") {
                Some(value) => InspectorKind::from_str(&value).map_err(|_| {
                    ConfigError::InvalidValue {
                        name: "CERT_INSPECTOR",
                        value,
                    }
                })?,
                None => ca_defaults.inspector,
            },
        };

        let lifecycle_defaults = LifecycleConfig::default();
        let lifecycle = LifecycleConfig {
            renewal_validity_days: parse_positive(
                "RENEWAL_VALIDITY_DAYS",
                get("RENEWAL_VALIDITY_DAYS"),
                lifecycle_defaults.renewal_validity_days,
            )?,
            ..lifecycle_defaults
        };

        let db_defaults = DbConfig::default();
        let db = DbConfig {
            url: get("SURREAL_URL").unwrap_or(db_defaults.url),
            namespace: get("SURREAL_NS").unwrap_or(db_defaults.namespace),
            database: get("SURREAL_DB").unwrap_or(db_defaults.database),
            username: get("SURREAL_USER").unwrap_or(db_defaults.username),
            password: get("SURREAL_PASS").unwrap_or(db_defaults.password),
        };

        let port = match get("PORT") {
            Some(value) => value
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidValue { name: "PORT", value })?,
            None => 8080,
        };

        Ok(Self {
            port,
            db,
            ca,
            lifecycle,
        })
    }
}

fn parse_positive<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed > T::default() => Ok(parsed),
        _ => Err(ConfigError::InvalidValue { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_ca_url_is_set() {
        let config = load(&[("CA_URL", "https://ca.internal:9000")]).unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.ca.ca_url, "https://ca.internal:9000");
        assert_eq!(config.ca.provisioner_name, "ui-admin");
        assert_eq!(config.ca.step_binary, PathBuf::from("step"));
        assert_eq!(config.ca.command_timeout_secs, 60);
        assert_eq!(config.ca.inspector, InspectorKind::Openssl);
        assert!(config.ca.root_cert.is_none());
        assert!(config.ca.provisioner_password_file.is_none());
        assert_eq!(config.lifecycle.renewal_validity_days, 90);
        assert_eq!(config.lifecycle.owner, "system");
        assert_eq!(config.db.namespace, "stepward");
    }

    #[test]
    fn missing_ca_url_is_an_error() {
        assert!(matches!(
            load(&[]),
            Err(ConfigError::MissingEnvVar("CA_URL"))
        ));
        assert!(matches!(
            load(&[("CA_URL", "")]),
            Err(ConfigError::MissingEnvVar("CA_URL"))
        ));
    }

    #[test]
    fn every_variable_is_read() {
        let config = load(&[
            ("CA_URL", "https://ca:9000"),
            ("CA_ROOT", "/etc/step/root.crt"),
            ("PROVISIONER_NAME", "automation"),
            ("PROVISIONER_PASSWORD_FILE", "/run/secrets/pw"),
            ("STEP_BIN", "/usr/local/bin/step"),
            ("OPENSSL_BIN", "/usr/bin/openssl"),
            ("CERT_INSPECTOR", "native"),
            ("CA_COMMAND_TIMEOUT_SECS", "15"),
            ("RENEWAL_VALIDITY_DAYS", "30"),
            ("SURREAL_URL", "db:8000"),
            ("SURREAL_NS", "ns"),
            ("SURREAL_DB", "db"),
            ("SURREAL_USER", "admin"),
            ("SURREAL_PASS", "hunter2"),
            ("PORT", "9443"),
        ])
        .unwrap();

        assert_eq!(config.port, 9443);
        assert_eq!(config.ca.root_cert, Some(PathBuf::from("/etc/step/root.crt")));
        assert_eq!(config.ca.provisioner_name, "automation");
        assert_eq!(
            config.ca.provisioner_password_file,
            Some(PathBuf::from("/run/secrets/pw"))
        );
        assert_eq!(config.ca.step_binary, PathBuf::from("/usr/local/bin/step"));
        assert_eq!(config.ca.openssl_binary, PathBuf::from("/usr/bin/openssl"));
        assert_eq!(config.ca.inspector, InspectorKind::Native);
        assert_eq!(config.ca.command_timeout_secs, 15);
        assert_eq!(config.lifecycle.renewal_validity_days, 30);
        assert_eq!(config.db.url, "db:8000");
        assert_eq!(config.db.namespace, "ns");
        assert_eq!(config.db.database, "db");
        assert_eq!(config.db.username, "admin");
        assert_eq!(config.db.password, "hunter2");
    }

    #[test]
    fn invalid_values_are_rejected() {
        for (name, value) in [
            ("PORT", "http"),
            ("PORT", "70000"),
            ("CA_COMMAND_TIMEOUT_SECS", "0"),
            ("RENEWAL_VALIDITY_DAYS", "-5"),
            ("CERT_INSPECTOR", "gnutls"),
        ] {
            let err = load(&[("CA_URL", "https://ca:9000"), (name, value)]).unwrap_err();
            assert!(
                matches!(&err, ConfigError::InvalidValue { name: n, .. } if *n == name),
                "{name}={value} gave {err}"
            );
        }
    }
}
