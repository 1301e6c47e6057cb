//! Opening the certificate store.
//!
//! The lifecycle service only ever sees repositories; this module turns a
//! [`DbConfig`] into a migrated SurrealDB handle and hands those
//! repositories out.

use std::fmt;

use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tracing::info;

use crate::error::DbError;
use crate::repository::{SurrealAuditEventRepository, SurrealCertificateRepository};
use crate::schema::run_migrations;

/// Where the certificate records and audit trail live.
#[derive(Clone)]
pub struct DbConfig {
    /// WebSocket address (e.g., `127.0.0.1:8000`).
    pub url: String,
    pub namespace: String,
    pub database: String,
    /// Root credentials.
    pub username: String,
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "127.0.0.1:8000".into(),
            namespace: "stepward".into(),
            database: "certs".into(),
            username: "root".into(),
            password: "root".into(),
        }
    }
}

// The server logs its configuration at startup.
impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("url", &self.url)
            .field("namespace", &self.namespace)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// A migrated connection to the certificate store.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Client>,
}

impl DbManager {
    /// Connect, sign in, select the namespace and database, and bring the
    /// `certificate` and `audit_event` tables up to the current schema.
    ///
    /// Nothing is written by the lifecycle service until this returns, so
    /// a half-migrated store is never used.
    pub async fn open(config: &DbConfig) -> Result<Self, DbError> {
        info!(
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            "Opening certificate store"
        );

        let unavailable = |stage: &'static str| {
            let url = config.url.clone();
            move |source: surrealdb::Error| DbError::Unavailable { url, stage, source }
        };

        let db = Surreal::new::<Ws>(&config.url)
            .await
            .map_err(unavailable("connect"))?;
        db.signin(Root {
            username: config.username.clone(),
            password: config.password.clone(),
        })
        .await
        .map_err(unavailable("sign in"))?;
        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(unavailable("select namespace"))?;

        run_migrations(&db).await?;

        info!("Certificate store ready");
        Ok(Self { db })
    }

    pub fn certificates(&self) -> SurrealCertificateRepository<Client> {
        SurrealCertificateRepository::new(self.db.clone())
    }

    pub fn audit_events(&self) -> SurrealAuditEventRepository<Client> {
        SurrealAuditEventRepository::new(self.db.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_the_password() {
        let config = DbConfig {
            password: "s3cret-root".into(),
            ..DbConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("s3cret-root"));
        assert!(rendered.contains("127.0.0.1:8000"));
    }
}
