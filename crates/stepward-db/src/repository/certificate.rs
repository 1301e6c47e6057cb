//! SurrealDB implementation of [`CertificateRepository`].

use chrono::{DateTime, Utc};
use stepward_core::error::StepwardResult;
use stepward_core::models::certificate::{
    Certificate, CertificateStatus, CreateCertificate, KeyStrategy, StorageRef,
};
use stepward_core::repository::{CertificateQuery, CertificateRepository};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct CertificateRow {
    cn: String,
    sans: Vec<String>,
    serial: Option<String>,
    not_after: DateTime<Utc>,
    status: String,
    key_strategy: String,
    storage_ref: String,
    owner_user: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct CertificateRowWithId {
    record_id: String,
    cn: String,
    sans: Vec<String>,
    serial: Option<String>,
    not_after: DateTime<Utc>,
    status: String,
    key_strategy: String,
    storage_ref: String,
    owner_user: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CertificateRow {
    fn into_certificate(self, id: Uuid) -> Result<Certificate, DbError> {
        Ok(Certificate {
            id,
            cn: self.cn,
            sans: self.sans,
            serial: self.serial,
            not_after: self.not_after,
            status: parse_status(&self.status)?,
            key_strategy: parse_key_strategy(&self.key_strategy)?,
            storage_ref: StorageRef::from_stored(&self.storage_ref),
            owner_user: self.owner_user,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl CertificateRowWithId {
    fn try_into_certificate(self) -> Result<Certificate, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Decode(format!("invalid UUID: {e}")))?;
        CertificateRow {
            cn: self.cn,
            sans: self.sans,
            serial: self.serial,
            not_after: self.not_after,
            status: self.status,
            key_strategy: self.key_strategy,
            storage_ref: self.storage_ref,
            owner_user: self.owner_user,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .into_certificate(id)
    }
}

fn parse_status(s: &str) -> Result<CertificateStatus, DbError> {
    s.parse()
        .map_err(|_| DbError::Decode(format!("unknown certificate status: {s}")))
}

fn parse_key_strategy(s: &str) -> Result<KeyStrategy, DbError> {
    s.parse()
        .map_err(|_| DbError::Decode(format!("unknown key strategy: {s}")))
}

/// SurrealDB implementation of the Certificate repository.
#[derive(Clone)]
pub struct SurrealCertificateRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealCertificateRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> CertificateRepository for SurrealCertificateRepository<C> {
    async fn create(&self, input: CreateCertificate) -> StepwardResult<Certificate> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('certificate', $id) SET \
                 cn = $cn, \
                 sans = $sans, \
                 serial = $serial, \
                 not_after = $not_after, \
                 status = $status, \
                 key_strategy = $key_strategy, \
                 storage_ref = $storage_ref, \
                 owner_user = $owner_user",
            )
            .bind(("id", id_str.clone()))
            .bind(("cn", input.cn))
            .bind(("sans", input.sans))
            .bind(("serial", input.serial))
            .bind(("not_after", input.not_after))
            .bind(("status", CertificateStatus::Active.as_str().to_string()))
            .bind(("key_strategy", input.key_strategy.as_str().to_string()))
            .bind(("storage_ref", input.storage_ref.as_str().to_string()))
            .bind(("owner_user", input.owner_user))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Query {
                operation: "certificate create",
                message: e.to_string(),
            })?;

        let rows: Vec<CertificateRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "certificate".into(),
            id: id_str,
        })?;

        row.into_certificate(id).map_err(Into::into)
    }

    async fn get_by_id(&self, id: Uuid) -> StepwardResult<Certificate> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('certificate', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CertificateRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "certificate".into(),
            id: id_str,
        })?;

        row.into_certificate(id).map_err(Into::into)
    }

    async fn list(&self, query: CertificateQuery) -> StepwardResult<Vec<Certificate>> {
        // Filters on the status a reader would see: an active record
        // past its expiry counts as expired.
        let filter = match query.status {
            None => "",
            Some(CertificateStatus::Revoked) => "WHERE status = 'revoked' ",
            Some(CertificateStatus::Active) => {
                "WHERE status = 'active' AND not_after >= time::now() "
            }
            Some(CertificateStatus::Expired) => {
                "WHERE status = 'expired' OR (status = 'active' AND not_after < time::now()) "
            }
        };
        let statement = format!(
            "SELECT meta::id(id) AS record_id, * FROM certificate \
             {filter}\
             ORDER BY created_at DESC \
             LIMIT $limit START $offset"
        );

        let mut result = self
            .db
            .query(&statement)
            .bind(("limit", query.limit))
            .bind(("offset", query.offset))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<CertificateRowWithId> = result.take(0).map_err(DbError::from)?;

        rows.into_iter()
            .map(|row| row.try_into_certificate())
            .collect::<Result<Vec<_>, DbError>>()
            .map_err(Into::into)
    }

    async fn update(&self, certificate: Certificate) -> StepwardResult<Certificate> {
        let id_str = certificate.id.to_string();

        // One statement, so readers never see a partially applied record.
        // UPDATE on a missing record id returns no rows instead of creating one.
        let result = self
            .db
            .query(
                "UPDATE type::record('certificate', $id) SET \
                 cn = $cn, \
                 sans = $sans, \
                 serial = $serial, \
                 not_after = $not_after, \
                 status = $status, \
                 key_strategy = $key_strategy, \
                 storage_ref = $storage_ref, \
                 owner_user = $owner_user, \
                 updated_at = $updated_at",
            )
            .bind(("id", id_str.clone()))
            .bind(("cn", certificate.cn))
            .bind(("sans", certificate.sans))
            .bind(("serial", certificate.serial))
            .bind(("not_after", certificate.not_after))
            .bind(("status", certificate.status.as_str().to_string()))
            .bind(("key_strategy", certificate.key_strategy.as_str().to_string()))
            .bind(("storage_ref", certificate.storage_ref.as_str().to_string()))
            .bind(("owner_user", certificate.owner_user))
            .bind(("updated_at", certificate.updated_at))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Query {
                operation: "certificate update",
                message: e.to_string(),
            })?;

        let rows: Vec<CertificateRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "certificate".into(),
            id: id_str,
        })?;

        row.into_certificate(certificate.id).map_err(Into::into)
    }

    async fn delete(&self, id: Uuid) -> StepwardResult<()> {
        self.db
            .query("DELETE type::record('certificate', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query {
                operation: "certificate delete",
                message: e.to_string(),
            })?;

        Ok(())
    }
}
