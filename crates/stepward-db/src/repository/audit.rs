//! SurrealDB implementation of [`AuditEventRepository`].

use chrono::{DateTime, Utc};
use stepward_core::error::StepwardResult;
use stepward_core::models::audit::{AuditAction, AuditEvent, CreateAuditEvent};
use stepward_core::repository::AuditEventRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct AuditEventRow {
    cert_id: String,
    who: String,
    action: String,
    details: String,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct AuditEventRowWithId {
    record_id: String,
    cert_id: String,
    who: String,
    action: String,
    details: String,
    timestamp: DateTime<Utc>,
}

fn row_to_event(row: AuditEventRow, id: Uuid) -> Result<AuditEvent, DbError> {
    let cert_id = Uuid::parse_str(&row.cert_id)
        .map_err(|e| DbError::Decode(format!("invalid certificate UUID: {e}")))?;
    let action: AuditAction = row
        .action
        .parse()
        .map_err(|_| DbError::Decode(format!("unknown audit action: {}", row.action)))?;
    Ok(AuditEvent {
        id,
        cert_id,
        who: row.who,
        action,
        details: row.details,
        timestamp: row.timestamp,
    })
}

impl AuditEventRowWithId {
    fn try_into_event(self) -> Result<AuditEvent, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Decode(format!("invalid UUID: {e}")))?;
        row_to_event(
            AuditEventRow {
                cert_id: self.cert_id,
                who: self.who,
                action: self.action,
                details: self.details,
                timestamp: self.timestamp,
            },
            id,
        )
    }
}

/// SurrealDB implementation of the append-only audit trail.
#[derive(Clone)]
pub struct SurrealAuditEventRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAuditEventRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AuditEventRepository for SurrealAuditEventRepository<C> {
    async fn append(&self, input: CreateAuditEvent) -> StepwardResult<AuditEvent> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('audit_event', $id) SET \
                 cert_id = $cert_id, \
                 who = $who, \
                 action = $action, \
                 details = $details",
            )
            .bind(("id", id_str.clone()))
            .bind(("cert_id", input.cert_id.to_string()))
            .bind(("who", input.who))
            .bind(("action", input.action.as_str().to_string()))
            .bind(("details", input.details))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Query {
                operation: "audit event append",
                message: e.to_string(),
            })?;

        let rows: Vec<AuditEventRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "audit_event".into(),
            id: id_str,
        })?;

        row_to_event(row, id).map_err(Into::into)
    }

    async fn list(&self, cert_id: Option<Uuid>, limit: u64) -> StepwardResult<Vec<AuditEvent>> {
        let filter = if cert_id.is_some() {
            "WHERE cert_id = $cert_id "
        } else {
            ""
        };
        let bound = if limit > 0 { " LIMIT $limit" } else { "" };
        let statement = format!(
            "SELECT meta::id(id) AS record_id, * FROM audit_event \
             {filter}ORDER BY timestamp DESC{bound}"
        );

        let mut builder = self.db.query(&statement);
        if let Some(cert_id) = cert_id {
            builder = builder.bind(("cert_id", cert_id.to_string()));
        }
        if limit > 0 {
            builder = builder.bind(("limit", limit));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let rows: Vec<AuditEventRowWithId> = result.take(0).map_err(DbError::from)?;

        rows.into_iter()
            .map(|row| row.try_into_event())
            .collect::<Result<Vec<_>, DbError>>()
            .map_err(Into::into)
    }
}
