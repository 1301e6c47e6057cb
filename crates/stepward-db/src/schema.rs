//! Certificate store schema and its migration runner.
//!
//! Two SCHEMAFULL tables: `certificate` (one mutable row per issued or
//! signed certificate) and `audit_event` (append-only; the table denies
//! update and delete). Ids are UUID strings; statuses, key strategies
//! and audit actions are stored as their lowercase wire names behind
//! ASSERT constraints.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "certificate_lifecycle",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1: certificate records and audit trail
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Certificates
-- =======================================================================
DEFINE TABLE certificate SCHEMAFULL;
DEFINE FIELD cn ON TABLE certificate TYPE string;
DEFINE FIELD sans ON TABLE certificate TYPE array<string> DEFAULT [];
DEFINE FIELD serial ON TABLE certificate TYPE option<string>;
DEFINE FIELD not_after ON TABLE certificate TYPE datetime;
DEFINE FIELD status ON TABLE certificate TYPE string \
    ASSERT $value IN ['active', 'revoked', 'expired'];
DEFINE FIELD key_strategy ON TABLE certificate TYPE string \
    ASSERT $value IN ['server', 'csr'];
DEFINE FIELD storage_ref ON TABLE certificate TYPE string \
    DEFAULT 'ephemeral';
DEFINE FIELD owner_user ON TABLE certificate TYPE string;
DEFINE FIELD created_at ON TABLE certificate TYPE datetime \
    DEFAULT time::now() READONLY;
DEFINE FIELD updated_at ON TABLE certificate TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_certificate_cn ON TABLE certificate COLUMNS cn;
DEFINE INDEX idx_certificate_not_after ON TABLE certificate \
    COLUMNS not_after;
DEFINE INDEX idx_certificate_status_created ON TABLE certificate \
    COLUMNS status, created_at;

-- =======================================================================
-- Audit events (append-only)
-- =======================================================================
DEFINE TABLE audit_event SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD cert_id ON TABLE audit_event TYPE string;
DEFINE FIELD who ON TABLE audit_event TYPE string;
DEFINE FIELD action ON TABLE audit_event TYPE string \
    ASSERT $value IN ['issued', 'signed_csr', 'renewed', 'revoked'];
DEFINE FIELD details ON TABLE audit_event TYPE string;
DEFINE FIELD timestamp ON TABLE audit_event TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_audit_cert_time ON TABLE audit_event \
    COLUMNS cert_id, timestamp;
";

// -----------------------------------------------------------------------
// Runner
// -----------------------------------------------------------------------

/// Bring the certificate store up to the latest schema version.
///
/// Safe to call on every start: versions already recorded in `_migration`
/// are skipped.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration {
            version: 0,
            name: "migration_tracking",
            message: e.to_string(),
        })?;

    let applied = applied_version(db).await?;
    let outstanding = pending(applied);
    if outstanding.is_empty() {
        info!(version = applied, "Certificate store schema is current");
        return Ok(());
    }

    for migration in outstanding {
        apply(db, migration).await?;
    }
    Ok(())
}

async fn applied_version<C: Connection>(db: &Surreal<C>) -> Result<u32, DbError> {
    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    Ok(records.first().map(|m| m.version).unwrap_or(0))
}

fn pending(applied: u32) -> &'static [Migration] {
    let start = MIGRATIONS
        .iter()
        .position(|m| m.version > applied)
        .unwrap_or(MIGRATIONS.len());
    &MIGRATIONS[start..]
}

/// Run one schema step, then record it. A failed step is not recorded,
/// so the next start retries it.
async fn apply<C: Connection>(db: &Surreal<C>, migration: &Migration) -> Result<(), DbError> {
    info!(
        version = migration.version,
        name = migration.name,
        "Applying certificate store migration"
    );
    let failed = |e: surrealdb::Error| DbError::Migration {
        version: migration.version,
        name: migration.name,
        message: e.to_string(),
    };

    db.query(migration.sql)
        .await
        .and_then(|response| response.check())
        .map_err(failed)?;
    db.query("CREATE _migration SET version = $version, name = $name")
        .bind(("version", migration.version))
        .bind(("name", migration.name))
        .await
        .and_then(|response| response.check())
        .map_err(failed)?;

    info!(version = migration.version, "Migration applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_v1_defines_both_tables() {
        assert!(SCHEMA_V1.contains("DEFINE TABLE certificate"));
        assert!(SCHEMA_V1.contains("DEFINE TABLE audit_event"));
    }

    #[test]
    fn fresh_store_runs_every_migration() {
        assert_eq!(pending(0).len(), MIGRATIONS.len());
        assert_eq!(pending(0)[0].name, "certificate_lifecycle");
    }

    #[test]
    fn current_store_has_nothing_pending() {
        let latest = MIGRATIONS.last().map(|m| m.version).unwrap_or(0);
        assert!(pending(latest).is_empty());
    }

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }
}
