//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. The certificate store owns both
//! certificate records and their audit trail; the two traits are split
//! so the audit log can stay append-only at the type level.

use uuid::Uuid;

use crate::error::StepwardResult;
use crate::models::{
    audit::{AuditEvent, CreateAuditEvent},
    certificate::{Certificate, CertificateStatus, CreateCertificate},
};

/// Default page size for certificate listings.
pub const DEFAULT_LIST_LIMIT: u64 = 50;

/// Query parameters for certificate listings.
///
/// Results are ordered by `created_at` descending. `status` narrows the
/// result set only when present, and matches the effective status: an
/// active record past its `not_after` is listed as expired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateQuery {
    pub limit: u64,
    pub offset: u64,
    pub status: Option<CertificateStatus>,
}

impl Default for CertificateQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
            status: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Certificates
// ---------------------------------------------------------------------------

pub trait CertificateRepository: Send + Sync {
    fn create(
        &self,
        input: CreateCertificate,
    ) -> impl Future<Output = StepwardResult<Certificate>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = StepwardResult<Certificate>> + Send;
    fn list(
        &self,
        query: CertificateQuery,
    ) -> impl Future<Output = StepwardResult<Vec<Certificate>>> + Send;
    /// Replace every mutable field of an existing record in one atomic
    /// write. `created_at` is never touched.
    fn update(
        &self,
        certificate: Certificate,
    ) -> impl Future<Output = StepwardResult<Certificate>> + Send;
    /// Physically remove a record. Not part of any lifecycle workflow.
    fn delete(&self, id: Uuid) -> impl Future<Output = StepwardResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Audit (append-only)
// ---------------------------------------------------------------------------

pub trait AuditEventRepository: Send + Sync {
    /// Append a new audit event. No update or delete operations exist.
    fn append(
        &self,
        input: CreateAuditEvent,
    ) -> impl Future<Output = StepwardResult<AuditEvent>> + Send;
    /// Newest events first. `cert_id = None` returns events for every
    /// certificate; `limit = 0` means no limit.
    fn list(
        &self,
        cert_id: Option<Uuid>,
        limit: u64,
    ) -> impl Future<Output = StepwardResult<Vec<AuditEvent>>> + Send;
}
