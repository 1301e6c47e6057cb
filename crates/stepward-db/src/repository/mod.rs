//! SurrealDB repository implementations.

mod audit;
mod certificate;

pub use audit::SurrealAuditEventRepository;
pub use certificate::SurrealCertificateRepository;
