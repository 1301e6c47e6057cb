//! stepward PKI: certificate lifecycle orchestration.
//!
//! Drives an external step CA agent through issuance, CSR signing,
//! renewal, and revocation; recovers certificate identity from the
//! issued material; packages deliverables into a ZIP bundle; and keeps
//! certificate records and the audit trail consistent with the CA.
//!
//! Layering, leaves first:
//! - [`workspace`] and [`command`]: scratch directories and bounded
//!   external process execution.
//! - [`inspect`] and [`csr`]: certificate and CSR inspection.
//! - [`authority`] and [`step`]: the CA capability traits and their
//!   step CLI implementation.
//! - [`bundle`]: download archive assembly.
//! - [`service`]: the lifecycle workflows.

pub mod authority;
pub mod bundle;
pub mod command;
pub mod config;
pub mod csr;
pub mod error;
pub mod inspect;
pub mod service;
pub mod step;
pub mod workspace;

pub use authority::{CertificateAuthority, CertificateBundle, IssueRequest, Pkcs12Packager};
pub use bundle::BundleFormat;
pub use config::{CaConfig, InspectorKind, LifecycleConfig};
pub use error::PkiError;
pub use inspect::{CertificateIdentity, CertificateInspector, ConfiguredInspector};
pub use service::LifecycleService;
pub use step::StepCliAuthority;
