//! Certificate lifecycle service: issue, sign, renew, and revoke
//! orchestration.
//!
//! Ordering rule for every workflow: nothing is persisted until the CA
//! has answered and the deliverable has been built. A failure before
//! that point leaves no record and no audit event. A persistence
//! failure after the CA succeeded leaves a certificate the CA knows
//! about and the store does not; that case is logged at error level
//! with the serial so it can be reconciled. Audit appends are best
//! effort and never fail a workflow.

use chrono::Utc;
use stepward_core::error::{StepwardError, StepwardResult};
use stepward_core::models::audit::{AuditAction, AuditEvent, CreateAuditEvent};
use stepward_core::models::certificate::{
    Certificate, CertificateStatus, CreateCertificate, KeyStrategy, StorageRef,
};
use stepward_core::repository::{AuditEventRepository, CertificateQuery, CertificateRepository};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::authority::{
    CertificateAuthority, IssueRequest, Pkcs12Packager, validate_name, validate_validity_days,
};
use crate::bundle::{self, BUNDLE_MIME_TYPE, BundleFormat};
use crate::config::LifecycleConfig;
use crate::csr;

/// Input for server-side key issuance.
#[derive(Debug)]
pub struct IssueInput {
    pub common_name: String,
    pub sans: Vec<String>,
    pub validity_days: u32,
    pub format: BundleFormat,
    /// Required when `format` is [`BundleFormat::Pfx`].
    pub pfx_password: Option<String>,
}

/// A file handed back to the caller once.
#[derive(Debug, Clone)]
pub struct Download {
    pub data: Vec<u8>,
    pub filename: String,
    pub mime_type: &'static str,
}

#[derive(Debug)]
pub struct IssueOutput {
    pub certificate: Certificate,
    pub download: Download,
}

#[derive(Debug)]
pub struct SignCsrInput {
    pub csr_pem: String,
    pub validity_days: u32,
}

#[derive(Debug)]
pub struct SignCsrOutput {
    pub certificate: Certificate,
    pub cert_pem: String,
    pub chain_pem: String,
}

#[derive(Debug)]
pub struct RenewOutput {
    pub certificate: Certificate,
    pub download: Download,
}

/// Certificate lifecycle service.
///
/// Generic over the CA and the repositories so the workflows carry no
/// dependency on the step CLI or the database crate.
pub struct LifecycleService<A, C, E>
where
    A: CertificateAuthority + Pkcs12Packager,
    C: CertificateRepository,
    E: AuditEventRepository,
{
    authority: A,
    certificates: C,
    audit: E,
    config: LifecycleConfig,
}

impl<A, C, E> LifecycleService<A, C, E>
where
    A: CertificateAuthority + Pkcs12Packager,
    C: CertificateRepository,
    E: AuditEventRepository,
{
    pub fn new(authority: A, certificates: C, audit: E, config: LifecycleConfig) -> Self {
        Self {
            authority,
            certificates,
            audit,
            config,
        }
    }

    pub fn authority(&self) -> &A {
        &self.authority
    }

    /// Issue a certificate with a CA-generated key and return it as a
    /// download bundle.
    pub async fn issue(&self, input: IssueInput) -> StepwardResult<IssueOutput> {
        // 1. Validate before touching the CA.
        validate_name("common name", &input.common_name)?;
        for san in &input.sans {
            validate_name("SAN", san)?;
        }
        validate_validity_days(input.validity_days)?;
        let pfx_password = input.pfx_password.as_deref().filter(|p| !p.is_empty());
        if input.format == BundleFormat::Pfx && pfx_password.is_none() {
            return Err(StepwardError::validation("a PFX bundle requires a password"));
        }

        // 2. CA issuance.
        let bundle = self
            .authority
            .issue(&IssueRequest {
                common_name: input.common_name.clone(),
                sans: input.sans.clone(),
                validity_days: input.validity_days,
            })
            .await
            .inspect_err(|e| warn!(cn = %input.common_name, error = %e, "CA issuance failed"))?;

        // 3. Build the deliverable.
        let archive = bundle::assemble(&self.authority, &bundle, input.format, pfx_password).await?;

        // 4. Persist.
        let certificate = self
            .persist(CreateCertificate {
                cn: input.common_name.clone(),
                sans: input.sans.clone(),
                serial: Some(bundle.serial.clone()),
                not_after: bundle.not_after,
                key_strategy: KeyStrategy::Server,
                storage_ref: StorageRef::Ephemeral,
                owner_user: self.config.owner.clone(),
            })
            .await?;

        // 5. Audit.
        self.record(
            certificate.id,
            AuditAction::Issued,
            format!("CN: {}, SANs: [{}]", certificate.cn, certificate.sans.join(", ")),
        )
        .await;

        info!(
            cert_id = %certificate.id,
            cn = %certificate.cn,
            serial = ?certificate.serial,
            "Certificate issued"
        );

        Ok(IssueOutput {
            download: Download {
                data: archive,
                filename: bundle::bundle_filename(&certificate.cn),
                mime_type: BUNDLE_MIME_TYPE,
            },
            certificate,
        })
    }

    /// Sign a caller-supplied CSR. The subject recorded is the one the
    /// CSR requests.
    pub async fn sign_csr(&self, input: SignCsrInput) -> StepwardResult<SignCsrOutput> {
        // 1. Validate.
        validate_validity_days(input.validity_days)?;
        let subject = csr::inspect_csr(&input.csr_pem)?;

        // 2. CA signing.
        let bundle = self
            .authority
            .sign_csr(&input.csr_pem, input.validity_days)
            .await
            .inspect_err(|e| warn!(cn = %subject.common_name, error = %e, "CA signing failed"))?;

        // 3. Persist.
        let certificate = self
            .persist(CreateCertificate {
                cn: subject.common_name,
                sans: subject.sans,
                serial: Some(bundle.serial.clone()),
                not_after: bundle.not_after,
                key_strategy: KeyStrategy::Csr,
                storage_ref: StorageRef::Ephemeral,
                owner_user: self.config.owner.clone(),
            })
            .await?;

        // 4. Audit.
        self.record(
            certificate.id,
            AuditAction::SignedCsr,
            format!("CN: {}, SANs: [{}]", certificate.cn, certificate.sans.join(", ")),
        )
        .await;

        info!(cert_id = %certificate.id, cn = %certificate.cn, "CSR signed");

        Ok(SignCsrOutput {
            certificate,
            cert_pem: String::from_utf8_lossy(&bundle.cert_pem).into_owned(),
            chain_pem: String::from_utf8_lossy(&bundle.chain_pem).into_owned(),
        })
    }

    /// Obtain a fresh certificate for an existing record's subject and
    /// move the record onto it.
    ///
    /// Revoked certificates cannot be renewed. Expired ones can; that is
    /// what renewal is for. Renewal always has the CA generate a new key,
    /// so a record that came from a CSR switches to the `server` key
    /// strategy and the audit event notes the switch.
    pub async fn renew(&self, id: Uuid) -> StepwardResult<RenewOutput> {
        // 1. Load and check state.
        let mut certificate = self.certificates.get_by_id(id).await?;
        if certificate.status.is_terminal() {
            return Err(StepwardError::validation(format!(
                "certificate {id} is revoked and cannot be renewed"
            )));
        }

        // 2. CA issuance for the same subject.
        let bundle = self
            .authority
            .issue(&IssueRequest {
                common_name: certificate.cn.clone(),
                sans: certificate.sans.clone(),
                validity_days: self.config.renewal_validity_days,
            })
            .await
            .inspect_err(|e| warn!(cert_id = %id, error = %e, "CA renewal failed"))?;

        // 3. Build the deliverable.
        let archive = bundle::assemble(&self.authority, &bundle, BundleFormat::Pem, None).await?;

        // 4. Persist as one full replace.
        let previous_serial = certificate.serial.replace(bundle.serial.clone());
        let previous_strategy =
            std::mem::replace(&mut certificate.key_strategy, KeyStrategy::Server);
        certificate.not_after = bundle.not_after;
        certificate.updated_at = Utc::now();
        let certificate = self.replace(certificate).await?;

        // 5. Audit.
        let mut details = format!(
            "CN: {}, serial: {} -> {}",
            certificate.cn,
            previous_serial.as_deref().unwrap_or("none"),
            bundle.serial
        );
        if previous_strategy != certificate.key_strategy {
            details.push_str(&format!(
                ", key strategy: {} -> {}",
                previous_strategy.as_str(),
                certificate.key_strategy.as_str()
            ));
        }
        self.record(certificate.id, AuditAction::Renewed, details).await;

        info!(
            cert_id = %certificate.id,
            serial = %bundle.serial,
            not_after = %certificate.not_after,
            "Certificate renewed"
        );

        Ok(RenewOutput {
            download: Download {
                data: archive,
                filename: bundle::bundle_filename(&certificate.cn),
                mime_type: BUNDLE_MIME_TYPE,
            },
            certificate,
        })
    }

    /// Revoke a certificate.
    ///
    /// Idempotent: revoking an already revoked certificate returns it
    /// unchanged without calling the CA or writing an audit event. If
    /// the CA refuses, the local revocation still happens and the audit
    /// event records the CA's answer.
    pub async fn revoke(&self, id: Uuid) -> StepwardResult<Certificate> {
        // 1. Load and short-circuit.
        let mut certificate = self.certificates.get_by_id(id).await?;
        if certificate.status == CertificateStatus::Revoked {
            info!(cert_id = %id, "Certificate already revoked");
            return Ok(certificate);
        }

        // 2. CA revocation; a failure does not block the local one.
        let upstream = match certificate.serial.as_deref() {
            Some(serial) => match self.authority.revoke(serial).await {
                Ok(()) => "revoked at CA".to_string(),
                Err(e) => {
                    warn!(
                        cert_id = %id,
                        serial,
                        error = %e,
                        "CA revocation failed, revoking locally only"
                    );
                    format!("CA revocation failed: {e}")
                }
            },
            None => "no serial on record, revoked locally only".to_string(),
        };

        // 3. Persist.
        certificate.status = CertificateStatus::Revoked;
        certificate.updated_at = Utc::now();
        let certificate = self
            .certificates
            .update(certificate)
            .await
            .inspect_err(|e| error!(cert_id = %id, error = %e, "Failed to record revocation"))?;

        // 4. Audit.
        self.record(
            certificate.id,
            AuditAction::Revoked,
            format!(
                "CN: {}, serial: {}, {upstream}",
                certificate.cn,
                certificate.serial.as_deref().unwrap_or("none")
            ),
        )
        .await;

        info!(cert_id = %certificate.id, "Certificate revoked");
        Ok(certificate)
    }

    pub async fn get(&self, id: Uuid) -> StepwardResult<Certificate> {
        self.certificates.get_by_id(id).await
    }

    pub async fn list(&self, query: CertificateQuery) -> StepwardResult<Vec<Certificate>> {
        self.certificates.list(query).await
    }

    /// Audit events for one certificate, newest first. `limit = 0`
    /// returns all of them.
    pub async fn audit_trail(&self, id: Uuid, limit: u64) -> StepwardResult<Vec<AuditEvent>> {
        self.certificates.get_by_id(id).await?;
        self.audit.list(Some(id), limit).await
    }

    /// Remove a record. Administrative only; the audit trail is kept.
    pub async fn delete(&self, id: Uuid) -> StepwardResult<()> {
        self.certificates.delete(id).await?;
        info!(cert_id = %id, "Certificate record deleted");
        Ok(())
    }

    async fn persist(&self, input: CreateCertificate) -> StepwardResult<Certificate> {
        let cn = input.cn.clone();
        let serial = input.serial.clone();
        self.certificates.create(input).await.inspect_err(|e| {
            error!(
                cn = %cn,
                serial = ?serial,
                error = %e,
                "CA issued a certificate that could not be recorded; it is untracked until reconciled"
            );
        })
    }

    async fn replace(&self, certificate: Certificate) -> StepwardResult<Certificate> {
        let id = certificate.id;
        let serial = certificate.serial.clone();
        self.certificates.update(certificate).await.inspect_err(|e| {
            error!(
                cert_id = %id,
                serial = ?serial,
                error = %e,
                "CA issued a renewal that could not be recorded; the record still shows the old certificate"
            );
        })
    }

    async fn record(&self, cert_id: Uuid, action: AuditAction, details: String) {
        let event = CreateAuditEvent {
            cert_id,
            who: self.config.owner.clone(),
            action,
            details,
        };
        if let Err(e) = self.audit.append(event).await {
            error!(
                cert_id = %cert_id,
                action = action.as_str(),
                error = %e,
                "Failed to append audit event"
            );
        }
    }
}
