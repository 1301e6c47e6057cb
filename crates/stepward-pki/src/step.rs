//! [`CertificateAuthority`] backed by the `step` CLI talking to a
//! step-ca server.
//!
//! Each operation runs in its own [`ScratchWorkspace`]: inputs are
//! written there with owner-only permissions, the CLI writes its
//! outputs there, and the directory is removed when the operation ends.
//! The provisioner password is only ever passed by file path.

use std::fs;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info};

use crate::authority::{
    CertificateAuthority, CertificateBundle, IssueRequest, Pkcs12Packager, validate_name,
    validate_validity_days,
};
use crate::command::run_bounded;
use crate::config::CaConfig;
use crate::error::PkiError;
use crate::inspect::{CertificateInspector, ensure_pem_envelope, parse_certificate};
use crate::workspace::ScratchWorkspace;

const CERT_FILE: &str = "cert.pem";
const KEY_FILE: &str = "key.pem";
const CSR_FILE: &str = "request.csr";
const P12_FILE: &str = "cert.p12";
const P12_PASSWORD_FILE: &str = "p12.pass";

pub struct StepCliAuthority<I> {
    config: CaConfig,
    inspector: I,
    /// Provisioner password, held only to scrub it from tool output.
    provisioner_secret: Option<String>,
}

impl<I: CertificateInspector> StepCliAuthority<I> {
    pub fn new(config: CaConfig, inspector: I) -> Result<Self, PkiError> {
        if config.ca_url.trim().is_empty() {
            return Err(PkiError::InvalidInput("CA URL is not configured".into()));
        }
        let provisioner_secret = match &config.provisioner_password_file {
            Some(path) => {
                let secret = fs::read_to_string(path).map_err(|e| {
                    PkiError::InvalidInput(format!(
                        "provisioner password file {}: {e}",
                        path.display()
                    ))
                })?;
                Some(secret.trim_end_matches(['\r', '\n']).to_string())
            }
            None => None,
        };

        Ok(Self {
            config,
            inspector,
            provisioner_secret,
        })
    }

    pub fn config(&self) -> &CaConfig {
        &self.config
    }

    fn timeout(&self) -> Duration {
        self.config.command_timeout()
    }

    fn step(&self, workspace: &ScratchWorkspace) -> Command {
        let mut cmd = Command::new(&self.config.step_binary);
        cmd.current_dir(workspace.path());
        cmd
    }

    /// CA URL, trust root, and provisioner credentials.
    fn ca_flags(&self, cmd: &mut Command) {
        cmd.arg("--ca-url").arg(&self.config.ca_url);
        if let Some(root) = &self.config.root_cert {
            cmd.arg("--root").arg(root);
        }
        cmd.arg("--provisioner").arg(&self.config.provisioner_name);
        if let Some(file) = &self.config.provisioner_password_file {
            cmd.arg("--provisioner-password-file").arg(file);
        }
    }

    fn secrets(&self) -> Vec<&str> {
        self.provisioner_secret.as_deref().into_iter().collect()
    }

    /// Read the signed certificate, fetch its chain, and inspect it.
    async fn collect(
        &self,
        operation: &'static str,
        workspace: &ScratchWorkspace,
        key_pem: Option<Vec<u8>>,
    ) -> Result<CertificateBundle, PkiError> {
        let cert_pem = workspace.read_output(operation, CERT_FILE)?;
        let chain_pem = self.fetch_chain(&cert_pem).await?;
        let identity = parse_certificate(&self.inspector, &cert_pem).await?;

        Ok(CertificateBundle {
            cert_pem,
            key_pem,
            chain_pem,
            serial: identity.serial,
            not_after: identity.not_after,
        })
    }
}

/// step reads `--not-after` as a duration; whole days become hours.
fn not_after_flag(validity_days: u32) -> String {
    format!("{}h", u64::from(validity_days) * 24)
}

impl<I: CertificateInspector> CertificateAuthority for StepCliAuthority<I> {
    async fn issue(&self, request: &IssueRequest) -> Result<CertificateBundle, PkiError> {
        validate_name("common name", &request.common_name)?;
        for san in &request.sans {
            validate_name("SAN", san)?;
        }
        validate_validity_days(request.validity_days)?;

        let workspace = ScratchWorkspace::acquire("issue")?;
        let mut cmd = self.step(&workspace);
        cmd.args(["ca", "certificate"])
            .arg(&request.common_name)
            .arg(workspace.file(CERT_FILE))
            .arg(workspace.file(KEY_FILE));
        self.ca_flags(&mut cmd);
        cmd.arg("--not-after").arg(not_after_flag(request.validity_days));
        for san in &request.sans {
            cmd.arg("--san").arg(san);
        }

        run_bounded("issue", cmd, None, self.timeout(), &self.secrets()).await?;

        let key_pem = workspace.read_output("issue", KEY_FILE)?;
        let bundle = self.collect("issue", &workspace, Some(key_pem)).await?;
        info!(
            cn = %request.common_name,
            serial = %bundle.serial,
            not_after = %bundle.not_after,
            "Certificate issued by CA"
        );
        Ok(bundle)
    }

    async fn sign_csr(&self, csr_pem: &str, validity_days: u32) -> Result<CertificateBundle, PkiError> {
        ensure_pem_envelope(
            csr_pem.as_bytes(),
            &["CERTIFICATE REQUEST", "NEW CERTIFICATE REQUEST"],
        )
        .map_err(|e| PkiError::InvalidInput(format!("CSR: {e}")))?;
        validate_validity_days(validity_days)?;

        let workspace = ScratchWorkspace::acquire("sign")?;
        let csr_path = workspace.write_private(CSR_FILE, csr_pem.as_bytes())?;
        let mut cmd = self.step(&workspace);
        cmd.args(["ca", "sign"])
            .arg(csr_path)
            .arg(workspace.file(CERT_FILE));
        self.ca_flags(&mut cmd);
        cmd.arg("--not-after").arg(not_after_flag(validity_days));

        run_bounded("sign", cmd, None, self.timeout(), &self.secrets()).await?;

        let bundle = self.collect("sign", &workspace, None).await?;
        info!(serial = %bundle.serial, not_after = %bundle.not_after, "CSR signed by CA");
        Ok(bundle)
    }

    async fn revoke(&self, serial: &str) -> Result<(), PkiError> {
        validate_name("serial", serial)?;

        let workspace = ScratchWorkspace::acquire("revoke")?;
        let mut cmd = self.step(&workspace);
        cmd.args(["ca", "revoke"]).arg(serial);
        self.ca_flags(&mut cmd);

        run_bounded("revoke", cmd, None, self.timeout(), &self.secrets()).await?;
        info!(serial, "Certificate revoked at CA");
        Ok(())
    }

    async fn fetch_chain(&self, cert_pem: &[u8]) -> Result<Vec<u8>, PkiError> {
        let workspace = ScratchWorkspace::acquire("chain")?;
        let cert_path = workspace.write_private(CERT_FILE, cert_pem)?;
        let mut cmd = self.step(&workspace);
        cmd.args(["certificate", "chain"])
            .arg(cert_path)
            .arg("--ca-url")
            .arg(&self.config.ca_url);
        if let Some(root) = &self.config.root_cert {
            cmd.arg("--root").arg(root);
        }

        let output = run_bounded("chain", cmd, None, self.timeout(), &self.secrets()).await?;
        ensure_pem_envelope(&output.stdout, &["CERTIFICATE"]).map_err(|e| {
            PkiError::UnexpectedOutput {
                operation: "chain",
                message: e.to_string(),
            }
        })?;
        debug!(bytes = output.stdout.len(), "Fetched issuing chain");
        Ok(output.stdout)
    }
}

impl<I: CertificateInspector> Pkcs12Packager for StepCliAuthority<I> {
    async fn package(&self, cert_pem: &[u8], key_pem: &[u8], password: &str) -> Result<Vec<u8>, PkiError> {
        if password.is_empty() {
            return Err(PkiError::InvalidInput(
                "a PKCS#12 bundle requires a password".into(),
            ));
        }

        let workspace = ScratchWorkspace::acquire("p12")?;
        let cert_path = workspace.write_private(CERT_FILE, cert_pem)?;
        let key_path = workspace.write_private(KEY_FILE, key_pem)?;
        let password_path = workspace.write_private(P12_PASSWORD_FILE, password.as_bytes())?;
        let mut cmd = self.step(&workspace);
        cmd.args(["certificate", "p12"])
            .arg(workspace.file(P12_FILE))
            .arg(cert_path)
            .arg(key_path)
            .arg("--password-file")
            .arg(password_path);

        let mut secrets = self.secrets();
        secrets.push(password);
        run_bounded("p12", cmd, None, self.timeout(), &secrets)
            .await
            .map_err(|e| PkiError::Pkcs12(e.to_string()))?;

        workspace
            .read_output("p12", P12_FILE)
            .map_err(|e| PkiError::Pkcs12(e.to_string()))
    }
}
