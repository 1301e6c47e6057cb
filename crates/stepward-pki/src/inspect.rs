//! Certificate inspection: recovering serial number and expiry from
//! issued PEM material.
//!
//! Two strategies sit behind [`CertificateInspector`]. The openssl
//! inspector pipes the PEM into `openssl x509 -noout -serial -enddate`
//! and parses its `serial=` and `notAfter=` lines. The native inspector
//! decodes the DER in-process and renders the serial the way openssl
//! prints it, so both strategies store identical values.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use tokio::process::Command;

use crate::command::run_bounded;
use crate::config::{CaConfig, InspectorKind};
use crate::error::PkiError;

/// Identity of one issued certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateIdentity {
    /// Serial number as reported by the inspector, without reformatting.
    pub serial: String,
    pub not_after: DateTime<Utc>,
}

pub trait CertificateInspector: Send + Sync {
    fn inspect(
        &self,
        cert_pem: &[u8],
    ) -> impl Future<Output = Result<CertificateIdentity, PkiError>> + Send;
}

/// Recover the identity of the first certificate in `cert_pem`.
///
/// Input that is not a PEM `CERTIFICATE` block fails as
/// [`PkiError::Malformed`]; a decodable block whose serial or expiry
/// cannot be recovered fails as [`PkiError::Unparseable`].
pub async fn parse_certificate<I: CertificateInspector>(
    inspector: &I,
    cert_pem: &[u8],
) -> Result<CertificateIdentity, PkiError> {
    ensure_pem_envelope(cert_pem, &["CERTIFICATE"])?;
    inspector.inspect(cert_pem).await
}

/// Decode the first PEM block and check its label.
pub fn ensure_pem_envelope(input: &[u8], labels: &[&str]) -> Result<pem::Pem, PkiError> {
    let block =
        pem::parse(input).map_err(|e| PkiError::Malformed(format!("PEM decode failed: {e}")))?;
    if !labels.contains(&block.tag()) {
        return Err(PkiError::Malformed(format!(
            "unexpected PEM block '{}', expected {}",
            block.tag(),
            labels.join(" or ")
        )));
    }
    Ok(block)
}

/// Parse `serial=` and `notAfter=` lines as printed by
/// `openssl x509 -noout -serial -enddate`.
///
/// Lines may arrive in any order, other lines are ignored, and both
/// keys must be present.
pub fn parse_inspection_output(text: &str) -> Result<CertificateIdentity, PkiError> {
    let mut serial = None;
    let mut not_after = None;

    for line in text.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("serial=") {
            serial = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("notAfter=") {
            not_after = Some(parse_not_after(value)?);
        }
    }

    let serial = serial
        .filter(|serial| !serial.is_empty())
        .ok_or_else(|| PkiError::Unparseable("inspection output has no serial".into()))?;
    let not_after = not_after
        .ok_or_else(|| PkiError::Unparseable("inspection output has no notAfter".into()))?;

    Ok(CertificateIdentity { serial, not_after })
}

/// Parse an expiry such as `Jan  2 15:04:05 2031 GMT`.
///
/// Runs of whitespace are collapsed first, so space-padded single-digit
/// days parse. The trailing zone is an abbreviation openssl always
/// prints as `GMT`; any alphabetic zone token is accepted and the time
/// is taken as UTC.
fn parse_not_after(value: &str) -> Result<DateTime<Utc>, PkiError> {
    let tokens: Vec<&str> = value.split_whitespace().collect();
    let [month, day, time, year, zone] = tokens.as_slice() else {
        return Err(PkiError::Unparseable(format!(
            "notAfter '{value}' is not in 'Mon D HH:MM:SS YYYY ZONE' form"
        )));
    };
    if !zone.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(PkiError::Unparseable(format!(
            "notAfter '{value}' has an unrecognized zone '{zone}'"
        )));
    }

    let normalized = format!("{month} {day} {time} {year}");
    NaiveDateTime::parse_from_str(&normalized, "%b %d %H:%M:%S %Y")
        .map(|naive| naive.and_utc())
        .map_err(|e| PkiError::Unparseable(format!("notAfter '{value}': {e}")))
}

// ---------------------------------------------------------------------------
// openssl
// ---------------------------------------------------------------------------

pub struct OpensslInspector {
    binary: PathBuf,
    timeout: Duration,
}

impl OpensslInspector {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

impl CertificateInspector for OpensslInspector {
    async fn inspect(&self, cert_pem: &[u8]) -> Result<CertificateIdentity, PkiError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["x509", "-noout", "-serial", "-enddate"]);

        let output = match run_bounded("inspect", cmd, Some(cert_pem), self.timeout, &[]).await {
            Ok(output) => output,
            Err(PkiError::CommandFailed { output, .. }) => {
                return Err(PkiError::Unparseable(format!("openssl rejected the certificate: {output}")));
            }
            Err(err) => return Err(err),
        };

        parse_inspection_output(&String::from_utf8_lossy(&output.stdout))
    }
}

// ---------------------------------------------------------------------------
// native
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
pub struct NativeInspector;

impl NativeInspector {
    fn identity(cert_pem: &[u8]) -> Result<CertificateIdentity, PkiError> {
        let block = ensure_pem_envelope(cert_pem, &["CERTIFICATE"])?;
        let (_, cert) = x509_parser::parse_x509_certificate(block.contents())
            .map_err(|e| PkiError::Unparseable(format!("X.509 decode failed: {e}")))?;

        let serial = openssl_serial(cert.raw_serial());
        let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
            .ok_or_else(|| PkiError::Unparseable("notAfter is out of range".into()))?;

        Ok(CertificateIdentity { serial, not_after })
    }
}

impl CertificateInspector for NativeInspector {
    async fn inspect(&self, cert_pem: &[u8]) -> Result<CertificateIdentity, PkiError> {
        Self::identity(cert_pem)
    }
}

/// Uppercase hex of the serial magnitude, two digits per byte, the way
/// `openssl x509 -serial` prints it.
fn openssl_serial(raw: &[u8]) -> String {
    match raw.iter().position(|b| *b != 0) {
        Some(start) => raw[start..].iter().map(|b| format!("{b:02X}")).collect(),
        None => "00".into(),
    }
}

// ---------------------------------------------------------------------------
// configured
// ---------------------------------------------------------------------------

/// The inspector chosen by [`CaConfig::inspector`].
pub enum ConfiguredInspector {
    Openssl(OpensslInspector),
    Native(NativeInspector),
}

impl ConfiguredInspector {
    pub fn from_config(config: &CaConfig) -> Self {
        match config.inspector {
            InspectorKind::Openssl => ConfiguredInspector::Openssl(OpensslInspector::new(
                config.openssl_binary.clone(),
                config.command_timeout(),
            )),
            InspectorKind::Native => ConfiguredInspector::Native(NativeInspector),
        }
    }
}

impl CertificateInspector for ConfiguredInspector {
    async fn inspect(&self, cert_pem: &[u8]) -> Result<CertificateIdentity, PkiError> {
        match self {
            ConfiguredInspector::Openssl(inner) => inner.inspect(cert_pem).await,
            ConfiguredInspector::Native(inner) => inner.inspect(cert_pem).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn test_cert(serial: Vec<u8>) -> String {
        let mut params = rcgen::CertificateParams::new(vec!["svc.internal".to_string()]).unwrap();
        params.serial_number = Some(rcgen::SerialNumber::from(serial));
        params.not_after = rcgen::date_time_ymd(2031, 3, 4);
        let key = rcgen::KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().pem()
    }

    #[test]
    fn parses_openssl_output() {
        let identity =
            parse_inspection_output("serial=0123ABCD\nnotAfter=Jan  2 15:04:05 2031 GMT\n").unwrap();
        assert_eq!(identity.serial, "0123ABCD");
        assert_eq!(
            identity.not_after,
            Utc.with_ymd_and_hms(2031, 1, 2, 15, 4, 5).unwrap()
        );
    }

    #[test]
    fn line_order_and_extra_lines_do_not_matter() {
        let identity = parse_inspection_output(
            "subject=CN = svc\r\nnotAfter=Dec 31 23:59:59 2030 GMT\r\nserial=FF\r\n",
        )
        .unwrap();
        assert_eq!(identity.serial, "FF");
        assert_eq!(
            identity.not_after,
            Utc.with_ymd_and_hms(2030, 12, 31, 23, 59, 59).unwrap()
        );
    }

    #[test]
    fn any_alphabetic_zone_is_read_as_utc() {
        let identity =
            parse_inspection_output("serial=01\nnotAfter=Jun 15 08:00:00 2029 UTC").unwrap();
        assert_eq!(
            identity.not_after,
            Utc.with_ymd_and_hms(2029, 6, 15, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn missing_keys_are_unparseable() {
        let err = parse_inspection_output("notAfter=Jan 2 15:04:05 2031 GMT").unwrap_err();
        assert!(matches!(err, PkiError::Unparseable(m) if m.contains("serial")));

        let err = parse_inspection_output("serial=0A").unwrap_err();
        assert!(matches!(err, PkiError::Unparseable(m) if m.contains("notAfter")));

        assert!(matches!(
            parse_inspection_output("").unwrap_err(),
            PkiError::Unparseable(_)
        ));
    }

    #[test]
    fn garbled_dates_are_unparseable() {
        for date in [
            "2031-01-02T15:04:05Z",
            "Foo 2 15:04:05 2031 GMT",
            "Jan 2 15:04:05 2031 +0000",
            "Jan 2 15:04:05 2031",
        ] {
            let text = format!("serial=01\nnotAfter={date}");
            assert!(
                matches!(parse_inspection_output(&text), Err(PkiError::Unparseable(_))),
                "{date} should not parse"
            );
        }
    }

    #[test]
    fn envelope_rejects_non_pem_and_wrong_labels() {
        assert!(matches!(
            ensure_pem_envelope(b"not pem at all", &["CERTIFICATE"]),
            Err(PkiError::Malformed(_))
        ));

        let key = rcgen::KeyPair::generate().unwrap();
        assert!(matches!(
            ensure_pem_envelope(key.serialize_pem().as_bytes(), &["CERTIFICATE"]),
            Err(PkiError::Malformed(m)) if m.contains("PRIVATE KEY")
        ));
    }

    #[test]
    fn serial_is_rendered_like_openssl() {
        assert_eq!(openssl_serial(&[0x00, 0x8A, 0x01]), "8A01");
        assert_eq!(openssl_serial(&[0x0A, 0xBC, 0xDE]), "0ABCDE");
        assert_eq!(openssl_serial(&[0x00]), "00");
    }

    #[tokio::test]
    async fn native_inspector_reads_serial_and_expiry() {
        let pem = test_cert(vec![0x0A, 0xBC, 0xDE]);
        let identity = parse_certificate(&NativeInspector, pem.as_bytes()).await.unwrap();
        assert_eq!(identity.serial, "0ABCDE");
        assert_eq!(
            identity.not_after,
            Utc.with_ymd_and_hms(2031, 3, 4, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn parse_certificate_rejects_garbage_as_malformed() {
        let err = parse_certificate(&NativeInspector, b"garbage").await.unwrap_err();
        assert!(matches!(err, PkiError::Malformed(_)));
    }

    #[tokio::test]
    async fn corrupt_der_is_unparseable() {
        let block = pem::Pem::new("CERTIFICATE", vec![0x30, 0x03, 0x02, 0x01]);
        let text = pem::encode(&block);
        let err = parse_certificate(&NativeInspector, text.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, PkiError::Unparseable(_)));
    }
}
