//! Certificate signing request inspection.
//!
//! The CA agent signs whatever it is given; the subject recorded for a
//! CSR-signed certificate comes from the request itself, after its
//! self-signature has been checked.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::prelude::FromDer;

use crate::error::PkiError;
use crate::inspect::ensure_pem_envelope;

const CSR_LABELS: &[&str] = &["CERTIFICATE REQUEST", "NEW CERTIFICATE REQUEST"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrSubject {
    pub common_name: String,
    pub sans: Vec<String>,
}

/// Decode `csr_pem`, verify its signature, and extract CN and SANs.
///
/// A request without a CN falls back to its first SAN; a request with
/// neither is rejected. Every failure is [`PkiError::InvalidInput`].
pub fn inspect_csr(csr_pem: &str) -> Result<CsrSubject, PkiError> {
    let block = ensure_pem_envelope(csr_pem.as_bytes(), CSR_LABELS)
        .map_err(|e| PkiError::InvalidInput(format!("CSR: {e}")))?;

    let (_, csr) = X509CertificationRequest::from_der(block.contents())
        .map_err(|e| PkiError::InvalidInput(format!("CSR could not be decoded: {e}")))?;
    csr.verify_signature()
        .map_err(|e| PkiError::InvalidInput(format!("CSR signature verification failed: {e}")))?;

    let sans = requested_sans(&csr);
    let common_name = csr
        .certification_request_info
        .subject
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_string)
        .filter(|cn| !cn.trim().is_empty())
        .or_else(|| sans.first().cloned())
        .ok_or_else(|| {
            PkiError::InvalidInput("CSR has neither a common name nor a subject alternative name".into())
        })?;

    Ok(CsrSubject { common_name, sans })
}

fn requested_sans(csr: &X509CertificationRequest<'_>) -> Vec<String> {
    let mut sans = Vec::new();
    let Some(extensions) = csr.requested_extensions() else {
        return sans;
    };
    for ext in extensions {
        let ParsedExtension::SubjectAlternativeName(san) = ext else {
            continue;
        };
        for name in &san.general_names {
            match name {
                GeneralName::DNSName(dns) => sans.push(dns.to_string()),
                GeneralName::RFC822Name(email) => sans.push(email.to_string()),
                GeneralName::URI(uri) => sans.push(uri.to_string()),
                GeneralName::IPAddress(bytes) => {
                    if let Some(ip) = ip_from_bytes(bytes) {
                        sans.push(ip.to_string());
                    }
                }
                _ => {}
            }
        }
    }
    sans
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(|b| IpAddr::V4(Ipv4Addr::from(b))),
        16 => <[u8; 16]>::try_from(bytes).ok().map(|b| IpAddr::V6(Ipv6Addr::from(b))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

    use super::*;

    fn csr(cn: Option<&str>, sans: &[&str]) -> String {
        let mut params =
            CertificateParams::new(sans.iter().map(|s| s.to_string()).collect::<Vec<_>>()).unwrap();
        let mut dn = DistinguishedName::new();
        if let Some(cn) = cn {
            dn.push(DnType::CommonName, cn);
        }
        params.distinguished_name = dn;
        let key = KeyPair::generate().unwrap();
        params.serialize_request(&key).unwrap().pem().unwrap()
    }

    #[test]
    fn extracts_common_name_and_sans() {
        let pem = csr(Some("api.internal"), &["api.internal", "10.0.0.7"]);
        let subject = inspect_csr(&pem).unwrap();
        assert_eq!(subject.common_name, "api.internal");
        assert_eq!(subject.sans, vec!["api.internal", "10.0.0.7"]);
    }

    #[test]
    fn first_san_stands_in_for_missing_common_name() {
        let pem = csr(None, &["db.internal", "db2.internal"]);
        let subject = inspect_csr(&pem).unwrap();
        assert_eq!(subject.common_name, "db.internal");
    }

    #[test]
    fn request_without_any_name_is_rejected() {
        let pem = csr(None, &[]);
        assert!(matches!(inspect_csr(&pem), Err(PkiError::InvalidInput(_))));
    }

    #[test]
    fn non_csr_input_is_rejected() {
        assert!(matches!(inspect_csr("hello"), Err(PkiError::InvalidInput(_))));

        let key = KeyPair::generate().unwrap();
        let cert = CertificateParams::new(vec!["x.internal".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();
        assert!(matches!(
            inspect_csr(&cert.pem()),
            Err(PkiError::InvalidInput(m)) if m.contains("CERTIFICATE")
        ));
    }

    #[test]
    fn tampered_request_fails_signature_check() {
        let request = csr(Some("api.internal"), &["api.internal"]);
        let block = pem::parse(&request).unwrap();
        let mut der = block.contents().to_vec();
        // Flip a byte inside the subject so the signature no longer covers it.
        let pos = der
            .windows(b"api.internal".len())
            .position(|w| w == b"api.internal")
            .unwrap();
        der[pos] = b'x';
        let tampered = pem::encode(&pem::Pem::new("CERTIFICATE REQUEST", der));
        assert!(matches!(inspect_csr(&tampered), Err(PkiError::InvalidInput(_))));
    }
}
