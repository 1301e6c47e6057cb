//! Download bundle assembly.
//!
//! Archive layout, in order:
//!
//! | entry           | present when                               |
//! |-----------------|--------------------------------------------|
//! | `cert.pem`      | always                                     |
//! | `chain.pem`     | always                                     |
//! | `fullchain.pem` | always (certificate followed by chain)     |
//! | `privkey.pem`   | the CA generated the key                   |
//! | `cert.p12`      | PFX requested and a key is present         |
//! | `README.txt`    | always                                     |
//!
//! Entries carry a fixed timestamp, so identical inputs produce
//! identical archives.

use std::io::{Cursor, Write};
use std::str::FromStr;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::authority::{CertificateBundle, Pkcs12Packager};
use crate::error::PkiError;

pub const BUNDLE_MIME_TYPE: &str = "application/zip";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BundleFormat {
    #[default]
    Pem,
    /// PEM files plus a password-protected PKCS#12.
    Pfx,
}

impl FromStr for BundleFormat {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "pem" => Ok(BundleFormat::Pem),
            "pfx" => Ok(BundleFormat::Pfx),
            other => Err(PkiError::InvalidInput(format!(
                "unknown bundle format '{other}', expected 'pem' or 'pfx'"
            ))),
        }
    }
}

/// `<cn>-cert-bundle.zip`, with characters unsafe in a file name
/// replaced by `_`.
pub fn bundle_filename(common_name: &str) -> String {
    let stem: String = common_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{stem}-cert-bundle.zip")
}

/// Build the ZIP archive for `bundle`.
pub async fn assemble<P: Pkcs12Packager>(
    packager: &P,
    bundle: &CertificateBundle,
    format: BundleFormat,
    pfx_password: Option<&str>,
) -> Result<Vec<u8>, PkiError> {
    let p12 = match (format, bundle.key_pem.as_deref()) {
        (BundleFormat::Pfx, Some(key_pem)) => {
            let password = pfx_password.filter(|p| !p.is_empty()).ok_or_else(|| {
                PkiError::InvalidInput("a PFX bundle requires a password".into())
            })?;
            Some(packager.package(&bundle.cert_pem, key_pem, password).await?)
        }
        _ => None,
    };

    let fullchain = [bundle.cert_pem.as_slice(), &bundle.chain_pem].concat();
    let guide = render_install_guide(bundle.key_pem.is_some(), p12.is_some());

    let mut entries: Vec<(&str, &[u8], u32)> = vec![
        ("cert.pem", bundle.cert_pem.as_slice(), 0o644),
        ("chain.pem", bundle.chain_pem.as_slice(), 0o644),
        ("fullchain.pem", fullchain.as_slice(), 0o644),
    ];
    if let Some(key_pem) = &bundle.key_pem {
        entries.push(("privkey.pem", key_pem.as_slice(), 0o600));
    }
    if let Some(p12) = &p12 {
        entries.push(("cert.p12", p12.as_slice(), 0o600));
    }
    entries.push(("README.txt", guide.as_bytes(), 0o644));

    write_archive(&entries)
}

fn write_archive(entries: &[(&str, &[u8], u32)]) -> Result<Vec<u8>, PkiError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents, mode) in entries {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(*mode);
        writer.start_file(*name, options)?;
        writer
            .write_all(contents)
            .map_err(|e| PkiError::Archive(format!("writing {name}: {e}")))?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Plain-text installation guide listing exactly the files present.
pub fn render_install_guide(has_key: bool, has_p12: bool) -> String {
    let mut guide = String::from("Certificate Installation Instructions\n");
    guide.push_str("=====================================\n\n");

    guide.push_str("Files in this bundle\n--------------------\n");
    guide.push_str("- cert.pem: your certificate\n");
    guide.push_str("- chain.pem: issuing chain (intermediate and root CAs)\n");
    guide.push_str("- fullchain.pem: certificate followed by chain; use this for most servers\n");
    if has_key {
        guide.push_str("- privkey.pem: private key; keep it secret, it is not stored anywhere else\n");
    }
    if has_p12 {
        guide.push_str(
            "- cert.p12: PKCS#12 bundle of certificate and key, protected with the password you chose\n",
        );
    }
    guide.push_str("- README.txt: this file\n\n");

    guide.push_str("Linux (nginx, Apache, ...)\n--------------------------\n");
    guide.push_str("    sudo cp fullchain.pem /etc/ssl/certs/your-domain.crt\n");
    if has_key {
        guide.push_str("    sudo cp privkey.pem /etc/ssl/private/your-domain.key\n");
        guide.push_str("    sudo chmod 600 /etc/ssl/private/your-domain.key\n\n");
        guide.push_str("    # nginx server block:\n");
        guide.push_str("    #   ssl_certificate     /etc/ssl/certs/your-domain.crt;\n");
        guide.push_str("    #   ssl_certificate_key /etc/ssl/private/your-domain.key;\n");
    } else {
        guide.push_str("\n    # Pair the certificate with the private key behind your CSR:\n");
        guide.push_str("    #   ssl_certificate     /etc/ssl/certs/your-domain.crt;\n");
        guide.push_str("    #   ssl_certificate_key <path to your key>;\n");
    }
    guide.push_str("    sudo nginx -s reload\n\n");

    if has_p12 {
        guide.push_str("Windows (IIS)\n-------------\n");
        guide.push_str("1. Import cert.p12 into the Local Machine certificate store.\n");
        guide.push_str("2. Bind the certificate to your site in IIS Manager.\n\n");
    }

    guide.push_str("Trusting the CA\n---------------\n");
    guide.push_str("Linux:\n");
    guide.push_str("    sudo cp chain.pem /usr/local/share/ca-certificates/stepward-ca.crt\n");
    guide.push_str("    sudo update-ca-certificates\n");
    guide.push_str("Windows PowerShell:\n");
    guide.push_str(
        "    Import-Certificate -FilePath chain.pem -CertStoreLocation Cert:\\LocalMachine\\Root\n\n",
    );

    guide.push_str("Verification\n------------\n");
    guide.push_str("    openssl verify -CAfile chain.pem cert.pem\n");
    guide.push_str("    openssl x509 -in cert.pem -text -noout\n");
    guide.push_str("    openssl s_client -connect your-domain:443 -showcerts\n");
    guide
}
