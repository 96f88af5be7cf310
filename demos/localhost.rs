//! Generates `localhost.key` and `localhost.crt` in the directory given as the
//! first argument (default: the current directory).
//!
//! The key is written in the traditional `RSA PRIVATE KEY` container with
//! owner-only permissions; the certificate is self-signed for one year.

use std::path::PathBuf;

use localca::encoding::{self, Format};
use localca::error::LocalCaError;
use localca::issuer::CertificateIssuer;
use localca::persist::{FilePermissions, StagedWrite};
use localca::profile::CertificateProfile;

fn main() -> Result<(), LocalCaError> {
    let dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let certified = CertificateProfile::localhost().self_signed(&CertificateIssuer::default())?;

    let key_pem = encoding::encode_rsa_private_key_pkcs1(certified.key(), Format::Pem)?;
    let cert_pem = encoding::encode_certificate(certified.certificate(), Format::Pem)?;

    let key = StagedWrite::stage(dir.join("localhost.key"), &key_pem, FilePermissions::OwnerOnly)?;
    let cert = StagedWrite::stage(dir.join("localhost.crt"), &cert_pem, FilePermissions::Public)?;
    let key_path = key.commit()?;
    let cert_path = cert.commit()?;

    println!(
        "Generated {} and {}",
        cert_path.display(),
        key_path.display()
    );
    Ok(())
}
