pub mod extensions;
pub mod params;

use der::{Decode, DecodePem, Encode, EncodePem};
use extensions::ToAndFromX509Extension;
use params::{DistinguishedName, ExtensionSet, ValidityWindow};
use sha2::{Digest, Sha256};
use x509_cert::serial_number::SerialNumber;

use crate::error::{LocalCaError, Result};
use crate::key::PublicKey;
use crate::signing::{SignatureAlgorithm, verify_signature};
use crate::tbs_certificate::TbsCertificate;

/// Represents a signed X.509 certificate.
///
/// Certificates are immutable: accessors decode from the signed structure,
/// so what they report is exactly what was signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    inner: x509_cert::Certificate,
}

impl Certificate {
    pub(crate) fn from_inner(inner: x509_cert::Certificate) -> Self {
        Self { inner }
    }

    /// The underlying `x509-cert` structure.
    pub fn as_inner(&self) -> &x509_cert::Certificate {
        &self.inner
    }

    /// Encodes the certificate into DER format.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.inner.to_der()?)
    }

    /// Encodes the certificate into PEM format (`CERTIFICATE` label, LF line endings).
    pub fn to_pem(&self) -> Result<String> {
        Ok(self.inner.to_pem(pkcs8::LineEnding::LF)?)
    }

    /// Parses a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        Ok(Self::from_inner(x509_cert::Certificate::from_der(der)?))
    }

    /// Parses a PEM-encoded certificate.
    pub fn from_pem(pem: impl AsRef<[u8]>) -> Result<Self> {
        Ok(Self::from_inner(x509_cert::Certificate::from_pem(pem)?))
    }

    pub fn serial_number(&self) -> &SerialNumber {
        &self.inner.tbs_certificate.serial_number
    }

    pub fn subject(&self) -> Result<DistinguishedName> {
        DistinguishedName::from_x509_name(&self.inner.tbs_certificate.subject)
    }

    pub fn issuer(&self) -> Result<DistinguishedName> {
        DistinguishedName::from_x509_name(&self.inner.tbs_certificate.issuer)
    }

    pub fn validity(&self) -> Result<ValidityWindow> {
        ValidityWindow::from_x509_validity(&self.inner.tbs_certificate.validity)
    }

    /// The certified (subject) public key.
    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_spki(&self.inner.tbs_certificate.subject_public_key_info)
    }

    pub fn extensions(&self) -> Result<ExtensionSet> {
        Ok(self.tbs_certificate()?.extensions)
    }

    /// Looks up and decodes a typed extension, `None` when absent.
    pub fn extension<E: ToAndFromX509Extension>(&self) -> Result<Option<E>> {
        self.extensions()?.find::<E>()
    }

    /// The outer signature algorithm.
    pub fn signature_algorithm(&self) -> Result<SignatureAlgorithm> {
        SignatureAlgorithm::from_algorithm_identifier(&self.inner.signature_algorithm)
    }

    /// The decoded to-be-signed fields.
    pub fn tbs_certificate(&self) -> Result<TbsCertificate> {
        TbsCertificate::from_tbs_certificate_inner(&self.inner.tbs_certificate)
    }

    /// The signed bytes: DER of the `tbsCertificate` field.
    pub fn tbs_der(&self) -> Result<Vec<u8>> {
        Ok(self.inner.tbs_certificate.to_der()?)
    }

    pub fn signature(&self) -> &[u8] {
        self.inner.signature.raw_bytes()
    }

    /// Verifies the certificate signature against `issuer_key`.
    ///
    /// # Errors
    /// `SignatureInvalid` if the signature does not verify, or if the outer
    /// and inner signature algorithm identifiers disagree.
    pub fn verify(&self, issuer_key: &PublicKey) -> Result<()> {
        if self.inner.signature_algorithm != self.inner.tbs_certificate.signature {
            return Err(LocalCaError::SignatureInvalid(
                "outer and inner signature algorithms differ".to_string(),
            ));
        }
        verify_signature(
            issuer_key,
            self.signature_algorithm()?,
            &self.tbs_der()?,
            self.signature(),
        )
    }

    /// Verifies the certificate against its own public key.
    pub fn verify_self_signed(&self) -> Result<()> {
        self.verify(&self.public_key()?)
    }

    /// True when the issuer and subject names are identical.
    pub fn is_self_issued(&self) -> bool {
        self.inner.tbs_certificate.issuer == self.inner.tbs_certificate.subject
    }

    /// SHA-256 over the DER encoding.
    pub fn fingerprint(&self) -> Result<[u8; 32]> {
        Ok(Sha256::digest(self.to_der()?).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::extensions::SubjectAltName;
    use crate::cert::params::Extension;
    use crate::issuer::CertificateIssuer;
    use crate::key::{KeyAlgorithm, KeyPair};
    use crate::signing::DigestAlgorithm;
    use crate::template::CertificateTemplate;

    fn self_signed(algorithm: KeyAlgorithm, digest: DigestAlgorithm) -> (Certificate, KeyPair) {
        let key = KeyPair::generate(algorithm).unwrap();
        let template = CertificateTemplate::builder()
            .subject(DistinguishedName::parse("O=Test,CN=cert.test").unwrap())
            .subject_public_key(key.public_key())
            .validity(ValidityWindow::for_days(10).unwrap())
            .extensions(vec![
                Extension::from_extension(&SubjectAltName::dns(["cert.test"]), false).unwrap(),
            ])
            .build()
            .unwrap();
        let cert = CertificateIssuer::default()
            .issue(&template, &key, digest)
            .unwrap();
        (cert, key)
    }

    #[test]
    fn test_der_and_pem_round_trip() {
        let (cert, _) = self_signed(KeyAlgorithm::EcdsaP256, DigestAlgorithm::Sha256);

        let der = cert.to_der().unwrap();
        assert_eq!(Certificate::from_der(&der).unwrap(), cert);

        let pem = cert.to_pem().unwrap();
        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----\n"));
        assert!(!pem.contains('\r'));
        assert_eq!(Certificate::from_pem(&pem).unwrap(), cert);
    }

    #[test]
    fn test_accessors() {
        let (cert, key) = self_signed(KeyAlgorithm::EcdsaP384, DigestAlgorithm::Sha384);

        assert_eq!(cert.subject().unwrap().common_name(), Some("cert.test"));
        assert_eq!(cert.issuer().unwrap(), cert.subject().unwrap());
        assert_eq!(cert.public_key().unwrap(), key.public_key());
        assert_eq!(
            cert.signature_algorithm().unwrap(),
            SignatureAlgorithm::EcdsaWithSha384
        );
        assert_eq!(
            cert.extension::<SubjectAltName>()
                .unwrap()
                .unwrap()
                .dns_names(),
            vec!["cert.test"]
        );
        assert!(cert.is_self_issued());
        assert_eq!(cert.validity().unwrap().duration(), time::Duration::days(10));
    }

    #[test]
    fn test_verify() {
        let (cert, key) = self_signed(KeyAlgorithm::Ed25519, DigestAlgorithm::Sha256);
        cert.verify_self_signed().unwrap();
        cert.verify(&key.public_key()).unwrap();

        let other = KeyPair::generate(KeyAlgorithm::Ed25519).unwrap();
        assert!(matches!(
            cert.verify(&other.public_key()),
            Err(LocalCaError::SignatureInvalid(_))
        ));
    }

    #[test]
    fn test_tampered_certificate_fails_verification() {
        let (cert, _) = self_signed(KeyAlgorithm::EcdsaP256, DigestAlgorithm::Sha256);
        let mut inner = cert.as_inner().clone();
        inner.tbs_certificate.subject = DistinguishedName::from_common_name("evil.test")
            .as_x509_name()
            .unwrap();
        let tampered = Certificate::from_inner(inner);
        assert!(matches!(
            tampered.verify(&cert.public_key().unwrap()),
            Err(LocalCaError::SignatureInvalid(_))
        ));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let (cert, _) = self_signed(KeyAlgorithm::EcdsaP256, DigestAlgorithm::Sha256);
        let reparsed = Certificate::from_der(&cert.to_der().unwrap()).unwrap();
        assert_eq!(cert.fingerprint().unwrap(), reparsed.fingerprint().unwrap());
    }
}
