use bon::Builder;
use der::asn1::BitString;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::cert::Certificate;
use crate::cert::params::DistinguishedName;
use crate::error::{LocalCaError, Result};
use crate::key::{KeyPair, PublicKey};
use crate::signing::{DigestAlgorithm, SignatureAlgorithm, sign_data};
use crate::template::{CertificateTemplate, hex};

/// Signs certificate templates.
///
/// The only knob is how far in the future a template's `not_before` may lie
/// relative to the clock. The default tolerance is zero.
///
/// # Example
/// ```
/// use localca::issuer::CertificateIssuer;
///
/// let strict = CertificateIssuer::default();
/// let lenient = CertificateIssuer::builder()
///     .clock_skew_tolerance(time::Duration::minutes(5))
///     .build();
/// assert!(lenient.clock_skew_tolerance() > strict.clock_skew_tolerance());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Builder)]
pub struct CertificateIssuer {
    #[builder(default)]
    clock_skew_tolerance: Duration,
}

impl CertificateIssuer {
    pub fn clock_skew_tolerance(&self) -> Duration {
        self.clock_skew_tolerance
    }

    /// Issues a certificate from `template`, signed by `signing_key`.
    ///
    /// # Errors
    /// * `WeakDigestRejected` if `digest` is below 256 bits.
    /// * `SigningKeyMismatch` if `signing_key` is not the template's intended
    ///   signer or cannot sign with `digest`.
    /// * `ClockSkew` if the template starts later than now plus the tolerance.
    pub fn issue(
        &self,
        template: &CertificateTemplate,
        signing_key: &KeyPair,
        digest: DigestAlgorithm,
    ) -> Result<Certificate> {
        self.issue_at(template, signing_key, digest, OffsetDateTime::now_utc())
    }

    /// [`issue`](Self::issue) against an explicit clock reading.
    pub fn issue_at(
        &self,
        template: &CertificateTemplate,
        signing_key: &KeyPair,
        digest: DigestAlgorithm,
        now: OffsetDateTime,
    ) -> Result<Certificate> {
        digest.ensure_strong()?;

        if signing_key.public_key() != *template.issuer_public_key() {
            return Err(LocalCaError::SigningKeyMismatch(format!(
                "{} signing key is not the intended signer of {}",
                signing_key.algorithm(),
                template.subject()
            )));
        }
        let signature_algorithm = SignatureAlgorithm::for_key(signing_key.algorithm(), digest)?;

        let not_before = template.validity().not_before();
        // A tolerance reaching past the last representable instant never rejects.
        let latest_start = now.checked_add(self.clock_skew_tolerance);
        if latest_start.is_some_and(|latest| not_before > latest) {
            warn!(
                %not_before,
                %now,
                tolerance = %self.clock_skew_tolerance,
                "refusing to issue a certificate that starts in the future"
            );
            return Err(LocalCaError::ClockSkew {
                not_before,
                now,
                tolerance: self.clock_skew_tolerance,
            });
        }

        let tbs_certificate = template
            .to_tbs_certificate(signature_algorithm)
            .to_tbs_certificate_inner()?;
        let tbs_der = der::Encode::to_der(&tbs_certificate)?;
        let signature = sign_data(signing_key, signature_algorithm, &tbs_der)?;

        debug!(
            subject = %template.subject(),
            issuer = %template.issuer(),
            serial = %hex(template.serial_number().as_bytes()),
            algorithm = ?signature_algorithm,
            "issued certificate"
        );

        Ok(Certificate::from_inner(x509_cert::Certificate {
            tbs_certificate,
            signature_algorithm: signature_algorithm.to_algorithm_identifier(),
            signature: BitString::from_bytes(&signature)?,
        }))
    }
}

/// A certificate together with its private key, able to sign further
/// certificates as a CA.
#[derive(Debug)]
pub struct CertifiedKey {
    certificate: Certificate,
    key: KeyPair,
}

impl CertifiedKey {
    /// # Errors
    /// `SigningKeyMismatch` unless `key` is the private half of the key
    /// certified by `certificate`.
    pub fn new(certificate: Certificate, key: KeyPair) -> Result<Self> {
        if certificate.public_key()? != key.public_key() {
            return Err(LocalCaError::SigningKeyMismatch(
                "private key does not match the certificate".to_string(),
            ));
        }
        Ok(Self { certificate, key })
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn key(&self) -> &KeyPair {
        &self.key
    }

    /// The subject of the certificate, which is the issuer name of everything
    /// this key signs.
    pub fn name(&self) -> Result<DistinguishedName> {
        self.certificate.subject()
    }

    pub fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    pub fn into_parts(self) -> (Certificate, KeyPair) {
        (self.certificate, self.key)
    }

    /// Signs `template` with this CA key.
    ///
    /// # Errors
    /// `SigningKeyMismatch` if `template` names a different issuer, plus every
    /// error of [`CertificateIssuer::issue`].
    pub fn issue(
        &self,
        issuer: &CertificateIssuer,
        template: &CertificateTemplate,
        digest: DigestAlgorithm,
    ) -> Result<Certificate> {
        if *template.issuer() != self.name()? {
            return Err(LocalCaError::SigningKeyMismatch(format!(
                "template issuer {} is not {}",
                template.issuer(),
                self.name()?
            )));
        }
        issuer.issue(template, &self.key, digest)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::cert::params::ValidityWindow;
    use crate::key::KeyAlgorithm;

    fn template_for(key: &KeyPair, validity: ValidityWindow) -> CertificateTemplate {
        CertificateTemplate::builder()
            .subject(DistinguishedName::from_common_name("issuer.test"))
            .subject_public_key(key.public_key())
            .validity(validity)
            .build()
            .unwrap()
    }

    #[test]
    fn test_rejects_sha1() {
        let key = KeyPair::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let template = template_for(&key, ValidityWindow::for_days(1).unwrap());
        let err = CertificateIssuer::default()
            .issue(&template, &key, DigestAlgorithm::Sha1)
            .unwrap_err();
        assert!(matches!(err, LocalCaError::WeakDigestRejected(_)));
    }

    #[test]
    fn test_rejects_foreign_signing_key() {
        let key = KeyPair::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let other = KeyPair::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let template = template_for(&key, ValidityWindow::for_days(1).unwrap());
        let err = CertificateIssuer::default()
            .issue(&template, &other, DigestAlgorithm::Sha256)
            .unwrap_err();
        assert!(matches!(err, LocalCaError::SigningKeyMismatch(_)));
    }

    #[test]
    fn test_rejects_incompatible_digest() {
        let key = KeyPair::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let template = template_for(&key, ValidityWindow::for_days(1).unwrap());
        let err = CertificateIssuer::default()
            .issue(&template, &key, DigestAlgorithm::Sha384)
            .unwrap_err();
        assert!(matches!(err, LocalCaError::SigningKeyMismatch(_)));
    }

    #[test]
    fn test_clock_skew() {
        let key = KeyPair::generate(KeyAlgorithm::Ed25519).unwrap();
        let now = datetime!(2025-03-01 12:00 UTC);
        let template = template_for(
            &key,
            ValidityWindow::starting_at(now + Duration::minutes(2), 30).unwrap(),
        );

        let err = CertificateIssuer::default()
            .issue_at(&template, &key, DigestAlgorithm::Sha256, now)
            .unwrap_err();
        assert_eq!(
            err,
            LocalCaError::ClockSkew {
                not_before: now + Duration::minutes(2),
                now,
                tolerance: Duration::ZERO,
            }
        );

        let lenient = CertificateIssuer::builder()
            .clock_skew_tolerance(Duration::minutes(5))
            .build();
        lenient
            .issue_at(&template, &key, DigestAlgorithm::Sha256, now)
            .unwrap();
    }

    #[test]
    fn test_unbounded_clock_skew_tolerance() {
        let key = KeyPair::generate(KeyAlgorithm::Ed25519).unwrap();
        let now = datetime!(2025-03-01 12:00 UTC);
        let template = template_for(
            &key,
            ValidityWindow::starting_at(now + Duration::days(400), 30).unwrap(),
        );

        let unbounded = CertificateIssuer::builder()
            .clock_skew_tolerance(Duration::MAX)
            .build();
        let cert = unbounded
            .issue_at(&template, &key, DigestAlgorithm::Sha256, now)
            .unwrap();
        cert.verify(&key.public_key()).unwrap();
    }

    #[test]
    fn test_outer_and_inner_algorithms_match() {
        let key = KeyPair::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let template = template_for(&key, ValidityWindow::for_days(1).unwrap());
        let cert = CertificateIssuer::default()
            .issue(&template, &key, DigestAlgorithm::Sha256)
            .unwrap();
        let inner = cert.as_inner();
        assert_eq!(inner.signature_algorithm, inner.tbs_certificate.signature);
        assert_eq!(
            inner.signature_algorithm.oid,
            const_oid::db::rfc5912::ECDSA_WITH_SHA_256
        );
    }

    #[test]
    fn test_certified_key_rejects_wrong_key() {
        let key = KeyPair::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let template = template_for(&key, ValidityWindow::for_days(1).unwrap());
        let cert = CertificateIssuer::default()
            .issue(&template, &key, DigestAlgorithm::Sha256)
            .unwrap();

        let other = KeyPair::generate(KeyAlgorithm::EcdsaP256).unwrap();
        assert!(matches!(
            CertifiedKey::new(cert.clone(), other),
            Err(LocalCaError::SigningKeyMismatch(_))
        ));
        CertifiedKey::new(cert, key).unwrap();
    }

    #[test]
    fn test_certified_key_signs_leaf() {
        let issuer = CertificateIssuer::default();
        let ca_key = KeyPair::generate(KeyAlgorithm::EcdsaP384).unwrap();
        let ca_template = CertificateTemplate::builder()
            .subject(DistinguishedName::parse("O=Test,CN=Test CA").unwrap())
            .subject_public_key(ca_key.public_key())
            .validity(ValidityWindow::for_days(30).unwrap())
            .build()
            .unwrap();
        let ca_cert = issuer
            .issue(&ca_template, &ca_key, DigestAlgorithm::Sha384)
            .unwrap();
        let ca = CertifiedKey::new(ca_cert, ca_key).unwrap();

        let leaf_key = KeyPair::generate(KeyAlgorithm::Ed25519).unwrap();
        let leaf_template = CertificateTemplate::builder()
            .subject(DistinguishedName::from_common_name("leaf.test"))
            .issuer(ca.name().unwrap())
            .subject_public_key(leaf_key.public_key())
            .issuer_public_key(ca.public_key())
            .validity(ValidityWindow::for_days(7).unwrap())
            .build()
            .unwrap();
        let leaf = ca
            .issue(&issuer, &leaf_template, DigestAlgorithm::Sha384)
            .unwrap();

        leaf.verify(&ca.public_key()).unwrap();
        assert!(leaf.verify_self_signed().is_err());
        assert_eq!(leaf.issuer().unwrap(), ca.name().unwrap());

        let stray_template = CertificateTemplate::builder()
            .subject(DistinguishedName::from_common_name("stray.test"))
            .issuer(DistinguishedName::from_common_name("Someone Else"))
            .subject_public_key(leaf_key.public_key())
            .issuer_public_key(ca.public_key())
            .validity(ValidityWindow::for_days(7).unwrap())
            .build()
            .unwrap();
        assert!(matches!(
            ca.issue(&issuer, &stray_template, DigestAlgorithm::Sha384),
            Err(LocalCaError::SigningKeyMismatch(_))
        ));
    }
}
