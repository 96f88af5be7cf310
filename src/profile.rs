//! Named certificate configurations.
//!
//! A [`CertificateProfile`] collects the choices a caller makes when asking for
//! a certificate (who it is for, how long it lives, which key and digest) and
//! turns them into a [`CertificateTemplate`] with the standard extensions.

use bon::Builder;
use der::flagset::FlagSet;

use crate::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, ExtendedKeyUsageOption, KeyUsage,
    KeyUsages, SanType, SubjectAltName, SubjectKeyIdentifier,
};
use crate::cert::params::{AttributeType, DistinguishedName, Extension, ValidityWindow};
use crate::error::Result;
use crate::issuer::{CertificateIssuer, CertifiedKey};
use crate::key::{KeyAlgorithm, KeyPair, PublicKey};
use crate::signing::DigestAlgorithm;
use crate::template::CertificateTemplate;

/// What to put in a certificate, independent of any particular key.
///
/// # Example
/// ```
/// use localca::cert::params::DistinguishedName;
/// use localca::issuer::CertificateIssuer;
/// use localca::key::KeyAlgorithm;
/// use localca::profile::CertificateProfile;
///
/// let profile = CertificateProfile::builder()
///     .subject(DistinguishedName::from_common_name("Dev CA"))
///     .key_algorithm(KeyAlgorithm::EcdsaP256)
///     .is_ca(true)
///     .path_length(0)
///     .build();
/// let ca = profile.self_signed(&CertificateIssuer::default()).unwrap();
/// ca.certificate().verify_self_signed().unwrap();
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Builder)]
pub struct CertificateProfile {
    pub subject: DistinguishedName,
    #[builder(default)]
    pub subject_alt_names: Vec<SanType>,
    #[builder(default = 365)]
    pub validity_days: i64,
    #[builder(default = KeyAlgorithm::EcdsaP256)]
    pub key_algorithm: KeyAlgorithm,
    #[builder(default)]
    pub digest: DigestAlgorithm,
    #[builder(default)]
    pub is_ca: bool,
    pub path_length: Option<u8>,
    #[builder(default)]
    pub usages: Vec<ExtendedKeyUsageOption>,
}

impl CertificateProfile {
    /// A self-signed RSA-2048 server certificate for `localhost`, valid for
    /// 365 days and signed with SHA-256.
    pub fn localhost() -> Self {
        let subject = DistinguishedName::new()
            .with(AttributeType::Country, "US")
            .with(AttributeType::StateOrProvince, "CA")
            .with(AttributeType::Locality, "San Francisco")
            .with(AttributeType::Organization, "My Company")
            .with(AttributeType::CommonName, "localhost");

        Self::builder()
            .subject(subject)
            .subject_alt_names(vec![SanType::DnsName("localhost".to_string())])
            .validity_days(365)
            .key_algorithm(KeyAlgorithm::Rsa { bits: 2048 })
            .digest(DigestAlgorithm::Sha256)
            .usages(vec![ExtendedKeyUsageOption::ServerAuth])
            .build()
    }

    /// Key usage bits implied by the profile and the certified key type.
    fn key_usage(&self, subject_key: &PublicKey) -> FlagSet<KeyUsages> {
        let mut flags: FlagSet<KeyUsages> = KeyUsages::DigitalSignature.into();
        if self.is_ca {
            flags |= KeyUsages::KeyCertSign;
            flags |= KeyUsages::CRLSign;
        }
        let key_exchange = self.usages.iter().any(|usage| {
            matches!(
                usage,
                ExtendedKeyUsageOption::ServerAuth
                    | ExtendedKeyUsageOption::ClientAuth
                    | ExtendedKeyUsageOption::EmailProtection
            )
        });
        if key_exchange && matches!(subject_key, PublicKey::Rsa(_)) {
            flags |= KeyUsages::KeyEncipherment;
        }
        flags
    }

    fn extensions(&self, subject_key: &PublicKey, ca: Option<&CertifiedKey>) -> Result<Vec<Extension>> {
        let mut extensions = Vec::new();
        if self.is_ca {
            extensions.push(Extension::from_extension(
                &BasicConstraints::ca(self.path_length),
                true,
            )?);
        }
        extensions.push(Extension::from_extension(
            &KeyUsage(self.key_usage(subject_key)),
            true,
        )?);
        if !self.usages.is_empty() {
            extensions.push(Extension::from_extension(
                &ExtendedKeyUsage {
                    usage: self.usages.clone(),
                },
                false,
            )?);
        }
        if !self.subject_alt_names.is_empty() {
            extensions.push(Extension::from_extension(
                &SubjectAltName {
                    names: self.subject_alt_names.clone(),
                },
                false,
            )?);
        }
        extensions.push(Extension::from_extension(
            &SubjectKeyIdentifier(subject_key.key_identifier()?),
            false,
        )?);
        if let Some(ca) = ca {
            extensions.push(Extension::from_extension(
                &AuthorityKeyIdentifier {
                    key_identifier: ca.public_key().key_identifier()?,
                },
                false,
            )?);
        }
        Ok(extensions)
    }

    /// Builds a template certifying `subject_key`, valid from now.
    ///
    /// Without `ca` the template is self-signed; with it, the CA's subject and
    /// key become the issuer.
    pub fn template(
        &self,
        subject_key: &PublicKey,
        ca: Option<&CertifiedKey>,
    ) -> Result<CertificateTemplate> {
        let (issuer, issuer_public_key) = match ca {
            Some(ca) => (Some(ca.name()?), Some(ca.public_key())),
            None => (None, None),
        };

        CertificateTemplate::builder()
            .subject(self.subject.clone())
            .maybe_issuer(issuer)
            .subject_public_key(subject_key.clone())
            .maybe_issuer_public_key(issuer_public_key)
            .validity(ValidityWindow::for_days(self.validity_days)?)
            .extensions(self.extensions(subject_key, ca)?)
            .build()
    }

    /// Generates a key and a self-signed certificate for it.
    pub fn self_signed(&self, issuer: &CertificateIssuer) -> Result<CertifiedKey> {
        let key = KeyPair::generate(self.key_algorithm)?;
        let template = self.template(&key.public_key(), None)?;
        let certificate = issuer.issue(&template, &key, self.digest)?;
        CertifiedKey::new(certificate, key)
    }

    /// Generates a key and a certificate for it signed by `ca`.
    pub fn signed_by(&self, ca: &CertifiedKey, issuer: &CertificateIssuer) -> Result<CertifiedKey> {
        let key = KeyPair::generate(self.key_algorithm)?;
        let template = self.template(&key.public_key(), Some(ca))?;
        let certificate = ca.issue(issuer, &template, self.digest)?;
        CertifiedKey::new(certificate, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::extensions::ToAndFromX509Extension;
    use crate::error::LocalCaError;

    #[test]
    fn test_unrepresentable_validity_is_an_error() {
        let err = CertificateProfile::builder()
            .subject(DistinguishedName::from_common_name("forever.test"))
            .key_algorithm(KeyAlgorithm::Ed25519)
            .validity_days(i64::MAX)
            .build()
            .self_signed(&CertificateIssuer::default())
            .unwrap_err();
        assert!(matches!(err, LocalCaError::InvalidValidityWindow { .. }));
    }

    #[test]
    fn test_localhost_preset() {
        let profile = CertificateProfile::localhost();
        assert_eq!(
            profile.subject.to_string(),
            "C=US,ST=CA,L=San Francisco,O=My Company,CN=localhost"
        );
        assert_eq!(profile.validity_days, 365);
        assert_eq!(profile.key_algorithm, KeyAlgorithm::Rsa { bits: 2048 });
        assert_eq!(profile.digest, DigestAlgorithm::Sha256);
        assert!(!profile.is_ca);
    }

    #[test]
    fn test_builder_defaults() {
        let profile = CertificateProfile::builder()
            .subject(DistinguishedName::from_common_name("svc.test"))
            .build();
        assert_eq!(profile.validity_days, 365);
        assert_eq!(profile.key_algorithm, KeyAlgorithm::EcdsaP256);
        assert_eq!(profile.digest, DigestAlgorithm::Sha256);
        assert!(profile.subject_alt_names.is_empty());
        assert_eq!(profile.path_length, None);
    }

    #[test]
    fn test_ca_extensions() {
        let issuer = CertificateIssuer::default();
        let ca = CertificateProfile::builder()
            .subject(DistinguishedName::from_common_name("Test CA"))
            .is_ca(true)
            .path_length(1)
            .build()
            .self_signed(&issuer)
            .unwrap();

        let cert = ca.certificate();
        let bc = cert.extension::<BasicConstraints>().unwrap().unwrap();
        assert_eq!(bc, BasicConstraints::ca(Some(1)));
        let extensions = cert.extensions().unwrap();
        assert!(extensions.get(BasicConstraints::OID).unwrap().critical);

        let ku = cert.extension::<KeyUsage>().unwrap().unwrap();
        assert!(ku.0.contains(KeyUsages::KeyCertSign));
        assert!(ku.0.contains(KeyUsages::CRLSign));

        let ski = cert.extension::<SubjectKeyIdentifier>().unwrap().unwrap();
        assert_eq!(ski.0, ca.public_key().key_identifier().unwrap());
        assert!(cert.extension::<AuthorityKeyIdentifier>().unwrap().is_none());
    }

    #[test]
    fn test_leaf_signed_by_ca() {
        let issuer = CertificateIssuer::default();
        let ca = CertificateProfile::builder()
            .subject(DistinguishedName::from_common_name("Test CA"))
            .key_algorithm(KeyAlgorithm::EcdsaP384)
            .digest(DigestAlgorithm::Sha384)
            .is_ca(true)
            .build()
            .self_signed(&issuer)
            .unwrap();

        let leaf = CertificateProfile::builder()
            .subject(DistinguishedName::from_common_name("api.test"))
            .subject_alt_names(vec![SanType::DnsName("api.test".to_string())])
            .key_algorithm(KeyAlgorithm::Ed25519)
            .digest(DigestAlgorithm::Sha384)
            .usages(vec![ExtendedKeyUsageOption::ServerAuth])
            .validity_days(30)
            .build()
            .signed_by(&ca, &issuer)
            .unwrap();

        let cert = leaf.certificate();
        cert.verify(&ca.public_key()).unwrap();
        assert_eq!(cert.issuer().unwrap(), ca.name().unwrap());
        assert!(cert.extension::<BasicConstraints>().unwrap().is_none());

        let aki = cert.extension::<AuthorityKeyIdentifier>().unwrap().unwrap();
        assert_eq!(aki.key_identifier, ca.public_key().key_identifier().unwrap());

        let ku = cert.extension::<KeyUsage>().unwrap().unwrap();
        assert!(ku.0.contains(KeyUsages::DigitalSignature));
        assert!(!ku.0.contains(KeyUsages::KeyEncipherment));
    }

    #[test]
    fn test_ecdsa_ca_with_wrong_digest() {
        let issuer = CertificateIssuer::default();
        let err = CertificateProfile::builder()
            .subject(DistinguishedName::from_common_name("Test CA"))
            .key_algorithm(KeyAlgorithm::EcdsaP256)
            .digest(DigestAlgorithm::Sha512)
            .build()
            .self_signed(&issuer)
            .unwrap_err();
        assert!(matches!(err, LocalCaError::SigningKeyMismatch(_)));
    }
}
