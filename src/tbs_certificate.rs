use der::Encode;
use der::asn1::OctetString;
use x509_cert::Version;
use x509_cert::certificate::TbsCertificateInner;
use x509_cert::serial_number::SerialNumber;

use crate::cert::params::{DistinguishedName, Extension, ExtensionSet, ValidityWindow};
use crate::error::Result;
use crate::key::PublicKey;
use crate::signing::SignatureAlgorithm;

/// Represents the "To Be Signed" (TBS) portion of an X.509 certificate.
/// This struct contains all the fields required to generate a valid X.509 certificate.
///
/// # Fields
/// * `serial_number` - The unique identifier for the certificate.
/// * `signature_algorithm` - The algorithm used to sign the certificate.
/// * `issuer` - The distinguished name of the certificate issuer.
/// * `validity` - The certificate's validity period.
/// * `subject` - The distinguished name of the certificate subject.
/// * `subject_public_key` - The public key of the certificate subject.
/// * `extensions` - Additional X.509 extensions for the certificate.
#[derive(Clone, Debug, PartialEq)]
pub struct TbsCertificate {
    pub serial_number: SerialNumber,
    pub signature_algorithm: SignatureAlgorithm,
    pub issuer: DistinguishedName,
    pub validity: ValidityWindow,
    pub subject: DistinguishedName,
    pub subject_public_key: PublicKey,
    pub extensions: ExtensionSet,
}

impl TbsCertificate {
    /// Converts the `TbsCertificate` into a `TbsCertificateInner` for DER encoding.
    ///
    /// Always a v3 structure. Extensions are written in insertion order and
    /// the field is omitted entirely when there are none.
    pub fn to_tbs_certificate_inner(&self) -> Result<TbsCertificateInner> {
        let extensions = self
            .extensions
            .iter()
            .map(|ext| -> Result<x509_cert::ext::Extension> {
                Ok(x509_cert::ext::Extension {
                    extn_id: ext.oid,
                    critical: ext.critical,
                    extn_value: OctetString::new(ext.value.clone())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(TbsCertificateInner {
            version: Version::V3,
            serial_number: self.serial_number.clone(),
            signature: self.signature_algorithm.to_algorithm_identifier(),
            issuer: self.issuer.as_x509_name()?,
            validity: self.validity.to_x509_validity()?,
            subject: self.subject.as_x509_name()?,
            subject_public_key_info: self.subject_public_key.to_spki()?,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: if extensions.is_empty() {
                None
            } else {
                Some(extensions)
            },
        })
    }

    /// Creates a `TbsCertificate` from a `TbsCertificateInner`.
    ///
    /// # Errors
    /// Fails for names, keys or algorithms this crate cannot represent, and for
    /// repeated extension identifiers.
    pub fn from_tbs_certificate_inner(inner: &TbsCertificateInner) -> Result<Self> {
        let extensions = ExtensionSet::from_extensions(
            inner
                .extensions
                .iter()
                .flatten()
                .map(|ext| Extension {
                    oid: ext.extn_id,
                    critical: ext.critical,
                    value: ext.extn_value.as_bytes().to_vec(),
                }),
        )?;

        Ok(Self {
            serial_number: inner.serial_number.clone(),
            signature_algorithm: SignatureAlgorithm::from_algorithm_identifier(&inner.signature)?,
            issuer: DistinguishedName::from_x509_name(&inner.issuer)?,
            validity: ValidityWindow::from_x509_validity(&inner.validity)?,
            subject: DistinguishedName::from_x509_name(&inner.subject)?,
            subject_public_key: PublicKey::from_spki(&inner.subject_public_key_info)?,
            extensions,
        })
    }

    /// Encodes the `TbsCertificate` into DER format.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.to_tbs_certificate_inner()?.to_der()?)
    }
}

#[cfg(test)]
mod tests {
    use der::Decode;
    use time::macros::datetime;

    use super::*;
    use crate::cert::extensions::{KeyUsage, KeyUsages, SubjectAltName};
    use crate::key::{KeyAlgorithm, KeyPair};

    fn sample(extensions: ExtensionSet) -> TbsCertificate {
        let key = KeyPair::generate(KeyAlgorithm::Ed25519).unwrap();
        TbsCertificate {
            serial_number: SerialNumber::new(&[0x42; 20]).unwrap(),
            signature_algorithm: SignatureAlgorithm::Ed25519,
            issuer: DistinguishedName::parse("O=Test CA,CN=Test Root").unwrap(),
            validity: ValidityWindow::new(
                datetime!(2024-06-01 12:00 UTC),
                datetime!(2054-06-01 12:00 UTC),
            )
            .unwrap(),
            subject: DistinguishedName::parse("C=US,O=Test,CN=leaf.test").unwrap(),
            subject_public_key: key.public_key(),
            extensions,
        }
    }

    #[test]
    fn test_inner_round_trip() {
        let extensions = ExtensionSet::from_extensions([
            Extension::from_extension(&SubjectAltName::dns(["leaf.test"]), false).unwrap(),
            Extension::from_extension(&KeyUsage(KeyUsages::DigitalSignature.into()), true)
                .unwrap(),
        ])
        .unwrap();
        let tbs = sample(extensions);

        let der = tbs.to_der().unwrap();
        let inner = TbsCertificateInner::from_der(&der).unwrap();
        assert_eq!(inner.version, Version::V3);

        let decoded = TbsCertificate::from_tbs_certificate_inner(&inner).unwrap();
        assert_eq!(decoded, tbs);
    }

    #[test]
    fn test_empty_extensions_are_omitted() {
        let inner = sample(ExtensionSet::new()).to_tbs_certificate_inner().unwrap();
        assert!(inner.extensions.is_none());
    }

    #[test]
    fn test_times_switch_to_generalized_after_2049() {
        let inner = sample(ExtensionSet::new()).to_tbs_certificate_inner().unwrap();
        assert!(matches!(
            inner.validity.not_before,
            x509_cert::time::Time::UtcTime(_)
        ));
        assert!(matches!(
            inner.validity.not_after,
            x509_cert::time::Time::GeneralTime(_)
        ));
    }
}
