use bon::bon;
use rand::TryRngCore;
use rand::rngs::OsRng;
use tracing::debug;
use x509_cert::serial_number::SerialNumber;

use crate::cert::params::{DistinguishedName, Extension, ExtensionSet, ValidityWindow};
use crate::error::{LocalCaError, Result};
use crate::key::PublicKey;
use crate::signing::SignatureAlgorithm;
use crate::tbs_certificate::TbsCertificate;

/// Length of generated serial numbers in bytes (RFC 5280 caps serials at 20 octets).
pub const SERIAL_NUMBER_LEN: usize = 20;

/// Everything a certificate asserts, minus the signature.
///
/// A template is immutable once built. It references the public key it
/// certifies and the public key of the signer it expects, but never owns a
/// private key.
///
/// # Example
/// ```
/// use localca::cert::params::{DistinguishedName, ValidityWindow};
/// use localca::key::{KeyAlgorithm, KeyPair};
/// use localca::template::CertificateTemplate;
///
/// let key = KeyPair::generate(KeyAlgorithm::EcdsaP256).unwrap();
/// let template = CertificateTemplate::builder()
///     .subject(DistinguishedName::from_common_name("localhost"))
///     .subject_public_key(key.public_key())
///     .validity(ValidityWindow::for_days(30).unwrap())
///     .build()
///     .unwrap();
/// assert!(template.is_self_signed());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct CertificateTemplate {
    subject: DistinguishedName,
    issuer: DistinguishedName,
    subject_public_key: PublicKey,
    issuer_public_key: PublicKey,
    validity: ValidityWindow,
    extensions: ExtensionSet,
    serial_number: SerialNumber,
}

#[bon]
impl CertificateTemplate {
    /// Validates the inputs and draws a fresh random serial number.
    ///
    /// `issuer` defaults to `subject` and `issuer_public_key` defaults to
    /// `subject_public_key`, which together describe a self-signed certificate.
    ///
    /// # Errors
    /// * `InvalidDistinguishedName` if either name has an empty common name.
    /// * `DuplicateExtension` if two extensions share an identifier.
    /// * `InsufficientEntropy` if the serial number cannot be drawn.
    #[builder]
    pub fn new(
        subject: DistinguishedName,
        issuer: Option<DistinguishedName>,
        subject_public_key: PublicKey,
        issuer_public_key: Option<PublicKey>,
        validity: ValidityWindow,
        #[builder(default)] extensions: Vec<Extension>,
    ) -> Result<Self> {
        subject.validate()?;
        let issuer = issuer.unwrap_or_else(|| subject.clone());
        issuer.validate()?;

        let extensions = ExtensionSet::from_extensions(extensions)?;
        let issuer_public_key = issuer_public_key.unwrap_or_else(|| subject_public_key.clone());
        let serial_number = random_serial_number()?;

        debug!(
            subject = %subject,
            serial = %hex(serial_number.as_bytes()),
            "built certificate template"
        );

        Ok(Self {
            subject,
            issuer,
            subject_public_key,
            issuer_public_key,
            validity,
            extensions,
            serial_number,
        })
    }
}

impl CertificateTemplate {
    pub fn subject(&self) -> &DistinguishedName {
        &self.subject
    }

    pub fn issuer(&self) -> &DistinguishedName {
        &self.issuer
    }

    pub fn subject_public_key(&self) -> &PublicKey {
        &self.subject_public_key
    }

    /// Public half of the key expected to sign this template.
    pub fn issuer_public_key(&self) -> &PublicKey {
        &self.issuer_public_key
    }

    pub fn validity(&self) -> ValidityWindow {
        self.validity
    }

    pub fn extensions(&self) -> &ExtensionSet {
        &self.extensions
    }

    pub fn serial_number(&self) -> &SerialNumber {
        &self.serial_number
    }

    /// True when issuer and subject coincide in both name and key.
    pub fn is_self_signed(&self) -> bool {
        self.issuer == self.subject && self.issuer_public_key == self.subject_public_key
    }

    /// The to-be-signed structure for this template under `signature_algorithm`.
    pub fn to_tbs_certificate(&self, signature_algorithm: SignatureAlgorithm) -> TbsCertificate {
        TbsCertificate {
            serial_number: self.serial_number.clone(),
            signature_algorithm,
            issuer: self.issuer.clone(),
            validity: self.validity,
            subject: self.subject.clone(),
            subject_public_key: self.subject_public_key.clone(),
            extensions: self.extensions.clone(),
        }
    }

    /// Canonical DER encoding of the template fields; byte-identical for
    /// identical inputs.
    pub fn to_der(&self, signature_algorithm: SignatureAlgorithm) -> Result<Vec<u8>> {
        self.to_tbs_certificate(signature_algorithm).to_der()
    }
}

/// 20 random bytes forming a positive integer with a non-zero leading byte,
/// so the encoding is always exactly 20 octets.
fn random_serial_number() -> Result<SerialNumber> {
    let mut bytes = [0u8; SERIAL_NUMBER_LEN];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| LocalCaError::InsufficientEntropy(e.to_string()))?;
    bytes[0] = (bytes[0] & 0x7f) | 0x40;
    Ok(SerialNumber::new(&bytes)?)
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
