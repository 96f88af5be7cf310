use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;

use const_oid::AssociatedOid;
use der::{
    Decode, Encode,
    asn1::{Ia5String, OctetString},
    oid::ObjectIdentifier,
};
use regex::Regex;
use x509_cert::ext::pkix::name::GeneralName;

use crate::error::{LocalCaError, Result};

/// Trait for converting to and from X.509 extensions.
///
/// This trait provides methods to encode and decode X.509 extension values.
///
/// # Example
/// ```
/// use localca::cert::extensions::{SubjectAltName, ToAndFromX509Extension};
/// let san = SubjectAltName::dns(["example.com"]);
/// let encoded = san.to_x509_extension_value().unwrap();
/// let decoded = SubjectAltName::from_x509_extension_value(&encoded).unwrap();
/// assert_eq!(san, decoded);
/// ```
pub trait ToAndFromX509Extension {
    /// The Object Identifier (OID) for the extension.
    const OID: ObjectIdentifier;

    /// Encodes the extension into a DER-encoded byte vector.
    fn to_x509_extension_value(&self) -> Result<Vec<u8>>;

    /// Decodes the extension from a DER-encoded byte slice.
    fn from_x509_extension_value(extension: &[u8]) -> Result<Self>
    where
        Self: Sized;
}

static DNS_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\*\.)?([A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*\.?$")
        .expect("DNS name pattern is a valid regex")
});

fn is_valid_dns_name(name: &str) -> bool {
    name.len() <= 253 && DNS_NAME.is_match(name)
}

/// One entry of a Subject Alternative Name extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanType {
    DnsName(String),
    IpAddress(IpAddr),
    Rfc822Name(String),
}

impl SanType {
    fn to_general_name(&self) -> Result<GeneralName> {
        match self {
            SanType::DnsName(name) => {
                if !is_valid_dns_name(name) {
                    return Err(LocalCaError::EncodingError(format!(
                        "invalid DNS name {name:?}"
                    )));
                }
                Ok(GeneralName::DnsName(Ia5String::new(name)?))
            }
            SanType::IpAddress(ip) => {
                let octets = match ip {
                    IpAddr::V4(v4) => v4.octets().to_vec(),
                    IpAddr::V6(v6) => v6.octets().to_vec(),
                };
                Ok(GeneralName::IpAddress(OctetString::new(octets)?))
            }
            SanType::Rfc822Name(email) => Ok(GeneralName::Rfc822Name(Ia5String::new(email)?)),
        }
    }

    fn from_general_name(name: &GeneralName) -> Result<Self> {
        match name {
            GeneralName::DnsName(dns) => Ok(SanType::DnsName(dns.to_string())),
            GeneralName::Rfc822Name(email) => Ok(SanType::Rfc822Name(email.to_string())),
            GeneralName::IpAddress(octets) => {
                let bytes = octets.as_bytes();
                if let Ok(v4) = <[u8; 4]>::try_from(bytes) {
                    Ok(SanType::IpAddress(IpAddr::V4(Ipv4Addr::from(v4))))
                } else if let Ok(v6) = <[u8; 16]>::try_from(bytes) {
                    Ok(SanType::IpAddress(IpAddr::V6(Ipv6Addr::from(v6))))
                } else {
                    Err(LocalCaError::EncodingError(format!(
                        "IP address of {} bytes",
                        bytes.len()
                    )))
                }
            }
            _ => Err(LocalCaError::EncodingError(
                "Unsupported general name type".to_string(),
            )),
        }
    }
}

/// Represents the Subject Alternative Name (SAN) extension.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubjectAltName {
    pub names: Vec<SanType>,
}

impl SubjectAltName {
    /// A SAN holding only DNS names.
    pub fn dns<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names
                .into_iter()
                .map(|name| SanType::DnsName(name.into()))
                .collect(),
        }
    }

    pub fn dns_names(&self) -> Vec<&str> {
        self.names
            .iter()
            .filter_map(|name| match name {
                SanType::DnsName(dns) => Some(dns.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl ToAndFromX509Extension for SubjectAltName {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::SubjectAltName::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>> {
        if self.names.is_empty() {
            return Err(LocalCaError::EncodingError(
                "subject alternative name needs at least one entry".to_string(),
            ));
        }
        let san = x509_cert::ext::pkix::SubjectAltName(
            self.names
                .iter()
                .map(SanType::to_general_name)
                .collect::<Result<Vec<_>>>()?,
        );

        Ok(san.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self> {
        let san = x509_cert::ext::pkix::SubjectAltName::from_der(extension)?;
        let names = san
            .0
            .iter()
            .map(SanType::from_general_name)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { names })
    }
}

/// Represents the Basic Constraints extension.
///
/// # Fields
/// * `is_ca` - Indicates if the certificate is a CA.
/// * `max_path_length` - The maximum number of intermediate CAs allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BasicConstraints {
    pub is_ca: bool,
    pub max_path_length: Option<u8>,
}

impl BasicConstraints {
    pub fn ca(max_path_length: Option<u8>) -> Self {
        Self {
            is_ca: true,
            max_path_length,
        }
    }

    pub fn end_entity() -> Self {
        Self::default()
    }
}

impl ToAndFromX509Extension for BasicConstraints {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::BasicConstraints::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>> {
        let bc = x509_cert::ext::pkix::BasicConstraints {
            ca: self.is_ca,
            path_len_constraint: if self.is_ca { self.max_path_length } else { None },
        };

        Ok(bc.to_der()?)
    }

    fn from_x509_extension_value(der_bytes: &[u8]) -> Result<Self> {
        let bc = x509_cert::ext::pkix::BasicConstraints::from_der(der_bytes)?;
        Ok(Self {
            is_ca: bc.ca,
            max_path_length: bc.path_len_constraint,
        })
    }
}

pub use der::flagset::FlagSet;
use x509_cert::ext::pkix::KeyUsage as X509KeyUsage;
pub use x509_cert::ext::pkix::KeyUsages;

/// Represents the Key Usage extension.
///
/// This extension defines the purpose of the key contained in the certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyUsage(pub FlagSet<KeyUsages>);

impl ToAndFromX509Extension for KeyUsage {
    const OID: ObjectIdentifier = <X509KeyUsage as AssociatedOid>::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>> {
        if self.0.is_empty() {
            return Err(LocalCaError::EncodingError(
                "key usage needs at least one bit set".to_string(),
            ));
        }
        Ok(X509KeyUsage(self.0).to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self> {
        let ku = X509KeyUsage::from_der(extension)?;
        Ok(Self(ku.0))
    }
}

/// Represents the Extended Key Usage extension.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtendedKeyUsage {
    pub usage: Vec<ExtendedKeyUsageOption>,
}

impl ToAndFromX509Extension for ExtendedKeyUsage {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::ExtendedKeyUsage::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>> {
        let oids: Vec<ObjectIdentifier> = self.usage.iter().map(|v| (*v).into()).collect();
        let eku = x509_cert::ext::pkix::ExtendedKeyUsage(oids);
        Ok(eku.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self> {
        let eku = x509_cert::ext::pkix::ExtendedKeyUsage::from_der(extension)?;
        let usage = eku
            .0
            .iter()
            .map(|v| match *v {
                const_oid::db::rfc5912::ID_KP_OCSP_SIGNING => {
                    Ok(ExtendedKeyUsageOption::OcspSigning)
                }
                const_oid::db::rfc5912::ID_KP_SERVER_AUTH => Ok(ExtendedKeyUsageOption::ServerAuth),
                const_oid::db::rfc5912::ID_KP_CLIENT_AUTH => Ok(ExtendedKeyUsageOption::ClientAuth),
                const_oid::db::rfc5912::ID_KP_CODE_SIGNING => {
                    Ok(ExtendedKeyUsageOption::CodeSigning)
                }
                const_oid::db::rfc5912::ID_KP_EMAIL_PROTECTION => {
                    Ok(ExtendedKeyUsageOption::EmailProtection)
                }
                const_oid::db::rfc5912::ID_KP_TIME_STAMPING => {
                    Ok(ExtendedKeyUsageOption::TimeStamping)
                }
                other => Err(LocalCaError::EncodingError(format!(
                    "Unsupported extended key usage {other}"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { usage })
    }
}

/// Represents an option for the Extended Key Usage extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExtendedKeyUsageOption {
    ServerAuth,
    ClientAuth,
    CodeSigning,
    EmailProtection,
    TimeStamping,
    OcspSigning,
}

impl From<ExtendedKeyUsageOption> for ObjectIdentifier {
    fn from(value: ExtendedKeyUsageOption) -> Self {
        match value {
            ExtendedKeyUsageOption::OcspSigning => const_oid::db::rfc5912::ID_KP_OCSP_SIGNING,
            ExtendedKeyUsageOption::ServerAuth => const_oid::db::rfc5912::ID_KP_SERVER_AUTH,
            ExtendedKeyUsageOption::ClientAuth => const_oid::db::rfc5912::ID_KP_CLIENT_AUTH,
            ExtendedKeyUsageOption::CodeSigning => const_oid::db::rfc5912::ID_KP_CODE_SIGNING,
            ExtendedKeyUsageOption::EmailProtection => {
                const_oid::db::rfc5912::ID_KP_EMAIL_PROTECTION
            }
            ExtendedKeyUsageOption::TimeStamping => const_oid::db::rfc5912::ID_KP_TIME_STAMPING,
        }
    }
}

/// Represents the Subject Key Identifier extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectKeyIdentifier(pub Vec<u8>);

impl ToAndFromX509Extension for SubjectKeyIdentifier {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::SubjectKeyIdentifier::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>> {
        let ski = x509_cert::ext::pkix::SubjectKeyIdentifier(OctetString::new(self.0.as_slice())?);
        Ok(ski.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self> {
        let ski = x509_cert::ext::pkix::SubjectKeyIdentifier::from_der(extension)?;
        Ok(Self(ski.0.as_bytes().to_vec()))
    }
}

/// Represents the Authority Key Identifier (AKI) extension, in its
/// key-identifier-only form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityKeyIdentifier {
    pub key_identifier: Vec<u8>,
}

impl ToAndFromX509Extension for AuthorityKeyIdentifier {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::AuthorityKeyIdentifier::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>> {
        let aki = x509_cert::ext::pkix::AuthorityKeyIdentifier {
            key_identifier: Some(OctetString::new(self.key_identifier.as_slice())?),
            authority_cert_issuer: None,
            authority_cert_serial_number: None,
        };

        Ok(aki.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self> {
        let aki = x509_cert::ext::pkix::AuthorityKeyIdentifier::from_der(extension)?;

        Ok(Self {
            key_identifier: aki
                .key_identifier
                .map(|id| id.as_bytes().to_vec())
                .unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_alt_name_encoding_decoding() {
        let original = SubjectAltName {
            names: vec![
                SanType::DnsName("localhost".to_string()),
                SanType::DnsName("*.dev.local".to_string()),
                SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)),
                SanType::IpAddress(IpAddr::V6(Ipv6Addr::LOCALHOST)),
                SanType::Rfc822Name("admin@example.com".to_string()),
            ],
        };
        let encoded = original.to_x509_extension_value().unwrap();
        let decoded = SubjectAltName::from_x509_extension_value(&encoded).unwrap();
        assert_eq!(original, decoded);
        assert_eq!(decoded.dns_names(), vec!["localhost", "*.dev.local"]);
    }

    #[test]
    fn test_subject_alt_name_rejects_bad_dns_names() {
        for name in ["", "under_score.example", "-leading.example", "a..b", "spa ce"] {
            let san = SubjectAltName::dns([name]);
            assert!(
                san.to_x509_extension_value().is_err(),
                "{name:?} should be rejected"
            );
        }
        assert!(SubjectAltName::default().to_x509_extension_value().is_err());
    }

    #[test]
    fn test_dns_name_pattern() {
        assert!(is_valid_dns_name("localhost"));
        assert!(is_valid_dns_name("*.example.com"));
        assert!(is_valid_dns_name("example.com."));
        assert!(!is_valid_dns_name("-bad.example.com"));
        assert!(!is_valid_dns_name("a..b"));
        assert!(!is_valid_dns_name(&format!("{}.com", "a.".repeat(130))));
    }

    #[test]
    fn test_basic_constraints_encoding_decoding() {
        let original = BasicConstraints::ca(Some(3));
        let encoded = original.to_x509_extension_value().unwrap();
        let decoded = BasicConstraints::from_x509_extension_value(&encoded).unwrap();
        assert_eq!(original, decoded);

        let leaf = BasicConstraints::end_entity();
        let decoded =
            BasicConstraints::from_x509_extension_value(&leaf.to_x509_extension_value().unwrap())
                .unwrap();
        assert!(!decoded.is_ca);
        assert_eq!(decoded.max_path_length, None);
    }

    #[test]
    fn test_key_usage_encoding_decoding() {
        let original = KeyUsage(KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment);
        let encoded = original.to_x509_extension_value().unwrap();
        let decoded = KeyUsage::from_x509_extension_value(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_extended_key_usage_encoding_decoding() {
        let original = ExtendedKeyUsage {
            usage: vec![
                ExtendedKeyUsageOption::ServerAuth,
                ExtendedKeyUsageOption::ClientAuth,
            ],
        };
        let encoded = original.to_x509_extension_value().unwrap();
        let decoded = ExtendedKeyUsage::from_x509_extension_value(&encoded).unwrap();
        assert_eq!(original.usage, decoded.usage);
    }

    #[test]
    fn test_key_identifier_extensions() {
        let ski = SubjectKeyIdentifier(vec![1, 2, 3, 4, 5]);
        let decoded =
            SubjectKeyIdentifier::from_x509_extension_value(&ski.to_x509_extension_value().unwrap())
                .unwrap();
        assert_eq!(ski, decoded);

        let aki = AuthorityKeyIdentifier {
            key_identifier: vec![6, 7, 8, 9, 10],
        };
        let decoded = AuthorityKeyIdentifier::from_x509_extension_value(
            &aki.to_x509_extension_value().unwrap(),
        )
        .unwrap();
        assert_eq!(aki, decoded);
    }
}
