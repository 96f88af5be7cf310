use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use const_oid::ObjectIdentifier;
use der::asn1::{
    Any, GeneralizedTime, Ia5StringRef, PrintableStringRef, SetOfVec, UtcTime, Utf8StringRef,
};
use der::{Tag, Tagged};
use time::{Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};
use x509_cert::time::Time;

use super::extensions::ToAndFromX509Extension;
use crate::error::{LocalCaError, Result};

/// The attribute types a distinguished name may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    Country,
    StateOrProvince,
    Locality,
    Organization,
    OrganizationalUnit,
    CommonName,
}

impl AttributeType {
    pub const fn oid(&self) -> ObjectIdentifier {
        match self {
            AttributeType::Country => ObjectIdentifier::new_unwrap("2.5.4.6"),
            AttributeType::StateOrProvince => ObjectIdentifier::new_unwrap("2.5.4.8"),
            AttributeType::Locality => ObjectIdentifier::new_unwrap("2.5.4.7"),
            AttributeType::Organization => ObjectIdentifier::new_unwrap("2.5.4.10"),
            AttributeType::OrganizationalUnit => ObjectIdentifier::new_unwrap("2.5.4.11"),
            AttributeType::CommonName => ObjectIdentifier::new_unwrap("2.5.4.3"),
        }
    }

    /// RFC 4514 short name, e.g. `CN`.
    pub fn short_name(&self) -> &'static str {
        match self {
            AttributeType::Country => "C",
            AttributeType::StateOrProvince => "ST",
            AttributeType::Locality => "L",
            AttributeType::Organization => "O",
            AttributeType::OrganizationalUnit => "OU",
            AttributeType::CommonName => "CN",
        }
    }

    pub fn from_oid(oid: ObjectIdentifier) -> Result<Self> {
        [
            AttributeType::Country,
            AttributeType::StateOrProvince,
            AttributeType::Locality,
            AttributeType::Organization,
            AttributeType::OrganizationalUnit,
            AttributeType::CommonName,
        ]
        .into_iter()
        .find(|attr| attr.oid() == oid)
        .ok_or_else(|| {
            LocalCaError::InvalidDistinguishedName(format!("unknown attribute type {oid}"))
        })
    }
}

impl FromStr for AttributeType {
    type Err = LocalCaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "c" | "countryname" => Ok(AttributeType::Country),
            "st" | "s" | "stateorprovincename" => Ok(AttributeType::StateOrProvince),
            "l" | "localityname" => Ok(AttributeType::Locality),
            "o" | "organizationname" => Ok(AttributeType::Organization),
            "ou" | "organizationalunitname" => Ok(AttributeType::OrganizationalUnit),
            "cn" | "commonname" => Ok(AttributeType::CommonName),
            other => Err(LocalCaError::InvalidDistinguishedName(format!(
                "unknown attribute type {other:?}"
            ))),
        }
    }
}

/// An ordered sequence of (attribute type, value) pairs.
///
/// Each pair is encoded as its own single-valued RDN, in insertion order.
/// Repeated attribute types are allowed.
///
/// ```
/// use localca::cert::params::{AttributeType, DistinguishedName};
///
/// let dn = DistinguishedName::new()
///     .with(AttributeType::Country, "US")
///     .with(AttributeType::CommonName, "localhost");
/// assert_eq!(dn.common_name(), Some("localhost"));
/// assert_eq!(dn.to_string(), "C=US,CN=localhost");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    attributes: Vec<(AttributeType, String)>,
}

impl DistinguishedName {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a name holding only a common name.
    pub fn from_common_name(common_name: impl Into<String>) -> Self {
        Self::new().with(AttributeType::CommonName, common_name)
    }

    /// Appends an attribute and returns the name.
    pub fn with(mut self, attribute: AttributeType, value: impl Into<String>) -> Self {
        self.push(attribute, value);
        self
    }

    pub fn push(&mut self, attribute: AttributeType, value: impl Into<String>) {
        self.attributes.push((attribute, value.into()));
    }

    /// Parses `TYPE=value` pairs separated by commas, in encoding order.
    /// A backslash escapes the next character.
    ///
    /// # Errors
    /// `InvalidDistinguishedName` for unknown attribute types or malformed pairs.
    pub fn parse(input: &str) -> Result<Self> {
        let mut name = Self::new();
        for pair in split_unescaped(input, ',') {
            let (attribute, value) = pair.split_once('=').ok_or_else(|| {
                LocalCaError::InvalidDistinguishedName(format!("missing '=' in {pair:?}"))
            })?;
            name.push(attribute.parse()?, unescape(value.trim()));
        }
        Ok(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AttributeType, &str)> {
        self.attributes
            .iter()
            .map(|(attribute, value)| (*attribute, value.as_str()))
    }

    pub fn get(&self, attribute: AttributeType) -> impl Iterator<Item = &str> {
        self.iter()
            .filter(move |(attr, _)| *attr == attribute)
            .map(|(_, value)| value)
    }

    /// The last common name, which is the one TLS clients look at.
    pub fn common_name(&self) -> Option<&str> {
        self.get(AttributeType::CommonName).last()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Checks the name is usable in a certificate: a non-empty common name,
    /// no empty values, and two-letter country codes.
    pub fn validate(&self) -> Result<()> {
        match self.common_name() {
            Some(cn) if !cn.trim().is_empty() => {}
            _ => {
                return Err(LocalCaError::InvalidDistinguishedName(
                    "common name must be non-empty".to_string(),
                ));
            }
        }
        for (attribute, value) in self.iter() {
            if value.trim().is_empty() {
                return Err(LocalCaError::InvalidDistinguishedName(format!(
                    "{} must not be empty",
                    attribute.short_name()
                )));
            }
            if attribute == AttributeType::Country
                && !(value.len() == 2 && value.bytes().all(|b| b.is_ascii_alphabetic()))
            {
                return Err(LocalCaError::InvalidDistinguishedName(format!(
                    "country must be a two-letter code, got {value:?}"
                )));
            }
        }
        Ok(())
    }

    /// Converts the distinguished name to an X.509 `Name`.
    ///
    /// Country is encoded as `PrintableString`, everything else as `UTF8String`.
    pub fn as_x509_name(&self) -> Result<Name> {
        let rdns = self
            .attributes
            .iter()
            .map(|(attribute, value)| -> Result<RelativeDistinguishedName> {
                let value = match attribute {
                    AttributeType::Country => Any::encode_from(&PrintableStringRef::new(value)?)?,
                    _ => Any::encode_from(&Utf8StringRef::new(value)?)?,
                };
                let atv = AttributeTypeAndValue {
                    oid: attribute.oid(),
                    value,
                };
                Ok(RelativeDistinguishedName(SetOfVec::try_from(vec![atv])?))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(RdnSequence(rdns))
    }

    /// Creates a `DistinguishedName` from an X.509 `Name`.
    pub fn from_x509_name(name: &Name) -> Result<Self> {
        let mut dn = Self::new();
        for rdn in name.0.iter() {
            for atv in rdn.0.iter() {
                let attribute = AttributeType::from_oid(atv.oid)?;
                let value = match atv.value.tag() {
                    Tag::PrintableString => {
                        atv.value.decode_as::<PrintableStringRef<'_>>()?.to_string()
                    }
                    Tag::Utf8String => atv.value.decode_as::<Utf8StringRef<'_>>()?.to_string(),
                    Tag::Ia5String => atv.value.decode_as::<Ia5StringRef<'_>>()?.to_string(),
                    tag => {
                        return Err(LocalCaError::EncodingError(format!(
                            "unsupported string type {tag} for {}",
                            attribute.short_name()
                        )));
                    }
                };
                dn.push(attribute, value);
            }
        }
        Ok(dn)
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (attribute, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}=", attribute.short_name())?;
            for c in value.chars() {
                if matches!(c, ',' | '\\' | '=') {
                    f.write_str("\\")?;
                }
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for DistinguishedName {
    type Err = LocalCaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn split_unescaped(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in input.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            c if c == separator => {
                parts.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    if start < input.len() || !parts.is_empty() {
        parts.push(&input[start..]);
    }
    parts
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Certificate validity period, both ends in UTC.
///
/// Instants are truncated to whole seconds, the resolution X.509 encodes.
/// `not_before < not_after` always holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidityWindow {
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
}

impl ValidityWindow {
    /// # Errors
    /// `InvalidValidityWindow` unless `not_before < not_after` after truncation,
    /// or if `not_before` is earlier than 1970, which X.509 time encoding here
    /// cannot represent.
    pub fn new(not_before: OffsetDateTime, not_after: OffsetDateTime) -> Result<Self> {
        let not_before = truncate_to_seconds(not_before);
        let not_after = truncate_to_seconds(not_after);
        if not_before < OffsetDateTime::UNIX_EPOCH || not_before >= not_after {
            return Err(LocalCaError::InvalidValidityWindow {
                not_before,
                not_after,
            });
        }
        Ok(Self {
            not_before,
            not_after,
        })
    }

    /// A window starting at `start` and lasting `days` days.
    ///
    /// # Errors
    /// `InvalidValidityWindow` if the end falls outside the representable
    /// range of dates (after year 9999).
    pub fn starting_at(start: OffsetDateTime, days: i64) -> Result<Self> {
        let not_after = days
            .checked_mul(SECONDS_PER_DAY)
            .map(Duration::seconds)
            .and_then(|length| start.checked_add(length))
            .ok_or_else(|| {
                let bound = if days < 0 {
                    PrimitiveDateTime::MIN
                } else {
                    PrimitiveDateTime::MAX
                };
                LocalCaError::InvalidValidityWindow {
                    not_before: start,
                    not_after: bound.assume_utc(),
                }
            })?;
        Self::new(start, not_after)
    }

    /// Creates a validity period starting now for the given number of days.
    pub fn for_days(days: i64) -> Result<Self> {
        Self::starting_at(OffsetDateTime::now_utc(), days)
    }

    pub fn not_before(&self) -> OffsetDateTime {
        self.not_before
    }

    pub fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }

    pub fn duration(&self) -> Duration {
        self.not_after - self.not_before
    }

    pub fn contains(&self, instant: OffsetDateTime) -> bool {
        self.not_before <= instant && instant <= self.not_after
    }

    /// Converts into the X.509 `Validity` structure.
    pub fn to_x509_validity(&self) -> Result<x509_cert::time::Validity> {
        Ok(x509_cert::time::Validity {
            not_before: to_x509_time(self.not_before)?,
            not_after: to_x509_time(self.not_after)?,
        })
    }

    pub fn from_x509_validity(validity: &x509_cert::time::Validity) -> Result<Self> {
        Self::new(
            OffsetDateTime::from(validity.not_before.to_system_time()),
            OffsetDateTime::from(validity.not_after.to_system_time()),
        )
    }
}

const SECONDS_PER_DAY: i64 = 86_400;

fn truncate_to_seconds(instant: OffsetDateTime) -> OffsetDateTime {
    let utc = instant.to_offset(UtcOffset::UTC);
    utc - Duration::nanoseconds(i64::from(utc.nanosecond()))
}

/// RFC 5280: `UTCTime` through 2049, `GeneralizedTime` from 2050 on.
fn to_x509_time(instant: OffsetDateTime) -> Result<Time> {
    let date_time = der::DateTime::from_system_time(SystemTime::from(instant))?;
    if date_time.year() < 2050 {
        Ok(Time::UtcTime(UtcTime::from_date_time(date_time)?))
    } else {
        Ok(Time::GeneralTime(GeneralizedTime::from_date_time(date_time)))
    }
}

/// One X.509 extension: identifier, criticality and DER-encoded value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Extension {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl Extension {
    /// Encodes a typed extension.
    pub fn from_extension<E: ToAndFromX509Extension>(extension: &E, critical: bool) -> Result<Self> {
        Ok(Self {
            oid: E::OID,
            critical,
            value: extension.to_x509_extension_value()?,
        })
    }

    /// Decodes into a typed extension.
    pub fn to_extension<E: ToAndFromX509Extension>(&self) -> Result<E> {
        if self.oid != E::OID {
            return Err(LocalCaError::EncodingError(format!(
                "extension {} is not {}",
                self.oid,
                E::OID
            )));
        }
        E::from_x509_extension_value(&self.value)
    }
}

/// Extensions keyed by identifier, kept in insertion order. Never holds two
/// entries with the same identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtensionSet {
    entries: Vec<Extension>,
}

impl ExtensionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// `DuplicateExtension` if any identifier repeats.
    pub fn from_extensions(extensions: impl IntoIterator<Item = Extension>) -> Result<Self> {
        let mut set = Self::new();
        for extension in extensions {
            set.insert(extension)?;
        }
        Ok(set)
    }

    /// # Errors
    /// `DuplicateExtension` if an extension with the same identifier is present.
    pub fn insert(&mut self, extension: Extension) -> Result<()> {
        if self.contains(extension.oid) {
            return Err(LocalCaError::DuplicateExtension(extension.oid));
        }
        self.entries.push(extension);
        Ok(())
    }

    pub fn contains(&self, oid: ObjectIdentifier) -> bool {
        self.get(oid).is_some()
    }

    pub fn get(&self, oid: ObjectIdentifier) -> Option<&Extension> {
        self.entries.iter().find(|extension| extension.oid == oid)
    }

    /// Looks up and decodes a typed extension.
    pub fn find<E: ToAndFromX509Extension>(&self) -> Result<Option<E>> {
        self.get(E::OID).map(Extension::to_extension::<E>).transpose()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Extension> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for ExtensionSet {
    type Item = Extension;
    type IntoIter = std::vec::IntoIter<Extension>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
