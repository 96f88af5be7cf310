//! # localca - A Minimal Local Certificate Authority in Pure Rust
//!
//! localca generates key pairs, builds X.509 certificate templates, signs them
//! into certificates and writes keys and certificates to disk atomically with
//! safe permissions. It is built entirely on the RustCrypto crates; `openssl`
//! is used only by the test suite.
//!
//! ## Supported Key Types
//!
//! - **RSA**: 2048, 3072 and 4096-bit keys with public exponent 65537
//! - **ECDSA**: P-256 and P-384 curves
//! - **Ed25519**: Edwards curve digital signature algorithm
//!
//! RSA keys below 2048 bits and SHA-1 signatures are refused.
//!
//! ## Supported Formats
//!
//! - **DER**: Distinguished Encoding Rules (binary format)
//! - **PEM**: base64 armor with LF line endings
//! - Private keys as PKCS#8, passphrase-encrypted PKCS#8 or (RSA only) PKCS#1
//!
//! ## Quick Start
//!
//! ### A self-signed certificate for localhost
//!
//! ```rust,no_run
//! use localca::{
//!     encoding::{Format, KeyEncryption},
//!     issuer::CertificateIssuer,
//!     persist,
//!     profile::CertificateProfile,
//! };
//!
//! # fn main() -> Result<(), localca::error::LocalCaError> {
//! let certified = CertificateProfile::localhost().self_signed(&CertificateIssuer::default())?;
//! let written = persist::write_certified_key(
//!     ".",
//!     "localhost",
//!     &certified,
//!     Format::Pem,
//!     &KeyEncryption::None,
//! )?;
//! println!("wrote {}", written.certificate_path.display());
//! # Ok(())
//! # }
//! ```
//!
//! ### Building a template by hand
//!
//! ```rust
//! use localca::{
//!     cert::extensions::SubjectAltName,
//!     cert::params::{DistinguishedName, Extension, ValidityWindow},
//!     issuer::CertificateIssuer,
//!     key::{KeyAlgorithm, KeyPair},
//!     signing::DigestAlgorithm,
//!     template::CertificateTemplate,
//! };
//!
//! # fn main() -> Result<(), localca::error::LocalCaError> {
//! let key = KeyPair::generate(KeyAlgorithm::EcdsaP256)?;
//!
//! let template = CertificateTemplate::builder()
//!     .subject(DistinguishedName::parse("C=US,O=Example Corp,CN=example.com")?)
//!     .subject_public_key(key.public_key())
//!     .validity(ValidityWindow::for_days(90)?)
//!     .extensions(vec![Extension::from_extension(
//!         &SubjectAltName::dns(["example.com", "www.example.com"]),
//!         false,
//!     )?])
//!     .build()?;
//!
//! let certificate = CertificateIssuer::default().issue(&template, &key, DigestAlgorithm::Sha256)?;
//! certificate.verify_self_signed()?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Creating a Certificate Chain
//!
//! ```rust
//! use localca::{
//!     cert::params::DistinguishedName,
//!     issuer::CertificateIssuer,
//!     key::KeyAlgorithm,
//!     profile::CertificateProfile,
//! };
//!
//! # fn main() -> Result<(), localca::error::LocalCaError> {
//! let issuer = CertificateIssuer::default();
//!
//! let ca = CertificateProfile::builder()
//!     .subject(DistinguishedName::from_common_name("Example CA"))
//!     .is_ca(true)
//!     .build()
//!     .self_signed(&issuer)?;
//!
//! let server = CertificateProfile::builder()
//!     .subject(DistinguishedName::from_common_name("server.example.com"))
//!     .key_algorithm(KeyAlgorithm::Ed25519)
//!     .build()
//!     .signed_by(&ca, &issuer)?;
//!
//! server.certificate().verify(&ca.public_key())?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every failure is one [`error::LocalCaError`] kind:
//!
//! ```rust
//! use localca::{error::LocalCaError, key::KeyAlgorithm, key::KeyPair};
//!
//! match KeyPair::generate(KeyAlgorithm::Rsa { bits: 1024 }) {
//!     Err(LocalCaError::WeakKeyRejected { bits, minimum }) => {
//!         println!("{bits}-bit RSA is below {minimum}")
//!     }
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`key`]: Key generation and key containers
//! - [`signing`]: Digest policy, signature algorithms, sign and verify
//! - [`cert`]: Signed certificates, names, validity and extensions
//! - [`template`]: Immutable certificate templates with random serials
//! - [`tbs_certificate`]: Canonical to-be-signed encoding
//! - [`issuer`]: Certificate issuance and CA keys
//! - [`profile`]: Named certificate configurations
//! - [`encoding`]: PEM and DER encoding of keys and certificates
//! - [`persist`]: Atomic file writes with enforced permissions
//! - [`error`]: Error taxonomy

pub mod cert;
pub mod encoding;
pub mod error;
pub mod issuer;
pub mod key;
pub mod persist;
pub mod profile;
pub mod signing;
pub mod tbs_certificate;
pub mod template;
