//! use localca::error::LocalCaError;

use std::path::PathBuf;

use const_oid::ObjectIdentifier;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

/// Represents errors that can occur while generating keys, issuing
/// certificates or persisting them.
///
/// Every kind is either a policy violation (fix the input) or an environment
/// failure (fix the environment). None of them is retried internally.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LocalCaError {
    /// The algorithm or its parameter (key size, curve) is not implemented.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The operating system random source could not provide entropy.
    #[error("Insufficient entropy: {0}")]
    InsufficientEntropy(String),

    /// An RSA key below the minimum strength was requested.
    #[error("Weak key rejected: {bits}-bit RSA is below the {minimum}-bit minimum")]
    WeakKeyRejected { bits: usize, minimum: usize },

    /// A distinguished name is unusable (empty common name, unknown attribute type, bad value).
    #[error("Invalid distinguished name: {0}")]
    InvalidDistinguishedName(String),

    /// `not_before` is not strictly earlier than `not_after`.
    #[error("Invalid validity window: not_before {not_before} must be earlier than not_after {not_after}")]
    InvalidValidityWindow {
        not_before: OffsetDateTime,
        not_after: OffsetDateTime,
    },

    /// The same extension identifier was supplied twice.
    #[error("Duplicate extension: {0}")]
    DuplicateExtension(ObjectIdentifier),

    /// The signing key does not match the intended signer or cannot sign with the requested digest.
    #[error("Signing key mismatch: {0}")]
    SigningKeyMismatch(String),

    /// The requested digest algorithm is considered too weak.
    #[error("Weak digest rejected: {0}")]
    WeakDigestRejected(String),

    /// `not_before` lies further in the future than the configured tolerance.
    #[error("Clock skew: not_before {not_before} is ahead of {now} by more than {tolerance}")]
    ClockSkew {
        not_before: OffsetDateTime,
        now: OffsetDateTime,
        tolerance: Duration,
    },

    /// Owner-only permissions could not be enforced on the target file.
    #[error("Unsafe permissions on {}: {reason}", .path.display())]
    UnsafePermissions { path: PathBuf, reason: String },

    /// The destination cannot be written.
    #[error("Path unwritable {}: {reason}", .path.display())]
    PathUnwritable { path: PathBuf, reason: String },

    /// Malformed input to an encode or decode step.
    #[error("Failed to encode data: {0}")]
    EncodingError(String),

    /// A certificate signature did not verify.
    #[error("Signature verification failed: {0}")]
    SignatureInvalid(String),

    /// Error from RSA operations.
    #[error("RSA error: {0}")]
    RsaError(String),
}

pub type Result<T> = std::result::Result<T, LocalCaError>;

impl From<der::Error> for LocalCaError {
    fn from(err: der::Error) -> Self {
        LocalCaError::EncodingError(err.to_string())
    }
}

impl From<pkcs8::Error> for LocalCaError {
    fn from(err: pkcs8::Error) -> Self {
        LocalCaError::EncodingError(err.to_string())
    }
}

impl From<pkcs8::spki::Error> for LocalCaError {
    fn from(err: pkcs8::spki::Error) -> Self {
        LocalCaError::EncodingError(err.to_string())
    }
}

impl From<rsa::pkcs1::Error> for LocalCaError {
    fn from(err: rsa::pkcs1::Error) -> Self {
        LocalCaError::EncodingError(err.to_string())
    }
}

impl From<pem::PemError> for LocalCaError {
    fn from(err: pem::PemError) -> Self {
        LocalCaError::EncodingError(err.to_string())
    }
}

impl From<rsa::Error> for LocalCaError {
    fn from(err: rsa::Error) -> Self {
        LocalCaError::RsaError(err.to_string())
    }
}
