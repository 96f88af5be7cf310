use std::fmt;

use const_oid::ObjectIdentifier;
use const_oid::db::rfc5912::{
    ECDSA_WITH_SHA_256, ECDSA_WITH_SHA_384, SHA_256_WITH_RSA_ENCRYPTION,
    SHA_384_WITH_RSA_ENCRYPTION, SHA_512_WITH_RSA_ENCRYPTION,
};
use const_oid::db::rfc8410::ID_ED_25519;
use der::asn1::AnyRef;
use ecdsa::signature::{Signer, Verifier};
use rsa::pkcs1v15;
use rsa::signature::SignatureEncoding;
use sha2::{Sha256, Sha384, Sha512};
use tracing::warn;
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::error::{LocalCaError, Result};
use crate::key::{KeyAlgorithm, KeyPair, PublicKey};

/// Hash function used to bind a signature to the certificate contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DigestAlgorithm {
    /// Accepted only so it can be refused with a precise error.
    Sha1,
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    pub fn output_bits(&self) -> usize {
        match self {
            DigestAlgorithm::Sha1 => 160,
            DigestAlgorithm::Sha256 => 256,
            DigestAlgorithm::Sha384 => 384,
            DigestAlgorithm::Sha512 => 512,
        }
    }

    pub fn is_weak(&self) -> bool {
        self.output_bits() < 256
    }

    /// Fails with `WeakDigestRejected` for digests below 256 bits.
    pub fn ensure_strong(self) -> Result<()> {
        if self.is_weak() {
            warn!(digest = %self, "rejecting weak digest");
            return Err(LocalCaError::WeakDigestRejected(self.to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DigestAlgorithm::Sha1 => "SHA-1",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
        })
    }
}

/// Represents the supported signature algorithms for certificates.
///
/// This enum provides a mapping to the corresponding OIDs for each algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-256.
    Sha256WithRsa,
    /// RSASSA-PKCS1-v1_5 with SHA-384.
    Sha384WithRsa,
    /// RSASSA-PKCS1-v1_5 with SHA-512.
    Sha512WithRsa,
    /// ECDSA with SHA-256.
    EcdsaWithSha256,
    /// ECDSA with SHA-384.
    EcdsaWithSha384,
    /// PureEdDSA over Ed25519.
    Ed25519,
}

impl SignatureAlgorithm {
    /// Chooses the signature algorithm for a key and digest.
    ///
    /// # Errors
    /// * `WeakDigestRejected` if `digest` is below 256 bits.
    /// * `SigningKeyMismatch` if the key type cannot sign with `digest`
    ///   (ECDSA keys only sign with their curve's native hash).
    pub fn for_key(key: KeyAlgorithm, digest: DigestAlgorithm) -> Result<Self> {
        digest.ensure_strong()?;

        match (key, digest) {
            (KeyAlgorithm::Rsa { .. }, DigestAlgorithm::Sha256) => Ok(Self::Sha256WithRsa),
            (KeyAlgorithm::Rsa { .. }, DigestAlgorithm::Sha384) => Ok(Self::Sha384WithRsa),
            (KeyAlgorithm::Rsa { .. }, DigestAlgorithm::Sha512) => Ok(Self::Sha512WithRsa),
            (KeyAlgorithm::EcdsaP256, DigestAlgorithm::Sha256) => Ok(Self::EcdsaWithSha256),
            (KeyAlgorithm::EcdsaP384, DigestAlgorithm::Sha384) => Ok(Self::EcdsaWithSha384),
            // Ed25519 hashes internally; the digest only has to pass the policy above.
            (KeyAlgorithm::Ed25519, _) => Ok(Self::Ed25519),
            (key, digest) => Err(LocalCaError::SigningKeyMismatch(format!(
                "{key} keys cannot sign with {digest}"
            ))),
        }
    }

    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            SignatureAlgorithm::Sha256WithRsa => SHA_256_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::Sha384WithRsa => SHA_384_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::Sha512WithRsa => SHA_512_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::EcdsaWithSha256 => ECDSA_WITH_SHA_256,
            SignatureAlgorithm::EcdsaWithSha384 => ECDSA_WITH_SHA_384,
            SignatureAlgorithm::Ed25519 => ID_ED_25519,
        }
    }

    /// Converts into an `AlgorithmIdentifier`. RSA identifiers carry an explicit
    /// NULL parameter (RFC 4055); ECDSA and EdDSA identifiers carry none.
    pub fn to_algorithm_identifier(&self) -> AlgorithmIdentifierOwned {
        let parameters = match self {
            SignatureAlgorithm::Sha256WithRsa
            | SignatureAlgorithm::Sha384WithRsa
            | SignatureAlgorithm::Sha512WithRsa => Some(AnyRef::NULL.into()),
            _ => None,
        };
        AlgorithmIdentifierOwned {
            oid: self.oid(),
            parameters,
        }
    }

    /// Determines the algorithm from a certificate's `AlgorithmIdentifier`.
    pub fn from_algorithm_identifier(identifier: &AlgorithmIdentifierOwned) -> Result<Self> {
        match identifier.oid {
            SHA_256_WITH_RSA_ENCRYPTION => Ok(SignatureAlgorithm::Sha256WithRsa),
            SHA_384_WITH_RSA_ENCRYPTION => Ok(SignatureAlgorithm::Sha384WithRsa),
            SHA_512_WITH_RSA_ENCRYPTION => Ok(SignatureAlgorithm::Sha512WithRsa),
            ECDSA_WITH_SHA_256 => Ok(SignatureAlgorithm::EcdsaWithSha256),
            ECDSA_WITH_SHA_384 => Ok(SignatureAlgorithm::EcdsaWithSha384),
            ID_ED_25519 => Ok(SignatureAlgorithm::Ed25519),
            other => Err(LocalCaError::UnsupportedAlgorithm(format!(
                "signature algorithm {other}"
            ))),
        }
    }
}

impl From<SignatureAlgorithm> for AlgorithmIdentifierOwned {
    fn from(value: SignatureAlgorithm) -> Self {
        value.to_algorithm_identifier()
    }
}

/// Signs `data` with `key` under `algorithm`.
///
/// ECDSA signatures are DER-encoded `Ecdsa-Sig-Value`s as X.509 requires.
pub fn sign_data(key: &KeyPair, algorithm: SignatureAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
    let signature = match (key, algorithm) {
        (KeyPair::Rsa { private, .. }, SignatureAlgorithm::Sha256WithRsa) => {
            pkcs1v15::SigningKey::<Sha256>::new((**private).clone())
                .try_sign(data)
                .map_err(signing_failed)?
                .to_vec()
        }
        (KeyPair::Rsa { private, .. }, SignatureAlgorithm::Sha384WithRsa) => {
            pkcs1v15::SigningKey::<Sha384>::new((**private).clone())
                .try_sign(data)
                .map_err(signing_failed)?
                .to_vec()
        }
        (KeyPair::Rsa { private, .. }, SignatureAlgorithm::Sha512WithRsa) => {
            pkcs1v15::SigningKey::<Sha512>::new((**private).clone())
                .try_sign(data)
                .map_err(signing_failed)?
                .to_vec()
        }
        (KeyPair::EcdsaP256 { signing_key, .. }, SignatureAlgorithm::EcdsaWithSha256) => {
            let signature: p256::ecdsa::DerSignature =
                signing_key.try_sign(data).map_err(signing_failed)?;
            signature.as_bytes().to_vec()
        }
        (KeyPair::EcdsaP384 { signing_key, .. }, SignatureAlgorithm::EcdsaWithSha384) => {
            let signature: p384::ecdsa::DerSignature =
                signing_key.try_sign(data).map_err(signing_failed)?;
            signature.as_bytes().to_vec()
        }
        (KeyPair::Ed25519 { signing_key }, SignatureAlgorithm::Ed25519) => signing_key
            .try_sign(data)
            .map_err(signing_failed)?
            .to_bytes()
            .to_vec(),
        (key, algorithm) => {
            return Err(LocalCaError::SigningKeyMismatch(format!(
                "{} key cannot produce {algorithm:?} signatures",
                key.algorithm()
            )));
        }
    };
    Ok(signature)
}

/// Verifies `signature` over `data` against `public_key`.
pub fn verify_signature(
    public_key: &PublicKey,
    algorithm: SignatureAlgorithm,
    data: &[u8],
    signature: &[u8],
) -> Result<()> {
    match (public_key, algorithm) {
        (PublicKey::Rsa(public), SignatureAlgorithm::Sha256WithRsa) => {
            pkcs1v15::VerifyingKey::<Sha256>::new(public.clone())
                .verify(data, &rsa_signature(signature)?)
        }
        (PublicKey::Rsa(public), SignatureAlgorithm::Sha384WithRsa) => {
            pkcs1v15::VerifyingKey::<Sha384>::new(public.clone())
                .verify(data, &rsa_signature(signature)?)
        }
        (PublicKey::Rsa(public), SignatureAlgorithm::Sha512WithRsa) => {
            pkcs1v15::VerifyingKey::<Sha512>::new(public.clone())
                .verify(data, &rsa_signature(signature)?)
        }
        (PublicKey::EcdsaP256(verifying_key), SignatureAlgorithm::EcdsaWithSha256) => {
            let signature =
                p256::ecdsa::Signature::from_der(signature).map_err(verification_failed)?;
            verifying_key.verify(data, &signature)
        }
        (PublicKey::EcdsaP384(verifying_key), SignatureAlgorithm::EcdsaWithSha384) => {
            let signature =
                p384::ecdsa::Signature::from_der(signature).map_err(verification_failed)?;
            verifying_key.verify(data, &signature)
        }
        (PublicKey::Ed25519(verifying_key), SignatureAlgorithm::Ed25519) => {
            let signature =
                ed25519_dalek::Signature::from_slice(signature).map_err(verification_failed)?;
            verifying_key.verify_strict(data, &signature)
        }
        (public_key, algorithm) => {
            return Err(LocalCaError::SignatureInvalid(format!(
                "{} key cannot verify {algorithm:?} signatures",
                public_key.algorithm()
            )));
        }
    }
    .map_err(verification_failed)
}

fn rsa_signature(bytes: &[u8]) -> Result<pkcs1v15::Signature> {
    pkcs1v15::Signature::try_from(bytes).map_err(verification_failed)
}

fn signing_failed(err: impl fmt::Display) -> LocalCaError {
    LocalCaError::SigningKeyMismatch(format!("signing failed: {err}"))
}

fn verification_failed(err: impl fmt::Display) -> LocalCaError {
    LocalCaError::SignatureInvalid(err.to_string())
}
