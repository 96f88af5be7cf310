use std::fmt;
use std::str::FromStr;

use const_oid::ObjectIdentifier;
use const_oid::db::rfc5912::{ID_EC_PUBLIC_KEY, RSA_ENCRYPTION, SECP_256_R_1, SECP_384_R_1};
use const_oid::db::rfc8410::ID_ED_25519;
use der::Encode;
use ed25519_dalek::{SigningKey as Ed25519SigningKey, VerifyingKey as Ed25519VerifyingKey};
use p256::ecdsa::{SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey};
use p384::ecdsa::{SigningKey as P384SigningKey, VerifyingKey as P384VerifyingKey};
use pkcs8::spki::SubjectPublicKeyInfoRef;
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, PrivateKeyInfo, SecretDocument};
use rand_core::{OsRng, RngCore};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};
use tracing::{debug, warn};
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::error::{LocalCaError, Result};

/// Smallest RSA modulus this crate will generate or load.
pub const MIN_RSA_BITS: usize = 2048;

/// Fixed RSA public exponent (F4).
pub const RSA_PUBLIC_EXPONENT: u64 = 65537;

const SUPPORTED_RSA_BITS: [usize; 3] = [2048, 3072, 4096];

/// Algorithm and strength of a key pair.
///
/// Parses from strings such as `rsa-2048`, `rsa4096`, `ec-p256`, `p384` or
/// `ed25519`:
///
/// ```
/// use localca::key::KeyAlgorithm;
///
/// let algorithm: KeyAlgorithm = "rsa-3072".parse().unwrap();
/// assert_eq!(algorithm, KeyAlgorithm::Rsa { bits: 3072 });
/// assert!("dsa-1024".parse::<KeyAlgorithm>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    /// RSA with the given modulus size in bits.
    Rsa { bits: usize },
    /// ECDSA on NIST P-256.
    EcdsaP256,
    /// ECDSA on NIST P-384.
    EcdsaP384,
    /// Ed25519.
    Ed25519,
}

impl KeyAlgorithm {
    /// Resolves an algorithm family and its strength or curve, e.g. `("rsa", "2048")`
    /// or `("ec", "P-256")`.
    pub fn from_parts(algorithm: &str, strength_or_curve: &str) -> Result<Self> {
        let family = algorithm.trim().to_ascii_lowercase();
        let parameter = strength_or_curve.trim().to_ascii_lowercase();
        let unsupported = || {
            LocalCaError::UnsupportedAlgorithm(if parameter.is_empty() {
                family.clone()
            } else {
                format!("{family}-{parameter}")
            })
        };

        match family.as_str() {
            "rsa" => parameter
                .parse::<usize>()
                .map(|bits| KeyAlgorithm::Rsa { bits })
                .map_err(|_| unsupported()),
            "ec" | "ecdsa" => curve(&parameter).ok_or_else(unsupported),
            "ed25519" if parameter.is_empty() => Ok(KeyAlgorithm::Ed25519),
            other if parameter.is_empty() => curve(other).ok_or_else(unsupported),
            _ => Err(unsupported()),
        }
    }
}

fn curve(name: &str) -> Option<KeyAlgorithm> {
    match name.replace(['-', '_'], "").as_str() {
        "p256" | "secp256r1" | "prime256v1" => Some(KeyAlgorithm::EcdsaP256),
        "p384" | "secp384r1" => Some(KeyAlgorithm::EcdsaP384),
        _ => None,
    }
}

impl FromStr for KeyAlgorithm {
    type Err = LocalCaError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        match s.split_once(['-', ':']) {
            Some((family, parameter)) => Self::from_parts(family, parameter),
            None => match s.strip_prefix("rsa") {
                Some(bits) if !bits.is_empty() => Self::from_parts("rsa", bits),
                _ => Self::from_parts(&s, ""),
            },
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAlgorithm::Rsa { bits } => write!(f, "rsa-{bits}"),
            KeyAlgorithm::EcdsaP256 => f.write_str("ec-p256"),
            KeyAlgorithm::EcdsaP384 => f.write_str("ec-p384"),
            KeyAlgorithm::Ed25519 => f.write_str("ed25519"),
        }
    }
}

/// A private key together with its public half.
///
/// Not `Clone`: ownership moves from the generator to whoever signs or
/// persists the key.
pub enum KeyPair {
    Rsa {
        private: Box<RsaPrivateKey>,
        public: RsaPublicKey,
    },
    EcdsaP256 {
        signing_key: P256SigningKey,
        verifying_key: P256VerifyingKey,
    },
    EcdsaP384 {
        signing_key: P384SigningKey,
        verifying_key: P384VerifyingKey,
    },
    Ed25519 {
        signing_key: Ed25519SigningKey,
    },
}

impl KeyPair {
    /// Generates a fresh key pair from the operating system's random source.
    ///
    /// # Errors
    /// * `WeakKeyRejected` for RSA below [`MIN_RSA_BITS`].
    /// * `UnsupportedAlgorithm` for RSA sizes other than 2048, 3072 and 4096.
    /// * `InsufficientEntropy` if the random source cannot be read.
    pub fn generate(algorithm: KeyAlgorithm) -> Result<Self> {
        if let KeyAlgorithm::Rsa { bits } = algorithm {
            check_rsa_bits(bits)?;
        }
        let mut rng = entropy_source()?;

        let key_pair = match algorithm {
            KeyAlgorithm::Rsa { bits } => {
                let exponent = BigUint::from(RSA_PUBLIC_EXPONENT);
                let private = RsaPrivateKey::new_with_exp(&mut rng, bits, &exponent)?;
                Self::from_rsa(private)
            }
            KeyAlgorithm::EcdsaP256 => {
                let signing_key = P256SigningKey::random(&mut rng);
                let verifying_key = *signing_key.verifying_key();
                KeyPair::EcdsaP256 {
                    signing_key,
                    verifying_key,
                }
            }
            KeyAlgorithm::EcdsaP384 => {
                let signing_key = P384SigningKey::random(&mut rng);
                let verifying_key = *signing_key.verifying_key();
                KeyPair::EcdsaP384 {
                    signing_key,
                    verifying_key,
                }
            }
            KeyAlgorithm::Ed25519 => KeyPair::Ed25519 {
                signing_key: Ed25519SigningKey::generate(&mut rng),
            },
        };

        debug!(%algorithm, "generated key pair");
        Ok(key_pair)
    }

    /// Generate an RSA key pair with the specified number of bits.
    pub fn generate_rsa(bits: usize) -> Result<Self> {
        Self::generate(KeyAlgorithm::Rsa { bits })
    }

    fn from_rsa(private: RsaPrivateKey) -> Self {
        let public = RsaPublicKey::from(&private);
        KeyPair::Rsa {
            private: Box::new(private),
            public,
        }
    }

    /// The algorithm and strength of this key.
    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            KeyPair::Rsa { public, .. } => KeyAlgorithm::Rsa {
                bits: public.size() * 8,
            },
            KeyPair::EcdsaP256 { .. } => KeyAlgorithm::EcdsaP256,
            KeyPair::EcdsaP384 { .. } => KeyAlgorithm::EcdsaP384,
            KeyPair::Ed25519 { .. } => KeyAlgorithm::Ed25519,
        }
    }

    /// The public half of this key pair.
    pub fn public_key(&self) -> PublicKey {
        match self {
            KeyPair::Rsa { public, .. } => PublicKey::Rsa(public.clone()),
            KeyPair::EcdsaP256 { verifying_key, .. } => PublicKey::EcdsaP256(*verifying_key),
            KeyPair::EcdsaP384 { verifying_key, .. } => PublicKey::EcdsaP384(*verifying_key),
            KeyPair::Ed25519 { signing_key } => PublicKey::Ed25519(signing_key.verifying_key()),
        }
    }

    /// Encodes the private key as an unencrypted PKCS#8 `PrivateKeyInfo`.
    pub fn to_pkcs8_der(&self) -> Result<SecretDocument> {
        let document = match self {
            KeyPair::Rsa { private, .. } => private.to_pkcs8_der()?,
            KeyPair::EcdsaP256 { signing_key, .. } => signing_key.to_pkcs8_der()?,
            KeyPair::EcdsaP384 { signing_key, .. } => signing_key.to_pkcs8_der()?,
            KeyPair::Ed25519 { signing_key } => signing_key.to_pkcs8_der()?,
        };
        Ok(document)
    }

    /// Decodes an unencrypted PKCS#8 `PrivateKeyInfo`, dispatching on its algorithm OID.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let info = PrivateKeyInfo::try_from(der)?;

        match info.algorithm.oid {
            RSA_ENCRYPTION => {
                let private = RsaPrivateKey::from_pkcs8_der(der)?;
                check_rsa_bits(private.size() * 8)?;
                Ok(Self::from_rsa(private))
            }
            ID_EC_PUBLIC_KEY => match info.algorithm.parameters_oid()? {
                SECP_256_R_1 => {
                    let signing_key = P256SigningKey::from_pkcs8_der(der)?;
                    let verifying_key = *signing_key.verifying_key();
                    Ok(KeyPair::EcdsaP256 {
                        signing_key,
                        verifying_key,
                    })
                }
                SECP_384_R_1 => {
                    let signing_key = P384SigningKey::from_pkcs8_der(der)?;
                    let verifying_key = *signing_key.verifying_key();
                    Ok(KeyPair::EcdsaP384 {
                        signing_key,
                        verifying_key,
                    })
                }
                other => Err(unsupported_oid("elliptic curve", other)),
            },
            ID_ED_25519 => Ok(KeyPair::Ed25519 {
                signing_key: Ed25519SigningKey::from_pkcs8_der(der)?,
            }),
            other => Err(unsupported_oid("private key algorithm", other)),
        }
    }

    /// Encodes an RSA key in the traditional PKCS#1 `RSAPrivateKey` container.
    pub fn to_pkcs1_der(&self) -> Result<SecretDocument> {
        match self {
            KeyPair::Rsa { private, .. } => Ok(private.to_pkcs1_der()?),
            other => Err(LocalCaError::UnsupportedAlgorithm(format!(
                "PKCS#1 encoding of {} keys",
                other.algorithm()
            ))),
        }
    }

    /// Decodes a traditional PKCS#1 `RSAPrivateKey`.
    pub fn from_pkcs1_der(der: &[u8]) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs1_der(der)?;
        check_rsa_bits(private.size() * 8)?;
        Ok(Self::from_rsa(private))
    }
}

impl PartialEq for KeyPair {
    fn eq(&self, other: &Self) -> bool {
        match (self.to_pkcs8_der(), other.to_pkcs8_der()) {
            (Ok(a), Ok(b)) => a.as_bytes() == b.as_bytes(),
            _ => false,
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

/// The public half of a [`KeyPair`], as certified by a certificate.
#[derive(Clone, Debug, PartialEq)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    EcdsaP256(P256VerifyingKey),
    EcdsaP384(P384VerifyingKey),
    Ed25519(Ed25519VerifyingKey),
}

impl PublicKey {
    pub fn from_key_pair(key_pair: &KeyPair) -> Self {
        key_pair.public_key()
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            PublicKey::Rsa(public) => KeyAlgorithm::Rsa {
                bits: public.size() * 8,
            },
            PublicKey::EcdsaP256(_) => KeyAlgorithm::EcdsaP256,
            PublicKey::EcdsaP384(_) => KeyAlgorithm::EcdsaP384,
            PublicKey::Ed25519(_) => KeyAlgorithm::Ed25519,
        }
    }

    /// Converts the key into an X.509 `SubjectPublicKeyInfo`.
    pub fn to_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        let spki = match self {
            PublicKey::Rsa(public) => SubjectPublicKeyInfoOwned::from_key(public.clone())?,
            PublicKey::EcdsaP256(verifying_key) => {
                SubjectPublicKeyInfoOwned::from_key(*verifying_key)?
            }
            PublicKey::EcdsaP384(verifying_key) => {
                SubjectPublicKeyInfoOwned::from_key(*verifying_key)?
            }
            PublicKey::Ed25519(verifying_key) => {
                SubjectPublicKeyInfoOwned::from_key(*verifying_key)?
            }
        };
        Ok(spki)
    }

    /// Reads a key back out of an X.509 `SubjectPublicKeyInfo`.
    pub fn from_spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        Self::from_public_key_der(&spki.to_der()?)
    }

    /// Decodes a DER `SubjectPublicKeyInfo`, dispatching on its algorithm OID.
    pub fn from_public_key_der(der: &[u8]) -> Result<Self> {
        let spki = SubjectPublicKeyInfoRef::try_from(der)?;

        match spki.algorithm.oid {
            RSA_ENCRYPTION => Ok(PublicKey::Rsa(RsaPublicKey::from_public_key_der(der)?)),
            ID_EC_PUBLIC_KEY => match spki.algorithm.parameters_oid()? {
                SECP_256_R_1 => Ok(PublicKey::EcdsaP256(
                    P256VerifyingKey::from_public_key_der(der)?,
                )),
                SECP_384_R_1 => Ok(PublicKey::EcdsaP384(
                    P384VerifyingKey::from_public_key_der(der)?,
                )),
                other => Err(unsupported_oid("elliptic curve", other)),
            },
            ID_ED_25519 => Ok(PublicKey::Ed25519(Ed25519VerifyingKey::from_public_key_der(
                der,
            )?)),
            other => Err(unsupported_oid("public key algorithm", other)),
        }
    }

    /// DER encoding of the `SubjectPublicKeyInfo`.
    pub fn to_public_key_der(&self) -> Result<Vec<u8>> {
        Ok(self.to_spki()?.to_der()?)
    }

    /// RFC 5280 key identifier: SHA-1 over the `subjectPublicKey` bit string.
    pub fn key_identifier(&self) -> Result<Vec<u8>> {
        let spki = self.to_spki()?;
        Ok(Sha1::digest(spki.subject_public_key.raw_bytes()).to_vec())
    }
}

fn check_rsa_bits(bits: usize) -> Result<()> {
    if bits < MIN_RSA_BITS {
        warn!(bits, minimum = MIN_RSA_BITS, "rejecting weak RSA key");
        return Err(LocalCaError::WeakKeyRejected {
            bits,
            minimum: MIN_RSA_BITS,
        });
    }
    if !SUPPORTED_RSA_BITS.contains(&bits) {
        return Err(LocalCaError::UnsupportedAlgorithm(format!("rsa-{bits}")));
    }
    Ok(())
}

/// Returns the OS random source after proving it can actually produce bytes.
fn entropy_source() -> Result<OsRng> {
    let mut probe = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut probe)
        .map_err(|e| LocalCaError::InsufficientEntropy(e.to_string()))?;
    Ok(OsRng)
}

fn unsupported_oid(what: &str, oid: ObjectIdentifier) -> LocalCaError {
    LocalCaError::UnsupportedAlgorithm(format!("{what} {oid}"))
}
