//! COSE algorithm identifiers and per-family verification.

#[cfg(any(feature = "es256", feature = "es384", feature = "es512"))]
mod ecdsa;
#[cfg(feature = "eddsa")]
mod eddsa;
#[cfg(feature = "rsa")]
mod rsa;

use crate::{EcCurve, OkpCurve, PublicKey, SignatureError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fmt;

/// A COSE algorithm identifier from the IANA registry, restricted to the
/// algorithms a relying party can verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum CoseAlgorithm {
    /// ECDSA over P-256 with SHA-256 (`-7`).
    Es256,
    /// ECDSA over P-384 with SHA-384 (`-35`).
    Es384,
    /// ECDSA over P-521 with SHA-512 (`-36`).
    Es512,
    /// EdDSA over Ed25519 (`-8`).
    EdDsa,
    /// RSASSA-PSS with SHA-256 (`-37`).
    Ps256,
    /// RSASSA-PKCS1-v1_5 with SHA-256 (`-257`).
    Rs256,
    /// RSASSA-PKCS1-v1_5 with SHA-384 (`-258`).
    Rs384,
    /// RSASSA-PKCS1-v1_5 with SHA-512 (`-259`).
    Rs512,
}

impl CoseAlgorithm {
    /// Every algorithm this type can name, in the order relying parties
    /// usually advertise them.
    pub const ALL: [CoseAlgorithm; 8] = [
        CoseAlgorithm::Es256,
        CoseAlgorithm::EdDsa,
        CoseAlgorithm::Es384,
        CoseAlgorithm::Es512,
        CoseAlgorithm::Ps256,
        CoseAlgorithm::Rs256,
        CoseAlgorithm::Rs384,
        CoseAlgorithm::Rs512,
    ];

    /// The registered COSE identifier.
    #[must_use]
    pub const fn identifier(self) -> i64 {
        match self {
            CoseAlgorithm::Es256 => -7,
            CoseAlgorithm::Es384 => -35,
            CoseAlgorithm::Es512 => -36,
            CoseAlgorithm::EdDsa => -8,
            CoseAlgorithm::Ps256 => -37,
            CoseAlgorithm::Rs256 => -257,
            CoseAlgorithm::Rs384 => -258,
            CoseAlgorithm::Rs512 => -259,
        }
    }

    /// Whether verification for this algorithm was compiled into the crate.
    #[must_use]
    pub const fn is_compiled(self) -> bool {
        match self {
            CoseAlgorithm::Es256 => cfg!(feature = "es256"),
            CoseAlgorithm::Es384 => cfg!(feature = "es384"),
            CoseAlgorithm::Es512 => cfg!(feature = "es512"),
            CoseAlgorithm::EdDsa => cfg!(feature = "eddsa"),
            CoseAlgorithm::Ps256
            | CoseAlgorithm::Rs256
            | CoseAlgorithm::Rs384
            | CoseAlgorithm::Rs512 => cfg!(feature = "rsa"),
        }
    }

    /// Digest `data` with the hash function this algorithm signs with.
    ///
    /// EdDSA hashes internally; SHA-512 is returned for it since that is the
    /// digest Ed25519 is defined over.
    #[must_use]
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            CoseAlgorithm::Es256 | CoseAlgorithm::Ps256 | CoseAlgorithm::Rs256 => {
                Sha256::digest(data).to_vec()
            }
            CoseAlgorithm::Es384 | CoseAlgorithm::Rs384 => Sha384::digest(data).to_vec(),
            CoseAlgorithm::Es512 | CoseAlgorithm::Rs512 | CoseAlgorithm::EdDsa => {
                Sha512::digest(data).to_vec()
            }
        }
    }

    /// Whether `key` is the kind of key this algorithm operates on.
    #[must_use]
    pub fn fits(self, key: &PublicKey) -> bool {
        matches!(
            (self, key),
            (CoseAlgorithm::Es256, PublicKey::Ec2 { curve: EcCurve::P256, .. })
                | (CoseAlgorithm::Es384, PublicKey::Ec2 { curve: EcCurve::P384, .. })
                | (CoseAlgorithm::Es512, PublicKey::Ec2 { curve: EcCurve::P521, .. })
                | (CoseAlgorithm::EdDsa, PublicKey::Okp { curve: OkpCurve::Ed25519, .. })
                | (
                    CoseAlgorithm::Ps256
                        | CoseAlgorithm::Rs256
                        | CoseAlgorithm::Rs384
                        | CoseAlgorithm::Rs512,
                    PublicKey::Rsa { .. }
                )
        )
    }
}

impl fmt::Display for CoseAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoseAlgorithm::Es256 => "ES256",
            CoseAlgorithm::Es384 => "ES384",
            CoseAlgorithm::Es512 => "ES512",
            CoseAlgorithm::EdDsa => "EdDSA",
            CoseAlgorithm::Ps256 => "PS256",
            CoseAlgorithm::Rs256 => "RS256",
            CoseAlgorithm::Rs384 => "RS384",
            CoseAlgorithm::Rs512 => "RS512",
        };
        f.write_str(name)
    }
}

impl From<CoseAlgorithm> for i64 {
    fn from(alg: CoseAlgorithm) -> Self {
        alg.identifier()
    }
}

impl TryFrom<i64> for CoseAlgorithm {
    type Error = SignatureError;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        CoseAlgorithm::ALL
            .into_iter()
            .find(|alg| alg.identifier() == id)
            .ok_or_else(|| SignatureError::UnsupportedAlgorithm(format!("COSE algorithm {id}")))
    }
}

/// Verify `signature` over `message` with `key` under `alg`.
///
/// The caller has already decided that `alg` is acceptable; this only
/// dispatches to the family implementation.
pub(crate) fn verify_signature(
    alg: CoseAlgorithm,
    key: &PublicKey,
    message: &[u8],
    signature: &[u8],
) -> Result<(), SignatureError> {
    if !alg.is_compiled() {
        return Err(SignatureError::UnsupportedAlgorithm(format!(
            "{alg} is not compiled in"
        )));
    }

    match (alg, key) {
        #[cfg(feature = "es256")]
        (CoseAlgorithm::Es256, PublicKey::Ec2 { curve: EcCurve::P256, x, y }) => {
            ecdsa::verify_p256(x, y, message, signature)
        }
        #[cfg(feature = "es384")]
        (CoseAlgorithm::Es384, PublicKey::Ec2 { curve: EcCurve::P384, x, y }) => {
            ecdsa::verify_p384(x, y, message, signature)
        }
        #[cfg(feature = "es512")]
        (CoseAlgorithm::Es512, PublicKey::Ec2 { curve: EcCurve::P521, x, y }) => {
            ecdsa::verify_p521(x, y, message, signature)
        }
        #[cfg(feature = "eddsa")]
        (CoseAlgorithm::EdDsa, PublicKey::Okp { curve: OkpCurve::Ed25519, x }) => {
            eddsa::verify_ed25519(x, message, signature)
        }
        #[cfg(feature = "rsa")]
        (CoseAlgorithm::Ps256, PublicKey::Rsa { n, e }) => rsa::verify_pss_sha256(n, e, message, signature),
        #[cfg(feature = "rsa")]
        (CoseAlgorithm::Rs256 | CoseAlgorithm::Rs384 | CoseAlgorithm::Rs512, PublicKey::Rsa { n, e }) => {
            rsa::verify_pkcs1v15(alg, n, e, message, signature)
        }
        _ => Err(SignatureError::KeyMismatch {
            alg,
            key: key.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_roundtrip_through_i64() {
        for alg in CoseAlgorithm::ALL {
            assert_eq!(CoseAlgorithm::try_from(alg.identifier()), Ok(alg));
        }
    }

    #[test]
    fn unknown_identifier_is_unsupported() {
        assert!(matches!(
            CoseAlgorithm::try_from(-65535),
            Err(SignatureError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn digest_length_follows_algorithm() {
        assert_eq!(CoseAlgorithm::Es256.digest(b"abc").len(), 32);
        assert_eq!(CoseAlgorithm::Rs384.digest(b"abc").len(), 48);
        assert_eq!(CoseAlgorithm::Es512.digest(b"abc").len(), 64);
    }

    #[test]
    fn algorithm_does_not_fit_foreign_curve() {
        let key = PublicKey::Ec2 {
            curve: EcCurve::P384,
            x: vec![0; 48],
            y: vec![0; 48],
        };
        assert!(!CoseAlgorithm::Es256.fits(&key));
        assert!(CoseAlgorithm::Es384.fits(&key));
    }
}
