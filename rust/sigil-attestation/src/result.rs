//! The outcome of attestation verification.

use crate::Certificate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the authenticator vouched for the new credential.
///
/// The ordering follows how much an independent party stands behind the
/// claim: `None < SelfAttestation < AnonymizationCa < Basic`, with `Basic`
/// and `AttestationCa` on the same level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttestationType {
    /// No attestation was conveyed.
    None,
    /// Signed with the credential key itself.
    #[serde(rename = "self")]
    SelfAttestation,
    /// Signed by a vendor CA that issues per-credential certificates.
    #[serde(rename = "anonCA")]
    AnonymizationCa,
    /// Signed by a batch attestation key.
    Basic,
    /// Signed by a key certified by an attestation CA.
    #[serde(rename = "attCA")]
    AttestationCa,
}

impl AttestationType {
    /// The trust level used for policy comparisons.
    #[must_use]
    pub const fn trust_level(self) -> u8 {
        match self {
            AttestationType::None => 0,
            AttestationType::SelfAttestation => 1,
            AttestationType::AnonymizationCa => 2,
            AttestationType::Basic | AttestationType::AttestationCa => 3,
        }
    }

    /// Whether this type meets `minimum`.
    #[must_use]
    pub const fn satisfies(self, minimum: AttestationType) -> bool {
        self.trust_level() >= minimum.trust_level()
    }
}

impl fmt::Display for AttestationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttestationType::None => "none",
            AttestationType::SelfAttestation => "self",
            AttestationType::AnonymizationCa => "anonCA",
            AttestationType::Basic => "basic",
            AttestationType::AttestationCa => "attCA",
        })
    }
}

/// The certificates the attestation was verified through.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TrustPath {
    /// No certificates (none and self attestation).
    #[default]
    Empty,
    /// The statement's chain, leaf first.
    Certificates(Vec<Certificate>),
}

impl TrustPath {
    /// The certificates, leaf first; empty for [`TrustPath::Empty`].
    #[must_use]
    pub fn certificates(&self) -> &[Certificate] {
        match self {
            TrustPath::Empty => &[],
            TrustPath::Certificates(chain) => chain,
        }
    }
}

/// Whether the trust path ended at a known anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrustVerdict {
    /// A chain certificate or its issuer matched a trust anchor.
    Anchored,
    /// No anchors were available and policy accepted the chain on its
    /// internal consistency alone.
    Unanchored,
    /// The attestation carries no certificates.
    NotApplicable,
}

/// A verified attestation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    /// The attestation type.
    pub attestation_type: AttestationType,
    /// The certificates the attestation was verified through.
    pub trust_path: TrustPath,
    /// Whether the trust path reached an anchor.
    pub verdict: TrustVerdict,
}

impl VerificationResult {
    /// The result of `none` attestation.
    #[must_use]
    pub fn none() -> Self {
        Self {
            attestation_type: AttestationType::None,
            trust_path: TrustPath::Empty,
            verdict: TrustVerdict::NotApplicable,
        }
    }

    /// The result of self attestation.
    #[must_use]
    pub fn self_attested() -> Self {
        Self {
            attestation_type: AttestationType::SelfAttestation,
            trust_path: TrustPath::Empty,
            verdict: TrustVerdict::NotApplicable,
        }
    }
}
