//! Decoded attestation statements, one variant per format.

use crate::Certificate;
use sigil_cose::CoseAlgorithm;

/// A format-specific attestation statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttestationStatement {
    /// `none`: no attestation.
    None,
    /// `packed`
    Packed(PackedStatement),
    /// `fido-u2f`
    FidoU2f(FidoU2fStatement),
    /// `android-key`
    AndroidKey(AndroidKeyStatement),
    /// `tpm`
    Tpm(TpmStatement),
    /// `android-safetynet`
    AndroidSafetyNet(SafetyNetStatement),
    /// `apple`
    Apple(AppleStatement),
}

impl AttestationStatement {
    /// The format identifier this statement was decoded for.
    #[must_use]
    pub const fn format(&self) -> &'static str {
        match self {
            AttestationStatement::None => "none",
            AttestationStatement::Packed(_) => "packed",
            AttestationStatement::FidoU2f(_) => "fido-u2f",
            AttestationStatement::AndroidKey(_) => "android-key",
            AttestationStatement::Tpm(_) => "tpm",
            AttestationStatement::AndroidSafetyNet(_) => "android-safetynet",
            AttestationStatement::Apple(_) => "apple",
        }
    }
}

/// How a packed statement is signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackedSigner {
    /// By the credential key (no `x5c`, no `ecdaaKeyId`).
    SelfAttestation,
    /// By the key in the leaf of `x5c`.
    Certificates(Vec<Certificate>),
    /// By an ECDAA issuer key.
    Ecdaa(Vec<u8>),
}

/// A `packed` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedStatement {
    /// The signature algorithm.
    pub alg: CoseAlgorithm,
    /// Signature over `authenticatorData || clientDataHash`.
    pub sig: Vec<u8>,
    /// Who signed.
    pub signer: PackedSigner,
}

/// A `fido-u2f` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FidoU2fStatement {
    /// Signature over the U2F registration message.
    pub sig: Vec<u8>,
    /// The attestation certificate (exactly one).
    pub certificate: Certificate,
}

/// An `android-key` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidKeyStatement {
    /// The signature algorithm.
    pub alg: CoseAlgorithm,
    /// Signature over `authenticatorData || clientDataHash`.
    pub sig: Vec<u8>,
    /// The credential certificate and its chain.
    pub x5c: Vec<Certificate>,
}

/// A `tpm` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmStatement {
    /// The signature algorithm.
    pub alg: CoseAlgorithm,
    /// Signature over `certInfo`.
    pub sig: Vec<u8>,
    /// The AIK certificate and its chain.
    pub x5c: Vec<Certificate>,
    /// The `TPMS_ATTEST` structure that was signed.
    pub cert_info: Vec<u8>,
    /// The `TPMT_PUBLIC` structure describing the credential key.
    pub pub_area: Vec<u8>,
}

/// An `android-safetynet` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyNetStatement {
    /// The Google Play Services version.
    pub ver: String,
    /// The compact JWS returned by the SafetyNet API.
    pub response: Vec<u8>,
}

/// An `apple` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppleStatement {
    /// The credential certificate and its chain.
    pub x5c: Vec<Certificate>,
}
