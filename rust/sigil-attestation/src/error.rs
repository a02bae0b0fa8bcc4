//! Attestation error type.

use sigil_cose::{CodecError, SignatureError};
use thiserror::Error;

/// Errors produced while decoding or verifying an attestation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttestationError {
    /// No decoder or verifier is registered for the format identifier.
    #[error("attestation format {0:?} is not supported")]
    FormatNotSupported(String),

    /// A verifier was handed a statement decoded for another format.
    #[error("{verifier} verifier received a {found} statement")]
    UnexpectedStatement {
        /// The format the verifier handles.
        verifier: &'static str,
        /// The format of the statement it received.
        found: &'static str,
    },

    /// The attestation object or statement is structurally invalid.
    #[error("malformed attestation: {0}")]
    MalformedStatement(String),

    /// Authenticator data or a COSE key embedded in the attestation could
    /// not be decoded.
    #[error("malformed authenticator data: {0}")]
    Codec(#[from] CodecError),

    /// A certificate could not be parsed or carries unusable key material.
    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),

    /// A certificate does not meet the requirements of its format.
    #[error("certificate requirement not met: {0}")]
    CertificateRequirement(String),

    /// The attestation signature, or a value bound into the attestation,
    /// does not verify.
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    /// The algorithm is unknown, not accepted, or not implemented (ECDAA).
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The certificate chain is expired, broken, revoked or unanchored.
    #[error("certificate chain validation failed: {0}")]
    ChainValidationFailed(String),

    /// Revocation status could not be determined and the failure mode is
    /// fail-closed.
    #[error("revocation check unavailable: {0}")]
    RevocationCheckUnavailable(String),

    /// Metadata is required and none is known for the authenticator.
    #[error("no metadata found for {0}")]
    MetadataNotFound(String),

    /// Metadata for the authenticator does not list the attestation type
    /// the statement produced.
    #[error("attestation type {0} is not permitted by authenticator metadata")]
    AttestationTypeRejected(crate::AttestationType),
}

impl From<SignatureError> for AttestationError {
    fn from(error: SignatureError) -> Self {
        match error {
            SignatureError::UnsupportedAlgorithm(_) | SignatureError::KeyMismatch { .. } => {
                AttestationError::UnsupportedAlgorithm(error.to_string())
            }
            SignatureError::InvalidKey(_) | SignatureError::InvalidSignature(_) => {
                AttestationError::SignatureInvalid(error.to_string())
            }
        }
    }
}
