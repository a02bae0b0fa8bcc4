//! The error surfaced by every ceremony operation.

use crate::StoreError;
use sigil_attestation::AttestationError;
use sigil_cose::{CodecError, SignatureError};
use std::fmt;
use thiserror::Error;

/// What went wrong, independent of the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The relying party is not set up correctly. Raised before any ceremony
    /// state is created.
    ConfigurationError,
    /// A binary or JSON structure could not be parsed.
    MalformedInput,
    /// The challenge in the client data is not the ceremony's challenge.
    ChallengeMismatch,
    /// The origin in the client data is not the relying party's origin.
    OriginMismatch,
    /// The authenticator data was produced for another relying party.
    RpIdMismatch,
    /// The attestation format is not registered.
    FormatNotSupported,
    /// A signature did not verify.
    SignatureInvalid,
    /// The attestation certificate chain could not be trusted.
    ChainValidationFailed,
    /// No metadata is known for the authenticator and policy requires it.
    MetadataNotFound,
    /// The signature counter did not advance; the authenticator may have
    /// been cloned.
    CounterRegression,
    /// The algorithm is unknown or not accepted by policy.
    UnsupportedAlgorithm,
    /// A credential with this id is already registered.
    CredentialAlreadyRegistered,
    /// No credential with this id is registered for the ceremony.
    CredentialNotFound,
    /// The ceremony succeeded cryptographically but does not meet policy
    /// (user presence, user verification, attestation type).
    PolicyViolation,
    /// Revocation status could not be determined and policy fails closed.
    RevocationCheckUnavailable,
    /// The credential store failed.
    StorageFailure,
}

impl ErrorKind {
    /// Whether the failure is attributable to the client or authenticator
    /// (a 4xx class response) rather than to the relying party (5xx).
    #[must_use]
    pub const fn is_client_error(self) -> bool {
        !matches!(
            self,
            ErrorKind::ConfigurationError
                | ErrorKind::RevocationCheckUnavailable
                | ErrorKind::StorageFailure
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ConfigurationError => "configuration error",
            ErrorKind::MalformedInput => "malformed input",
            ErrorKind::ChallengeMismatch => "challenge mismatch",
            ErrorKind::OriginMismatch => "origin mismatch",
            ErrorKind::RpIdMismatch => "relying party id mismatch",
            ErrorKind::FormatNotSupported => "format not supported",
            ErrorKind::SignatureInvalid => "invalid signature",
            ErrorKind::ChainValidationFailed => "chain validation failed",
            ErrorKind::MetadataNotFound => "metadata not found",
            ErrorKind::CounterRegression => "counter regression",
            ErrorKind::UnsupportedAlgorithm => "unsupported algorithm",
            ErrorKind::CredentialAlreadyRegistered => "credential already registered",
            ErrorKind::CredentialNotFound => "credential not found",
            ErrorKind::PolicyViolation => "policy violation",
            ErrorKind::RevocationCheckUnavailable => "revocation check unavailable",
            ErrorKind::StorageFailure => "storage failure",
        };
        f.write_str(name)
    }
}

/// A failed ceremony operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    /// An error of `kind`.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The human readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedInput, message)
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigurationError, message)
    }

    pub(crate) fn policy(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PolicyViolation, message)
    }
}

impl From<AttestationError> for Error {
    fn from(error: AttestationError) -> Self {
        let kind = match &error {
            AttestationError::FormatNotSupported(_) => ErrorKind::FormatNotSupported,
            AttestationError::UnexpectedStatement { .. }
            | AttestationError::MalformedStatement(_)
            | AttestationError::Codec(_)
            | AttestationError::MalformedCertificate(_) => ErrorKind::MalformedInput,
            AttestationError::CertificateRequirement(_)
            | AttestationError::ChainValidationFailed(_) => ErrorKind::ChainValidationFailed,
            AttestationError::SignatureInvalid(_) => ErrorKind::SignatureInvalid,
            AttestationError::UnsupportedAlgorithm(_) => ErrorKind::UnsupportedAlgorithm,
            AttestationError::RevocationCheckUnavailable(_) => ErrorKind::RevocationCheckUnavailable,
            AttestationError::MetadataNotFound(_) => ErrorKind::MetadataNotFound,
            AttestationError::AttestationTypeRejected(_) => ErrorKind::PolicyViolation,
        };
        Error::new(kind, error.to_string())
    }
}

impl From<CodecError> for Error {
    fn from(error: CodecError) -> Self {
        Error::malformed(error.to_string())
    }
}

impl From<SignatureError> for Error {
    fn from(error: SignatureError) -> Self {
        let kind = match &error {
            SignatureError::UnsupportedAlgorithm(_) | SignatureError::KeyMismatch { .. } => {
                ErrorKind::UnsupportedAlgorithm
            }
            SignatureError::InvalidKey(_) | SignatureError::InvalidSignature(_) => {
                ErrorKind::SignatureInvalid
            }
        };
        Error::new(kind, error.to_string())
    }
}

impl From<StoreError> for Error {
    fn from(error: StoreError) -> Self {
        let kind = match &error {
            StoreError::NotFound(_) => ErrorKind::CredentialNotFound,
            StoreError::AlreadyExists(_) => ErrorKind::CredentialAlreadyRegistered,
            StoreError::CounterChanged { .. } => ErrorKind::CounterRegression,
            StoreError::Unavailable(_) => ErrorKind::StorageFailure,
        };
        Error::new(kind, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_attestation::AttestationType;

    #[test]
    fn attestation_errors_keep_their_kind() {
        assert_eq!(
            Error::from(AttestationError::FormatNotSupported("x".into())).kind(),
            ErrorKind::FormatNotSupported
        );
        assert_eq!(
            Error::from(AttestationError::AttestationTypeRejected(AttestationType::Basic)).kind(),
            ErrorKind::PolicyViolation
        );
        assert_eq!(
            Error::from(AttestationError::CertificateRequirement("AIK".into())).kind(),
            ErrorKind::ChainValidationFailed
        );
    }

    #[test]
    fn server_side_failures_are_not_client_errors() {
        assert!(ErrorKind::ChallengeMismatch.is_client_error());
        assert!(ErrorKind::CounterRegression.is_client_error());
        assert!(!ErrorKind::ConfigurationError.is_client_error());
        assert!(!ErrorKind::StorageFailure.is_client_error());
    }

    #[test]
    fn displays_kind_and_message() {
        let error = Error::new(ErrorKind::OriginMismatch, "https://evil.example");
        assert_eq!(error.to_string(), "origin mismatch: https://evil.example");
    }
}
