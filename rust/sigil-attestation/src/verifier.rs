//! Attestation statement verifiers.
//!
//! Each format module exposes a `decode` function turning the statement's
//! CBOR map into its [`AttestationStatement`] variant and a `verify`
//! function checking that variant against the authenticator data and client
//! data hash. The [`crate::FormatRegistry`] wires them together.

pub(crate) mod android_key;
pub(crate) mod apple;
pub(crate) mod fido_u2f;
pub(crate) mod none;
pub(crate) mod packed;
pub(crate) mod safetynet;
pub(crate) mod tpm;

use crate::{
    AttestationError, AttestationStatement, AttestationType, Certificate, ChainEvaluator,
    TrustAnchorResolver, TrustPath, VerificationResult,
};
use sigil_cose::{Aaguid, AttestedCredentialData, AuthenticatorData, SignatureVerifier};

/// The collaborators an attestation verifier consults.
#[derive(Debug, Clone, Copy)]
pub struct VerificationContext<'a> {
    /// Verifies attestation signatures.
    pub signatures: &'a SignatureVerifier,
    /// Supplies trust anchors for certificate chains.
    pub resolver: &'a TrustAnchorResolver,
    /// Evaluates certificate chains.
    pub chains: &'a ChainEvaluator,
    /// Whether certificate revocation is checked.
    pub check_revocation: bool,
    /// Whether optional format requirements are enforced.
    pub strict: bool,
}

impl VerificationContext<'_> {
    /// Resolve anchors for `chain`, evaluate it, and check the resulting
    /// attestation type against the authenticator's metadata.
    pub(crate) fn establish_trust(
        &self,
        aaguid: Aaguid,
        chain: Vec<Certificate>,
        attestation_type: AttestationType,
    ) -> Result<VerificationResult, AttestationError> {
        let resolved = self.resolver.resolve(aaguid, &chain)?;
        let verdict = self
            .chains
            .evaluate(&chain, &resolved.anchors, self.check_revocation)?;
        if !resolved.hints.permits(attestation_type) {
            return Err(AttestationError::AttestationTypeRejected(attestation_type));
        }
        tracing::debug!(%attestation_type, ?verdict, length = chain.len(), "attestation chain trusted");
        Ok(VerificationResult {
            attestation_type,
            trust_path: TrustPath::Certificates(chain),
            verdict,
        })
    }
}

pub(crate) fn unexpected(verifier: &'static str, statement: &AttestationStatement) -> AttestationError {
    AttestationError::UnexpectedStatement {
        verifier,
        found: statement.format(),
    }
}

pub(crate) fn attested_credential(
    auth_data: &AuthenticatorData,
) -> Result<&AttestedCredentialData, AttestationError> {
    auth_data.attested_credential_data().ok_or_else(|| {
        AttestationError::MalformedStatement("authenticator data has no attested credential".into())
    })
}

/// `Basic` for an end-entity attestation certificate, `AttestationCa` when
/// the leaf is itself a CA certificate.
pub(crate) fn basic_or_ca(leaf: &Certificate) -> Result<AttestationType, AttestationError> {
    Ok(if leaf.is_ca()? {
        AttestationType::AttestationCa
    } else {
        AttestationType::Basic
    })
}

pub(crate) fn leaf(chain: &[Certificate]) -> Result<&Certificate, AttestationError> {
    chain
        .first()
        .ok_or_else(|| AttestationError::MalformedStatement("empty certificate chain".into()))
}

/// The leaf's subject key must be the credential key.
pub(crate) fn require_credential_key(
    leaf: &Certificate,
    credential: &AttestedCredentialData,
) -> Result<(), AttestationError> {
    if leaf.public_key()? != *credential.public_key.public_key() {
        return Err(AttestationError::CertificateRequirement(
            "certificate key does not match the credential key".into(),
        ));
    }
    Ok(())
}
