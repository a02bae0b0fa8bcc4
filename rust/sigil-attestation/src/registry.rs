//! The attestation format registry.

use crate::{
    AttestationError, AttestationObject, AttestationStatement, VerificationContext,
    VerificationResult, verifier,
};
use ciborium::Value;
use sigil_cose::AuthenticatorData;
use std::{collections::HashMap, fmt};

/// Turns a statement's CBOR map into a typed statement. The flag requests
/// strict decoding (unknown keys rejected).
pub type DecodeFn = fn(&Value, bool) -> Result<AttestationStatement, AttestationError>;

/// Verifies a typed statement against authenticator data and the client
/// data hash.
pub type VerifyFn = fn(
    &AttestationStatement,
    &AuthenticatorData,
    &[u8; 32],
    &VerificationContext<'_>,
) -> Result<VerificationResult, AttestationError>;

/// The verifier registered for one format.
#[derive(Clone, Copy)]
pub struct Verifier {
    format: &'static str,
    verify: VerifyFn,
}

impl Verifier {
    /// The format this verifier handles.
    #[must_use]
    pub fn format(&self) -> &'static str {
        self.format
    }

    /// Verify `statement` for `auth_data` and `client_data_hash`.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::UnexpectedStatement`] when `statement` was
    /// decoded for another format, and the format's own failure otherwise.
    pub fn verify(
        &self,
        statement: &AttestationStatement,
        auth_data: &AuthenticatorData,
        client_data_hash: &[u8; 32],
        context: &VerificationContext<'_>,
    ) -> Result<VerificationResult, AttestationError> {
        (self.verify)(statement, auth_data, client_data_hash, context)
    }
}

impl fmt::Debug for Verifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Verifier").field(&self.format).finish()
    }
}

#[derive(Clone, Copy)]
struct FormatEntry {
    decode: DecodeFn,
    verifier: Verifier,
}

/// Maps attestation format identifiers to their decoder and verifier.
///
/// Lookups of unregistered identifiers fail with
/// [`AttestationError::FormatNotSupported`]; the registry never falls back
/// to another format.
#[derive(Clone)]
pub struct FormatRegistry {
    formats: HashMap<&'static str, FormatEntry>,
}

impl FormatRegistry {
    /// A registry with no formats.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            formats: HashMap::new(),
        }
    }

    /// A registry with every format this crate implements: `none`, `packed`,
    /// `fido-u2f`, `android-key`, `tpm`, `android-safetynet` and `apple`.
    #[must_use]
    pub fn standard() -> Self {
        Self::empty()
            .with_format("none", verifier::none::decode, verifier::none::verify)
            .with_format("packed", verifier::packed::decode, verifier::packed::verify)
            .with_format("fido-u2f", verifier::fido_u2f::decode, verifier::fido_u2f::verify)
            .with_format(
                "android-key",
                verifier::android_key::decode,
                verifier::android_key::verify,
            )
            .with_format("tpm", verifier::tpm::decode, verifier::tpm::verify)
            .with_format(
                "android-safetynet",
                verifier::safetynet::decode,
                verifier::safetynet::verify,
            )
            .with_format("apple", verifier::apple::decode, verifier::apple::verify)
    }

    /// Register (or replace) `format`.
    #[must_use]
    pub fn with_format(mut self, format: &'static str, decode: DecodeFn, verify: VerifyFn) -> Self {
        self.formats.insert(
            format,
            FormatEntry {
                decode,
                verifier: Verifier { format, verify },
            },
        );
        self
    }

    /// Remove `format`, if registered.
    #[must_use]
    pub fn without_format(mut self, format: &str) -> Self {
        self.formats.remove(format);
        self
    }

    /// The registered format identifiers, sorted.
    #[must_use]
    pub fn formats(&self) -> Vec<&'static str> {
        let mut formats: Vec<_> = self.formats.keys().copied().collect();
        formats.sort_unstable();
        formats
    }

    /// Whether `format` is registered.
    #[must_use]
    pub fn supports(&self, format: &str) -> bool {
        self.formats.contains_key(format)
    }

    fn entry(&self, format: &str) -> Result<&FormatEntry, AttestationError> {
        self.formats
            .get(format)
            .ok_or_else(|| AttestationError::FormatNotSupported(format.to_owned()))
    }

    /// Decode the statement of `object` for its format.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::FormatNotSupported`] for unregistered
    /// formats and the decoder's error for malformed statements.
    pub fn create_statement(
        &self,
        object: &AttestationObject,
        strict: bool,
    ) -> Result<AttestationStatement, AttestationError> {
        (self.entry(object.format())?.decode)(object.statement(), strict)
    }

    /// The verifier registered for `format`.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::FormatNotSupported`] for unregistered
    /// formats.
    pub fn get_verifier(&self, format: &str) -> Result<Verifier, AttestationError> {
        Ok(self.entry(format)?.verifier)
    }

    /// Decode and verify `object` in one step, decoding strictly when
    /// `context.strict` is set.
    ///
    /// # Errors
    ///
    /// Any error of [`FormatRegistry::create_statement`] or of the format's
    /// verifier.
    pub fn verify(
        &self,
        object: &AttestationObject,
        client_data_hash: &[u8; 32],
        context: &VerificationContext<'_>,
    ) -> Result<VerificationResult, AttestationError> {
        let statement = self.create_statement(object, context.strict)?;
        let verifier = self.get_verifier(object.format())?;
        let result = verifier.verify(&statement, object.auth_data(), client_data_hash, context)?;
        tracing::debug!(
            format = object.format(),
            attestation_type = %result.attestation_type,
            verdict = ?result.verdict,
            "attestation verified"
        );
        Ok(result)
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("formats", &self.formats())
            .finish()
    }
}
