//! `apple` anonymous attestation.
//!
//! Apple issues a fresh certificate for every credential. The leaf carries
//! the credential key and a nonce extension:
//!
//! ```text
//! SEQUENCE { [1] EXPLICIT OCTET STRING nonce }
//! nonce = SHA-256(authenticatorData || clientDataHash)
//! ```

use super::{VerificationContext, attested_credential, leaf, require_credential_key, unexpected};
use crate::{
    AppleStatement, AttestationError, AttestationStatement, AttestationType, VerificationResult,
    cbor::StatementMap, oid,
};
use ciborium::Value;
use der::{
    Decode, Reader, SliceReader, TagNumber,
    asn1::{ContextSpecific, OctetStringRef},
};
use sha2::{Digest, Sha256};
use sigil_cose::AuthenticatorData;

const KEYS: &[&str] = &["x5c"];

pub(crate) fn decode(value: &Value, strict: bool) -> Result<AttestationStatement, AttestationError> {
    let map = StatementMap::new(value, "apple")?;
    map.reject_unknown(KEYS, strict)?;

    Ok(AttestationStatement::Apple(AppleStatement {
        x5c: map.certificates("x5c")?,
    }))
}

pub(crate) fn verify(
    statement: &AttestationStatement,
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8; 32],
    context: &VerificationContext<'_>,
) -> Result<VerificationResult, AttestationError> {
    let AttestationStatement::Apple(statement) = statement else {
        return Err(unexpected("apple", statement));
    };
    let credential = attested_credential(auth_data)?;
    let leaf = leaf(&statement.x5c)?;

    let extension = leaf.extension(&oid::APPLE_NONCE).ok_or_else(|| {
        AttestationError::CertificateRequirement("missing Apple nonce extension".into())
    })?;
    let expected = Sha256::digest(auth_data.signed_message(client_data_hash));
    if nonce(extension)? != expected.as_slice() {
        return Err(AttestationError::SignatureInvalid(
            "Apple nonce does not bind the authenticator data".into(),
        ));
    }
    require_credential_key(leaf, credential)?;

    context.establish_trust(
        credential.aaguid,
        statement.x5c.clone(),
        AttestationType::AnonymizationCa,
    )
}

fn nonce(extension: &[u8]) -> Result<&[u8], AttestationError> {
    let invalid = |e: der::Error| AttestationError::MalformedCertificate(format!("Apple nonce: {e}"));

    let mut reader = SliceReader::new(extension).map_err(invalid)?;
    let nonce = reader
        .sequence(|seq| {
            let field = ContextSpecific::<OctetStringRef<'_>>::decode_explicit(seq, TagNumber::N1)?
                .ok_or_else(|| seq.error(der::ErrorKind::TagNumberInvalid))?;
            Ok(field.value.as_bytes())
        })
        .map_err(invalid)?;
    reader.finish(nonce).map_err(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::{CertificateAuthority, LeafOptions, TestVerifiers, credential_auth_data};
    use p256::ecdsa::SigningKey;
    use sigil_cose::Aaguid;
    use testresult::TestResult;

    fn run(nonce_cdh: [u8; 32], cdh: [u8; 32], other_key: bool) -> TestResult<Result<VerificationResult, AttestationError>> {
        let root = CertificateAuthority::root("Apple WebAuthn Root CA", [1; 32])?;
        let credential_key = SigningKey::from_bytes(&[7u8; 32].into())?;
        let auth_data = credential_auth_data("example.com", &credential_key, Aaguid::ZERO, b"apple")?;
        let nonce: [u8; 32] = Sha256::digest(auth_data.signed_message(&nonce_cdh)).into();
        let leaf_secret = if other_key { [8; 32] } else { [7; 32] };
        let (leaf, _) = root.issue_leaf(
            "Apple Credential",
            leaf_secret,
            LeafOptions {
                apple_nonce: Some(nonce),
                ..LeafOptions::default()
            },
        )?;

        let statement = AttestationStatement::Apple(AppleStatement { x5c: vec![leaf] });
        let verifiers = TestVerifiers::trusting(vec![root.certificate().clone()]);
        Ok(verify(&statement, &auth_data, &cdh, &verifiers.context()))
    }

    #[test]
    fn verifies_anonymous_attestation() -> TestResult {
        let result = run([2; 32], [2; 32], false)??;
        assert_eq!(result.attestation_type, AttestationType::AnonymizationCa);
        Ok(())
    }

    #[test]
    fn nonce_must_bind_client_data() -> TestResult {
        assert!(matches!(
            run([2; 32], [3; 32], false)?,
            Err(AttestationError::SignatureInvalid(_))
        ));
        Ok(())
    }

    #[test]
    fn certificate_must_hold_the_credential_key() -> TestResult {
        assert!(matches!(
            run([2; 32], [2; 32], true)?,
            Err(AttestationError::CertificateRequirement(_))
        ));
        Ok(())
    }

    #[test]
    fn reads_the_explicitly_tagged_nonce() -> TestResult {
        let mut der = vec![0x30, 0x24, 0xa1, 0x22, 0x04, 0x20];
        der.extend_from_slice(&[0xab; 32]);
        assert_eq!(nonce(&der)?, &[0xab; 32]);
        Ok(())
    }
}
