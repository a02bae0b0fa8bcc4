//! `android-key` attestation.
//!
//! The leaf certificate is issued by the Android keystore for the credential
//! key itself and carries a key description extension:
//!
//! ```text
//! KeyDescription ::= SEQUENCE {
//!     attestationVersion        INTEGER,
//!     attestationSecurityLevel  ENUMERATED,
//!     keymasterVersion          INTEGER,
//!     keymasterSecurityLevel    ENUMERATED,
//!     attestationChallenge      OCTET STRING,
//!     uniqueId                  OCTET STRING,
//!     softwareEnforced          AuthorizationList,
//!     teeEnforced               AuthorizationList,
//!     ...
//! }
//! ```
//!
//! Authorization list entries use context tags above 30, which the `der`
//! reader does not decode, so the lists are scanned at the TLV level.

use super::{
    VerificationContext, attested_credential, basic_or_ca, leaf, require_credential_key,
    unexpected,
};
use crate::{
    AndroidKeyStatement, AttestationError, AttestationStatement, VerificationResult,
    cbor::StatementMap, oid,
};
use ciborium::Value;
use der::{
    Decode, Reader, SliceReader,
    asn1::{AnyRef, OctetStringRef},
};
use sigil_cose::AuthenticatorData;

const KEYS: &[&str] = &["alg", "sig", "x5c"];

/// `allApplications [600] EXPLICIT NULL`
const ALL_APPLICATIONS: u32 = 600;

pub(crate) fn decode(value: &Value, strict: bool) -> Result<AttestationStatement, AttestationError> {
    let map = StatementMap::new(value, "android-key")?;
    map.reject_unknown(KEYS, strict)?;

    Ok(AttestationStatement::AndroidKey(AndroidKeyStatement {
        alg: map.algorithm("alg")?,
        sig: map.bytes("sig")?,
        x5c: map.certificates("x5c")?,
    }))
}

pub(crate) fn verify(
    statement: &AttestationStatement,
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8; 32],
    context: &VerificationContext<'_>,
) -> Result<VerificationResult, AttestationError> {
    let AttestationStatement::AndroidKey(statement) = statement else {
        return Err(unexpected("android-key", statement));
    };
    let credential = attested_credential(auth_data)?;
    let leaf = leaf(&statement.x5c)?;

    context.signatures.verify_with(
        statement.alg,
        &leaf.public_key()?,
        &auth_data.signed_message(client_data_hash),
        &statement.sig,
    )?;
    require_credential_key(leaf, credential)?;

    let extension = leaf.extension(&oid::ANDROID_KEY_DESCRIPTION).ok_or_else(|| {
        AttestationError::CertificateRequirement("missing Android key description extension".into())
    })?;
    let description = KeyDescription::parse(extension)?;

    if description.attestation_challenge != client_data_hash {
        return Err(AttestationError::SignatureInvalid(
            "attestation challenge does not match the client data hash".into(),
        ));
    }
    if description.all_applications {
        return Err(AttestationError::CertificateRequirement(
            "key is usable by all applications".into(),
        ));
    }

    let attestation_type = basic_or_ca(leaf)?;
    context.establish_trust(credential.aaguid, statement.x5c.clone(), attestation_type)
}

struct KeyDescription {
    attestation_challenge: Vec<u8>,
    all_applications: bool,
}

impl KeyDescription {
    fn parse(bytes: &[u8]) -> Result<Self, AttestationError> {
        let mut reader = SliceReader::new(bytes).map_err(invalid)?;
        let description = reader
            .sequence(|seq| {
                let _attestation_version = AnyRef::decode(seq)?;
                let _attestation_security_level = AnyRef::decode(seq)?;
                let _keymaster_version = AnyRef::decode(seq)?;
                let _keymaster_security_level = AnyRef::decode(seq)?;
                let challenge = OctetStringRef::decode(seq)?;
                let _unique_id = AnyRef::decode(seq)?;
                let software_enforced = AnyRef::decode(seq)?;
                let tee_enforced = AnyRef::decode(seq)?;
                while !seq.is_finished() {
                    AnyRef::decode(seq)?;
                }
                Ok((
                    challenge.as_bytes().to_vec(),
                    software_enforced.value().to_vec(),
                    tee_enforced.value().to_vec(),
                ))
            })
            .map_err(invalid)?;
        let (attestation_challenge, software_enforced, tee_enforced) =
            reader.finish(description).map_err(invalid)?;

        let all_applications = context_tags(&software_enforced)?.contains(&ALL_APPLICATIONS)
            || context_tags(&tee_enforced)?.contains(&ALL_APPLICATIONS);

        Ok(Self {
            attestation_challenge,
            all_applications,
        })
    }
}

/// The tag numbers of the context-specific elements in a DER encoded
/// sequence body.
fn context_tags(mut bytes: &[u8]) -> Result<Vec<u32>, AttestationError> {
    let mut tags = Vec::new();
    while let [identifier, rest @ ..] = bytes {
        let mut rest = rest;

        let mut number = u32::from(identifier & 0x1f);
        if number == 0x1f {
            number = 0;
            loop {
                let [byte, tail @ ..] = rest else {
                    return Err(invalid("truncated tag"));
                };
                rest = tail;
                number = number
                    .checked_mul(128)
                    .and_then(|n| n.checked_add(u32::from(byte & 0x7f)))
                    .ok_or_else(|| invalid("tag number overflow"))?;
                if byte & 0x80 == 0 {
                    break;
                }
            }
        }

        let [first, tail @ ..] = rest else {
            return Err(invalid("truncated length"));
        };
        rest = tail;
        let len = if first & 0x80 == 0 {
            usize::from(*first)
        } else {
            let count = usize::from(first & 0x7f);
            if count == 0 || count > 4 || rest.len() < count {
                return Err(invalid("unsupported length encoding"));
            }
            let (len_bytes, tail) = rest.split_at(count);
            rest = tail;
            len_bytes
                .iter()
                .fold(0usize, |acc, b| (acc << 8) | usize::from(*b))
        };
        if rest.len() < len {
            return Err(invalid("truncated value"));
        }

        if identifier & 0xc0 == 0x80 {
            tags.push(number);
        }
        bytes = &rest[len..];
    }
    Ok(tags)
}

fn invalid(e: impl std::fmt::Display) -> AttestationError {
    AttestationError::MalformedCertificate(format!("key description: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        AttestationType, Certificate,
        helpers::{
            CertificateAuthority, LeafOptions, TestVerifiers, android_key_description,
            credential_auth_data, der_sign,
        },
    };
    use sigil_cose::{Aaguid, CoseAlgorithm};
    use testresult::TestResult;

    fn statement(sig: Vec<u8>, x5c: &[Certificate]) -> Value {
        Value::Map(vec![
            (Value::Text("alg".into()), Value::Integer(CoseAlgorithm::Es256.identifier().into())),
            (Value::Text("sig".into()), Value::Bytes(sig)),
            (
                Value::Text("x5c".into()),
                Value::Array(x5c.iter().map(|c| Value::Bytes(c.as_der().to_vec())).collect()),
            ),
        ])
    }

    fn run(challenge: [u8; 32], all_applications: bool, cdh: [u8; 32]) -> TestResult<Result<VerificationResult, AttestationError>> {
        let root = CertificateAuthority::root("Android Root", [1; 32])?;
        let (leaf, credential_key) = root.issue_leaf(
            "Android Keystore Key",
            [7; 32],
            LeafOptions {
                android_key_description: Some(android_key_description(&challenge, all_applications)),
                ..LeafOptions::default()
            },
        )?;
        let auth_data = credential_auth_data("example.com", &credential_key, Aaguid([3; 16]), b"droid")?;
        let sig = der_sign(&credential_key, &auth_data.signed_message(&cdh));

        let decoded = decode(&statement(sig, &[leaf]), true)?;
        let verifiers = TestVerifiers::trusting(vec![root.certificate().clone()]);
        Ok(verify(&decoded, &auth_data, &cdh, &verifiers.context()))
    }

    #[test]
    fn verifies_key_attestation() -> TestResult {
        let result = run([5; 32], false, [5; 32])??;
        assert_eq!(result.attestation_type, AttestationType::Basic);
        Ok(())
    }

    #[test]
    fn challenge_must_be_client_data_hash() -> TestResult {
        assert!(matches!(
            run([5; 32], false, [6; 32])?,
            Err(AttestationError::SignatureInvalid(_))
        ));
        Ok(())
    }

    #[test]
    fn all_applications_is_rejected() -> TestResult {
        assert!(matches!(
            run([5; 32], true, [5; 32])?,
            Err(AttestationError::CertificateRequirement(_))
        ));
        Ok(())
    }

    #[test]
    fn scans_high_tag_numbers() -> TestResult {
        // [600] { NULL }, [1] { INTEGER 2 }
        let body = [0xbf, 0x84, 0x58, 0x02, 0x05, 0x00, 0xa1, 0x03, 0x02, 0x01, 0x02];
        assert_eq!(context_tags(&body)?, vec![600, 1]);
        Ok(())
    }
}
