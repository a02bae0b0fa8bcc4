//! `fido-u2f` attestation.
//!
//! The signature covers the U2F registration message rather than the usual
//! `authenticatorData || clientDataHash`:
//!
//! ```text
//! 0x00 | rpIdHash (32) | clientDataHash (32) | credentialId | 0x04 | x (32) | y (32)
//! ```

use super::{VerificationContext, attested_credential, basic_or_ca, unexpected};
use crate::{
    AttestationError, AttestationStatement, FidoU2fStatement, VerificationResult,
    cbor::{StatementMap, malformed},
};
use ciborium::Value;
use sigil_cose::{AuthenticatorData, CoseAlgorithm, EcCurve, PublicKey};

const KEYS: &[&str] = &["sig", "x5c"];

pub(crate) fn decode(value: &Value, strict: bool) -> Result<AttestationStatement, AttestationError> {
    let map = StatementMap::new(value, "fido-u2f")?;
    map.reject_unknown(KEYS, strict)?;

    let mut x5c = map.certificates("x5c")?;
    if x5c.len() != 1 {
        return Err(malformed("fido-u2f", format_args!("x5c holds {} certificates, expected 1", x5c.len())));
    }
    let certificate = x5c.remove(0);

    Ok(AttestationStatement::FidoU2f(FidoU2fStatement {
        sig: map.bytes("sig")?,
        certificate,
    }))
}

pub(crate) fn verify(
    statement: &AttestationStatement,
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8; 32],
    context: &VerificationContext<'_>,
) -> Result<VerificationResult, AttestationError> {
    let AttestationStatement::FidoU2f(statement) = statement else {
        return Err(unexpected("fido-u2f", statement));
    };
    let credential = attested_credential(auth_data)?;

    let certificate_key = statement.certificate.public_key()?;
    if !matches!(certificate_key, PublicKey::Ec2 { curve: EcCurve::P256, .. }) {
        return Err(AttestationError::CertificateRequirement(
            "U2F attestation key is not a P-256 key".into(),
        ));
    }

    let credential_point = match credential.public_key.public_key() {
        key @ PublicKey::Ec2 { curve: EcCurve::P256, .. } => key.to_sec1_uncompressed(),
        _ => None,
    }
    .ok_or_else(|| {
        AttestationError::UnsupportedAlgorithm("U2F credentials must be P-256 keys".into())
    })?;

    let mut message = Vec::with_capacity(1 + 32 + 32 + credential.credential_id.len() + 65);
    message.push(0x00);
    message.extend_from_slice(auth_data.rp_id_hash());
    message.extend_from_slice(client_data_hash);
    message.extend_from_slice(&credential.credential_id);
    message.extend_from_slice(&credential_point);

    context
        .signatures
        .verify_with(CoseAlgorithm::Es256, &certificate_key, &message, &statement.sig)?;

    let attestation_type = basic_or_ca(&statement.certificate)?;
    context.establish_trust(
        credential.aaguid,
        vec![statement.certificate.clone()],
        attestation_type,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        AttestationType, Certificate,
        helpers::{
            CertificateAuthority, LeafOptions, TestVerifiers, credential_auth_data, der_sign,
        },
    };
    use p256::ecdsa::SigningKey;
    use sigil_cose::Aaguid;
    use testresult::TestResult;

    fn statement(sig: Vec<u8>, certificates: &[Certificate]) -> Value {
        Value::Map(vec![
            (Value::Text("sig".into()), Value::Bytes(sig)),
            (
                Value::Text("x5c".into()),
                Value::Array(
                    certificates
                        .iter()
                        .map(|c| Value::Bytes(c.as_der().to_vec()))
                        .collect(),
                ),
            ),
        ])
    }

    fn u2f_message(auth_data: &AuthenticatorData, cdh: &[u8; 32]) -> TestResult<Vec<u8>> {
        let credential = auth_data.attested_credential_data().ok_or("no credential")?;
        let mut message = vec![0x00];
        message.extend_from_slice(auth_data.rp_id_hash());
        message.extend_from_slice(cdh);
        message.extend_from_slice(&credential.credential_id);
        message.extend_from_slice(
            &credential
                .public_key
                .public_key()
                .to_sec1_uncompressed()
                .ok_or("not an EC key")?,
        );
        Ok(message)
    }

    #[test]
    fn verifies_u2f_registration_message() -> TestResult {
        let root = CertificateAuthority::root("U2F Root", [1; 32])?;
        let (leaf, attestation_key) = root.issue_leaf("U2F Batch", [2; 32], LeafOptions::default())?;
        let credential_key = SigningKey::from_bytes(&[7u8; 32].into())?;
        let auth_data = credential_auth_data("example.com", &credential_key, Aaguid::ZERO, b"u2f")?;
        let cdh = [9u8; 32];
        let sig = der_sign(&attestation_key, &u2f_message(&auth_data, &cdh)?);

        let decoded = decode(&statement(sig, &[leaf]), true)?;
        let verifiers = TestVerifiers::trusting(vec![root.certificate().clone()]);
        let result = verify(&decoded, &auth_data, &cdh, &verifiers.context())?;

        assert_eq!(result.attestation_type, AttestationType::Basic);
        Ok(())
    }

    #[test]
    fn generic_message_signature_is_rejected() -> TestResult {
        let root = CertificateAuthority::root("U2F Root", [1; 32])?;
        let (leaf, attestation_key) = root.issue_leaf("U2F Batch", [2; 32], LeafOptions::default())?;
        let credential_key = SigningKey::from_bytes(&[7u8; 32].into())?;
        let auth_data = credential_auth_data("example.com", &credential_key, Aaguid::ZERO, b"u2f")?;
        let cdh = [9u8; 32];
        let sig = der_sign(&attestation_key, &auth_data.signed_message(&cdh));

        let decoded = decode(&statement(sig, &[leaf]), true)?;
        let verifiers = TestVerifiers::trusting(vec![root.certificate().clone()]);
        assert!(matches!(
            verify(&decoded, &auth_data, &cdh, &verifiers.context()),
            Err(AttestationError::SignatureInvalid(_))
        ));
        Ok(())
    }

    #[test]
    fn requires_exactly_one_certificate() -> TestResult {
        let root = CertificateAuthority::root("U2F Root", [1; 32])?;
        let (leaf, _) = root.issue_leaf("U2F Batch", [2; 32], LeafOptions::default())?;
        let value = statement(vec![0; 70], &[leaf, root.certificate().clone()]);
        assert!(matches!(
            decode(&value, false),
            Err(AttestationError::MalformedStatement(_))
        ));
        Ok(())
    }
}
