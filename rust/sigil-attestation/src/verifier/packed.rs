//! `packed` attestation: self, basic/CA, or (unimplemented) ECDAA.

use super::{VerificationContext, attested_credential, basic_or_ca, leaf, unexpected};
use crate::{
    AttestationError, AttestationStatement, Certificate, PackedSigner, PackedStatement,
    VerificationResult, cbor::StatementMap, oid,
};
use ciborium::Value;
use der::{Decode, asn1::OctetStringRef};
use sigil_cose::{Aaguid, AuthenticatorData};

const KEYS: &[&str] = &["alg", "sig", "x5c", "ecdaaKeyId"];

pub(crate) fn decode(value: &Value, strict: bool) -> Result<AttestationStatement, AttestationError> {
    let map = StatementMap::new(value, "packed")?;
    map.reject_unknown(KEYS, strict)?;

    let signer = if map.get("x5c").is_some() {
        PackedSigner::Certificates(map.certificates("x5c")?)
    } else if map.get("ecdaaKeyId").is_some() {
        PackedSigner::Ecdaa(map.bytes("ecdaaKeyId")?)
    } else {
        PackedSigner::SelfAttestation
    };

    Ok(AttestationStatement::Packed(PackedStatement {
        alg: map.algorithm("alg")?,
        sig: map.bytes("sig")?,
        signer,
    }))
}

pub(crate) fn verify(
    statement: &AttestationStatement,
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8; 32],
    context: &VerificationContext<'_>,
) -> Result<VerificationResult, AttestationError> {
    let AttestationStatement::Packed(statement) = statement else {
        return Err(unexpected("packed", statement));
    };
    let credential = attested_credential(auth_data)?;
    let message = auth_data.signed_message(client_data_hash);

    match &statement.signer {
        PackedSigner::SelfAttestation => {
            let key = &credential.public_key;
            if statement.alg != key.algorithm() {
                return Err(AttestationError::UnsupportedAlgorithm(format!(
                    "self attestation signed with {} by a {} credential",
                    statement.alg,
                    key.algorithm()
                )));
            }
            context.signatures.verify(&message, &statement.sig, key)?;
            tracing::debug!(alg = %statement.alg, "packed self attestation verified");
            Ok(VerificationResult::self_attested())
        }
        PackedSigner::Certificates(chain) => {
            let leaf = leaf(chain)?;
            context
                .signatures
                .verify_with(statement.alg, &leaf.public_key()?, &message, &statement.sig)?;
            check_certificate(leaf, credential.aaguid)?;
            let attestation_type = basic_or_ca(leaf)?;
            context.establish_trust(credential.aaguid, chain.clone(), attestation_type)
        }
        PackedSigner::Ecdaa(_) => Err(AttestationError::UnsupportedAlgorithm(
            "ECDAA attestation is not implemented".into(),
        )),
    }
}

/// The attestation certificate must be v3, and an `id-fido-gen-ce-aaguid`
/// extension, if present, must name the authenticator's AAGUID.
fn check_certificate(leaf: &Certificate, aaguid: Aaguid) -> Result<(), AttestationError> {
    if !leaf.is_v3() {
        return Err(AttestationError::CertificateRequirement(
            "packed attestation certificate is not X.509 v3".into(),
        ));
    }
    if let Some(value) = leaf.extension(&oid::FIDO_GEN_CE_AAGUID) {
        let inner = OctetStringRef::from_der(value)
            .map_err(|e| AttestationError::MalformedCertificate(e.to_string()))?;
        if inner.as_bytes() != aaguid.as_bytes() {
            return Err(AttestationError::CertificateRequirement(
                "certificate AAGUID extension does not match authenticator data".into(),
            ));
        }
    }
    Ok(())
}
