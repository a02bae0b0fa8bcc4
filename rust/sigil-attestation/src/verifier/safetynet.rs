//! `android-safetynet` attestation.
//!
//! The statement's `response` is a compact JWS issued by Google Play
//! Services. Its header carries the signing chain, its payload a `nonce`
//! binding the ceremony:
//!
//! ```text
//! nonce = base64(SHA-256(authenticatorData || clientDataHash))
//! ```

use super::{VerificationContext, attested_credential, leaf, unexpected};
use crate::{
    AttestationError, AttestationStatement, AttestationType, Certificate, SafetyNetStatement,
    VerificationResult,
    cbor::{StatementMap, malformed},
};
use base64::{
    Engine as _,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use ciborium::Value;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use sigil_cose::{AuthenticatorData, CoseAlgorithm};

const KEYS: &[&str] = &["ver", "response"];

/// The subject common name of the SafetyNet signing certificate.
const ATTESTATION_HOSTNAME: &str = "attest.android.com";

pub(crate) fn decode(value: &Value, strict: bool) -> Result<AttestationStatement, AttestationError> {
    let map = StatementMap::new(value, "android-safetynet")?;
    map.reject_unknown(KEYS, strict)?;

    let ver = map.text("ver")?;
    if ver.is_empty() {
        return Err(malformed("android-safetynet", "empty version"));
    }

    Ok(AttestationStatement::AndroidSafetyNet(SafetyNetStatement {
        ver: ver.to_owned(),
        response: map.bytes("response")?,
    }))
}

pub(crate) fn verify(
    statement: &AttestationStatement,
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8; 32],
    context: &VerificationContext<'_>,
) -> Result<VerificationResult, AttestationError> {
    let AttestationStatement::AndroidSafetyNet(statement) = statement else {
        return Err(unexpected("android-safetynet", statement));
    };
    let credential = attested_credential(auth_data)?;

    let jws = Jws::parse(&statement.response)?;
    let leaf = leaf(&jws.chain)?;
    context
        .signatures
        .verify_with(jws.alg, &leaf.public_key()?, jws.signing_input, &jws.signature)?;

    if leaf.subject_common_name() != Some(ATTESTATION_HOSTNAME) {
        return Err(AttestationError::CertificateRequirement(format!(
            "SafetyNet response not signed by {ATTESTATION_HOSTNAME}"
        )));
    }

    let expected = STANDARD.encode(Sha256::digest(auth_data.signed_message(client_data_hash)));
    if jws.payload.nonce != expected {
        return Err(AttestationError::SignatureInvalid(
            "SafetyNet nonce does not bind the authenticator data".into(),
        ));
    }
    if context.strict && !jws.payload.cts_profile_match {
        return Err(AttestationError::CertificateRequirement(
            "device does not match a compatible profile".into(),
        ));
    }
    tracing::debug!(
        ver = %statement.ver,
        timestamp_ms = jws.payload.timestamp_ms,
        cts_profile_match = jws.payload.cts_profile_match,
        "SafetyNet response accepted"
    );

    context.establish_trust(credential.aaguid, jws.chain, AttestationType::Basic)
}

#[derive(Deserialize)]
struct Header {
    alg: String,
    #[serde(default)]
    x5c: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    nonce: String,
    #[serde(default)]
    timestamp_ms: u64,
    #[serde(default)]
    cts_profile_match: bool,
}

struct Jws<'a> {
    alg: CoseAlgorithm,
    chain: Vec<Certificate>,
    payload: Payload,
    signing_input: &'a [u8],
    signature: Vec<u8>,
}

impl<'a> Jws<'a> {
    fn parse(response: &'a [u8]) -> Result<Self, AttestationError> {
        let invalid = |reason: &dyn std::fmt::Display| malformed("android-safetynet", reason);

        let dot = response
            .iter()
            .rposition(|b| *b == b'.')
            .ok_or_else(|| invalid(&"response is not a compact JWS"))?;
        let (signing_input, signature) = (&response[..dot], &response[dot + 1..]);
        let mut parts = signing_input.split(|b| *b == b'.');
        let (Some(header), Some(payload), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid(&"response is not a compact JWS"));
        };

        let header: Header = serde_json::from_slice(
            &URL_SAFE_NO_PAD.decode(header).map_err(|e| invalid(&e))?,
        )
        .map_err(|e| invalid(&e))?;
        let payload: Payload = serde_json::from_slice(
            &URL_SAFE_NO_PAD.decode(payload).map_err(|e| invalid(&e))?,
        )
        .map_err(|e| invalid(&e))?;
        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|e| invalid(&e))?;

        let alg = match header.alg.as_str() {
            "RS256" => CoseAlgorithm::Rs256,
            "RS384" => CoseAlgorithm::Rs384,
            "RS512" => CoseAlgorithm::Rs512,
            "PS256" => CoseAlgorithm::Ps256,
            other => {
                return Err(AttestationError::UnsupportedAlgorithm(format!(
                    "JWS algorithm {other}"
                )));
            }
        };
        if header.x5c.is_empty() {
            return Err(invalid(&"JWS header has no x5c"));
        }
        let chain = header
            .x5c
            .iter()
            .map(|encoded| {
                STANDARD
                    .decode(encoded)
                    .map_err(|e| invalid(&e))
                    .and_then(|der| Certificate::from_der(&der))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            alg,
            chain,
            payload,
            signing_input,
            signature,
        })
    }
}
