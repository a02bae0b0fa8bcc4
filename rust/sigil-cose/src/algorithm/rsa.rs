//! RSASSA-PKCS1-v1_5 and RSASSA-PSS.

use crate::{CoseAlgorithm, SignatureError};
use ::rsa::{BigUint, RsaPublicKey, pkcs1v15, pss};
use sha2::{Sha256, Sha384, Sha512};
use signature::Verifier as _;

fn public_key(n: &[u8], e: &[u8]) -> Result<RsaPublicKey, SignatureError> {
    RsaPublicKey::new(BigUint::from_bytes_be(n), BigUint::from_bytes_be(e))
        .map_err(|e| SignatureError::InvalidKey(e.to_string()))
}

fn invalid_signature(e: impl std::fmt::Display) -> SignatureError {
    SignatureError::InvalidSignature(e.to_string())
}

pub(super) fn verify_pkcs1v15(
    alg: CoseAlgorithm,
    n: &[u8],
    e: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), SignatureError> {
    let key = public_key(n, e)?;
    let signature = pkcs1v15::Signature::try_from(signature).map_err(invalid_signature)?;

    match alg {
        CoseAlgorithm::Rs256 => pkcs1v15::VerifyingKey::<Sha256>::new(key)
            .verify(message, &signature)
            .map_err(invalid_signature),
        CoseAlgorithm::Rs384 => pkcs1v15::VerifyingKey::<Sha384>::new(key)
            .verify(message, &signature)
            .map_err(invalid_signature),
        CoseAlgorithm::Rs512 => pkcs1v15::VerifyingKey::<Sha512>::new(key)
            .verify(message, &signature)
            .map_err(invalid_signature),
        other => Err(SignatureError::UnsupportedAlgorithm(format!(
            "{other} is not a PKCS#1 v1.5 algorithm"
        ))),
    }
}

pub(super) fn verify_pss_sha256(
    n: &[u8],
    e: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), SignatureError> {
    let key = public_key(n, e)?;
    let signature = pss::Signature::try_from(signature).map_err(invalid_signature)?;
    pss::VerifyingKey::<Sha256>::new(key)
        .verify(message, &signature)
        .map_err(invalid_signature)
}
