//! ECDSA over the NIST curves.
//!
//! WebAuthn carries ECDSA signatures ASN.1 DER encoded, and COSE keys carry
//! the affine coordinates separately; both are normalized here before
//! handing them to the RustCrypto curve crates.

use crate::SignatureError;

/// Uncompressed SEC1 encoding: `0x04 || x || y`.
fn sec1_uncompressed(x: &[u8], y: &[u8]) -> Vec<u8> {
    let mut point = Vec::with_capacity(1 + x.len() + y.len());
    point.push(0x04);
    point.extend_from_slice(x);
    point.extend_from_slice(y);
    point
}

fn invalid_key(e: impl std::fmt::Display) -> SignatureError {
    SignatureError::InvalidKey(e.to_string())
}

fn invalid_signature(e: impl std::fmt::Display) -> SignatureError {
    SignatureError::InvalidSignature(e.to_string())
}

#[cfg(feature = "es256")]
pub(super) fn verify_p256(
    x: &[u8],
    y: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), SignatureError> {
    use p256::ecdsa::{Signature, VerifyingKey, signature::Verifier as _};

    let key = VerifyingKey::from_sec1_bytes(&sec1_uncompressed(x, y)).map_err(invalid_key)?;
    let signature = Signature::from_der(signature).map_err(invalid_signature)?;
    key.verify(message, &signature).map_err(invalid_signature)
}

#[cfg(feature = "es384")]
pub(super) fn verify_p384(
    x: &[u8],
    y: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), SignatureError> {
    use p384::ecdsa::{Signature, VerifyingKey, signature::Verifier as _};

    let key = VerifyingKey::from_sec1_bytes(&sec1_uncompressed(x, y)).map_err(invalid_key)?;
    let signature = Signature::from_der(signature).map_err(invalid_signature)?;
    key.verify(message, &signature).map_err(invalid_signature)
}

#[cfg(feature = "es512")]
pub(super) fn verify_p521(
    x: &[u8],
    y: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), SignatureError> {
    use p521::ecdsa::{Signature, VerifyingKey, signature::Verifier as _};

    let key = VerifyingKey::from_sec1_bytes(&sec1_uncompressed(x, y)).map_err(invalid_key)?;
    let signature = Signature::from_der(signature).map_err(invalid_signature)?;
    key.verify(message, &signature).map_err(invalid_signature)
}
