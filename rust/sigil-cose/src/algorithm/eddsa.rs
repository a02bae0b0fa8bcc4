//! EdDSA over Ed25519.

use crate::SignatureError;
use ed25519_dalek::{Signature, VerifyingKey};

pub(super) fn verify_ed25519(
    x: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), SignatureError> {
    let bytes: &[u8; 32] = x
        .try_into()
        .map_err(|_| SignatureError::InvalidKey(format!("expected 32 key bytes, got {}", x.len())))?;
    let key = VerifyingKey::from_bytes(bytes).map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
    let signature =
        Signature::from_slice(signature).map_err(|e| SignatureError::InvalidSignature(e.to_string()))?;

    // Strict verification rejects small-order keys and non-canonical R.
    key.verify_strict(message, &signature)
        .map_err(|e| SignatureError::InvalidSignature(e.to_string()))
}
