//! Error types for binary decoding and signature verification.

use crate::CoseAlgorithm;
use thiserror::Error;

/// Errors produced while decoding authenticator data or COSE keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The input ended before a fixed-size field could be read.
    #[error("truncated {field}: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        /// The field being read.
        field: &'static str,
        /// Bytes the field requires.
        needed: usize,
        /// Bytes that were left in the input.
        remaining: usize,
    },

    /// Bytes remained after the structure ended and no extension block was
    /// announced by the flags.
    #[error("{0} unconsumed trailing bytes")]
    TrailingBytes(usize),

    /// The extension flag was set but no extension block followed.
    #[error("extension data flag set without extension data")]
    MissingExtensions,

    /// The CBOR encoding itself is invalid.
    #[error("invalid CBOR: {0}")]
    InvalidCbor(String),

    /// The COSE key is structurally invalid (missing or mistyped parameter).
    #[error("invalid COSE key: {0}")]
    InvalidKey(String),

    /// The COSE key names a key type, curve or algorithm this crate does
    /// not support.
    #[error("unsupported COSE key: {0}")]
    UnsupportedKey(String),
}

/// Errors produced by [`crate::SignatureVerifier`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// The algorithm is unknown, not compiled in, or not accepted by policy.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The algorithm cannot be used with the supplied key type or curve.
    #[error("algorithm {alg} cannot be used with a {key} key")]
    KeyMismatch {
        /// The requested algorithm.
        alg: CoseAlgorithm,
        /// A description of the supplied key.
        key: String,
    },

    /// The public key material could not be loaded.
    #[error("invalid public key: {0}")]
    InvalidKey(String),

    /// The signature is malformed or does not verify.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}
