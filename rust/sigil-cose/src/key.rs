//! COSE public keys.
//!
//! A [`CoseKey`] is decoded from the CBOR map embedded in attested credential
//! data. The map carries no outer length, so decoding consumes exactly one
//! CBOR item from the front of the input and reports how far it got.

use crate::{CodecError, CoseAlgorithm};
use ciborium::Value;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const LABEL_KTY: i64 = 1;
const LABEL_ALG: i64 = 3;
const LABEL_CRV: i64 = -1;
const LABEL_X: i64 = -2;
const LABEL_Y: i64 = -3;
const LABEL_RSA_N: i64 = -1;
const LABEL_RSA_E: i64 = -2;

const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;

/// The NIST curves usable with EC2 keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EcCurve {
    /// NIST P-256 (`crv` 1).
    P256,
    /// NIST P-384 (`crv` 2).
    P384,
    /// NIST P-521 (`crv` 3).
    P521,
}

impl EcCurve {
    /// Length in bytes of one affine coordinate.
    #[must_use]
    pub const fn coordinate_len(self) -> usize {
        match self {
            EcCurve::P256 => 32,
            EcCurve::P384 => 48,
            EcCurve::P521 => 66,
        }
    }

    const fn identifier(self) -> i64 {
        match self {
            EcCurve::P256 => 1,
            EcCurve::P384 => 2,
            EcCurve::P521 => 3,
        }
    }

    fn from_identifier(id: i64) -> Option<Self> {
        match id {
            1 => Some(EcCurve::P256),
            2 => Some(EcCurve::P384),
            3 => Some(EcCurve::P521),
            _ => None,
        }
    }
}

/// The curves usable with OKP keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OkpCurve {
    /// Ed25519 (`crv` 6).
    Ed25519,
}

/// Public key material, independent of the algorithm it is used with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PublicKey {
    /// An elliptic curve point given by its affine coordinates.
    Ec2 {
        /// The curve.
        curve: EcCurve,
        /// Big-endian x coordinate, left-padded to the curve size.
        x: Vec<u8>,
        /// Big-endian y coordinate, left-padded to the curve size.
        y: Vec<u8>,
    },
    /// An octet key pair (EdDSA).
    Okp {
        /// The curve.
        curve: OkpCurve,
        /// The encoded public point.
        x: Vec<u8>,
    },
    /// An RSA public key.
    Rsa {
        /// Big-endian modulus without leading zeros.
        n: Vec<u8>,
        /// Big-endian public exponent without leading zeros.
        e: Vec<u8>,
    },
}

impl PublicKey {
    /// The uncompressed SEC1 point (`0x04 || x || y`) of an EC2 key, the
    /// "raw ANSI X9.62" form legacy U2F messages embed.
    #[must_use]
    pub fn to_sec1_uncompressed(&self) -> Option<Vec<u8>> {
        match self {
            PublicKey::Ec2 { x, y, .. } => {
                let mut point = Vec::with_capacity(1 + x.len() + y.len());
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                Some(point)
            }
            _ => None,
        }
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublicKey::Ec2 { curve, .. } => write!(f, "EC2 {curve:?}"),
            PublicKey::Okp { curve, .. } => write!(f, "OKP {curve:?}"),
            PublicKey::Rsa { n, .. } => write!(f, "RSA-{}", n.len() * 8),
        }
    }
}

/// A credential public key together with the algorithm it signs with and the
/// exact CBOR bytes it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoseKey {
    alg: CoseAlgorithm,
    key: PublicKey,
    raw: Vec<u8>,
}

impl CoseKey {
    /// Build a key and its canonical CBOR encoding.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidKey`] if `alg` cannot be used with `key`
    /// or the key material has the wrong size.
    pub fn new(alg: CoseAlgorithm, key: PublicKey) -> Result<Self, CodecError> {
        check_key(alg, &key)?;

        let int = |v: i64| Value::Integer(v.into());
        let mut entries = vec![];
        match &key {
            PublicKey::Ec2 { curve, x, y } => {
                entries.push((int(LABEL_KTY), int(KTY_EC2)));
                entries.push((int(LABEL_ALG), int(alg.identifier())));
                entries.push((int(LABEL_CRV), int(curve.identifier())));
                entries.push((int(LABEL_X), Value::Bytes(x.clone())));
                entries.push((int(LABEL_Y), Value::Bytes(y.clone())));
            }
            PublicKey::Okp { x, .. } => {
                entries.push((int(LABEL_KTY), int(KTY_OKP)));
                entries.push((int(LABEL_ALG), int(alg.identifier())));
                entries.push((int(LABEL_CRV), int(6)));
                entries.push((int(LABEL_X), Value::Bytes(x.clone())));
            }
            PublicKey::Rsa { n, e } => {
                entries.push((int(LABEL_KTY), int(KTY_RSA)));
                entries.push((int(LABEL_ALG), int(alg.identifier())));
                entries.push((int(LABEL_RSA_N), Value::Bytes(n.clone())));
                entries.push((int(LABEL_RSA_E), Value::Bytes(e.clone())));
            }
        }

        let mut raw = Vec::new();
        ciborium::ser::into_writer(&Value::Map(entries), &mut raw)
            .map_err(|e| CodecError::InvalidCbor(e.to_string()))?;

        Ok(Self { alg, key, raw })
    }

    /// Decode one COSE key from the front of `input`, advancing `input` past
    /// the bytes the key occupied.
    ///
    /// # Errors
    ///
    /// Returns an error if the CBOR is malformed, a required parameter is
    /// missing, or the key type, curve or algorithm is unsupported.
    pub fn decode_prefix(input: &mut &[u8]) -> Result<Self, CodecError> {
        let start = *input;
        let value: Value = ciborium::de::from_reader(&mut *input)
            .map_err(|e| CodecError::InvalidCbor(e.to_string()))?;
        let consumed = start.len() - input.len();
        Self::from_value(&value, start[..consumed].to_vec())
    }

    /// Decode a COSE key that must span all of `bytes`.
    ///
    /// # Errors
    ///
    /// As [`CoseKey::decode_prefix`], plus [`CodecError::TrailingBytes`] if
    /// anything follows the key.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut input = bytes;
        let key = Self::decode_prefix(&mut input)?;
        if !input.is_empty() {
            return Err(CodecError::TrailingBytes(input.len()));
        }
        Ok(key)
    }

    /// The algorithm this key is registered for.
    #[must_use]
    pub const fn algorithm(&self) -> CoseAlgorithm {
        self.alg
    }

    /// The key material.
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.key
    }

    /// The CBOR encoding this key was decoded from (or encoded to).
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    fn from_value(value: &Value, raw: Vec<u8>) -> Result<Self, CodecError> {
        let entries = value
            .as_map()
            .ok_or_else(|| CodecError::InvalidKey("expected a CBOR map".into()))?;

        let kty = int_param(entries, LABEL_KTY, "kty")?;
        let alg_id = int_param(entries, LABEL_ALG, "alg")?;
        let alg = CoseAlgorithm::try_from(alg_id)
            .map_err(|_| CodecError::UnsupportedKey(format!("algorithm {alg_id}")))?;

        let key = match kty {
            KTY_EC2 => {
                let crv = int_param(entries, LABEL_CRV, "crv")?;
                let curve = EcCurve::from_identifier(crv)
                    .ok_or_else(|| CodecError::UnsupportedKey(format!("EC2 curve {crv}")))?;
                PublicKey::Ec2 {
                    curve,
                    x: bytes_param(entries, LABEL_X, "x")?,
                    y: bytes_param(entries, LABEL_Y, "y")?,
                }
            }
            KTY_OKP => {
                let crv = int_param(entries, LABEL_CRV, "crv")?;
                if crv != 6 {
                    return Err(CodecError::UnsupportedKey(format!("OKP curve {crv}")));
                }
                PublicKey::Okp {
                    curve: OkpCurve::Ed25519,
                    x: bytes_param(entries, LABEL_X, "x")?,
                }
            }
            KTY_RSA => PublicKey::Rsa {
                n: bytes_param(entries, LABEL_RSA_N, "n")?,
                e: bytes_param(entries, LABEL_RSA_E, "e")?,
            },
            other => return Err(CodecError::UnsupportedKey(format!("key type {other}"))),
        };

        check_key(alg, &key)?;
        Ok(Self { alg, key, raw })
    }
}

fn check_key(alg: CoseAlgorithm, key: &PublicKey) -> Result<(), CodecError> {
    if !alg.fits(key) {
        return Err(CodecError::InvalidKey(format!(
            "algorithm {alg} cannot be used with a {key} key"
        )));
    }
    match key {
        PublicKey::Ec2 { curve, x, y } => {
            let len = curve.coordinate_len();
            if x.len() != len || y.len() != len {
                return Err(CodecError::InvalidKey(format!(
                    "{curve:?} coordinates must be {len} bytes"
                )));
            }
        }
        PublicKey::Okp { x, .. } => {
            if x.len() != 32 {
                return Err(CodecError::InvalidKey("Ed25519 key must be 32 bytes".into()));
            }
        }
        PublicKey::Rsa { n, e } => {
            if n.is_empty() || e.is_empty() {
                return Err(CodecError::InvalidKey("empty RSA parameter".into()));
            }
        }
    }
    Ok(())
}

fn param<'a>(entries: &'a [(Value, Value)], label: i64) -> Option<&'a Value> {
    entries.iter().find_map(|(k, v)| match k {
        Value::Integer(i) if i128::from(*i) == i128::from(label) => Some(v),
        _ => None,
    })
}

fn int_param(entries: &[(Value, Value)], label: i64, name: &str) -> Result<i64, CodecError> {
    let value = param(entries, label)
        .ok_or_else(|| CodecError::InvalidKey(format!("missing {name}")))?;
    value
        .as_integer()
        .and_then(|i| i64::try_from(i).ok())
        .ok_or_else(|| CodecError::InvalidKey(format!("{name} must be an integer")))
}

fn bytes_param(entries: &[(Value, Value)], label: i64, name: &str) -> Result<Vec<u8>, CodecError> {
    param(entries, label)
        .and_then(Value::as_bytes)
        .cloned()
        .ok_or_else(|| CodecError::InvalidKey(format!("missing or non-bytes {name}")))
}

impl Serialize for CoseKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serde_bytes::serialize(&self.raw, serializer)
    }
}

impl<'de> Deserialize<'de> for CoseKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: serde_bytes::ByteBuf = serde::Deserialize::deserialize(deserializer)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}
