//! Serde helpers for the base64url byte fields of the WebAuthn JSON shapes.
//!
//! Use with `#[serde(with = "crate::encoding::base64url")]` on fields that
//! implement `AsRef<[u8]>` and `From<Vec<u8>>`.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

/// Encode bytes as unpadded base64url.
pub(crate) fn encode(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode base64url, tolerating trailing padding.
pub(crate) fn decode(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(text.trim_end_matches('='))
}

pub(crate) mod base64url {
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: AsRef<[u8]>,
        S: Serializer,
    {
        serializer.serialize_str(&super::encode(value))
    }

    pub(crate) fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: From<Vec<u8>>,
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        super::decode(&text)
            .map(T::from)
            .map_err(serde::de::Error::custom)
    }

    /// The same encoding for optional fields; `null` and a missing field
    /// both read as `None`.
    pub(crate) mod option {
        use serde::{Deserialize, Deserializer, Serializer};

        pub(crate) fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
        where
            T: AsRef<[u8]>,
            S: Serializer,
        {
            match value {
                Some(value) => serializer.serialize_some(&super::super::encode(value)),
                None => serializer.serialize_none(),
            }
        }

        pub(crate) fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
        where
            T: From<Vec<u8>>,
            D: Deserializer<'de>,
        {
            match Option::<String>::deserialize(deserializer)? {
                Some(text) if !text.is_empty() => super::super::decode(&text)
                    .map(|bytes| Some(T::from(bytes)))
                    .map_err(serde::de::Error::custom),
                _ => Ok(None),
            }
        }
    }
}
