//! The client data the browser assembles and the authenticator signs over.

use crate::{Error, encoding};
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Which ceremony the client data was produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CeremonyType {
    /// Registration, `webauthn.create`.
    Create,
    /// Authentication, `webauthn.get`.
    Get,
}

impl CeremonyType {
    /// The `type` member of the client data.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CeremonyType::Create => "webauthn.create",
            CeremonyType::Get => "webauthn.get",
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClientData {
    #[serde(rename = "type")]
    ceremony: String,
    challenge: String,
    origin: String,
    #[serde(default)]
    cross_origin: bool,
    #[serde(default)]
    top_origin: Option<String>,
}

/// Parsed client data. Signatures cover [`ClientData::hash`] of the raw
/// bytes, never a re-serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientData {
    /// The ceremony type.
    pub ceremony: CeremonyType,
    /// The decoded challenge bytes.
    pub challenge: Vec<u8>,
    /// The origin the client reports, unnormalized.
    pub origin: String,
    /// Whether the ceremony ran in a cross-origin frame.
    pub cross_origin: bool,
    /// The top level origin for cross-origin frames.
    pub top_origin: Option<String>,
    hash: [u8; 32],
}

impl ClientData {
    /// Parse `clientDataJSON`.
    ///
    /// # Errors
    ///
    /// Returns a malformed input error for invalid JSON, a challenge that
    /// is not base64url and an unknown ceremony type.
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let raw: RawClientData = serde_json::from_slice(bytes)
            .map_err(|e| Error::malformed(format!("client data: {e}")))?;
        let ceremony = match raw.ceremony.as_str() {
            "webauthn.create" => CeremonyType::Create,
            "webauthn.get" => CeremonyType::Get,
            other => {
                return Err(Error::malformed(format!(
                    "unknown client data type {other:?}"
                )));
            }
        };
        let challenge = encoding::decode(&raw.challenge)
            .map_err(|e| Error::malformed(format!("client data challenge: {e}")))?;
        Ok(Self {
            ceremony,
            challenge,
            origin: raw.origin,
            cross_origin: raw.cross_origin,
            top_origin: raw.top_origin,
            hash: Sha256::digest(bytes).into(),
        })
    }

    /// SHA-256 of the raw bytes this was parsed from.
    #[must_use]
    pub fn hash(&self) -> &[u8; 32] {
        &self.hash
    }
}
