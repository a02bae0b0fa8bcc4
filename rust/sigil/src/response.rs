//! The `PublicKeyCredential` JSON a client returns at the end of a
//! ceremony.

use crate::{CredentialId, Error, UserHandle, encoding, options::PUBLIC_KEY};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

/// The `response` member of a registration credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorAttestationResponse {
    /// The raw client data.
    #[serde(rename = "clientDataJSON", with = "encoding::base64url")]
    pub client_data_json: Vec<u8>,
    /// The CBOR attestation object.
    #[serde(with = "encoding::base64url")]
    pub attestation_object: Vec<u8>,
    /// Transport hints.
    #[serde(default)]
    pub transports: Vec<String>,
}

/// The `response` member of an authentication credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorAssertionResponse {
    /// The raw client data.
    #[serde(rename = "clientDataJSON", with = "encoding::base64url")]
    pub client_data_json: Vec<u8>,
    /// The raw authenticator data.
    #[serde(with = "encoding::base64url")]
    pub authenticator_data: Vec<u8>,
    /// The assertion signature.
    #[serde(with = "encoding::base64url")]
    pub signature: Vec<u8>,
    /// The user handle, returned by discoverable credentials.
    #[serde(default, with = "encoding::base64url::option", skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<UserHandle>,
}

/// A `PublicKeyCredential` as returned to the relying party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredential<R> {
    /// The credential id, base64url.
    pub id: String,
    /// The credential id.
    pub raw_id: CredentialId,
    /// Always `public-key`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The authenticator response.
    pub response: R,
    /// Client extension outputs.
    #[serde(default)]
    pub client_extension_results: Map<String, Value>,
}

/// The client's answer to a registration.
pub type AttestationResponse = PublicKeyCredential<AuthenticatorAttestationResponse>;

/// The client's answer to an authentication.
pub type AssertionResponse = PublicKeyCredential<AuthenticatorAssertionResponse>;

impl<R: DeserializeOwned> PublicKeyCredential<R> {
    /// Parse the JSON a client posted.
    ///
    /// # Errors
    ///
    /// Returns a malformed input error for invalid JSON, a type other than
    /// `public-key` and an `id` that disagrees with `rawId`.
    pub fn from_json(json: &[u8]) -> Result<Self, Error> {
        let credential: Self = serde_json::from_slice(json)
            .map_err(|e| Error::malformed(format!("credential response: {e}")))?;
        credential.check()?;
        Ok(credential)
    }
}

impl<R> PublicKeyCredential<R> {
    /// A credential wrapping `response`, with no extension outputs.
    pub fn new(raw_id: CredentialId, response: R) -> Self {
        Self {
            id: raw_id.to_string(),
            raw_id,
            kind: PUBLIC_KEY.into(),
            response,
            client_extension_results: Map::new(),
        }
    }

    pub(crate) fn check(&self) -> Result<(), Error> {
        if self.kind != PUBLIC_KEY {
            return Err(Error::malformed(format!(
                "credential type {:?} is not {PUBLIC_KEY}",
                self.kind
            )));
        }
        let id = encoding::decode(&self.id)
            .map_err(|e| Error::malformed(format!("credential id: {e}")))?;
        if id != self.raw_id.as_bytes() {
            return Err(Error::malformed("credential id and rawId differ"));
        }
        Ok(())
    }
}
