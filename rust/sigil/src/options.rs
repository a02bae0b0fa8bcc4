//! Ceremony inputs and the options JSON handed to the client's
//! `navigator.credentials` call.

use crate::{
    AttestationConveyance, AuthenticationContext, Challenge, CredentialId, RegistrationContext,
    UserHandle, UserVerification,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sigil_cose::CoseAlgorithm;

/// The user a credential is registered for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    /// The opaque user handle stored on the authenticator.
    pub id: UserHandle,
    /// The account name, e.g. an email address.
    pub name: String,
    /// The name shown to the user.
    pub display_name: String,
}

/// Input to [`crate::Server::start_registration`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationOptions {
    /// The user to register a credential for.
    pub user: UserEntity,
    /// Overrides the policy's user verification requirement.
    pub user_verification: Option<UserVerification>,
}

impl RegistrationOptions {
    /// Options for `user` with the policy defaults.
    #[must_use]
    pub fn new(user: UserEntity) -> Self {
        Self {
            user,
            user_verification: None,
        }
    }
}

/// Input to [`crate::Server::start_authentication`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthenticationOptions {
    /// The user authenticating. `None` starts a discoverable ceremony in
    /// which the authenticator picks the credential.
    pub user_handle: Option<UserHandle>,
    /// Overrides the policy's user verification requirement.
    pub user_verification: Option<UserVerification>,
}

impl AuthenticationOptions {
    /// Options for a known user.
    #[must_use]
    pub fn for_user(user_handle: UserHandle) -> Self {
        Self {
            user_handle: Some(user_handle),
            user_verification: None,
        }
    }

    /// Options for a discoverable ceremony.
    #[must_use]
    pub fn discoverable() -> Self {
        Self::default()
    }
}

/// The relying party as presented to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelyingPartyEntity {
    /// The relying party id.
    pub id: String,
    /// The display name.
    pub name: String,
}

/// An entry of `pubKeyCredParams`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialParameters {
    /// Always `public-key`.
    #[serde(rename = "type")]
    pub kind: String,
    /// A COSE algorithm identifier.
    pub alg: CoseAlgorithm,
}

/// An entry of `excludeCredentials` or `allowCredentials`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialDescriptor {
    /// Always `public-key`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The credential id.
    pub id: CredentialId,
    /// Transport hints.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<String>,
}

impl CredentialDescriptor {
    pub(crate) fn public_key(id: CredentialId, transports: Vec<String>) -> Self {
        Self {
            kind: PUBLIC_KEY.into(),
            id,
            transports,
        }
    }
}

/// The `authenticatorSelection` member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    /// The user verification requirement.
    pub user_verification: UserVerification,
}

pub(crate) const PUBLIC_KEY: &str = "public-key";

/// `PublicKeyCredentialCreationOptions` in its JSON form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationOptions {
    /// The challenge.
    pub challenge: Challenge,
    /// The relying party.
    pub rp: RelyingPartyEntity,
    /// The user.
    pub user: UserEntity,
    /// Accepted algorithms, in preference order.
    pub pub_key_cred_params: Vec<CredentialParameters>,
    /// The ceremony timeout in milliseconds.
    pub timeout: u64,
    /// Credentials the user already has.
    pub exclude_credentials: Vec<CredentialDescriptor>,
    /// Authenticator requirements.
    pub authenticator_selection: AuthenticatorSelection,
    /// Requested attestation conveyance.
    pub attestation: AttestationConveyance,
    /// Extension inputs.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

/// `PublicKeyCredentialRequestOptions` in its JSON form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    /// The challenge.
    pub challenge: Challenge,
    /// The ceremony timeout in milliseconds.
    pub timeout: u64,
    /// The relying party id.
    pub rp_id: String,
    /// Credentials the assertion may use; empty for discoverable ceremonies.
    pub allow_credentials: Vec<CredentialDescriptor>,
    /// The user verification requirement.
    pub user_verification: UserVerification,
    /// Extension inputs.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

/// The result of [`crate::Server::start_registration`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    /// Options for the client.
    pub client_options: CreationOptions,
    /// The context to hand back to `finish_registration`.
    pub context: RegistrationContext,
}

/// The result of [`crate::Server::start_authentication`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationRequest {
    /// Options for the client.
    pub client_options: RequestOptions,
    /// The context to hand back to `finish_authentication`.
    pub context: AuthenticationContext,
}
