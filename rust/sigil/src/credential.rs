//! Registered credentials and the store that keeps them.

use crate::encoding;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sigil_attestation::{AttestationType, TrustVerdict};
use sigil_cose::{Aaguid, CoseKey};
use std::{collections::HashMap, fmt, sync::Arc};
use thiserror::Error;

macro_rules! byte_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(#[serde(with = "encoding::base64url")] Vec<u8>);

        impl $name {
            /// The raw bytes.
            #[must_use]
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<Vec<u8>> for $name {
            fn from(bytes: Vec<u8>) -> Self {
                Self(bytes)
            }
        }

        impl From<&[u8]> for $name {
            fn from(bytes: &[u8]) -> Self {
                Self(bytes.to_vec())
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), encoding::encode(&self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&encoding::encode(&self.0))
            }
        }
    };
}

byte_id!(
    /// A credential identifier chosen by the authenticator.
    CredentialId
);

byte_id!(
    /// An opaque user identifier chosen by the relying party.
    UserHandle
);

/// A registered credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// The credential id.
    pub id: CredentialId,
    /// The user the credential belongs to.
    pub user_handle: UserHandle,
    /// The credential public key.
    pub public_key: CoseKey,
    /// The last accepted signature counter.
    pub sign_count: u32,
    /// The authenticator model.
    pub aaguid: Aaguid,
    /// The attestation type established at registration.
    pub attestation_type: AttestationType,
    /// How the attestation was trusted at registration.
    pub trust_verdict: TrustVerdict,
    /// Whether the credential may be synced to other devices.
    pub backup_eligible: bool,
    /// Whether the credential was backed up at its last use.
    pub backed_up: bool,
    /// Whether the user was verified at its last use.
    pub user_verified: bool,
    /// Transport hints reported at registration.
    #[serde(default)]
    pub transports: Vec<String>,
}

/// Errors reported by a [`CredentialStore`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No credential with the id exists.
    #[error("credential {0} not found")]
    NotFound(CredentialId),

    /// A credential with the id already exists.
    #[error("credential {0} already exists")]
    AlreadyExists(CredentialId),

    /// The stored counter was not the expected value, so a concurrent
    /// assertion won.
    #[error("stored counter is {found}, expected {expected}")]
    CounterChanged {
        /// The counter the caller validated against.
        expected: u32,
        /// The counter actually stored.
        found: u32,
    },

    /// The backing store could not be reached.
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

/// Persistent credential storage.
///
/// Implementations must make [`CredentialStore::compare_and_swap_counter`]
/// atomic with respect to concurrent calls for the same credential.
pub trait CredentialStore: Send + Sync {
    /// The credential with `id`.
    fn get(&self, id: &CredentialId) -> Result<Option<Credential>, StoreError>;

    /// Every credential of `user`.
    fn credentials_for_user(&self, user: &UserHandle) -> Result<Vec<Credential>, StoreError>;

    /// Store a new credential.
    ///
    /// Fails with [`StoreError::AlreadyExists`] if the id is taken.
    fn save(&self, credential: Credential) -> Result<(), StoreError>;

    /// Replace the counter of `id` with `new` and record the flags of the
    /// assertion, only if the stored counter is still `expected`.
    fn compare_and_swap_counter(
        &self,
        id: &CredentialId,
        expected: u32,
        new: u32,
        usage: CredentialUsage,
    ) -> Result<(), StoreError>;
}

/// Flags of an accepted assertion recorded alongside the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CredentialUsage {
    /// The BS flag.
    pub backed_up: bool,
    /// The UV flag.
    pub user_verified: bool,
}

/// A [`CredentialStore`] that keeps credentials in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentialStore {
    credentials: Arc<RwLock<HashMap<CredentialId, Credential>>>,
}

impl InMemoryCredentialStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of stored credentials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.credentials.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.credentials.read().is_empty()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn get(&self, id: &CredentialId) -> Result<Option<Credential>, StoreError> {
        Ok(self.credentials.read().get(id).cloned())
    }

    fn credentials_for_user(&self, user: &UserHandle) -> Result<Vec<Credential>, StoreError> {
        let mut credentials: Vec<_> = self
            .credentials
            .read()
            .values()
            .filter(|credential| &credential.user_handle == user)
            .cloned()
            .collect();
        credentials.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(credentials)
    }

    fn save(&self, credential: Credential) -> Result<(), StoreError> {
        let mut credentials = self.credentials.write();
        if credentials.contains_key(&credential.id) {
            return Err(StoreError::AlreadyExists(credential.id));
        }
        credentials.insert(credential.id.clone(), credential);
        Ok(())
    }

    fn compare_and_swap_counter(
        &self,
        id: &CredentialId,
        expected: u32,
        new: u32,
        usage: CredentialUsage,
    ) -> Result<(), StoreError> {
        let mut credentials = self.credentials.write();
        let credential = credentials
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if credential.sign_count != expected {
            return Err(StoreError::CounterChanged {
                expected,
                found: credential.sign_count,
            });
        }
        credential.sign_count = new;
        credential.backed_up = usage.backed_up;
        credential.user_verified = usage.user_verified;
        Ok(())
    }
}
