//! Single-use ceremony state.
//!
//! A context is created by a `start_*` operation, held by the caller (or a
//! [`ContextStore`]) and consumed by the matching `finish_*` operation. The
//! server keeps no reference to it.

use crate::{
    Challenge, CredentialId, Origin, StoreError, UserEntity, UserHandle, UserVerification,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc, time::Duration};
use web_time::Instant;

/// State shared by both ceremony contexts.
pub trait CeremonyContext: Clone + Send + Sync {
    /// The challenge the context is bound to.
    fn challenge(&self) -> &Challenge;
}

/// The state of a registration between start and finish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationContext {
    challenge: Challenge,
    origin: Origin,
    rp_id: String,
    user: UserEntity,
    exclude_credentials: Vec<CredentialId>,
    user_verification: UserVerification,
}

impl RegistrationContext {
    pub(crate) fn new(
        challenge: Challenge,
        origin: Origin,
        rp_id: String,
        user: UserEntity,
        exclude_credentials: Vec<CredentialId>,
        user_verification: UserVerification,
    ) -> Self {
        Self {
            challenge,
            origin,
            rp_id,
            user,
            exclude_credentials,
            user_verification,
        }
    }

    /// The origin the ceremony must come from.
    #[must_use]
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// The relying party id.
    #[must_use]
    pub fn rp_id(&self) -> &str {
        &self.rp_id
    }

    /// The user being registered.
    #[must_use]
    pub fn user(&self) -> &UserEntity {
        &self.user
    }

    /// Credentials the user already has.
    #[must_use]
    pub fn exclude_credentials(&self) -> &[CredentialId] {
        &self.exclude_credentials
    }

    /// The user verification requirement of the ceremony.
    #[must_use]
    pub fn user_verification(&self) -> UserVerification {
        self.user_verification
    }
}

impl CeremonyContext for RegistrationContext {
    fn challenge(&self) -> &Challenge {
        &self.challenge
    }
}

/// The state of an authentication between start and finish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationContext {
    challenge: Challenge,
    origin: Origin,
    rp_id: String,
    user_handle: Option<UserHandle>,
    allow_credentials: Vec<CredentialId>,
    user_verification: UserVerification,
}

impl AuthenticationContext {
    pub(crate) fn new(
        challenge: Challenge,
        origin: Origin,
        rp_id: String,
        user_handle: Option<UserHandle>,
        allow_credentials: Vec<CredentialId>,
        user_verification: UserVerification,
    ) -> Self {
        Self {
            challenge,
            origin,
            rp_id,
            user_handle,
            allow_credentials,
            user_verification,
        }
    }

    /// The origin the ceremony must come from.
    #[must_use]
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// The relying party id.
    #[must_use]
    pub fn rp_id(&self) -> &str {
        &self.rp_id
    }

    /// The user authenticating, unless the ceremony is discoverable.
    #[must_use]
    pub fn user_handle(&self) -> Option<&UserHandle> {
        self.user_handle.as_ref()
    }

    /// The credentials the assertion may use. Empty for discoverable
    /// ceremonies.
    #[must_use]
    pub fn allow_credentials(&self) -> &[CredentialId] {
        &self.allow_credentials
    }

    /// The user verification requirement of the ceremony.
    #[must_use]
    pub fn user_verification(&self) -> UserVerification {
        self.user_verification
    }
}

impl CeremonyContext for AuthenticationContext {
    fn challenge(&self) -> &Challenge {
        &self.challenge
    }
}

/// Holds contexts between start and finish, keyed by challenge.
///
/// [`ContextStore::take`] must remove the context it returns, so that a
/// context is consumed at most once even under concurrent finishes.
pub trait ContextStore<C: CeremonyContext>: Send + Sync {
    /// Keep `context` until it is taken or expires.
    fn put(&self, context: C) -> Result<(), StoreError>;

    /// Remove and return the context bound to `challenge`.
    fn take(&self, challenge: &Challenge) -> Result<Option<C>, StoreError>;
}

/// A [`ContextStore`] in memory. Entries expire after a fixed lifetime.
#[derive(Debug, Clone)]
pub struct InMemoryContextStore<C> {
    entries: Arc<Mutex<HashMap<Challenge, (Instant, C)>>>,
    ttl: Duration,
}

impl<C> InMemoryContextStore<C> {
    /// A store whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// The number of entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<C> Default for InMemoryContextStore<C> {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl<C: CeremonyContext> ContextStore<C> for InMemoryContextStore<C> {
    fn put(&self, context: C) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        let ttl = self.ttl;
        entries.retain(|_, (created, _)| created.elapsed() < ttl);
        entries.insert(context.challenge().clone(), (Instant::now(), context));
        Ok(())
    }

    fn take(&self, challenge: &Challenge) -> Result<Option<C>, StoreError> {
        let entry = self.entries.lock().remove(challenge);
        Ok(entry.and_then(|(created, context)| {
            if created.elapsed() < self.ttl {
                Some(context)
            } else {
                tracing::debug!(%challenge, "ceremony context expired");
                None
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    fn context() -> TestResult<AuthenticationContext> {
        Ok(AuthenticationContext::new(
            Challenge::random()?,
            Origin::parse("https://example.com")?,
            "example.com".into(),
            None,
            vec![],
            UserVerification::Preferred,
        ))
    }

    #[test]
    fn contexts_are_taken_once() -> TestResult {
        let store = InMemoryContextStore::default();
        let context = context()?;
        store.put(context.clone())?;
        assert_eq!(store.take(context.challenge())?, Some(context.clone()));
        assert_eq!(store.take(context.challenge())?, None);
        Ok(())
    }

    #[test]
    fn expired_contexts_are_not_returned() -> TestResult {
        let store = InMemoryContextStore::new(Duration::ZERO);
        let context = context()?;
        store.put(context.clone())?;
        assert_eq!(store.take(context.challenge())?, None);
        assert!(store.is_empty());
        Ok(())
    }

    #[test]
    fn contexts_survive_serialization() -> TestResult {
        let context = context()?;
        let json = serde_json::to_string(&context)?;
        assert_eq!(serde_json::from_str::<AuthenticationContext>(&json)?, context);
        Ok(())
    }
}
