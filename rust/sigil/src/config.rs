//! Relying party configuration.

use crate::{Error, Origin, Policy};
use serde::{Deserialize, Serialize};

/// The relying party's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelyingParty {
    /// The relying party id: a registrable domain the origin's host is
    /// equal to or a subdomain of.
    pub id: String,
    /// The display name shown by authenticators.
    pub name: String,
    /// The origin ceremonies are performed from.
    pub origin: String,
}

/// Everything a [`crate::Server`] needs besides its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// The relying party identity.
    pub relying_party: RelyingParty,
    /// The ceremony policy.
    #[serde(default)]
    pub policy: Policy,
}

impl ServerConfig {
    /// A configuration with the default policy.
    pub fn new(id: impl Into<String>, name: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            relying_party: RelyingParty {
                id: id.into(),
                name: name.into(),
                origin: origin.into(),
            },
            policy: Policy::default(),
        }
    }

    /// Replace the policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Check the configuration and return the normalized origin.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty relying party id, an
    /// unparsable or opaque origin, an origin outside the relying party id
    /// and an empty algorithm list.
    pub fn validate(&self) -> Result<Origin, Error> {
        let rp_id = self.relying_party.id.trim();
        if rp_id.is_empty() {
            return Err(Error::configuration("relying party id is empty"));
        }
        let origin = Origin::parse(&self.relying_party.origin)?;
        if !origin.is_within(rp_id) {
            return Err(Error::configuration(format!(
                "origin {origin} is not within relying party id {rp_id}"
            )));
        }
        if self.policy.algorithms.is_empty() {
            return Err(Error::configuration("no credential algorithms are accepted"));
        }
        Ok(origin)
    }
}
