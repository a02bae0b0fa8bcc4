use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::{Host, Url};

/// A web origin (scheme, host and port) in its serialized form.
///
/// Origins are normalized once, when configured; client supplied origins
/// are compared against that form byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Origin {
    serialized: String,
    host: String,
}

impl Origin {
    /// Parse and normalize `origin`. Paths, queries and default ports are
    /// dropped and the host is lowercased.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unparsable URLs and for opaque
    /// origins (schemes without a host).
    pub fn parse(origin: &str) -> Result<Self, Error> {
        let url = Url::parse(origin)
            .map_err(|e| Error::configuration(format!("invalid origin {origin:?}: {e}")))?;
        let normalized = url.origin();
        if !normalized.is_tuple() {
            return Err(Error::configuration(format!(
                "origin {origin:?} is opaque"
            )));
        }
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_owned(),
            Some(host) => host.to_string(),
            None => return Err(Error::configuration(format!("origin {origin:?} has no host"))),
        };
        Ok(Self {
            serialized: normalized.ascii_serialization(),
            host,
        })
    }

    /// The host the origin names.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The serialized origin, e.g. `https://login.example.com`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Whether `host` is the relying party id or a subdomain of it.
    #[must_use]
    pub fn is_within(&self, rp_id: &str) -> bool {
        let rp_id = rp_id.to_ascii_lowercase();
        self.host == rp_id
            || self
                .host
                .strip_suffix(rp_id.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    }

    /// Exact comparison against a client supplied origin string.
    #[must_use]
    pub fn matches(&self, client: &str) -> bool {
        self.serialized == client
    }
}

impl TryFrom<String> for Origin {
    type Error = Error;

    fn try_from(origin: String) -> Result<Self, Self::Error> {
        Origin::parse(&origin)
    }
}

impl From<Origin> for String {
    fn from(origin: Origin) -> Self {
        origin.serialized
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialized)
    }
}
