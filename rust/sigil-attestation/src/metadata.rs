//! Authenticator metadata and trust anchor resolution.

use crate::{AttestationError, AttestationType, Certificate, TrustAnchor};
use serde::{Deserialize, Serialize};
use sigil_cose::Aaguid;
use std::{collections::HashMap, fmt, sync::Arc};

/// What to look metadata up by.
#[derive(Debug, Clone, Copy)]
pub enum MetadataQuery<'a> {
    /// The authenticator model.
    Aaguid(Aaguid),
    /// The attestation certificate chain, leaf first. Used for U2F
    /// authenticators, which report the zero AAGUID.
    Chain(&'a [Certificate]),
}

/// Policy hints carried by a metadata statement.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PolicyHints {
    /// Attestation types the authenticator is known to produce. Empty means
    /// unrestricted.
    pub attestation_types: Vec<AttestationType>,
    /// Key protection levels the authenticator claims (`hardware`,
    /// `secure_element`, ...). Informational.
    pub key_protection: Vec<String>,
}

impl PolicyHints {
    /// Whether an attestation of type `attestation_type` is consistent with
    /// these hints.
    #[must_use]
    pub fn permits(&self, attestation_type: AttestationType) -> bool {
        self.attestation_types.is_empty() || self.attestation_types.contains(&attestation_type)
    }
}

/// Trust anchors and hints for one authenticator model.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetadataEntry {
    /// Human readable model name.
    pub description: String,
    /// Root certificates attestation chains must lead to.
    pub anchors: Vec<TrustAnchor>,
    /// Policy hints.
    pub hints: PolicyHints,
}

/// A source of authenticator metadata (a FIDO MDS mirror, a static
/// allow-list, ...). Lookups are synchronous; timeouts are the source's
/// concern.
pub trait MetadataSource: Send + Sync {
    /// The entry for `query`, if known.
    fn lookup(&self, query: &MetadataQuery<'_>) -> Option<MetadataEntry>;
}

/// An in-memory metadata source.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata {
    by_aaguid: HashMap<Aaguid, MetadataEntry>,
    by_anchor: Vec<MetadataEntry>,
}

impl StaticMetadata {
    /// An empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `entry` for the authenticator model `aaguid`.
    #[must_use]
    pub fn with_aaguid(mut self, aaguid: Aaguid, entry: MetadataEntry) -> Self {
        self.by_aaguid.insert(aaguid, entry);
        self
    }

    /// Register `entry` for any chain that leads to one of its anchors.
    #[must_use]
    pub fn with_chain_entry(mut self, entry: MetadataEntry) -> Self {
        self.by_anchor.push(entry);
        self
    }
}

impl MetadataSource for StaticMetadata {
    fn lookup(&self, query: &MetadataQuery<'_>) -> Option<MetadataEntry> {
        match query {
            MetadataQuery::Aaguid(aaguid) => self.by_aaguid.get(aaguid).cloned(),
            MetadataQuery::Chain(chain) => self
                .by_anchor
                .iter()
                .find(|entry| {
                    entry.anchors.iter().any(|anchor| {
                        chain
                            .iter()
                            .any(|cert| anchor.matches(cert) || anchor.issued(cert))
                    })
                })
                .cloned(),
        }
    }
}

/// The anchors and hints applicable to one attestation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedTrust {
    /// Anchors to evaluate the chain against. Empty when no metadata was
    /// found and policy allows trusting without it.
    pub anchors: Vec<TrustAnchor>,
    /// Hints from the metadata entry.
    pub hints: PolicyHints,
}

/// Finds the trust anchors for an authenticator.
#[derive(Clone)]
pub struct TrustAnchorResolver {
    source: Option<Arc<dyn MetadataSource>>,
    trust_without_metadata: bool,
}

impl TrustAnchorResolver {
    /// A resolver consulting `source`.
    #[must_use]
    pub fn new(source: Arc<dyn MetadataSource>, trust_without_metadata: bool) -> Self {
        Self {
            source: Some(source),
            trust_without_metadata,
        }
    }

    /// A resolver with no metadata source. Every lookup misses.
    #[must_use]
    pub fn without_source(trust_without_metadata: bool) -> Self {
        Self {
            source: None,
            trust_without_metadata,
        }
    }

    /// Resolve anchors for an attestation by `aaguid`, falling back to the
    /// certificate `chain`.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::MetadataNotFound`] when nothing is known
    /// about the authenticator, or its entry lists no anchors, and trusting
    /// without metadata is disabled.
    pub fn resolve(&self, aaguid: Aaguid, chain: &[Certificate]) -> Result<ResolvedTrust, AttestationError> {
        let entry = self.source.as_ref().and_then(|source| {
            let by_aaguid = if aaguid.is_zero() {
                None
            } else {
                source.lookup(&MetadataQuery::Aaguid(aaguid))
            };
            by_aaguid.or_else(|| {
                if chain.is_empty() {
                    None
                } else {
                    source.lookup(&MetadataQuery::Chain(chain))
                }
            })
        });

        match entry {
            Some(entry) if entry.anchors.is_empty() && !self.trust_without_metadata => {
                Err(AttestationError::MetadataNotFound(format!(
                    "AAGUID {aaguid}: metadata for {} lists no trust anchors",
                    entry.description
                )))
            }
            Some(entry) => {
                tracing::debug!(%aaguid, description = %entry.description, "metadata found");
                Ok(ResolvedTrust {
                    anchors: entry.anchors,
                    hints: entry.hints,
                })
            }
            None if self.trust_without_metadata => {
                tracing::debug!(%aaguid, "no metadata, continuing without a trust root");
                Ok(ResolvedTrust::default())
            }
            None => Err(AttestationError::MetadataNotFound(format!("AAGUID {aaguid}"))),
        }
    }
}

impl fmt::Debug for TrustAnchorResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustAnchorResolver")
            .field("source", &self.source.is_some())
            .field("trust_without_metadata", &self.trust_without_metadata)
            .finish()
    }
}
