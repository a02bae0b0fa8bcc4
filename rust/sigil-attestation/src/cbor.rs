//! Typed access to attestation statement maps.

use crate::{AttestationError, Certificate};
use ciborium::Value;
use sigil_cose::CoseAlgorithm;

/// A statement's CBOR map with text keys.
pub(crate) struct StatementMap<'a> {
    format: &'static str,
    entries: &'a [(Value, Value)],
}

impl<'a> StatementMap<'a> {
    pub(crate) fn new(value: &'a Value, format: &'static str) -> Result<Self, AttestationError> {
        let entries = value
            .as_map()
            .ok_or_else(|| malformed(format, "statement is not a map"))?;
        Ok(Self { format, entries })
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn get(&self, key: &str) -> Option<&'a Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_text() == Some(key))
            .map(|(_, v)| v)
    }

    fn require(&self, key: &str) -> Result<&'a Value, AttestationError> {
        self.get(key)
            .ok_or_else(|| malformed(self.format, format_args!("missing {key:?}")))
    }

    pub(crate) fn bytes(&self, key: &str) -> Result<Vec<u8>, AttestationError> {
        self.require(key)?
            .as_bytes()
            .cloned()
            .ok_or_else(|| malformed(self.format, format_args!("{key:?} is not a byte string")))
    }

    pub(crate) fn text(&self, key: &str) -> Result<&'a str, AttestationError> {
        self.require(key)?
            .as_text()
            .ok_or_else(|| malformed(self.format, format_args!("{key:?} is not a text string")))
    }

    pub(crate) fn algorithm(&self, key: &str) -> Result<CoseAlgorithm, AttestationError> {
        let id = self
            .require(key)?
            .as_integer()
            .and_then(|i| i64::try_from(i).ok())
            .ok_or_else(|| malformed(self.format, format_args!("{key:?} is not an integer")))?;
        CoseAlgorithm::try_from(id)
            .map_err(|_| AttestationError::UnsupportedAlgorithm(format!("COSE algorithm {id}")))
    }

    /// An `x5c`-style array of DER certificates, leaf first. Must not be
    /// empty.
    pub(crate) fn certificates(&self, key: &str) -> Result<Vec<Certificate>, AttestationError> {
        let items = self
            .require(key)?
            .as_array()
            .ok_or_else(|| malformed(self.format, format_args!("{key:?} is not an array")))?;
        if items.is_empty() {
            return Err(malformed(self.format, format_args!("{key:?} is empty")));
        }
        items
            .iter()
            .map(|item| {
                item.as_bytes()
                    .ok_or_else(|| {
                        malformed(self.format, format_args!("{key:?} holds a non-bytes entry"))
                    })
                    .and_then(|der| Certificate::from_der(der))
            })
            .collect()
    }

    /// In strict mode, fail on keys outside `allowed`.
    pub(crate) fn reject_unknown(&self, allowed: &[&str], strict: bool) -> Result<(), AttestationError> {
        if !strict {
            return Ok(());
        }
        for (key, _) in self.entries {
            match key.as_text() {
                Some(key) if allowed.contains(&key) => {}
                other => {
                    return Err(malformed(
                        self.format,
                        format_args!("unexpected statement key {other:?}"),
                    ));
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn malformed(format: &str, reason: impl std::fmt::Display) -> AttestationError {
    AttestationError::MalformedStatement(format!("{format}: {reason}"))
}
