use crate::{Error, encoding};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A ceremony challenge: random bytes bound into the client data the
/// authenticator signs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Encoded")]
pub struct Challenge(#[serde(with = "encoding::base64url")] Vec<u8>);

#[derive(Deserialize)]
struct Encoded(#[serde(with = "encoding::base64url")] Vec<u8>);

impl TryFrom<Encoded> for Challenge {
    type Error = Error;

    fn try_from(encoded: Encoded) -> Result<Self, Self::Error> {
        Challenge::from_bytes(encoded.0)
    }
}

impl Challenge {
    /// The length of generated challenges.
    pub const LENGTH: usize = 32;

    /// The shortest challenge accepted from the outside.
    pub const MINIMUM_LENGTH: usize = 16;

    /// A fresh challenge from the operating system's random source.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no random source is available.
    pub fn random() -> Result<Self, Error> {
        let mut bytes = vec![0; Self::LENGTH];
        getrandom::getrandom(&mut bytes)
            .map_err(|e| Error::configuration(format!("random source unavailable: {e}")))?;
        Ok(Self(bytes))
    }

    /// A challenge from existing bytes.
    ///
    /// # Errors
    ///
    /// Returns a malformed input error for fewer than
    /// [`Challenge::MINIMUM_LENGTH`] bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, Error> {
        let bytes = bytes.into();
        if bytes.len() < Self::MINIMUM_LENGTH {
            return Err(Error::malformed(format!(
                "challenge of {} bytes is shorter than {}",
                bytes.len(),
                Self::MINIMUM_LENGTH
            )));
        }
        Ok(Self(bytes))
    }

    /// The raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The base64url form used in client options and client data.
    #[must_use]
    pub fn to_base64url(&self) -> String {
        encoding::encode(&self.0)
    }
}

impl AsRef<[u8]> for Challenge {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Challenge({})", self.to_base64url())
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use testresult::TestResult;

    #[test]
    fn random_challenges_are_long_and_distinct() -> TestResult {
        let first = Challenge::random()?;
        let second = Challenge::random()?;
        assert_eq!(first.as_bytes().len(), Challenge::LENGTH);
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn short_challenges_are_rejected() {
        assert!(matches!(
            Challenge::from_bytes(vec![0; 15]),
            Err(error) if error.kind() == ErrorKind::MalformedInput
        ));
        assert!(Challenge::from_bytes(vec![0; 16]).is_ok());
    }

    #[test]
    fn serializes_as_base64url() -> TestResult {
        let challenge = Challenge::from_bytes(vec![0xff; 16])?;
        let json = serde_json::to_string(&challenge)?;
        assert_eq!(json, "\"_____________________w\"");
        assert_eq!(serde_json::from_str::<Challenge>(&json)?, challenge);
        Ok(())
    }

    #[test]
    fn short_challenges_do_not_deserialize() {
        // 15 bytes
        assert!(serde_json::from_str::<Challenge>("\"AAAAAAAAAAAAAAAAAAAA\"").is_err());
    }
}
