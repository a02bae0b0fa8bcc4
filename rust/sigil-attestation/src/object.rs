//! The attestation object returned at registration.

use crate::AttestationError;
use ciborium::Value;
use sigil_cose::AuthenticatorData;

/// `{ "fmt": text, "attStmt": map, "authData": bytes }`
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationObject {
    format: String,
    statement: Value,
    auth_data: AuthenticatorData,
}

impl AttestationObject {
    /// Assemble an attestation object.
    #[must_use]
    pub fn new(format: impl Into<String>, statement: Value, auth_data: AuthenticatorData) -> Self {
        Self {
            format: format.into(),
            statement,
            auth_data,
        }
    }

    /// Decode the CBOR attestation object.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::MalformedStatement`] if the outer
    /// structure is not a map with the three required members, and
    /// [`AttestationError::Codec`] if the authenticator data does not parse.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, AttestationError> {
        let mut input = bytes;
        let value: Value = ciborium::de::from_reader(&mut input)
            .map_err(|e| malformed(format_args!("invalid CBOR: {e}")))?;
        if !input.is_empty() {
            return Err(malformed(format_args!("{} trailing bytes", input.len())));
        }

        let entries = value
            .into_map()
            .map_err(|_| malformed("attestation object is not a map"))?;

        let mut format = None;
        let mut statement = None;
        let mut auth_data = None;
        for (key, value) in entries {
            match key.as_text() {
                Some("fmt") => format = Some(value),
                Some("attStmt") => statement = Some(value),
                Some("authData") => auth_data = Some(value),
                _ => {}
            }
        }

        let format = format
            .and_then(|v| v.into_text().ok())
            .ok_or_else(|| malformed("missing or non-text \"fmt\""))?;
        let statement = statement
            .filter(Value::is_map)
            .ok_or_else(|| malformed("missing or non-map \"attStmt\""))?;
        let auth_data = auth_data
            .and_then(|v| v.into_bytes().ok())
            .ok_or_else(|| malformed("missing or non-bytes \"authData\""))?;

        Ok(Self {
            format,
            statement,
            auth_data: AuthenticatorData::from_bytes(&auth_data)?,
        })
    }

    /// Encode as CBOR.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_cbor(&self) -> Result<Vec<u8>, AttestationError> {
        let value = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text(self.format.clone())),
            (Value::Text("attStmt".into()), self.statement.clone()),
            (
                Value::Text("authData".into()),
                Value::Bytes(self.auth_data.as_bytes().to_vec()),
            ),
        ]);
        let mut out = Vec::new();
        ciborium::ser::into_writer(&value, &mut out).map_err(malformed)?;
        Ok(out)
    }

    /// The attestation format identifier.
    #[must_use]
    pub fn format(&self) -> &str {
        &self.format
    }

    /// The undecoded format-specific statement.
    #[must_use]
    pub fn statement(&self) -> &Value {
        &self.statement
    }

    /// The authenticator data the statement covers.
    #[must_use]
    pub fn auth_data(&self) -> &AuthenticatorData {
        &self.auth_data
    }
}

fn malformed(reason: impl std::fmt::Display) -> AttestationError {
    AttestationError::MalformedStatement(reason.to_string())
}
