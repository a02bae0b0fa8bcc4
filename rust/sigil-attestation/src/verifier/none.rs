//! `none` attestation.

use super::{VerificationContext, unexpected};
use crate::{AttestationError, AttestationStatement, VerificationResult, cbor::StatementMap};
use ciborium::Value;
use sigil_cose::AuthenticatorData;

pub(crate) fn decode(value: &Value, _strict: bool) -> Result<AttestationStatement, AttestationError> {
    let map = StatementMap::new(value, "none")?;
    if !map.is_empty() {
        return Err(AttestationError::MalformedStatement(
            "none: statement must be empty".into(),
        ));
    }
    Ok(AttestationStatement::None)
}

pub(crate) fn verify(
    statement: &AttestationStatement,
    _auth_data: &AuthenticatorData,
    _client_data_hash: &[u8; 32],
    _context: &VerificationContext<'_>,
) -> Result<VerificationResult, AttestationError> {
    match statement {
        AttestationStatement::None => Ok(VerificationResult::none()),
        other => Err(unexpected("none", other)),
    }
}
