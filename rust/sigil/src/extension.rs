use crate::CeremonyType;
use serde_json::{Map, Value};

/// Produces extension inputs for client options and checks extension
/// outputs at the end of a ceremony.
///
/// Extension values are opaque to the server; it only carries them between
/// the client and this processor.
pub trait ExtensionProcessor: Send + Sync {
    /// Extension inputs to include in the options of `ceremony`.
    fn inputs(&self, _ceremony: CeremonyType) -> Map<String, Value> {
        Map::new()
    }

    /// Inspect the outputs of a finished ceremony. The authenticator outputs
    /// are the raw CBOR extension block of the authenticator data, if any.
    ///
    /// Returning an error fails the ceremony with a policy violation.
    fn process(
        &self,
        _ceremony: CeremonyType,
        _client_outputs: &Map<String, Value>,
        _authenticator_outputs: Option<&[u8]>,
    ) -> Result<(), String> {
        Ok(())
    }
}

/// Requests no extensions and accepts any outputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExtensions;

impl ExtensionProcessor for NoExtensions {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_extensions_requests_nothing_and_accepts_anything() {
        let outputs: Map<String, Value> = [("credProps".to_string(), Value::Bool(true))].into_iter().collect();
        assert!(NoExtensions.inputs(CeremonyType::Create).is_empty());
        assert_eq!(NoExtensions.process(CeremonyType::Get, &outputs, Some(&[0xa0])), Ok(()));
    }
}
