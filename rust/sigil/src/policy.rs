//! The policy a relying party applies to every ceremony.

use serde::{Deserialize, Serialize};
use sigil_attestation::{AttestationType, RevocationFailureMode};
use sigil_cose::CoseAlgorithm;

/// Whether the authenticator must verify the user (PIN, biometric).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerification {
    /// The UV flag must be set.
    Required,
    /// Verification is requested but not enforced.
    #[default]
    Preferred,
    /// Verification is not requested.
    Discouraged,
}

/// How much attestation the relying party asks the client to convey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyance {
    /// No attestation is wanted.
    #[default]
    None,
    /// The client may anonymize the attestation.
    Indirect,
    /// The authenticator's attestation is wanted as is.
    Direct,
    /// Uniquely identifying attestation, for managed deployments.
    Enterprise,
}

/// A read-only snapshot of the relying party's requirements.
///
/// Deserializes from camelCase JSON; every field has a default so a partial
/// document is a valid policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Policy {
    /// User verification requirement.
    pub user_verification: UserVerification,
    /// Whether the UP flag must be set.
    pub require_user_presence: bool,
    /// Accepted credential algorithms, in preference order.
    pub algorithms: Vec<CoseAlgorithm>,
    /// The attestation conveyance requested at registration.
    pub attestation: AttestationConveyance,
    /// The weakest attestation type a registration may produce.
    pub minimum_attestation: AttestationType,
    /// Whether authenticators without metadata are accepted.
    pub trust_without_metadata: bool,
    /// Whether attestation certificates are checked for revocation.
    pub check_revocation: bool,
    /// What to do when revocation status cannot be determined.
    pub revocation_failure: RevocationFailureMode,
    /// Strict statement decoding and format-specific optional checks.
    pub strict_format_support: bool,
    /// Whether ceremonies embedded in a cross-origin iframe are accepted.
    pub allow_cross_origin: bool,
    /// The ceremony timeout advertised to the client, in milliseconds.
    pub timeout_ms: u64,
}

impl Policy {
    /// The requirement the flags of a ceremony fail, if any. `verification`
    /// is the ceremony's requirement, which may override the policy's.
    pub(crate) fn user_requirement_unmet(
        &self,
        verification: UserVerification,
        user_present: bool,
        user_verified: bool,
    ) -> Option<&'static str> {
        if self.require_user_presence && !user_present {
            return Some("user presence is required");
        }
        if verification == UserVerification::Required && !user_verified {
            return Some("user verification is required");
        }
        None
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            user_verification: UserVerification::Preferred,
            require_user_presence: true,
            algorithms: vec![CoseAlgorithm::Es256, CoseAlgorithm::EdDsa, CoseAlgorithm::Rs256],
            attestation: AttestationConveyance::None,
            minimum_attestation: AttestationType::None,
            trust_without_metadata: true,
            check_revocation: false,
            revocation_failure: RevocationFailureMode::FailClosed,
            strict_format_support: false,
            allow_cross_origin: false,
            timeout_ms: 300_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    #[test]
    fn partial_documents_fill_in_defaults() -> TestResult {
        let policy: Policy = serde_json::from_str(
            r#"{"userVerification": "required", "algorithms": [-7], "revocationFailure": "failOpen"}"#,
        )?;
        assert_eq!(
            policy,
            Policy {
                user_verification: UserVerification::Required,
                algorithms: vec![CoseAlgorithm::Es256],
                revocation_failure: RevocationFailureMode::FailOpen,
                ..Policy::default()
            }
        );
        Ok(())
    }

    #[test]
    fn flags_are_checked_against_requirements() {
        let policy = Policy::default();
        let required = UserVerification::Required;
        assert_eq!(policy.user_requirement_unmet(required, true, true), None);
        assert!(policy.user_requirement_unmet(required, false, true).is_some());
        assert!(policy.user_requirement_unmet(required, true, false).is_some());
        assert_eq!(policy.user_requirement_unmet(UserVerification::Preferred, true, false), None);

        let lenient = Policy {
            require_user_presence: false,
            ..Policy::default()
        };
        assert_eq!(lenient.user_requirement_unmet(UserVerification::Discouraged, false, false), None);
    }
}
