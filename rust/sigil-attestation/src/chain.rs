//! Certificate chain evaluation.
//!
//! A chain is walked from the leaf towards the root. Each certificate must be
//! inside its validity period, must not be revoked (when revocation checking
//! is requested), and must be signed by the next certificate in the chain,
//! which must be a CA allowed to sign certificates. The walk succeeds as soon
//! as a certificate matches a trust anchor, or when the last certificate was
//! issued (and signed) by one.

use crate::{AttestationError, Certificate, TrustAnchor, TrustVerdict};
use serde::{Deserialize, Serialize};
use sigil_cose::SignatureVerifier;
use std::{fmt, sync::Arc, time::Duration};
use thiserror::Error;

/// A source of the current time.
pub trait Clock: Send + Sync {
    /// Time elapsed since the Unix epoch.
    fn now(&self) -> Duration;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        web_time::SystemTime::now()
            .duration_since(web_time::UNIX_EPOCH)
            .unwrap_or_default()
    }
}

/// A clock stopped at a fixed instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub Duration);

impl Clock for FixedClock {
    fn now(&self) -> Duration {
        self.0
    }
}

/// Revocation status of a single certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationStatus {
    /// Not revoked.
    Good,
    /// Revoked by its issuer.
    Revoked,
}

/// The revocation infrastructure could not answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct RevocationUnavailable(pub String);

/// Looks up revocation status, typically by fetching the CRLs the
/// certificate points at.
pub trait RevocationChecker: Send + Sync {
    /// The revocation status of `certificate`, whose CRL distribution point
    /// URIs are `distribution_points`.
    ///
    /// # Errors
    ///
    /// Returns [`RevocationUnavailable`] when status cannot be determined,
    /// for example because the endpoint is unreachable.
    fn status(
        &self,
        certificate: &Certificate,
        distribution_points: &[String],
    ) -> Result<RevocationStatus, RevocationUnavailable>;
}

/// What to do when revocation status cannot be determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RevocationFailureMode {
    /// Accept the certificate and log a warning.
    FailOpen,
    /// Reject the attestation with
    /// [`AttestationError::RevocationCheckUnavailable`].
    #[default]
    FailClosed,
}

/// Validates certificate chains against trust anchors.
#[derive(Clone)]
pub struct ChainEvaluator {
    clock: Arc<dyn Clock>,
    revocation: Option<Arc<dyn RevocationChecker>>,
    failure_mode: RevocationFailureMode,
    signatures: SignatureVerifier,
}

impl ChainEvaluator {
    /// An evaluator using the system clock and no revocation checker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            revocation: None,
            failure_mode: RevocationFailureMode::default(),
            signatures: SignatureVerifier::supported(),
        }
    }

    /// Use `clock` for validity checks.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use `checker` for revocation checks, treating unavailability
    /// according to `failure_mode`.
    #[must_use]
    pub fn with_revocation(
        mut self,
        checker: Arc<dyn RevocationChecker>,
        failure_mode: RevocationFailureMode,
    ) -> Self {
        self.revocation = Some(checker);
        self.failure_mode = failure_mode;
        self
    }

    /// Set the treatment of revocation unavailability.
    #[must_use]
    pub fn with_failure_mode(mut self, failure_mode: RevocationFailureMode) -> Self {
        self.failure_mode = failure_mode;
        self
    }

    /// The clock validity is checked against.
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Evaluate `chain` (leaf first) against `anchors`.
    ///
    /// With no anchors at all the chain is accepted on its internal
    /// consistency alone and the verdict is [`TrustVerdict::Unanchored`];
    /// callers decide whether that is acceptable before passing an empty
    /// anchor set.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::ChainValidationFailed`] for an empty
    /// chain, a certificate outside its validity period, a broken or
    /// mis-ordered link, a revoked certificate, or a chain that never reaches
    /// an anchor. Returns [`AttestationError::RevocationCheckUnavailable`]
    /// when revocation status is unknown and the failure mode is fail-closed.
    pub fn evaluate(
        &self,
        chain: &[Certificate],
        anchors: &[TrustAnchor],
        check_revocation: bool,
    ) -> Result<TrustVerdict, AttestationError> {
        if chain.is_empty() {
            return Err(chain_failed("empty certificate chain"));
        }
        let now = self.clock.now();

        for (depth, certificate) in chain.iter().enumerate() {
            if !certificate.is_valid_at(now) {
                return Err(chain_failed(format_args!(
                    "certificate {depth} ({}) is outside its validity period",
                    certificate.subject()
                )));
            }
            if check_revocation {
                self.check_revocation(depth, certificate)?;
            }
            // Above the leaf a shared key suffices, its link below is verified.
            // The leaf must be the anchor itself.
            let anchored = if depth == 0 {
                anchors.iter().any(|anchor| anchor.is(certificate))
            } else {
                anchors.iter().any(|anchor| anchor.matches(certificate))
            };
            if anchored {
                tracing::debug!(depth, "chain reached a trust anchor");
                return Ok(TrustVerdict::Anchored);
            }

            if let Some(issuer) = chain.get(depth + 1) {
                if certificate.issuer() != issuer.subject() {
                    return Err(chain_failed(format_args!(
                        "certificate {depth} was not issued by the next certificate in the chain"
                    )));
                }
                require_issuer(depth + 1, issuer)?;
                self.verify_link(depth, certificate, issuer)?;
                continue;
            }

            // Last certificate in the chain: look for its issuer among the anchors.
            let mut issuers = anchors.iter().filter(|anchor| anchor.issued(certificate)).peekable();
            if issuers.peek().is_some() {
                let mut last_error = None;
                for anchor in issuers {
                    if !anchor.certificate().is_valid_at(now) {
                        last_error = Some(chain_failed("issuing trust anchor is outside its validity period"));
                        continue;
                    }
                    if let Err(error) = require_issuer(depth + 1, anchor.certificate()) {
                        last_error = Some(error);
                        continue;
                    }
                    match self.verify_link(depth, certificate, anchor.certificate()) {
                        Ok(()) => {
                            tracing::debug!(depth, "chain issued by a trust anchor");
                            return Ok(TrustVerdict::Anchored);
                        }
                        Err(error) => last_error = Some(error),
                    }
                }
                return Err(last_error.unwrap_or_else(|| chain_failed("no anchor verified the chain")));
            }

            if anchors.is_empty() {
                if certificate.issuer() == certificate.subject() {
                    self.verify_link(depth, certificate, certificate)?;
                }
                tracing::warn!(
                    length = chain.len(),
                    "no trust anchors available, accepting chain on internal consistency"
                );
                return Ok(TrustVerdict::Unanchored);
            }
        }

        Err(chain_failed("chain does not lead to a trust anchor"))
    }

    fn verify_link(
        &self,
        depth: usize,
        certificate: &Certificate,
        issuer: &Certificate,
    ) -> Result<(), AttestationError> {
        let issuer_key = issuer.public_key()?;
        let alg = certificate.signature_algorithm(&issuer_key)?;
        let tbs = certificate.tbs_der()?;
        self.signatures
            .verify_with(alg, &issuer_key, &tbs, certificate.signature())
            .map_err(|e| {
                chain_failed(format_args!("signature on certificate {depth} does not verify: {e}"))
            })
    }

    fn check_revocation(&self, depth: usize, certificate: &Certificate) -> Result<(), AttestationError> {
        let outcome = match &self.revocation {
            Some(checker) => {
                let points = certificate.crl_distribution_points()?;
                checker.status(certificate, &points)
            }
            None => Err(RevocationUnavailable("no revocation checker configured".into())),
        };

        match outcome {
            Ok(RevocationStatus::Good) => Ok(()),
            Ok(RevocationStatus::Revoked) => Err(chain_failed(format_args!(
                "certificate {depth} ({}) is revoked",
                certificate.subject()
            ))),
            Err(unavailable) => match self.failure_mode {
                RevocationFailureMode::FailOpen => {
                    tracing::warn!(depth, reason = %unavailable, "revocation status unknown, failing open");
                    Ok(())
                }
                RevocationFailureMode::FailClosed => Err(AttestationError::RevocationCheckUnavailable(
                    format!("certificate {depth}: {unavailable}"),
                )),
            },
        }
    }
}

impl Default for ChainEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChainEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainEvaluator")
            .field("revocation", &self.revocation.is_some())
            .field("failure_mode", &self.failure_mode)
            .finish_non_exhaustive()
    }
}

fn require_issuer(depth: usize, issuer: &Certificate) -> Result<(), AttestationError> {
    if issuer.can_sign_certificates()? {
        Ok(())
    } else {
        Err(chain_failed(format_args!(
            "certificate {depth} ({}) is not a certificate authority",
            issuer.subject()
        )))
    }
}

fn chain_failed(reason: impl fmt::Display) -> AttestationError {
    AttestationError::ChainValidationFailed(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::{CertificateAuthority, LeafOptions, StaticRevocation};
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    struct Fixture {
        root: CertificateAuthority,
        intermediate: CertificateAuthority,
        leaf: Certificate,
    }

    fn fixture() -> TestResult<Fixture> {
        let root = CertificateAuthority::root("Chain Root", [1; 32])?;
        let intermediate = root.issue_intermediate("Chain Intermediate", [2; 32])?;
        let (leaf, _) = intermediate.issue_leaf(
            "Chain Leaf",
            [3; 32],
            LeafOptions {
                crl_url: Some("http://crl.example.com/intermediate.crl".into()),
                ..LeafOptions::default()
            },
        )?;
        Ok(Fixture {
            root,
            intermediate,
            leaf,
        })
    }

    #[test]
    fn leaf_without_matching_anchor_fails() -> TestResult {
        let f = fixture()?;
        let unrelated = CertificateAuthority::root("Somebody Else", [9; 32])?;
        let anchors = [TrustAnchor::new(unrelated.certificate().clone())];

        let result = ChainEvaluator::new().evaluate(&[f.leaf.clone()], &anchors, false);
        assert!(matches!(result, Err(AttestationError::ChainValidationFailed(_))));
        Ok(())
    }

    #[test]
    fn adding_the_issuing_anchor_makes_it_pass() -> TestResult {
        let f = fixture()?;
        let anchors = [TrustAnchor::new(f.intermediate.certificate().clone())];

        let verdict = ChainEvaluator::new().evaluate(&[f.leaf.clone()], &anchors, false)?;
        assert_eq!(verdict, TrustVerdict::Anchored);
        Ok(())
    }

    #[test]
    fn walks_intermediates_to_the_root() -> TestResult {
        let f = fixture()?;
        let chain = [f.leaf.clone(), f.intermediate.certificate().clone()];
        let anchors = [TrustAnchor::new(f.root.certificate().clone())];

        assert_eq!(
            ChainEvaluator::new().evaluate(&chain, &anchors, false)?,
            TrustVerdict::Anchored
        );
        Ok(())
    }

    #[test]
    fn anchor_inside_the_chain_ends_the_walk() -> TestResult {
        let f = fixture()?;
        let chain = [
            f.leaf.clone(),
            f.intermediate.certificate().clone(),
            f.root.certificate().clone(),
        ];
        let anchors = [TrustAnchor::new(f.intermediate.certificate().clone())];

        assert_eq!(
            ChainEvaluator::new().evaluate(&chain, &anchors, false)?,
            TrustVerdict::Anchored
        );
        Ok(())
    }

    #[test]
    fn out_of_order_chain_fails() -> TestResult {
        let f = fixture()?;
        let chain = [f.leaf.clone(), f.root.certificate().clone()];
        let anchors = [TrustAnchor::new(f.root.certificate().clone())];

        assert!(matches!(
            ChainEvaluator::new().evaluate(&chain, &anchors, false),
            Err(AttestationError::ChainValidationFailed(_))
        ));
        Ok(())
    }

    #[test]
    fn expired_leaf_fails() -> TestResult {
        let f = fixture()?;
        let anchors = [TrustAnchor::new(f.intermediate.certificate().clone())];
        let (_, not_after) = f.leaf.validity();
        let evaluator = ChainEvaluator::new()
            .with_clock(Arc::new(FixedClock(not_after + Duration::from_secs(1))));

        assert!(matches!(
            evaluator.evaluate(&[f.leaf.clone()], &anchors, false),
            Err(AttestationError::ChainValidationFailed(_))
        ));
        Ok(())
    }

    #[test]
    fn forged_signature_fails() -> TestResult {
        let f = fixture()?;
        // Same subject name as the real intermediate, different key.
        let impostor = f.root.issue_intermediate("Chain Intermediate", [8; 32])?;
        let anchors = [TrustAnchor::new(impostor.certificate().clone())];

        assert!(matches!(
            ChainEvaluator::new().evaluate(&[f.leaf.clone()], &anchors, false),
            Err(AttestationError::ChainValidationFailed(_))
        ));
        Ok(())
    }

    #[test]
    fn end_entity_cannot_issue_certificates() -> TestResult {
        let f = fixture()?;
        let (leaf, key) = f.root.issue_leaf("Batch Leaf", [4; 32], LeafOptions::default())?;
        assert!(!leaf.is_ca()?);
        let (forged, _) = CertificateAuthority::from_parts(leaf.clone(), key).issue_leaf(
            "Forged",
            [5; 32],
            LeafOptions::default(),
        )?;

        let in_chain = ChainEvaluator::new().evaluate(
            &[forged.clone(), leaf.clone()],
            &[TrustAnchor::new(f.root.certificate().clone())],
            false,
        );
        assert!(matches!(in_chain, Err(AttestationError::ChainValidationFailed(_))));

        let by_anchor = ChainEvaluator::new().evaluate(&[forged], &[TrustAnchor::new(leaf)], false);
        assert!(matches!(by_anchor, Err(AttestationError::ChainValidationFailed(_))));
        Ok(())
    }

    #[test]
    fn leaf_copying_an_anchor_key_is_not_the_anchor() -> TestResult {
        let f = fixture()?;
        let other = CertificateAuthority::root("Somebody Else", [9; 32])?;
        // Same key as the root, issued by an unrelated authority.
        let (copy, _) = other.issue_leaf("Chain Root", [1; 32], LeafOptions::default())?;
        assert!(copy.same_public_key(f.root.certificate()));

        assert!(matches!(
            ChainEvaluator::new().evaluate(&[copy], &[TrustAnchor::new(f.root.certificate().clone())], false),
            Err(AttestationError::ChainValidationFailed(_))
        ));
        Ok(())
    }

    #[test]
    fn leaf_that_is_the_anchor_passes() -> TestResult {
        let f = fixture()?;
        let anchors = [TrustAnchor::new(f.leaf.clone())];

        assert_eq!(
            ChainEvaluator::new().evaluate(&[f.leaf.clone()], &anchors, false)?,
            TrustVerdict::Anchored
        );
        Ok(())
    }

    #[test]
    fn empty_anchor_set_is_unanchored() -> TestResult {
        let f = fixture()?;
        let chain = [f.leaf.clone(), f.intermediate.certificate().clone()];

        assert_eq!(
            ChainEvaluator::new().evaluate(&chain, &[], false)?,
            TrustVerdict::Unanchored
        );
        Ok(())
    }

    #[test]
    fn revoked_leaf_fails() -> TestResult {
        let f = fixture()?;
        let anchors = [TrustAnchor::new(f.intermediate.certificate().clone())];
        let checker = StaticRevocation::revoking([f.leaf.fingerprint()]);
        let evaluator = ChainEvaluator::new()
            .with_revocation(Arc::new(checker), RevocationFailureMode::FailClosed);

        assert!(matches!(
            evaluator.evaluate(&[f.leaf.clone()], &anchors, true),
            Err(AttestationError::ChainValidationFailed(_))
        ));
        // The same chain passes when revocation is not requested.
        assert_eq!(
            evaluator.evaluate(&[f.leaf.clone()], &anchors, false)?,
            TrustVerdict::Anchored
        );
        Ok(())
    }

    #[test]
    fn checker_receives_distribution_points() -> TestResult {
        let f = fixture()?;
        let anchors = [TrustAnchor::new(f.intermediate.certificate().clone())];
        let checker = Arc::new(StaticRevocation::default());
        let evaluator = ChainEvaluator::new()
            .with_revocation(checker.clone(), RevocationFailureMode::FailClosed);

        evaluator.evaluate(&[f.leaf.clone()], &anchors, true)?;
        assert_eq!(
            checker.seen(),
            vec!["http://crl.example.com/intermediate.crl".to_string()]
        );
        Ok(())
    }

    #[test]
    fn unavailable_revocation_fails_closed() -> TestResult {
        let f = fixture()?;
        let anchors = [TrustAnchor::new(f.intermediate.certificate().clone())];
        let evaluator = ChainEvaluator::new()
            .with_revocation(Arc::new(StaticRevocation::unreachable()), RevocationFailureMode::FailClosed);

        assert!(matches!(
            evaluator.evaluate(&[f.leaf.clone()], &anchors, true),
            Err(AttestationError::RevocationCheckUnavailable(_))
        ));
        Ok(())
    }

    #[test]
    fn unavailable_revocation_fails_open() -> TestResult {
        let f = fixture()?;
        let anchors = [TrustAnchor::new(f.intermediate.certificate().clone())];
        let evaluator = ChainEvaluator::new()
            .with_revocation(Arc::new(StaticRevocation::unreachable()), RevocationFailureMode::FailOpen);

        assert_eq!(
            evaluator.evaluate(&[f.leaf.clone()], &anchors, true)?,
            TrustVerdict::Anchored
        );
        Ok(())
    }
}
