//! Algorithm-keyed signature verification.

use crate::{CoseAlgorithm, CoseKey, PublicKey, SignatureError, algorithm::verify_signature};

/// Verifies signatures for an explicit set of accepted algorithms.
///
/// The table is fixed at construction. Requests for an algorithm outside it
/// fail with [`SignatureError::UnsupportedAlgorithm`] before any key material
/// is touched; there is no fallback to a default algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureVerifier {
    accepted: Vec<CoseAlgorithm>,
}

impl SignatureVerifier {
    /// A verifier accepting exactly `algorithms`.
    ///
    /// Algorithms that were not compiled in are dropped with a warning, so
    /// the verifier never advertises something it cannot check.
    pub fn new(algorithms: impl IntoIterator<Item = CoseAlgorithm>) -> Self {
        let mut accepted = Vec::new();
        for alg in algorithms {
            if !alg.is_compiled() {
                tracing::warn!(%alg, "algorithm not compiled in, dropping it");
                continue;
            }
            if !accepted.contains(&alg) {
                accepted.push(alg);
            }
        }
        Self { accepted }
    }

    /// A verifier accepting every compiled-in algorithm.
    #[must_use]
    pub fn supported() -> Self {
        Self::new(CoseAlgorithm::ALL)
    }

    /// The accepted algorithms, in preference order.
    #[must_use]
    pub fn algorithms(&self) -> &[CoseAlgorithm] {
        &self.accepted
    }

    /// Whether `alg` is accepted.
    #[must_use]
    pub fn accepts(&self, alg: CoseAlgorithm) -> bool {
        self.accepted.contains(&alg)
    }

    /// Verify `signature` over `message` with a credential key, using the
    /// algorithm the key declares.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::UnsupportedAlgorithm`] if the key's algorithm
    /// is not accepted, and [`SignatureError::InvalidSignature`] if the
    /// signature does not verify.
    pub fn verify(
        &self,
        message: &[u8],
        signature: &[u8],
        key: &CoseKey,
    ) -> Result<(), SignatureError> {
        self.verify_with(key.algorithm(), key.public_key(), message, signature)
    }

    /// Verify `signature` over `message` with `key` under `alg`.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::UnsupportedAlgorithm`] if `alg` is not
    /// accepted, [`SignatureError::KeyMismatch`] if `key` is the wrong type
    /// for `alg`, and [`SignatureError::InvalidSignature`] if the signature
    /// does not verify.
    pub fn verify_with(
        &self,
        alg: CoseAlgorithm,
        key: &PublicKey,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), SignatureError> {
        if !self.accepts(alg) {
            return Err(SignatureError::UnsupportedAlgorithm(format!(
                "{alg} is not accepted"
            )));
        }
        verify_signature(alg, key, message, signature)
    }
}

impl Default for SignatureVerifier {
    fn default() -> Self {
        Self::supported()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EcCurve, OkpCurve};
    use testresult::TestResult;

    fn p256_key(sk: &p256::ecdsa::SigningKey) -> TestResult<CoseKey> {
        let point = sk.verifying_key().to_encoded_point(false);
        let bytes = point.as_bytes();
        Ok(CoseKey::new(
            CoseAlgorithm::Es256,
            PublicKey::Ec2 {
                curve: EcCurve::P256,
                x: bytes[1..33].to_vec(),
                y: bytes[33..65].to_vec(),
            },
        )?)
    }

    #[test]
    fn es256_signature_verifies() -> TestResult {
        use p256::ecdsa::{DerSignature, SigningKey, signature::Signer as _};

        let sk = SigningKey::from_bytes(&[42u8; 32].into())?;
        let key = p256_key(&sk)?;
        let signature: DerSignature = sk.sign(b"payload");

        SignatureVerifier::supported().verify(b"payload", signature.as_bytes(), &key)?;
        Ok(())
    }

    #[test]
    fn tampered_message_is_rejected() -> TestResult {
        use p256::ecdsa::{DerSignature, SigningKey, signature::Signer as _};

        let sk = SigningKey::from_bytes(&[42u8; 32].into())?;
        let key = p256_key(&sk)?;
        let signature: DerSignature = sk.sign(b"payload");

        assert!(matches!(
            SignatureVerifier::supported().verify(b"payloaD", signature.as_bytes(), &key),
            Err(SignatureError::InvalidSignature(_))
        ));
        Ok(())
    }

    #[test]
    fn algorithm_outside_the_table_fails_closed() -> TestResult {
        use p256::ecdsa::{DerSignature, SigningKey, signature::Signer as _};

        let sk = SigningKey::from_bytes(&[42u8; 32].into())?;
        let key = p256_key(&sk)?;
        let signature: DerSignature = sk.sign(b"payload");

        let verifier = SignatureVerifier::new([CoseAlgorithm::EdDsa]);
        assert!(matches!(
            verifier.verify(b"payload", signature.as_bytes(), &key),
            Err(SignatureError::UnsupportedAlgorithm(_))
        ));
        Ok(())
    }

    #[test]
    fn ed25519_signature_verifies() -> TestResult {
        use ed25519_dalek::{Signer as _, SigningKey};

        let sk = SigningKey::from_bytes(&[7u8; 32]);
        let key = PublicKey::Okp {
            curve: OkpCurve::Ed25519,
            x: sk.verifying_key().to_bytes().to_vec(),
        };
        let signature = sk.sign(b"payload");

        SignatureVerifier::supported().verify_with(
            CoseAlgorithm::EdDsa,
            &key,
            b"payload",
            &signature.to_bytes(),
        )?;
        Ok(())
    }

    #[test]
    fn es384_signature_verifies() -> TestResult {
        use p384::ecdsa::{DerSignature, SigningKey, signature::Signer as _};

        let sk = SigningKey::from_slice(&[9u8; 48])?;
        let point = sk.verifying_key().to_encoded_point(false);
        let bytes = point.as_bytes();
        let key = PublicKey::Ec2 {
            curve: EcCurve::P384,
            x: bytes[1..49].to_vec(),
            y: bytes[49..97].to_vec(),
        };
        let signature: DerSignature = sk.sign(b"payload");

        SignatureVerifier::supported().verify_with(
            CoseAlgorithm::Es384,
            &key,
            b"payload",
            signature.as_bytes(),
        )?;
        Ok(())
    }

    #[test]
    fn wrong_curve_for_algorithm_is_a_mismatch() {
        let key = PublicKey::Ec2 {
            curve: EcCurve::P384,
            x: vec![1; 48],
            y: vec![2; 48],
        };
        assert!(matches!(
            SignatureVerifier::supported().verify_with(CoseAlgorithm::Es256, &key, b"m", b"s"),
            Err(SignatureError::KeyMismatch { .. })
        ));
    }

    #[test]
    fn duplicates_collapse() {
        let verifier = SignatureVerifier::new([
            CoseAlgorithm::Es256,
            CoseAlgorithm::Es256,
            CoseAlgorithm::Rs256,
        ]);
        assert_eq!(
            verifier.algorithms(),
            &[CoseAlgorithm::Es256, CoseAlgorithm::Rs256]
        );
    }
}
