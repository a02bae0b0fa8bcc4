//! Trust anchors.

use crate::{AttestationError, Certificate};

/// A root or intermediate certificate accepted as the basis of trust for an
/// attestation chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustAnchor {
    certificate: Certificate,
    fingerprint: [u8; 32],
}

impl TrustAnchor {
    /// An anchor for `certificate`.
    #[must_use]
    pub fn new(certificate: Certificate) -> Self {
        let fingerprint = certificate.fingerprint();
        Self {
            certificate,
            fingerprint,
        }
    }

    /// An anchor from a DER encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if `der` is not a certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, AttestationError> {
        Certificate::from_der(der).map(Self::new)
    }

    /// The anchor certificate.
    #[must_use]
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// SHA-256 over the anchor's DER encoding.
    #[must_use]
    pub fn fingerprint(&self) -> &[u8; 32] {
        &self.fingerprint
    }

    /// Whether `certificate` is this anchor, by fingerprint or by public key.
    #[must_use]
    pub fn matches(&self, certificate: &Certificate) -> bool {
        certificate.fingerprint() == self.fingerprint || certificate.same_public_key(&self.certificate)
    }

    /// Whether `certificate` is byte for byte this anchor.
    #[must_use]
    pub fn is(&self, certificate: &Certificate) -> bool {
        certificate.fingerprint() == self.fingerprint
    }

    /// Whether this anchor's subject is the issuer of `certificate`.
    #[must_use]
    pub fn issued(&self, certificate: &Certificate) -> bool {
        certificate.issuer() == self.certificate.subject()
    }
}

impl From<Certificate> for TrustAnchor {
    fn from(certificate: Certificate) -> Self {
        TrustAnchor::new(certificate)
    }
}
