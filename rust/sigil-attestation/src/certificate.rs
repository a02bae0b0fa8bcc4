//! X.509 certificates as they appear in attestation statements.

use crate::AttestationError;
use der::{
    Decode, Encode, Reader, SliceReader, Tag, Tagged,
    asn1::{ObjectIdentifier, UintRef},
};
use sha2::{Digest, Sha256};
use sigil_cose::{CoseAlgorithm, EcCurve, OkpCurve, PublicKey};
use std::{fmt, time::Duration};
use x509_cert::{
    certificate::Version,
    ext::pkix::{
        BasicConstraints, CrlDistributionPoints, ExtendedKeyUsage, KeyUsage, KeyUsages,
        name::{DistributionPointName, GeneralName},
    },
    name::Name,
};

/// Object identifiers used by the attestation formats.
pub mod oid {
    use der::asn1::ObjectIdentifier;

    /// `ecdsa-with-SHA256`
    pub const ECDSA_WITH_SHA256: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
    /// `ecdsa-with-SHA384`
    pub const ECDSA_WITH_SHA384: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");
    /// `ecdsa-with-SHA512`
    pub const ECDSA_WITH_SHA512: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.4");
    /// `sha256WithRSAEncryption`
    pub const SHA256_WITH_RSA: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
    /// `sha384WithRSAEncryption`
    pub const SHA384_WITH_RSA: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
    /// `sha512WithRSAEncryption`
    pub const SHA512_WITH_RSA: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");
    /// `id-RSASSA-PSS`
    pub const RSASSA_PSS: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.10");
    /// `id-Ed25519`
    pub const ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");

    /// `id-ecPublicKey`
    pub const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
    /// `rsaEncryption`
    pub const RSA_ENCRYPTION: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
    /// `prime256v1`
    pub const SECP256R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
    /// `secp384r1`
    pub const SECP384R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");
    /// `secp521r1`
    pub const SECP521R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.35");

    /// `id-at-commonName`
    pub const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
    /// `id-ce-keyUsage`
    pub const KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.15");
    /// `id-ce-basicConstraints`
    pub const BASIC_CONSTRAINTS: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.19");
    /// `id-ce-extKeyUsage`
    pub const EXTENDED_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.37");
    /// `id-ce-cRLDistributionPoints`
    pub const CRL_DISTRIBUTION_POINTS: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.31");

    /// `id-fido-gen-ce-aaguid`
    pub const FIDO_GEN_CE_AAGUID: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.3.6.1.4.1.45724.1.1.4");
    /// Android key attestation key description.
    pub const ANDROID_KEY_DESCRIPTION: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.3.6.1.4.1.11129.2.1.17");
    /// Apple anonymous attestation nonce.
    pub const APPLE_NONCE: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.2.840.113635.100.8.2");
    /// `tcg-kp-AIKCertificate`
    pub const TCG_KP_AIK_CERTIFICATE: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("2.23.133.8.3");
}

const CURVES: [(ObjectIdentifier, EcCurve); 3] = [
    (oid::SECP256R1, EcCurve::P256),
    (oid::SECP384R1, EcCurve::P384),
    (oid::SECP521R1, EcCurve::P521),
];

const SIGNATURE_ALGORITHMS: [(ObjectIdentifier, CoseAlgorithm); 8] = [
    (oid::ECDSA_WITH_SHA256, CoseAlgorithm::Es256),
    (oid::ECDSA_WITH_SHA384, CoseAlgorithm::Es384),
    (oid::ECDSA_WITH_SHA512, CoseAlgorithm::Es512),
    (oid::SHA256_WITH_RSA, CoseAlgorithm::Rs256),
    (oid::SHA384_WITH_RSA, CoseAlgorithm::Rs384),
    (oid::SHA512_WITH_RSA, CoseAlgorithm::Rs512),
    (oid::RSASSA_PSS, CoseAlgorithm::Ps256),
    (oid::ED25519, CoseAlgorithm::EdDsa),
];

/// A parsed X.509 certificate that keeps its DER encoding.
#[derive(Clone)]
pub struct Certificate {
    der: Vec<u8>,
    parsed: x509_cert::Certificate,
}

impl Certificate {
    /// Parse a DER encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::MalformedCertificate`] if `der` is not a
    /// single well-formed certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, AttestationError> {
        let parsed = x509_cert::Certificate::from_der(der).map_err(malformed)?;
        Ok(Self {
            der: der.to_vec(),
            parsed,
        })
    }

    /// The DER encoding.
    #[must_use]
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    /// SHA-256 over the DER encoding.
    #[must_use]
    pub fn fingerprint(&self) -> [u8; 32] {
        Sha256::digest(&self.der).into()
    }

    /// The subject name.
    #[must_use]
    pub fn subject(&self) -> &Name {
        &self.parsed.tbs_certificate.subject
    }

    /// The issuer name.
    #[must_use]
    pub fn issuer(&self) -> &Name {
        &self.parsed.tbs_certificate.issuer
    }

    /// The first common name in the subject, if it is a string.
    #[must_use]
    pub fn subject_common_name(&self) -> Option<&str> {
        self.subject()
            .0
            .iter()
            .flat_map(|rdn| rdn.0.iter())
            .find(|atv| atv.oid == oid::COMMON_NAME)
            .and_then(|atv| match atv.value.tag() {
                Tag::Utf8String | Tag::PrintableString | Tag::Ia5String => {
                    std::str::from_utf8(atv.value.value()).ok()
                }
                _ => None,
            })
    }

    /// Whether the subject name is empty.
    #[must_use]
    pub fn has_empty_subject(&self) -> bool {
        self.subject().0.is_empty()
    }

    /// Whether this is an X.509 v3 certificate.
    #[must_use]
    pub fn is_v3(&self) -> bool {
        self.parsed.tbs_certificate.version == Version::V3
    }

    /// Whether the basic constraints extension marks this certificate as
    /// a CA. A missing extension means it is not one.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is present but malformed.
    pub fn is_ca(&self) -> Result<bool, AttestationError> {
        match self.extension(&oid::BASIC_CONSTRAINTS) {
            Some(value) => Ok(BasicConstraints::from_der(value).map_err(malformed)?.ca),
            None => Ok(false),
        }
    }

    /// Whether this certificate may sign other certificates: it must be a CA
    /// and, when it carries a key usage extension, assert `keyCertSign`.
    ///
    /// # Errors
    ///
    /// Returns an error if either extension is present but malformed.
    pub fn can_sign_certificates(&self) -> Result<bool, AttestationError> {
        if !self.is_ca()? {
            return Ok(false);
        }
        match self.extension(&oid::KEY_USAGE) {
            Some(value) => Ok(KeyUsage::from_der(value)
                .map_err(malformed)?
                .0
                .contains(KeyUsages::KeyCertSign)),
            None => Ok(true),
        }
    }

    /// Whether the extended key usage extension lists `purpose`.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is present but malformed.
    pub fn has_extended_key_usage(&self, purpose: &ObjectIdentifier) -> Result<bool, AttestationError> {
        match self.extension(&oid::EXTENDED_KEY_USAGE) {
            Some(value) => Ok(ExtendedKeyUsage::from_der(value)
                .map_err(malformed)?
                .0
                .contains(purpose)),
            None => Ok(false),
        }
    }

    /// The URIs of the CRL distribution points.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is present but malformed.
    pub fn crl_distribution_points(&self) -> Result<Vec<String>, AttestationError> {
        let Some(value) = self.extension(&oid::CRL_DISTRIBUTION_POINTS) else {
            return Ok(Vec::new());
        };
        let points = CrlDistributionPoints::from_der(value).map_err(malformed)?;
        Ok(points
            .0
            .iter()
            .filter_map(|point| match &point.distribution_point {
                Some(DistributionPointName::FullName(names)) => Some(names),
                _ => None,
            })
            .flatten()
            .filter_map(|name| match name {
                GeneralName::UniformResourceIdentifier(uri) => Some(uri.to_string()),
                _ => None,
            })
            .collect())
    }

    /// The value (the contents of `extnValue`) of the extension `id`.
    #[must_use]
    pub fn extension(&self, id: &ObjectIdentifier) -> Option<&[u8]> {
        self.parsed
            .tbs_certificate
            .extensions
            .as_ref()?
            .iter()
            .find(|ext| ext.extn_id == *id)
            .map(|ext| ext.extn_value.as_bytes())
    }

    /// `notBefore` and `notAfter` as durations since the Unix epoch.
    #[must_use]
    pub fn validity(&self) -> (Duration, Duration) {
        let validity = &self.parsed.tbs_certificate.validity;
        (
            validity.not_before.to_unix_duration(),
            validity.not_after.to_unix_duration(),
        )
    }

    /// Whether `now` falls inside the validity period.
    #[must_use]
    pub fn is_valid_at(&self, now: Duration) -> bool {
        let (not_before, not_after) = self.validity();
        not_before <= now && now <= not_after
    }

    /// Whether both certificates carry the same SubjectPublicKeyInfo.
    #[must_use]
    pub fn same_public_key(&self, other: &Certificate) -> bool {
        self.parsed.tbs_certificate.subject_public_key_info
            == other.parsed.tbs_certificate.subject_public_key_info
    }

    /// The subject public key.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::MalformedCertificate`] for key types or
    /// curves that cannot be expressed as a COSE key, and for compressed EC
    /// points.
    pub fn public_key(&self) -> Result<PublicKey, AttestationError> {
        let spki = &self.parsed.tbs_certificate.subject_public_key_info;
        let bits = spki.subject_public_key.raw_bytes();

        if spki.algorithm.oid == oid::EC_PUBLIC_KEY {
            let params = spki
                .algorithm
                .parameters
                .as_ref()
                .ok_or_else(|| malformed("EC key without curve parameters"))?;
            let curve_oid = ObjectIdentifier::from_bytes(params.value()).map_err(malformed)?;
            let curve = CURVES
                .iter()
                .find(|(id, _)| *id == curve_oid)
                .map(|(_, curve)| *curve)
                .ok_or_else(|| malformed(format!("unsupported curve {curve_oid}")))?;
            let len = curve.coordinate_len();
            match bits {
                [0x04, point @ ..] if point.len() == 2 * len => Ok(PublicKey::Ec2 {
                    curve,
                    x: point[..len].to_vec(),
                    y: point[len..].to_vec(),
                }),
                _ => Err(malformed("EC point is not an uncompressed point on its curve")),
            }
        } else if spki.algorithm.oid == oid::RSA_ENCRYPTION {
            let mut reader = SliceReader::new(bits).map_err(malformed)?;
            let (n, e) = reader
                .sequence(|seq| {
                    let n = UintRef::decode(seq)?;
                    let e = UintRef::decode(seq)?;
                    Ok((n.as_bytes().to_vec(), e.as_bytes().to_vec()))
                })
                .map_err(malformed)?;
            let (n, e) = reader.finish((n, e)).map_err(malformed)?;
            Ok(PublicKey::Rsa { n, e })
        } else if spki.algorithm.oid == oid::ED25519 && bits.len() == 32 {
            Ok(PublicKey::Okp {
                curve: OkpCurve::Ed25519,
                x: bits.to_vec(),
            })
        } else {
            Err(malformed(format!(
                "unsupported key algorithm {}",
                spki.algorithm.oid
            )))
        }
    }

    /// The COSE algorithm matching this certificate's signature algorithm
    /// when verified with `issuer_key`.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::UnsupportedAlgorithm`] for signature
    /// algorithms that have no COSE counterpart or do not fit the issuer key.
    pub fn signature_algorithm(&self, issuer_key: &PublicKey) -> Result<CoseAlgorithm, AttestationError> {
        let id = self.parsed.signature_algorithm.oid;
        let alg = SIGNATURE_ALGORITHMS
            .iter()
            .find(|(oid, _)| *oid == id)
            .map(|(_, alg)| *alg)
            .ok_or_else(|| {
                AttestationError::UnsupportedAlgorithm(format!(
                    "certificate signature algorithm {id}"
                ))
            })?;
        if !alg.fits(issuer_key) {
            return Err(AttestationError::UnsupportedAlgorithm(format!(
                "certificate signature algorithm {id} with a {issuer_key} issuer key"
            )));
        }
        Ok(alg)
    }

    /// The DER encoding of the to-be-signed portion.
    ///
    /// # Errors
    ///
    /// Returns an error if re-encoding fails.
    pub fn tbs_der(&self) -> Result<Vec<u8>, AttestationError> {
        self.parsed.tbs_certificate.to_der().map_err(malformed)
    }

    /// The issuer's signature over [`Certificate::tbs_der`].
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        self.parsed.signature.raw_bytes()
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject().to_string())
            .field("issuer", &self.issuer().to_string())
            .finish_non_exhaustive()
    }
}

fn malformed(e: impl fmt::Display) -> AttestationError {
    AttestationError::MalformedCertificate(e.to_string())
}
