use crate::{
    Certificate, ChainEvaluator, MetadataEntry, RevocationChecker, RevocationStatus,
    RevocationUnavailable, StaticMetadata, TrustAnchor, TrustAnchorResolver, VerificationContext,
    oid,
};
use anyhow::Result;
use der::{
    Decode, Encode, Length, Writer,
    asn1::{Ia5String, ObjectIdentifier},
    oid::AssociatedOid,
};
use p256::{
    ecdsa::{DerSignature, SigningKey, signature::Signer as _},
    pkcs8::EncodePublicKey as _,
};
use sha2::{Digest, Sha256};
use sigil_cose::{
    Aaguid, AttestedCredentialData, AuthenticatorData, CoseAlgorithm, CoseKey, EcCurve, Flags,
    PublicKey, SignatureVerifier,
};
use std::{marker::PhantomData, str::FromStr, sync::Arc, sync::Mutex, time::Duration};
use x509_cert::{
    builder::{Builder, CertificateBuilder, Profile},
    ext::{
        AsExtension, Extension,
        pkix::{
            CrlDistributionPoints, ExtendedKeyUsage,
            crl::dp::DistributionPoint,
            name::{DistributionPointName, GeneralName},
        },
    },
    name::Name,
    serial_number::SerialNumber,
    spki::SubjectPublicKeyInfoOwned,
    time::Validity,
};

const VALIDITY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Extensions and shape of a certificate issued by a
/// [`CertificateAuthority`].
#[derive(Debug, Clone, Default)]
pub struct LeafOptions {
    /// Issue a CA certificate instead of an end-entity one.
    pub ca: bool,
    /// Leave the subject name empty (TPM AIK certificates).
    pub empty_subject: bool,
    /// A CRL distribution point URI.
    pub crl_url: Option<String>,
    /// An `id-fido-gen-ce-aaguid` extension.
    pub aaguid: Option<Aaguid>,
    /// An Apple anonymous attestation nonce extension.
    pub apple_nonce: Option<[u8; 32]>,
    /// A DER encoded Android key description extension, see
    /// [`android_key_description`].
    pub android_key_description: Option<Vec<u8>>,
    /// A single extended key usage purpose.
    pub extended_key_usage: Option<ObjectIdentifier>,
}

/// A P-256 certificate authority for building attestation chains in tests.
#[derive(Debug, Clone)]
pub struct CertificateAuthority {
    key: SigningKey,
    certificate: Certificate,
}

impl CertificateAuthority {
    /// A self-signed root named `CN=<common_name>` with the key derived from
    /// `secret`.
    pub fn root(common_name: &str, secret: [u8; 32]) -> Result<Self> {
        let key = SigningKey::from_bytes(&secret.into())?;
        let builder = CertificateBuilder::new(
            Profile::Root,
            serial(&secret)?,
            Validity::from_now(VALIDITY)?,
            Name::from_str(&format!("CN={common_name}"))?,
            spki_of(&key)?,
            &key,
        )?;
        let certificate = finish(builder)?;
        Ok(Self { key, certificate })
    }

    /// An intermediate CA issued by this one.
    pub fn issue_intermediate(&self, common_name: &str, secret: [u8; 32]) -> Result<Self> {
        let key = SigningKey::from_bytes(&secret.into())?;
        let certificate = self.issue_for(
            common_name,
            spki_of(&key)?.to_der()?.as_slice(),
            LeafOptions {
                ca: true,
                ..LeafOptions::default()
            },
        )?;
        Ok(Self { key, certificate })
    }

    /// A certificate for the P-256 key derived from `secret`, returned with
    /// that key.
    pub fn issue_leaf(
        &self,
        common_name: &str,
        secret: [u8; 32],
        options: LeafOptions,
    ) -> Result<(Certificate, SigningKey)> {
        let key = SigningKey::from_bytes(&secret.into())?;
        let certificate = self.issue_for(common_name, spki_of(&key)?.to_der()?.as_slice(), options)?;
        Ok((certificate, key))
    }

    /// A certificate for an arbitrary DER encoded SubjectPublicKeyInfo.
    pub fn issue_for(
        &self,
        common_name: &str,
        subject_public_key_info: &[u8],
        options: LeafOptions,
    ) -> Result<Certificate> {
        let issuer = self.certificate.subject().clone();
        let profile = if options.ca {
            Profile::SubCA {
                issuer,
                path_len_constraint: None,
            }
        } else {
            Profile::Leaf {
                issuer,
                enable_key_agreement: false,
                enable_key_encipherment: false,
            }
        };
        let subject = if options.empty_subject {
            Name::default()
        } else {
            Name::from_str(&format!("CN={common_name}"))?
        };

        let mut builder = CertificateBuilder::new(
            profile,
            serial(subject_public_key_info)?,
            Validity::from_now(VALIDITY)?,
            subject,
            SubjectPublicKeyInfoOwned::from_der(subject_public_key_info)?,
            &self.key,
        )?;

        if let Some(url) = options.crl_url {
            builder.add_extension(&CrlDistributionPoints(vec![DistributionPoint {
                distribution_point: Some(DistributionPointName::FullName(vec![
                    GeneralName::UniformResourceIdentifier(Ia5String::new(&url)?),
                ])),
                reasons: None,
                crl_issuer: None,
            }]))?;
        }
        if let Some(purpose) = options.extended_key_usage {
            builder.add_extension(&ExtendedKeyUsage(vec![purpose]))?;
        }
        if let Some(aaguid) = options.aaguid {
            builder.add_extension(&RawExtension::<FidoAaguid>::new(tlv(&[0x04], aaguid.as_bytes())))?;
        }
        if let Some(nonce) = options.apple_nonce {
            let value = tlv(&[0x30], &tlv(&[0xa1], &tlv(&[0x04], &nonce)));
            builder.add_extension(&RawExtension::<AppleNonce>::new(value))?;
        }
        if let Some(description) = options.android_key_description {
            builder.add_extension(&RawExtension::<AndroidKeyDescription>::new(description))?;
        }

        finish(builder)
    }

    /// An issuer from any certificate and its key, whether or not the
    /// certificate is a CA.
    pub fn from_parts(certificate: Certificate, key: SigningKey) -> Self {
        Self { key, certificate }
    }

    /// This authority's certificate.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// This authority's signing key.
    pub fn signing_key(&self) -> &SigningKey {
        &self.key
    }
}

fn finish(builder: CertificateBuilder<'_, SigningKey>) -> Result<Certificate> {
    let certificate = builder.build::<DerSignature>()?;
    Ok(Certificate::from_der(&certificate.to_der()?)?)
}

fn spki_of(key: &SigningKey) -> Result<SubjectPublicKeyInfoOwned> {
    let der = key.verifying_key().to_public_key_der()?;
    Ok(SubjectPublicKeyInfoOwned::from_der(der.as_bytes())?)
}

/// A positive serial number derived from `seed`.
fn serial(seed: &[u8]) -> Result<SerialNumber> {
    let digest = Sha256::digest(seed);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    bytes[0] = (bytes[0] & 0x7f) | 0x01;
    Ok(SerialNumber::new(&bytes)?)
}

/// An extension whose value is given as raw DER.
struct RawExtension<O> {
    value: Vec<u8>,
    oid: PhantomData<O>,
}

impl<O> RawExtension<O> {
    fn new(value: Vec<u8>) -> Self {
        Self {
            value,
            oid: PhantomData,
        }
    }
}

impl<O: AssociatedOid> AssociatedOid for RawExtension<O> {
    const OID: ObjectIdentifier = O::OID;
}

impl<O> Encode for RawExtension<O> {
    fn encoded_len(&self) -> der::Result<Length> {
        Length::try_from(self.value.len())
    }

    fn encode(&self, writer: &mut impl Writer) -> der::Result<()> {
        writer.write(&self.value)
    }
}

impl<O: AssociatedOid> AsExtension for RawExtension<O> {
    fn critical(&self, _subject: &Name, _extensions: &[Extension]) -> bool {
        false
    }
}

struct FidoAaguid;
impl AssociatedOid for FidoAaguid {
    const OID: ObjectIdentifier = oid::FIDO_GEN_CE_AAGUID;
}

struct AppleNonce;
impl AssociatedOid for AppleNonce {
    const OID: ObjectIdentifier = oid::APPLE_NONCE;
}

struct AndroidKeyDescription;
impl AssociatedOid for AndroidKeyDescription {
    const OID: ObjectIdentifier = oid::ANDROID_KEY_DESCRIPTION;
}

/// DER tag-length-value.
fn tlv(tag: &[u8], value: &[u8]) -> Vec<u8> {
    let mut out = tag.to_vec();
    let len = value.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(value);
    out
}

/// A DER encoded Android key description with the given attestation
/// challenge. With `all_applications` the software enforced list carries the
/// `allApplications` tag.
pub fn android_key_description(challenge: &[u8], all_applications: bool) -> Vec<u8> {
    // allApplications [600] NULL
    let software = if all_applications {
        tlv(&[0xbf, 0x84, 0x58], &tlv(&[0x05], &[]))
    } else {
        Vec::new()
    };
    // purpose [1] SET OF INTEGER { SIGN }, origin [702] INTEGER GENERATED
    let mut tee = tlv(&[0xa1], &tlv(&[0x31], &tlv(&[0x02], &[2])));
    tee.extend(tlv(&[0xbf, 0x85, 0x3e], &tlv(&[0x02], &[0])));

    let mut body = Vec::new();
    body.extend(tlv(&[0x02], &[3]));
    body.extend(tlv(&[0x0a], &[1]));
    body.extend(tlv(&[0x02], &[4]));
    body.extend(tlv(&[0x0a], &[1]));
    body.extend(tlv(&[0x04], challenge));
    body.extend(tlv(&[0x04], &[]));
    body.extend(tlv(&[0x30], &software));
    body.extend(tlv(&[0x30], &tee));
    tlv(&[0x30], &body)
}

/// A revocation checker answering from a fixed set of revoked certificate
/// fingerprints. Records the distribution points it was asked about.
#[derive(Debug, Default)]
pub struct StaticRevocation {
    revoked: Vec<[u8; 32]>,
    unreachable: bool,
    seen: Mutex<Vec<String>>,
}

impl StaticRevocation {
    /// Report the certificates with these fingerprints as revoked.
    pub fn revoking(fingerprints: impl IntoIterator<Item = [u8; 32]>) -> Self {
        Self {
            revoked: fingerprints.into_iter().collect(),
            ..Self::default()
        }
    }

    /// A checker that can never be reached.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    /// Every distribution point URI passed to the checker so far.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

impl RevocationChecker for StaticRevocation {
    fn status(
        &self,
        certificate: &Certificate,
        distribution_points: &[String],
    ) -> Result<RevocationStatus, RevocationUnavailable> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.extend_from_slice(distribution_points);
        }
        if self.unreachable {
            return Err(RevocationUnavailable("CRL endpoint unreachable".into()));
        }
        Ok(if self.revoked.contains(&certificate.fingerprint()) {
            RevocationStatus::Revoked
        } else {
            RevocationStatus::Good
        })
    }
}

/// The collaborators of a [`VerificationContext`], owned.
#[derive(Debug, Clone)]
pub struct TestVerifiers {
    /// Attestation signature verifier.
    pub signatures: SignatureVerifier,
    /// Trust anchor resolver.
    pub resolver: TrustAnchorResolver,
    /// Chain evaluator.
    pub chains: ChainEvaluator,
}

impl TestVerifiers {
    /// No metadata; chains are accepted without a trust root.
    pub fn without_metadata() -> Self {
        Self {
            signatures: SignatureVerifier::supported(),
            resolver: TrustAnchorResolver::without_source(true),
            chains: ChainEvaluator::new(),
        }
    }

    /// Metadata that anchors any chain issued under one of `anchors`, and
    /// nothing else.
    pub fn trusting(anchors: Vec<Certificate>) -> Self {
        let entry = MetadataEntry {
            description: "Test Authenticator".into(),
            anchors: anchors.into_iter().map(TrustAnchor::new).collect(),
            hints: Default::default(),
        };
        Self {
            signatures: SignatureVerifier::supported(),
            resolver: TrustAnchorResolver::new(
                Arc::new(StaticMetadata::new().with_chain_entry(entry)),
                false,
            ),
            chains: ChainEvaluator::new(),
        }
    }

    /// A strict context without revocation checking.
    pub fn context(&self) -> VerificationContext<'_> {
        VerificationContext {
            signatures: &self.signatures,
            resolver: &self.resolver,
            chains: &self.chains,
            check_revocation: false,
            strict: true,
        }
    }
}

/// The ES256 COSE key of `key`.
pub fn cose_key(key: &SigningKey) -> Result<CoseKey> {
    let point = key.verifying_key().to_encoded_point(false);
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

/// Registration authenticator data for `rp_id` attesting the ES256
/// credential `key` with user presence and a zero counter.
pub fn credential_auth_data(
    rp_id: &str,
    key: &SigningKey,
    aaguid: Aaguid,
    credential_id: &[u8],
) -> Result<AuthenticatorData> {
    Ok(AuthenticatorData::new(
        Sha256::digest(rp_id.as_bytes()).into(),
        Flags::USER_PRESENT,
        0,
        Some(AttestedCredentialData {
            aaguid,
            credential_id: credential_id.to_vec(),
            public_key: cose_key(key)?,
        }),
        None,
    )?)
}

/// A DER encoded ECDSA signature over `message`.
pub fn der_sign(key: &SigningKey, message: &[u8]) -> Vec<u8> {
    let signature: DerSignature = key.sign(message);
    signature.as_bytes().to_vec()
}
