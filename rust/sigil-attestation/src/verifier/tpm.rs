//! `tpm` attestation.
//!
//! The TPM signs a `TPMS_ATTEST` structure (`certInfo`) with its attestation
//! identity key (AIK). `certInfo` names the credential key by the hash of its
//! `TPMT_PUBLIC` description (`pubArea`) and binds the ceremony through
//! `extraData = hash(authenticatorData || clientDataHash)`.

use super::{VerificationContext, attested_credential, leaf, unexpected};
use crate::{
    AttestationError, AttestationStatement, AttestationType, Certificate, TpmStatement,
    VerificationResult,
    cbor::{StatementMap, malformed},
    oid,
};
use ciborium::Value;
use der::{Decode, asn1::OctetStringRef};
use sha2::{Digest, Sha256, Sha384, Sha512};
use sigil_cose::{Aaguid, AuthenticatorData, EcCurve, PublicKey};

const KEYS: &[&str] = &["ver", "alg", "sig", "x5c", "certInfo", "pubArea", "ecdaaKeyId"];

const TPM_GENERATED_VALUE: u32 = 0xff54_4347;
const TPM_ST_ATTEST_CERTIFY: u16 = 0x8017;

const TPM_ALG_RSA: u16 = 0x0001;
const TPM_ALG_ECC: u16 = 0x0023;
const TPM_ALG_SHA256: u16 = 0x000b;
const TPM_ALG_SHA384: u16 = 0x000c;
const TPM_ALG_SHA512: u16 = 0x000d;

const TPM_ECC_NIST_P256: u16 = 0x0003;
const TPM_ECC_NIST_P384: u16 = 0x0004;
const TPM_ECC_NIST_P521: u16 = 0x0005;

const RSA_DEFAULT_EXPONENT: u32 = 65_537;

pub(crate) fn decode(value: &Value, strict: bool) -> Result<AttestationStatement, AttestationError> {
    let map = StatementMap::new(value, "tpm")?;
    map.reject_unknown(KEYS, strict)?;

    let ver = map.text("ver")?;
    if ver != "2.0" {
        return Err(malformed("tpm", format_args!("unsupported version {ver:?}")));
    }
    if map.get("ecdaaKeyId").is_some() {
        return Err(AttestationError::UnsupportedAlgorithm(
            "ECDAA attestation is not implemented".into(),
        ));
    }

    Ok(AttestationStatement::Tpm(TpmStatement {
        alg: map.algorithm("alg")?,
        sig: map.bytes("sig")?,
        x5c: map.certificates("x5c")?,
        cert_info: map.bytes("certInfo")?,
        pub_area: map.bytes("pubArea")?,
    }))
}

pub(crate) fn verify(
    statement: &AttestationStatement,
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8; 32],
    context: &VerificationContext<'_>,
) -> Result<VerificationResult, AttestationError> {
    let AttestationStatement::Tpm(statement) = statement else {
        return Err(unexpected("tpm", statement));
    };
    let credential = attested_credential(auth_data)?;

    let public = PublicArea::parse(&statement.pub_area)?;
    if public.key != *credential.public_key.public_key() {
        return Err(AttestationError::SignatureInvalid(
            "pubArea key does not match the credential key".into(),
        ));
    }

    let info = CertifyInfo::parse(&statement.cert_info)?;
    let expected = statement.alg.digest(&auth_data.signed_message(client_data_hash));
    if info.extra_data != expected {
        return Err(AttestationError::SignatureInvalid(
            "certInfo extraData does not bind the authenticator data".into(),
        ));
    }
    if info.attested_name != name_of(&statement.pub_area, public.name_alg)? {
        return Err(AttestationError::SignatureInvalid(
            "certInfo does not certify pubArea".into(),
        ));
    }

    let aik = leaf(&statement.x5c)?;
    context.signatures.verify_with(
        statement.alg,
        &aik.public_key()?,
        &statement.cert_info,
        &statement.sig,
    )?;
    check_aik(aik, credential.aaguid)?;

    context.establish_trust(
        credential.aaguid,
        statement.x5c.clone(),
        AttestationType::AttestationCa,
    )
}

/// AIK certificate requirements: v3, empty subject, the AIK extended key
/// usage, not a CA, and a matching AAGUID extension when present.
fn check_aik(aik: &Certificate, aaguid: Aaguid) -> Result<(), AttestationError> {
    let requirement = |reason: &str| -> Result<(), AttestationError> {
        Err(AttestationError::CertificateRequirement(format!("AIK {reason}")))
    };

    if !aik.is_v3() {
        return requirement("certificate is not X.509 v3");
    }
    if !aik.has_empty_subject() {
        return requirement("certificate subject is not empty");
    }
    if !aik.has_extended_key_usage(&oid::TCG_KP_AIK_CERTIFICATE)? {
        return requirement("certificate lacks tcg-kp-AIKCertificate");
    }
    if aik.is_ca()? {
        return requirement("certificate is a CA");
    }
    if let Some(value) = aik.extension(&oid::FIDO_GEN_CE_AAGUID) {
        let inner = OctetStringRef::from_der(value)
            .map_err(|e| AttestationError::MalformedCertificate(e.to_string()))?;
        if inner.as_bytes() != aaguid.as_bytes() {
            return requirement("certificate AAGUID extension does not match authenticator data");
        }
    }
    Ok(())
}

/// `nameAlg || hash(pubArea)`
fn name_of(pub_area: &[u8], name_alg: u16) -> Result<Vec<u8>, AttestationError> {
    let digest = match name_alg {
        TPM_ALG_SHA256 => Sha256::digest(pub_area).to_vec(),
        TPM_ALG_SHA384 => Sha384::digest(pub_area).to_vec(),
        TPM_ALG_SHA512 => Sha512::digest(pub_area).to_vec(),
        other => {
            return Err(AttestationError::UnsupportedAlgorithm(format!(
                "TPM name algorithm {other:#06x}"
            )));
        }
    };
    let mut name = name_alg.to_be_bytes().to_vec();
    name.extend_from_slice(&digest);
    Ok(name)
}

/// Big-endian reader over TPM marshalled structures.
struct Cursor<'a> {
    structure: &'static str,
    bytes: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(structure: &'static str, bytes: &'a [u8]) -> Self {
        Self { structure, bytes }
    }

    fn take(&mut self, len: usize, field: &str) -> Result<&'a [u8], AttestationError> {
        if self.bytes.len() < len {
            return Err(malformed(
                "tpm",
                format_args!("{} truncated at {field}", self.structure),
            ));
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    fn u16(&mut self, field: &str) -> Result<u16, AttestationError> {
        let bytes = self.take(2, field)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self, field: &str) -> Result<u32, AttestationError> {
        let bytes = self.take(4, field)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// A `TPM2B_*` sized buffer.
    fn sized(&mut self, field: &str) -> Result<&'a [u8], AttestationError> {
        let len = self.u16(field)?;
        self.take(usize::from(len), field)
    }

    fn finish(self) -> Result<(), AttestationError> {
        if self.bytes.is_empty() {
            Ok(())
        } else {
            Err(malformed(
                "tpm",
                format_args!("{} has {} trailing bytes", self.structure, self.bytes.len()),
            ))
        }
    }
}

/// The fields of `TPMT_PUBLIC` the verifier needs.
struct PublicArea {
    name_alg: u16,
    key: PublicKey,
}

impl PublicArea {
    fn parse(bytes: &[u8]) -> Result<Self, AttestationError> {
        let mut cursor = Cursor::new("pubArea", bytes);
        let key_type = cursor.u16("type")?;
        let name_alg = cursor.u16("nameAlg")?;
        let _object_attributes = cursor.u32("objectAttributes")?;
        let _auth_policy = cursor.sized("authPolicy")?;

        let key = match key_type {
            TPM_ALG_RSA => {
                let _symmetric = cursor.u16("symmetric")?;
                let _scheme = cursor.u16("scheme")?;
                let _key_bits = cursor.u16("keyBits")?;
                let exponent = match cursor.u32("exponent")? {
                    0 => RSA_DEFAULT_EXPONENT,
                    e => e,
                };
                let modulus = cursor.sized("unique")?;
                PublicKey::Rsa {
                    n: strip_leading_zeros(modulus).to_vec(),
                    e: strip_leading_zeros(&exponent.to_be_bytes()).to_vec(),
                }
            }
            TPM_ALG_ECC => {
                let _symmetric = cursor.u16("symmetric")?;
                let _scheme = cursor.u16("scheme")?;
                let curve = match cursor.u16("curveID")? {
                    TPM_ECC_NIST_P256 => EcCurve::P256,
                    TPM_ECC_NIST_P384 => EcCurve::P384,
                    TPM_ECC_NIST_P521 => EcCurve::P521,
                    other => {
                        return Err(AttestationError::UnsupportedAlgorithm(format!(
                            "TPM curve {other:#06x}"
                        )));
                    }
                };
                let _kdf = cursor.u16("kdf")?;
                let x = cursor.sized("unique.x")?;
                let y = cursor.sized("unique.y")?;
                PublicKey::Ec2 {
                    curve,
                    x: left_pad(x, curve.coordinate_len())?,
                    y: left_pad(y, curve.coordinate_len())?,
                }
            }
            other => {
                return Err(AttestationError::UnsupportedAlgorithm(format!(
                    "TPM key type {other:#06x}"
                )));
            }
        };
        cursor.finish()?;

        Ok(Self { name_alg, key })
    }
}

/// The fields of a certify `TPMS_ATTEST` the verifier needs.
struct CertifyInfo {
    extra_data: Vec<u8>,
    attested_name: Vec<u8>,
}

impl CertifyInfo {
    fn parse(bytes: &[u8]) -> Result<Self, AttestationError> {
        let mut cursor = Cursor::new("certInfo", bytes);
        if cursor.u32("magic")? != TPM_GENERATED_VALUE {
            return Err(AttestationError::SignatureInvalid(
                "certInfo was not generated by a TPM".into(),
            ));
        }
        if cursor.u16("type")? != TPM_ST_ATTEST_CERTIFY {
            return Err(AttestationError::SignatureInvalid(
                "certInfo is not a certify attestation".into(),
            ));
        }
        let _qualified_signer = cursor.sized("qualifiedSigner")?;
        let extra_data = cursor.sized("extraData")?.to_vec();
        // clock (8), resetCount (4), restartCount (4), safe (1)
        let _clock_info = cursor.take(17, "clockInfo")?;
        let _firmware_version = cursor.take(8, "firmwareVersion")?;
        let attested_name = cursor.sized("attested.name")?.to_vec();
        let _qualified_name = cursor.sized("attested.qualifiedName")?;
        cursor.finish()?;

        Ok(Self {
            extra_data,
            attested_name,
        })
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

fn left_pad(bytes: &[u8], len: usize) -> Result<Vec<u8>, AttestationError> {
    if bytes.len() > len {
        return Err(malformed("tpm", "EC coordinate longer than its curve"));
    }
    let mut padded = vec![0; len - bytes.len()];
    padded.extend_from_slice(bytes);
    Ok(padded)
}
