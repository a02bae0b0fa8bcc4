//! The authenticator data binary layout.
//!
//! ```text
//! rpIdHash (32) | flags (1) | signCount (4, big-endian)
//!   [ aaguid (16) | credentialIdLength (2, big-endian) | credentialId | COSE key ]
//!   [ extensions (CBOR map) ]
//! ```
//!
//! The bracketed parts are present when the AT and ED flags are set. The
//! COSE key has no length prefix, so its end is found by decoding it.

use crate::{CodecError, CoseKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The authenticator data flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flags(u8);

impl Flags {
    /// User Present.
    pub const USER_PRESENT: Flags = Flags(0x01);
    /// User Verified.
    pub const USER_VERIFIED: Flags = Flags(0x04);
    /// Backup Eligible.
    pub const BACKUP_ELIGIBLE: Flags = Flags(0x08);
    /// Backup State.
    pub const BACKED_UP: Flags = Flags(0x10);
    /// Attested credential data included.
    pub const ATTESTED_CREDENTIAL_DATA: Flags = Flags(0x40);
    /// Extension data included.
    pub const EXTENSION_DATA: Flags = Flags(0x80);

    /// Flags from the raw byte.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Flags(bits)
    }

    /// The raw byte.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the user was present.
    #[must_use]
    pub const fn user_present(self) -> bool {
        self.contains(Flags::USER_PRESENT)
    }

    /// Whether the user was verified.
    #[must_use]
    pub const fn user_verified(self) -> bool {
        self.contains(Flags::USER_VERIFIED)
    }

    /// Whether the credential may be backed up.
    #[must_use]
    pub const fn backup_eligible(self) -> bool {
        self.contains(Flags::BACKUP_ELIGIBLE)
    }

    /// Whether the credential is currently backed up.
    #[must_use]
    pub const fn backed_up(self) -> bool {
        self.contains(Flags::BACKED_UP)
    }
}

impl std::ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// An authenticator model identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Aaguid(pub [u8; 16]);

impl Aaguid {
    /// The all-zero AAGUID used by authenticators that do not disclose
    /// their model (and by every U2F authenticator).
    pub const ZERO: Aaguid = Aaguid([0; 16]);

    /// The raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Whether this is [`Aaguid::ZERO`].
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Aaguid::ZERO
    }
}

impl fmt::Display for Aaguid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// The credential section of authenticator data produced at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    /// The authenticator model.
    pub aaguid: Aaguid,
    /// The new credential's identifier.
    pub credential_id: Vec<u8>,
    /// The new credential's public key.
    pub public_key: CoseKey,
}

impl AttestedCredentialData {
    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), CodecError> {
        let len = u16::try_from(self.credential_id.len())
            .map_err(|_| CodecError::InvalidKey("credential id longer than 65535 bytes".into()))?;
        buf.extend_from_slice(self.aaguid.as_bytes());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(&self.credential_id);
        buf.extend_from_slice(self.public_key.as_bytes());
        Ok(())
    }
}

/// Parsed authenticator data. The exact bytes are retained because they are
/// what every attestation and assertion signature covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    raw: Vec<u8>,
    rp_id_hash: [u8; 32],
    flags: Flags,
    sign_count: u32,
    attested_credential_data: Option<AttestedCredentialData>,
    extensions: Option<Vec<u8>>,
}

impl AuthenticatorData {
    /// Assemble authenticator data and its binary encoding.
    ///
    /// The AT and ED flags are derived from the presence of
    /// `attested_credential_data` and `extensions`; other flag bits are taken
    /// from `flags` as given.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential id does not fit the 16-bit length
    /// field.
    pub fn new(
        rp_id_hash: [u8; 32],
        flags: Flags,
        sign_count: u32,
        attested_credential_data: Option<AttestedCredentialData>,
        extensions: Option<Vec<u8>>,
    ) -> Result<Self, CodecError> {
        let mut bits = flags.bits()
            & !(Flags::ATTESTED_CREDENTIAL_DATA.bits() | Flags::EXTENSION_DATA.bits());
        if attested_credential_data.is_some() {
            bits |= Flags::ATTESTED_CREDENTIAL_DATA.bits();
        }
        if extensions.is_some() {
            bits |= Flags::EXTENSION_DATA.bits();
        }
        let flags = Flags::from_bits(bits);

        let mut raw = Vec::with_capacity(37);
        raw.extend_from_slice(&rp_id_hash);
        raw.push(flags.bits());
        raw.extend_from_slice(&sign_count.to_be_bytes());
        if let Some(acd) = &attested_credential_data {
            acd.encode_into(&mut raw)?;
        }
        if let Some(ext) = &extensions {
            raw.extend_from_slice(ext);
        }

        Ok(Self {
            raw,
            rp_id_hash,
            flags,
            sign_count,
            attested_credential_data,
            extensions,
        })
    }

    /// Parse authenticator data.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] on any short read, on a COSE key with an
    /// unsupported key type or curve, on an extension block that is not
    /// a single CBOR item, or on trailing bytes when the ED flag is clear.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut input = bytes;

        let rp_id_hash: [u8; 32] = take_array(&mut input, "rpIdHash")?;
        let [flag_byte] = take_array::<1>(&mut input, "flags")?;
        let flags = Flags::from_bits(flag_byte);
        let sign_count = u32::from_be_bytes(take_array(&mut input, "signCount")?);

        let attested_credential_data = if flags.contains(Flags::ATTESTED_CREDENTIAL_DATA) {
            let aaguid = Aaguid(take_array(&mut input, "aaguid")?);
            let len = u16::from_be_bytes(take_array(&mut input, "credentialIdLength")?);
            let credential_id = take(&mut input, usize::from(len), "credentialId")?.to_vec();
            let public_key = CoseKey::decode_prefix(&mut input)?;
            Some(AttestedCredentialData {
                aaguid,
                credential_id,
                public_key,
            })
        } else {
            None
        };

        let extensions = if flags.contains(Flags::EXTENSION_DATA) {
            if input.is_empty() {
                return Err(CodecError::MissingExtensions);
            }
            let start = input;
            let _: ciborium::Value = ciborium::de::from_reader(&mut input)
                .map_err(|e| CodecError::InvalidCbor(e.to_string()))?;
            Some(start[..start.len() - input.len()].to_vec())
        } else {
            None
        };

        if !input.is_empty() {
            return Err(CodecError::TrailingBytes(input.len()));
        }

        Ok(Self {
            raw: bytes.to_vec(),
            rp_id_hash,
            flags,
            sign_count,
            attested_credential_data,
            extensions,
        })
    }

    /// The exact bytes the authenticator produced.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// SHA-256 of the relying party id the authenticator scoped the
    /// credential to.
    #[must_use]
    pub const fn rp_id_hash(&self) -> &[u8; 32] {
        &self.rp_id_hash
    }

    /// The flag byte.
    #[must_use]
    pub const fn flags(&self) -> Flags {
        self.flags
    }

    /// The signature counter.
    #[must_use]
    pub const fn sign_count(&self) -> u32 {
        self.sign_count
    }

    /// The attested credential data, present at registration.
    #[must_use]
    pub const fn attested_credential_data(&self) -> Option<&AttestedCredentialData> {
        self.attested_credential_data.as_ref()
    }

    /// The raw CBOR extension block, if any.
    #[must_use]
    pub fn extensions(&self) -> Option<&[u8]> {
        self.extensions.as_deref()
    }

    /// `authenticatorData || clientDataHash`, the message attestation and
    /// assertion signatures are computed over.
    #[must_use]
    pub fn signed_message(&self, client_data_hash: &[u8; 32]) -> Vec<u8> {
        let mut message = Vec::with_capacity(self.raw.len() + client_data_hash.len());
        message.extend_from_slice(&self.raw);
        message.extend_from_slice(client_data_hash);
        message
    }
}

fn take<'a>(input: &mut &'a [u8], len: usize, field: &'static str) -> Result<&'a [u8], CodecError> {
    if input.len() < len {
        return Err(CodecError::Truncated {
            field,
            needed: len,
            remaining: input.len(),
        });
    }
    let (head, tail) = input.split_at(len);
    *input = tail;
    Ok(head)
}

fn take_array<const N: usize>(input: &mut &[u8], field: &'static str) -> Result<[u8; N], CodecError> {
    let mut out = [0u8; N];
    out.copy_from_slice(take(input, N, field)?);
    Ok(out)
}
