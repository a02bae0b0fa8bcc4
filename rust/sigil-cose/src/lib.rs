//! Binary codecs and signature verification for WebAuthn relying parties.
//!
//! This crate holds the two leaf components of the verification engine:
//!
//! - [`AuthenticatorData`] parsing (and encoding) of the fixed binary layout
//!   authenticators sign, including the attested credential data and the
//!   self-delimiting [`CoseKey`] it carries.
//! - [`SignatureVerifier`], an algorithm table keyed by [`CoseAlgorithm`]
//!   that verifies a message/signature pair against a public key and fails
//!   closed for anything it was not configured to accept.
//!
//! Algorithms are compiled in per family (`es256`, `es384`, `es512`, `eddsa`,
//! `rsa`), all enabled by default.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod algorithm;
pub mod authenticator_data;
pub mod error;
pub mod key;
pub mod verifier;

pub use algorithm::*;
pub use authenticator_data::*;
pub use error::*;
pub use key::*;
pub use verifier::*;
