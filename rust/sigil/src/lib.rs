//! A WebAuthn relying party.
//!
//! [`Server`] runs the two ceremonies of the protocol:
//!
//! - Registration: [`Server::start_registration`] returns client options and
//!   a [`RegistrationContext`]; [`Server::finish_registration`] verifies the
//!   authenticator's attestation against that context and stores a new
//!   [`Credential`].
//! - Authentication: [`Server::start_authentication`] returns client options
//!   and an [`AuthenticationContext`]; [`Server::finish_authentication`]
//!   verifies the assertion signature with the stored credential key and
//!   advances its signature counter.
//!
//! Contexts are single use. Callers either keep them (keyed by challenge)
//! and hand them back, or configure a [`ContextStore`] and use the
//! `*_stored` variants, which consume each context exactly once.
//!
//! Attestation formats, certificate chains and metadata live in
//! [`sigil_attestation`]; binary codecs and signature verification in
//! [`sigil_cose`].

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod challenge;
pub mod client_data;
pub mod config;
pub mod context;
pub mod credential;
mod encoding;
pub mod error;
mod extension;
pub mod options;
mod origin;
pub mod policy;
pub mod response;
pub mod server;

pub use challenge::*;
pub use client_data::*;
pub use config::*;
pub use context::*;
pub use credential::*;
pub use error::*;
pub use extension::*;
pub use options::*;
pub use origin::*;
pub use policy::*;
pub use response::*;
pub use server::*;

pub use sigil_attestation::{AttestationType, RevocationFailureMode, TrustVerdict};
pub use sigil_cose::{Aaguid, CoseAlgorithm, CoseKey};
