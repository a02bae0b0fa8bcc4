//! Attestation verification for WebAuthn relying parties.
//!
//! An [`AttestationObject`] carries a format identifier, a format-specific
//! statement and the authenticator data the statement vouches for. The
//! [`FormatRegistry`] turns the statement into a typed
//! [`AttestationStatement`] and hands it to the verifier registered for the
//! format, which produces a [`VerificationResult`].
//!
//! Formats that carry certificates establish trust through the
//! [`TrustAnchorResolver`] (metadata-derived anchors for the authenticator
//! model) and the [`ChainEvaluator`] (signatures, validity and revocation of
//! each certificate up to an anchor).
//!
//! ```text
//! AttestationObject ──► FormatRegistry::create_statement ──► AttestationStatement
//!                                   │
//!                                   ▼
//!                        Verifier::verify(stmt, authData, clientDataHash)
//!                                   │
//!                  TrustAnchorResolver ──► ChainEvaluator
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod anchor;
pub mod certificate;
pub mod chain;
mod cbor;
pub mod error;
pub mod metadata;
pub mod object;
pub mod registry;
pub mod result;
pub mod statement;
pub mod verifier;

pub use anchor::*;
pub use certificate::*;
pub use chain::*;
pub use error::*;
pub use metadata::*;
pub use object::*;
pub use registry::*;
pub use result::*;
pub use statement::*;
pub use verifier::VerificationContext;

#[cfg(any(test, feature = "helpers"))]
mod helpers;
#[cfg(any(test, feature = "helpers"))]
pub use helpers::*;
