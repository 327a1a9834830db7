//! Schema1 manifest signing for Stevedore.
//!
//! Provides the process-wide trust key and the pretty-JWS envelope used to
//! sign and verify legacy schema1 manifests.

pub mod error;
pub mod jws;
pub mod key;

pub use error::{SignerError, SignerResult};
pub use jws::{sign_manifest, verify_manifest};
pub use key::TrustKey;
