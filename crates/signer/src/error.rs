//! Signer error types.

use thiserror::Error;

/// Signing and verification errors.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("key parsing error: {0}")]
    KeyParsing(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("signature verification failed")]
    VerificationFailed,

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for signer operations.
pub type SignerResult<T> = std::result::Result<T, SignerError>;
