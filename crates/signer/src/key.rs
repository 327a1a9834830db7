//! Ed25519 trust key types and operations.

use crate::error::{SignerError, SignerResult};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use ed25519_dalek::{SigningKey, VerifyingKey};
use std::fmt;

/// The registry's trust key for schema1 signing.
///
/// Process-wide and immutable after registry construction.
pub struct TrustKey {
    signing: SigningKey,
}

impl TrustKey {
    /// Generate a new random trust key.
    pub fn generate() -> Self {
        let mut rng = rand_core::OsRng;
        Self {
            signing: SigningKey::generate(&mut rng),
        }
    }

    /// Parse from a base64-encoded 32-byte secret key.
    pub fn from_base64(s: &str) -> SignerResult<Self> {
        let bytes = STANDARD
            .decode(s.trim())
            .map_err(|e| SignerError::KeyParsing(format!("invalid base64: {e}")))?;
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SignerError::KeyParsing("expected 32 key bytes".to_string()))?;
        Ok(Self {
            signing: SigningKey::from_bytes(&secret),
        })
    }

    /// Encode the secret key as base64 for key-file storage.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.signing.to_bytes())
    }

    /// The verifying half of the key.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// A stable identifier for the public key.
    pub fn key_id(&self) -> String {
        use sha2::Digest as _;
        let hash = sha2::Sha256::digest(self.signing.verifying_key().as_bytes());
        hash.iter().take(16).map(|b| format!("{b:02x}")).collect()
    }

    /// The public key as a JOSE JWK.
    pub fn jwk(&self) -> serde_json::Value {
        serde_json::json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "kid": self.key_id(),
            "x": URL_SAFE_NO_PAD.encode(self.signing.verifying_key().as_bytes()),
        })
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing
    }
}

impl fmt::Debug for TrustKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrustKey({}...)", &self.key_id()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_and_roundtrip() {
        let key = TrustKey::generate();
        let encoded = key.to_base64();
        let parsed = TrustKey::from_base64(&encoded).unwrap();
        assert_eq!(
            parsed.verifying_key().as_bytes(),
            key.verifying_key().as_bytes()
        );
        assert_eq!(parsed.key_id(), key.key_id());
    }

    #[test]
    fn rejects_short_key() {
        let short = STANDARD.encode([0u8; 16]);
        assert!(TrustKey::from_base64(&short).is_err());
        assert!(TrustKey::from_base64("not base64!!!").is_err());
    }

    #[test]
    fn jwk_carries_public_key() {
        let key = TrustKey::generate();
        let jwk = key.jwk();
        assert_eq!(jwk["kty"], "OKP");
        assert_eq!(jwk["crv"], "Ed25519");
        let x = URL_SAFE_NO_PAD.decode(jwk["x"].as_str().unwrap()).unwrap();
        assert_eq!(x, key.verifying_key().as_bytes());
    }
}
