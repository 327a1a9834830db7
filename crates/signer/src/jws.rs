//! Pretty-JWS signing and verification for schema1 manifests.
//!
//! The envelope embeds signatures inside the manifest JSON. Signing takes
//! the canonical (unsigned) document, records where the closing brace sits
//! in the protected header (`formatLength`/`formatTail`), splices a
//! `signatures` member in front of it, and signs
//! `b64url(protected) + "." + b64url(canonical)`.

use crate::error::{SignerError, SignerResult};
use crate::key::TrustKey;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytes::Bytes;
use ed25519_dalek::{Signature as EdSignature, Signer as _, Verifier as _, VerifyingKey};
use stevedore_core::manifest::schema1::{
    ProtectedHeader, SignatureHeader, SignedManifest, decode_protected,
};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// The JOSE algorithm identifier written into signature headers.
pub const SIGNATURE_ALG: &str = "EdDSA";

/// Sign a canonical schema1 document, producing the enveloped manifest.
pub fn sign_manifest(key: &TrustKey, canonical: &[u8]) -> SignerResult<SignedManifest> {
    let format_length = canonical
        .iter()
        .rposition(|&b| b == b'}')
        .ok_or_else(|| SignerError::InvalidSignature("payload is not a JSON object".to_string()))?;
    let tail = &canonical[format_length..];

    let time = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| SignerError::Serialization(e.to_string()))?;
    let protected = ProtectedHeader {
        format_length,
        format_tail: URL_SAFE_NO_PAD.encode(tail),
        time,
    };
    let protected_b64 = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(&protected).map_err(|e| SignerError::Serialization(e.to_string()))?,
    );

    let signing_input = format!("{protected_b64}.{}", URL_SAFE_NO_PAD.encode(canonical));
    let signature = key.signing_key().sign(signing_input.as_bytes());

    let entry = stevedore_core::manifest::schema1::Signature {
        header: SignatureHeader {
            jwk: key.jwk(),
            alg: SIGNATURE_ALG.to_string(),
        },
        signature: URL_SAFE_NO_PAD.encode(signature.to_bytes()),
        protected: protected_b64,
    };
    let signatures_json = serde_json::to_string_pretty(&vec![entry])
        .map_err(|e| SignerError::Serialization(e.to_string()))?;

    let mut enveloped = Vec::with_capacity(canonical.len() + signatures_json.len() + 32);
    enveloped.extend_from_slice(&canonical[..format_length]);
    enveloped.extend_from_slice(format!(",\n   \"signatures\": {signatures_json}\n").as_bytes());
    enveloped.extend_from_slice(tail);

    SignedManifest::from_payload(Bytes::from(enveloped))
        .map_err(|e| SignerError::InvalidSignature(e.to_string()))
}

/// Verify every embedded signature of a signed manifest against the public
/// key carried in its JOSE header.
pub fn verify_manifest(manifest: &SignedManifest) -> SignerResult<()> {
    if manifest.signatures().is_empty() {
        return Err(SignerError::InvalidSignature(
            "manifest carries no signatures".to_string(),
        ));
    }

    for entry in manifest.signatures() {
        if entry.header.alg != SIGNATURE_ALG {
            return Err(SignerError::InvalidSignature(format!(
                "unsupported signature algorithm: {}",
                entry.header.alg
            )));
        }

        // Validate the protected header decodes; the canonical payload was
        // reconstructed from it when the manifest was parsed.
        decode_protected(&entry.protected)
            .map_err(|e| SignerError::InvalidSignature(e.to_string()))?;

        let key = verifying_key_from_jwk(&entry.header.jwk)?;
        let raw = URL_SAFE_NO_PAD
            .decode(&entry.signature)
            .map_err(|e| SignerError::InvalidSignature(format!("invalid base64: {e}")))?;
        let raw: [u8; 64] = raw
            .try_into()
            .map_err(|_| SignerError::InvalidSignature("expected 64 signature bytes".to_string()))?;
        let signature = EdSignature::from_bytes(&raw);

        let signing_input = format!(
            "{}.{}",
            entry.protected,
            URL_SAFE_NO_PAD.encode(manifest.canonical())
        );
        key.verify(signing_input.as_bytes(), &signature)
            .map_err(|_| SignerError::VerificationFailed)?;
    }
    Ok(())
}

fn verifying_key_from_jwk(jwk: &serde_json::Value) -> SignerResult<VerifyingKey> {
    let x = jwk
        .get("x")
        .and_then(|v| v.as_str())
        .ok_or_else(|| SignerError::KeyParsing("jwk missing x coordinate".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(x)
        .map_err(|e| SignerError::KeyParsing(format!("invalid jwk base64: {e}")))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| SignerError::KeyParsing("expected 32 public key bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| SignerError::KeyParsing(format!("invalid public key: {e}")))
}
