//! Legacy schema1 manifests in the pretty-JWS envelope.
//!
//! A signed schema1 payload embeds its signatures inside the JSON document.
//! The signed (canonical) bytes are reconstructed from the payload using the
//! `formatLength`/`formatTail` fields of the protected header: canonical =
//! `payload[..formatLength] ++ decode(formatTail)`. The manifest digest is
//! the digest of those canonical bytes, not of the enveloped payload.

use crate::descriptor::Descriptor;
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::manifest::MEDIA_TYPE_MANIFEST_LAYER_V1;
use crate::reference::Reference;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A single layer reference in a schema1 manifest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FsLayer {
    #[serde(rename = "blobSum")]
    pub blob_sum: Digest,
}

/// A v1-compatibility history entry paired with an fs layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct History {
    #[serde(rename = "v1Compatibility")]
    pub v1_compatibility: String,
}

/// The parsed fields of the canonical (unsigned) schema1 document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestBody {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,

    pub name: String,
    pub tag: String,
    pub architecture: String,

    /// Layer references, most recent first.
    #[serde(rename = "fsLayers")]
    pub fs_layers: Vec<FsLayer>,

    /// One history entry per fs layer, same order.
    pub history: Vec<History>,
}

/// The JOSE header attached to each signature.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignatureHeader {
    pub jwk: serde_json::Value,
    pub alg: String,
}

/// One embedded JWS signature.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Signature {
    pub header: SignatureHeader,
    pub signature: String,
    pub protected: String,
}

/// The protected header carried base64url-encoded in each signature.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProtectedHeader {
    #[serde(rename = "formatLength")]
    pub format_length: usize,

    #[serde(rename = "formatTail")]
    pub format_tail: String,

    pub time: String,
}

/// A schema1 manifest with its embedded signatures.
#[derive(Clone, Debug)]
pub struct SignedManifest {
    body: ManifestBody,
    signatures: Vec<Signature>,
    canonical: Bytes,
    payload: Bytes,
}

impl SignedManifest {
    /// Parse a signed schema1 manifest from its full pretty-JWS payload,
    /// reconstructing the canonical signed bytes.
    pub fn from_payload(payload: Bytes) -> Result<Self> {
        let doc: serde_json::Value = serde_json::from_slice(&payload)
            .map_err(|e| Error::ManifestInvalid(format!("schema1: {e}")))?;

        let signatures: Vec<Signature> = match doc.get("signatures") {
            Some(raw) => serde_json::from_value(raw.clone())
                .map_err(|e| Error::ManifestInvalid(format!("schema1 signatures: {e}")))?,
            None => {
                return Err(Error::ManifestInvalid(
                    "schema1: missing signatures".to_string(),
                ));
            }
        };
        let first = signatures.first().ok_or_else(|| {
            Error::ManifestInvalid("schema1: empty signatures list".to_string())
        })?;

        let protected = decode_protected(&first.protected)?;
        if protected.format_length > payload.len() {
            return Err(Error::ManifestInvalid(format!(
                "schema1: formatLength {} exceeds payload size {}",
                protected.format_length,
                payload.len()
            )));
        }
        let tail = URL_SAFE_NO_PAD
            .decode(&protected.format_tail)
            .map_err(|e| Error::ManifestInvalid(format!("schema1 formatTail: {e}")))?;

        let mut canonical = Vec::with_capacity(protected.format_length + tail.len());
        canonical.extend_from_slice(&payload[..protected.format_length]);
        canonical.extend_from_slice(&tail);

        let body: ManifestBody = serde_json::from_slice(&canonical)
            .map_err(|e| Error::ManifestInvalid(format!("schema1 canonical: {e}")))?;
        if body.schema_version != 1 {
            return Err(Error::ManifestInvalid(format!(
                "schema1: unexpected schemaVersion {}",
                body.schema_version
            )));
        }
        if body.fs_layers.len() != body.history.len() {
            return Err(Error::ManifestInvalid(format!(
                "schema1: {} fsLayers but {} history entries",
                body.fs_layers.len(),
                body.history.len()
            )));
        }

        Ok(Self {
            body,
            signatures,
            canonical: Bytes::from(canonical),
            payload,
        })
    }

    /// The parsed manifest fields.
    pub fn body(&self) -> &ManifestBody {
        &self.body
    }

    /// The embedded signatures.
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// The canonical signed bytes.
    pub fn canonical(&self) -> &Bytes {
        &self.canonical
    }

    /// The full enveloped payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Referenced descriptors: one per fs layer, most recent first.
    pub fn references(&self) -> Vec<Descriptor> {
        self.body
            .fs_layers
            .iter()
            .map(|l| Descriptor::new(MEDIA_TYPE_MANIFEST_LAYER_V1, 0, l.blob_sum.clone()))
            .collect()
    }
}

/// Decode a base64url-encoded protected header.
pub fn decode_protected(protected: &str) -> Result<ProtectedHeader> {
    let raw = URL_SAFE_NO_PAD
        .decode(protected)
        .map_err(|e| Error::ManifestInvalid(format!("schema1 protected header: {e}")))?;
    serde_json::from_slice(&raw)
        .map_err(|e| Error::ManifestInvalid(format!("schema1 protected header: {e}")))
}

/// Builds a schema1 document from an image configuration and layer
/// references, for serving schema2 content to clients that only understand
/// schema1. The result is unsigned; a trust key turns it into a
/// `SignedManifest`.
pub struct ManifestBuilder {
    name: String,
    tag: String,
    architecture: String,
    config: serde_json::Value,
    layers: Vec<Digest>,
}

impl ManifestBuilder {
    /// Create a builder for the named reference from the image config JSON.
    pub fn new(reference: &Reference, config_json: &[u8]) -> Result<Self> {
        let config: serde_json::Value = serde_json::from_slice(config_json)
            .map_err(|e| Error::ManifestInvalid(format!("image config: {e}")))?;
        let architecture = config
            .get("architecture")
            .and_then(|v| v.as_str())
            .unwrap_or("amd64")
            .to_string();
        Ok(Self {
            name: reference.name().to_string(),
            tag: reference.tag().unwrap_or_default().to_string(),
            architecture,
            config,
            layers: Vec::new(),
        })
    }

    /// Append a layer reference, base layer first.
    pub fn append_reference(&mut self, descriptor: &Descriptor) {
        self.layers.push(descriptor.digest.clone());
    }

    /// Assemble the canonical (unsigned) schema1 document.
    ///
    /// Synthesises the v1-compatibility chain: each layer's v1 id is derived
    /// from its blob digest and its parent's id, and the top entry carries
    /// the image configuration.
    pub fn build(&self) -> Result<(ManifestBody, Bytes)> {
        if self.layers.is_empty() {
            return Err(Error::ManifestInvalid(
                "schema1 requires at least one layer".to_string(),
            ));
        }

        // v1 ids chain base -> top.
        let mut ids = Vec::with_capacity(self.layers.len());
        let mut parent = String::new();
        for layer in &self.layers {
            let id = Digest::from_bytes(format!("{layer} {parent}").as_bytes())
                .hex()
                .to_string();
            parent = id.clone();
            ids.push(id);
        }

        // fsLayers and history run most recent first.
        let mut fs_layers = Vec::with_capacity(self.layers.len());
        let mut history = Vec::with_capacity(self.layers.len());
        for (idx, layer) in self.layers.iter().enumerate().rev() {
            fs_layers.push(FsLayer {
                blob_sum: layer.clone(),
            });

            let parent_id = if idx > 0 { Some(&ids[idx - 1]) } else { None };
            let compat = if idx == self.layers.len() - 1 {
                // Top entry: transplant the image config, minus the fields
                // that only make sense in schema2.
                let mut top = self.config.clone();
                if let Some(obj) = top.as_object_mut() {
                    obj.remove("history");
                    obj.remove("rootfs");
                    obj.insert("id".to_string(), serde_json::json!(ids[idx]));
                    if let Some(parent_id) = parent_id {
                        obj.insert("parent".to_string(), serde_json::json!(parent_id));
                    }
                }
                top
            } else {
                let mut entry = serde_json::json!({ "id": ids[idx] });
                if let Some(parent_id) = parent_id {
                    entry["parent"] = serde_json::json!(parent_id);
                }
                entry
            };
            history.push(History {
                v1_compatibility: serde_json::to_string(&compat)
                    .map_err(|e| Error::Serialization(e.to_string()))?,
            });
        }

        let body = ManifestBody {
            schema_version: 1,
            name: self.name.clone(),
            tag: self.tag.clone(),
            architecture: self.architecture.clone(),
            fs_layers,
            history,
        };
        let canonical = serde_json::to_vec_pretty(&body)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        Ok((body, Bytes::from(canonical)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::RepositoryName;

    fn build_unsigned() -> (ManifestBody, Bytes) {
        let name = RepositoryName::parse("library/ubuntu").unwrap();
        let reference = Reference::with_tag(name, "latest").unwrap();
        let config = serde_json::json!({
            "architecture": "arm64",
            "os": "linux",
            "config": {"Cmd": ["/bin/sh"]},
            "rootfs": {"type": "layers"},
        });
        let mut builder =
            ManifestBuilder::new(&reference, &serde_json::to_vec(&config).unwrap()).unwrap();
        builder.append_reference(&Descriptor::new("", 10, Digest::from_bytes(b"base")));
        builder.append_reference(&Descriptor::new("", 20, Digest::from_bytes(b"top")));
        builder.build().unwrap()
    }

    #[test]
    fn builder_reverses_layers() {
        let (body, _) = build_unsigned();
        assert_eq!(body.fs_layers.len(), 2);
        // Most recent layer first.
        assert_eq!(body.fs_layers[0].blob_sum, Digest::from_bytes(b"top"));
        assert_eq!(body.fs_layers[1].blob_sum, Digest::from_bytes(b"base"));
        assert_eq!(body.history.len(), 2);
        assert_eq!(body.architecture, "arm64");
    }

    #[test]
    fn builder_chains_v1_ids() {
        let (body, _) = build_unsigned();
        let top: serde_json::Value =
            serde_json::from_str(&body.history[0].v1_compatibility).unwrap();
        let base: serde_json::Value =
            serde_json::from_str(&body.history[1].v1_compatibility).unwrap();
        assert_eq!(top["parent"], base["id"]);
        // Config fields survive only in the top entry.
        assert_eq!(top["config"]["Cmd"][0], "/bin/sh");
        assert!(top.get("rootfs").is_none());
    }

    #[test]
    fn from_payload_reconstructs_canonical() {
        let (_, canonical) = build_unsigned();
        // Envelope the canonical bytes by hand the way a signer would.
        let tail = b"\n}";
        let format_length = canonical.len() - tail.len();
        let protected = ProtectedHeader {
            format_length,
            format_tail: URL_SAFE_NO_PAD.encode(tail),
            time: "2015-04-07T00:00:00Z".to_string(),
        };
        let signature = Signature {
            header: SignatureHeader {
                jwk: serde_json::json!({"kty": "OKP"}),
                alg: "EdDSA".to_string(),
            },
            signature: URL_SAFE_NO_PAD.encode(b"not-a-real-signature"),
            protected: URL_SAFE_NO_PAD.encode(serde_json::to_vec(&protected).unwrap()),
        };
        let sig_json = serde_json::to_string_pretty(&vec![signature]).unwrap();
        let mut payload = Vec::new();
        payload.extend_from_slice(&canonical[..format_length]);
        payload.extend_from_slice(format!(",\n   \"signatures\": {sig_json}").as_bytes());
        payload.extend_from_slice(tail);

        let signed = SignedManifest::from_payload(Bytes::from(payload)).unwrap();
        assert_eq!(signed.canonical().as_ref(), canonical.as_ref());
        assert_eq!(signed.body().name, "library/ubuntu");
        assert_eq!(signed.references().len(), 2);
    }

    #[test]
    fn from_payload_rejects_unsigned() {
        let (_, canonical) = build_unsigned();
        assert!(SignedManifest::from_payload(canonical).is_err());
    }
}
