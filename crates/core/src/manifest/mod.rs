//! Manifest schemas and media-type dispatch.
//!
//! Three manifest schemas are understood: the legacy signed schema1
//! document, the schema2 manifest (config + layers), and the manifest list
//! (platform-keyed sub-manifests). Each carries its canonical byte payload
//! verbatim; the payload is never re-serialised once unmarshalled.

pub mod list;
pub mod schema1;
pub mod schema2;

use crate::descriptor::Descriptor;
use crate::digest::Digest;
use crate::error::{Error, Result};
use bytes::Bytes;
use serde::Deserialize;

/// Media type for the unsigned schema1 manifest.
pub const MEDIA_TYPE_MANIFEST_V1: &str = "application/vnd.docker.distribution.manifest.v1+json";

/// Media type for the signed (pretty-JWS) schema1 manifest.
pub const MEDIA_TYPE_SIGNED_MANIFEST_V1: &str =
    "application/vnd.docker.distribution.manifest.v1+prettyjws";

/// Media type for the schema2 manifest.
pub const MEDIA_TYPE_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Media type for the manifest list.
pub const MEDIA_TYPE_MANIFEST_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// Media type for the image configuration blob referenced by schema2.
pub const MEDIA_TYPE_IMAGE_CONFIG: &str = "application/vnd.docker.container.image.v1+json";

/// Media type for gzipped layer blobs.
pub const MEDIA_TYPE_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";

/// Media type recorded for schema1 layer references.
pub const MEDIA_TYPE_MANIFEST_LAYER_V1: &str =
    "application/vnd.docker.container.image.rootfs.diff+x-gtar";

/// A stored manifest of any supported schema.
#[derive(Clone, Debug)]
pub enum Manifest {
    Schema1(schema1::SignedManifest),
    Schema2(schema2::Manifest),
    List(list::ManifestList),
}

/// Minimal view used to sniff the schema of an untyped payload.
#[derive(Deserialize)]
struct Versioned {
    #[serde(rename = "schemaVersion")]
    schema_version: u32,
    #[serde(rename = "mediaType", default)]
    media_type: String,
}

impl Manifest {
    /// Unmarshal a manifest payload. When `media_type` is absent the schema
    /// is sniffed from the payload's `schemaVersion` and `mediaType` fields.
    pub fn unmarshal(media_type: Option<&str>, payload: Bytes) -> Result<Self> {
        let media_type = match media_type {
            Some(mt) if !mt.is_empty() => mt.to_string(),
            _ => Self::sniff(&payload)?,
        };

        match media_type.as_str() {
            MEDIA_TYPE_MANIFEST_V1 | MEDIA_TYPE_SIGNED_MANIFEST_V1 => Ok(Self::Schema1(
                schema1::SignedManifest::from_payload(payload)?,
            )),
            MEDIA_TYPE_MANIFEST_V2 => Ok(Self::Schema2(schema2::Manifest::from_payload(payload)?)),
            MEDIA_TYPE_MANIFEST_LIST => Ok(Self::List(list::ManifestList::from_payload(payload)?)),
            other => Err(Error::ManifestInvalid(format!(
                "unsupported manifest media type: {other}"
            ))),
        }
    }

    fn sniff(payload: &[u8]) -> Result<String> {
        let versioned: Versioned = serde_json::from_slice(payload)
            .map_err(|e| Error::ManifestInvalid(format!("cannot determine schema: {e}")))?;
        match versioned.schema_version {
            1 => Ok(MEDIA_TYPE_SIGNED_MANIFEST_V1.to_string()),
            2 if versioned.media_type == MEDIA_TYPE_MANIFEST_LIST => {
                Ok(MEDIA_TYPE_MANIFEST_LIST.to_string())
            }
            2 => Ok(MEDIA_TYPE_MANIFEST_V2.to_string()),
            v => Err(Error::ManifestInvalid(format!(
                "unrecognized manifest schemaVersion: {v}"
            ))),
        }
    }

    /// The media type of the stored payload.
    pub fn media_type(&self) -> &'static str {
        match self {
            Self::Schema1(_) => MEDIA_TYPE_SIGNED_MANIFEST_V1,
            Self::Schema2(_) => MEDIA_TYPE_MANIFEST_V2,
            Self::List(_) => MEDIA_TYPE_MANIFEST_LIST,
        }
    }

    /// The exact byte payload served for this manifest.
    pub fn payload(&self) -> &Bytes {
        match self {
            Self::Schema1(m) => m.payload(),
            Self::Schema2(m) => m.payload(),
            Self::List(m) => m.payload(),
        }
    }

    /// The digest addressing this manifest.
    ///
    /// For schema1 this is the digest of the canonical (signature-stripped)
    /// payload; for the other schemas it is the digest of the payload bytes.
    pub fn digest(&self) -> Digest {
        match self {
            Self::Schema1(m) => Digest::from_bytes(m.canonical()),
            Self::Schema2(m) => Digest::from_bytes(m.payload()),
            Self::List(m) => Digest::from_bytes(m.payload()),
        }
    }

    /// The descriptors this manifest references: config and layers for
    /// schema2, fs layers for schema1, sub-manifests for lists.
    pub fn references(&self) -> Vec<Descriptor> {
        match self {
            Self::Schema1(m) => m.references(),
            Self::Schema2(m) => m.references(),
            Self::List(m) => m.references(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema2_payload() -> Bytes {
        let config = Descriptor::new(MEDIA_TYPE_IMAGE_CONFIG, 100, Digest::from_bytes(b"config"));
        let layers = vec![Descriptor::new(
            MEDIA_TYPE_LAYER,
            200,
            Digest::from_bytes(b"layer"),
        )];
        schema2::Manifest::new(config, layers).unwrap().payload().clone()
    }

    #[test]
    fn sniff_schema2() {
        let manifest = Manifest::unmarshal(None, schema2_payload()).unwrap();
        assert!(matches!(manifest, Manifest::Schema2(_)));
        assert_eq!(manifest.media_type(), MEDIA_TYPE_MANIFEST_V2);
    }

    #[test]
    fn unmarshal_by_media_type() {
        let manifest = Manifest::unmarshal(Some(MEDIA_TYPE_MANIFEST_V2), schema2_payload()).unwrap();
        assert_eq!(manifest.references().len(), 2);
    }

    #[test]
    fn unmarshal_rejects_unknown_media_type() {
        assert!(Manifest::unmarshal(Some("application/json"), schema2_payload()).is_err());
    }

    #[test]
    fn digest_is_payload_digest() {
        let payload = schema2_payload();
        let manifest = Manifest::unmarshal(None, payload.clone()).unwrap();
        assert_eq!(manifest.digest(), Digest::from_bytes(&payload));
    }
}
