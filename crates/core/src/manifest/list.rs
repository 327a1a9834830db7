//! Manifest lists: platform-keyed collections of sub-manifests.

use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use crate::manifest::MEDIA_TYPE_MANIFEST_LIST;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// The platform a sub-manifest targets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    pub architecture: String,
    pub os: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

/// A sub-manifest descriptor annotated with its target platform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlatformDescriptor {
    #[serde(flatten)]
    pub descriptor: Descriptor,

    pub platform: Platform,
}

/// The parsed fields of a manifest list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListBody {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,

    #[serde(rename = "mediaType")]
    pub media_type: String,

    pub manifests: Vec<PlatformDescriptor>,
}

/// A manifest list together with its canonical payload bytes.
#[derive(Clone, Debug)]
pub struct ManifestList {
    body: ListBody,
    payload: Bytes,
}

impl ManifestList {
    /// Parse a manifest list from its canonical payload.
    pub fn from_payload(payload: Bytes) -> Result<Self> {
        let body: ListBody = serde_json::from_slice(&payload)
            .map_err(|e| Error::ManifestInvalid(format!("manifest list: {e}")))?;
        if body.schema_version != 2 {
            return Err(Error::ManifestInvalid(format!(
                "manifest list: unexpected schemaVersion {}",
                body.schema_version
            )));
        }
        if body.media_type != MEDIA_TYPE_MANIFEST_LIST {
            return Err(Error::ManifestInvalid(format!(
                "manifest list: unexpected mediaType {}",
                body.media_type
            )));
        }
        Ok(Self { body, payload })
    }

    /// Build a new list from sub-manifest descriptors, producing the
    /// canonical payload.
    pub fn new(manifests: Vec<PlatformDescriptor>) -> Result<Self> {
        let body = ListBody {
            schema_version: 2,
            media_type: MEDIA_TYPE_MANIFEST_LIST.to_string(),
            manifests,
        };
        let payload = serde_json::to_vec_pretty(&body)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Self {
            body,
            payload: Bytes::from(payload),
        })
    }

    /// The parsed list fields.
    pub fn body(&self) -> &ListBody {
        &self.body
    }

    /// Sub-manifest descriptors with their platforms.
    pub fn manifests(&self) -> &[PlatformDescriptor] {
        &self.body.manifests
    }

    /// Find the sub-manifest matching an architecture/OS pair.
    pub fn find_platform(&self, architecture: &str, os: &str) -> Option<&Descriptor> {
        self.body
            .manifests
            .iter()
            .find(|m| m.platform.architecture == architecture && m.platform.os == os)
            .map(|m| &m.descriptor)
    }

    /// The canonical payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Referenced descriptors: each sub-manifest.
    pub fn references(&self) -> Vec<Descriptor> {
        self.body
            .manifests
            .iter()
            .map(|m| m.descriptor.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Digest;
    use crate::manifest::MEDIA_TYPE_MANIFEST_V2;

    fn entry(arch: &str, os: &str, seed: &[u8]) -> PlatformDescriptor {
        PlatformDescriptor {
            descriptor: Descriptor::new(MEDIA_TYPE_MANIFEST_V2, 500, Digest::from_bytes(seed)),
            platform: Platform {
                architecture: arch.to_string(),
                os: os.to_string(),
                variant: None,
            },
        }
    }

    #[test]
    fn payload_roundtrip() {
        let list =
            ManifestList::new(vec![entry("amd64", "linux", b"a"), entry("arm64", "linux", b"b")])
                .unwrap();
        let reparsed = ManifestList::from_payload(list.payload().clone()).unwrap();
        assert_eq!(reparsed.body(), list.body());
    }

    #[test]
    fn find_platform_selects_match() {
        let list =
            ManifestList::new(vec![entry("arm64", "linux", b"a"), entry("amd64", "linux", b"b")])
                .unwrap();
        let selected = list.find_platform("amd64", "linux").unwrap();
        assert_eq!(selected.digest, Digest::from_bytes(b"b"));
        assert!(list.find_platform("s390x", "linux").is_none());
    }

    #[test]
    fn wire_form_flattens_descriptor() {
        let list = ManifestList::new(vec![entry("amd64", "linux", b"a")]).unwrap();
        let json: serde_json::Value = serde_json::from_slice(list.payload()).unwrap();
        let first = &json["manifests"][0];
        assert!(first.get("mediaType").is_some());
        assert!(first.get("digest").is_some());
        assert_eq!(first["platform"]["architecture"], "amd64");
    }
}
