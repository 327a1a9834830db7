//! Schema2 manifests: an image config descriptor plus ordered layers.

use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use crate::manifest::MEDIA_TYPE_MANIFEST_V2;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// The parsed fields of a schema2 manifest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestBody {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,

    #[serde(rename = "mediaType")]
    pub media_type: String,

    /// Descriptor of the image configuration blob.
    pub config: Descriptor,

    /// Layer descriptors, base layer first.
    pub layers: Vec<Descriptor>,
}

/// A schema2 manifest together with its canonical payload bytes.
///
/// The payload is the exact byte sequence addressed by the manifest digest;
/// it is preserved verbatim and never re-serialised from the parsed body.
#[derive(Clone, Debug)]
pub struct Manifest {
    body: ManifestBody,
    payload: Bytes,
}

impl Manifest {
    /// Parse a schema2 manifest from its canonical payload.
    pub fn from_payload(payload: Bytes) -> Result<Self> {
        let body: ManifestBody = serde_json::from_slice(&payload)
            .map_err(|e| Error::ManifestInvalid(format!("schema2: {e}")))?;
        if body.schema_version != 2 {
            return Err(Error::ManifestInvalid(format!(
                "schema2: unexpected schemaVersion {}",
                body.schema_version
            )));
        }
        if body.media_type != MEDIA_TYPE_MANIFEST_V2 {
            return Err(Error::ManifestInvalid(format!(
                "schema2: unexpected mediaType {}",
                body.media_type
            )));
        }
        Ok(Self { body, payload })
    }

    /// Build a new manifest from a config descriptor and layers, producing
    /// the canonical payload.
    pub fn new(config: Descriptor, layers: Vec<Descriptor>) -> Result<Self> {
        let body = ManifestBody {
            schema_version: 2,
            media_type: MEDIA_TYPE_MANIFEST_V2.to_string(),
            config,
            layers,
        };
        let payload = serde_json::to_vec_pretty(&body)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Self {
            body,
            payload: Bytes::from(payload),
        })
    }

    /// The parsed manifest fields.
    pub fn body(&self) -> &ManifestBody {
        &self.body
    }

    /// The config blob descriptor (the manifest's target).
    pub fn target(&self) -> &Descriptor {
        &self.body.config
    }

    /// Layer descriptors, base layer first.
    pub fn layers(&self) -> &[Descriptor] {
        &self.body.layers
    }

    /// The canonical payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Referenced descriptors: the config followed by each layer.
    pub fn references(&self) -> Vec<Descriptor> {
        let mut refs = Vec::with_capacity(1 + self.body.layers.len());
        refs.push(self.body.config.clone());
        refs.extend(self.body.layers.iter().cloned());
        refs
    }
}
