//! Blob descriptors.

use crate::digest::Digest;
use serde::{Deserialize, Serialize};

/// The canonical handle for a blob: its digest, size, and media type.
///
/// Descriptors are what tag values point at and what manifests reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    /// The media type of the referenced content.
    #[serde(rename = "mediaType", default, skip_serializing_if = "String::is_empty")]
    pub media_type: String,

    /// Content size in bytes.
    #[serde(default)]
    pub size: u64,

    /// Content digest.
    pub digest: Digest,
}

impl Descriptor {
    /// Construct a descriptor.
    pub fn new(media_type: impl Into<String>, size: u64, digest: Digest) -> Self {
        Self {
            media_type: media_type.into(),
            size,
            digest,
        }
    }
}
