//! Typed metadata keys.
//!
//! Domain entities are encoded into a repository-scoped flat key space with
//! `prefix::` tags. The string form of every key parses back to the same
//! variant; the grammars embedded here are the authoritative key format.

use crate::error::{MetadataError, MetadataResult};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use stevedore_core::digest::{DIGEST_PATTERN, Digest};
use stevedore_core::reference::{NAME_PATTERN, RepositoryName, TAG_PATTERN};

static MANIFEST_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^manifest::({DIGEST_PATTERN})$")).expect("manifest key regex"));

static TAG_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^tag::({TAG_PATTERN})$")).expect("tag key regex"));

static BLOB_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^blob::({DIGEST_PATTERN})$")).expect("blob key regex"));

static REPO_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^repo::({NAME_PATTERN})$")).expect("repo key regex"));

static UPLOAD_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^upload::(.+)::(startedat|path)$").expect("upload key regex"));

/// The iterable key variants. Iteration over a repository's key space
/// filters by this tag; `upload::` scratch keys are deliberately excluded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IterKind {
    ManifestDigest,
    Tag,
    Blob,
    Repo,
}

/// A typed metadata key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Key {
    /// A manifest stored in a repository, by digest.
    ManifestDigest(Digest),

    /// A tag in a repository.
    Tag(String),

    /// A blob linked into a repository, by digest.
    Blob(Digest),

    /// A repository in the global namespace.
    Repo(RepositoryName),

    /// An upload's RFC3339 start time.
    UploadStartedAt(String),

    /// An upload's driver storage path.
    UploadPath(String),
}

impl Key {
    /// Parse a key from its serialized form. An unrecognized prefix is a
    /// programming error, not user input.
    pub fn parse(s: &str) -> MetadataResult<Self> {
        if let Some(caps) = MANIFEST_KEY_RE.captures(s) {
            let dgst = Digest::parse(&caps[1])?;
            return Ok(Self::ManifestDigest(dgst));
        }
        if let Some(caps) = TAG_KEY_RE.captures(s) {
            return Ok(Self::Tag(caps[1].to_string()));
        }
        if let Some(caps) = BLOB_KEY_RE.captures(s) {
            let dgst = Digest::parse(&caps[1])?;
            return Ok(Self::Blob(dgst));
        }
        if let Some(caps) = REPO_KEY_RE.captures(s) {
            let name = RepositoryName::parse(&caps[1])?;
            return Ok(Self::Repo(name));
        }
        if let Some(caps) = UPLOAD_KEY_RE.captures(s) {
            let id = caps[1].to_string();
            return Ok(match &caps[2] {
                "startedat" => Self::UploadStartedAt(id),
                _ => Self::UploadPath(id),
            });
        }
        Err(MetadataError::Internal(format!(
            "unparseable metadata key: {s}"
        )))
    }

    /// The iterable projection of this key: its variant tag and the bare
    /// entity string delivered to iteration callbacks. Upload keys are
    /// scratch state and yield `None`.
    pub fn iter_parts(&self) -> Option<(IterKind, &str)> {
        match self {
            Self::ManifestDigest(dgst) => Some((IterKind::ManifestDigest, dgst.as_str())),
            Self::Tag(tag) => Some((IterKind::Tag, tag)),
            Self::Blob(dgst) => Some((IterKind::Blob, dgst.as_str())),
            Self::Repo(name) => Some((IterKind::Repo, name.as_str())),
            Self::UploadStartedAt(_) | Self::UploadPath(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ManifestDigest(dgst) => write!(f, "manifest::{dgst}"),
            Self::Tag(tag) => write!(f, "tag::{tag}"),
            Self::Blob(dgst) => write!(f, "blob::{dgst}"),
            Self::Repo(name) => write!(f, "repo::{name}"),
            Self::UploadStartedAt(id) => write!(f, "upload::{id}::startedat"),
            Self::UploadPath(id) => write!(f, "upload::{id}::path"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_keys() -> Vec<Key> {
        vec![
            Key::ManifestDigest(Digest::from_bytes(b"manifest")),
            Key::Tag("latest".to_string()),
            Key::Blob(Digest::from_bytes(b"blob")),
            Key::Repo(RepositoryName::parse("library/ubuntu").unwrap()),
            Key::UploadStartedAt("8a48d2e2-0f91-4e78-a2ba-50479b84a509".to_string()),
            Key::UploadPath("8a48d2e2-0f91-4e78-a2ba-50479b84a509".to_string()),
        ]
    }

    #[test]
    fn every_variant_roundtrips() {
        for key in sample_keys() {
            let parsed = Key::parse(&key.to_string()).unwrap();
            assert_eq!(parsed, key, "roundtrip failed for {key}");
        }
    }

    #[test]
    fn serialized_forms() {
        let dgst = Digest::from_bytes(b"x");
        assert_eq!(
            Key::ManifestDigest(dgst.clone()).to_string(),
            format!("manifest::{dgst}")
        );
        assert_eq!(Key::Tag("v1".to_string()).to_string(), "tag::v1");
        assert_eq!(
            Key::UploadStartedAt("abc".to_string()).to_string(),
            "upload::abc::startedat"
        );
    }

    #[test]
    fn upload_keys_are_not_iterable() {
        for key in sample_keys() {
            match key {
                Key::UploadStartedAt(_) | Key::UploadPath(_) => {
                    assert!(key.iter_parts().is_none())
                }
                _ => assert!(key.iter_parts().is_some()),
            }
        }
    }

    #[test]
    fn unknown_prefix_is_an_error() {
        assert!(Key::parse("bogus::value").is_err());
        assert!(Key::parse("manifest::not-a-digest").is_err());
        assert!(Key::parse("").is_err());
    }

    #[test]
    fn iter_parts_projects_entity() {
        let dgst = Digest::from_bytes(b"m");
        let key = Key::ManifestDigest(dgst.clone());
        let (kind, projected) = key.iter_parts().unwrap();
        assert_eq!(kind, IterKind::ManifestDigest);
        assert_eq!(projected, dgst.as_str());
    }
}
