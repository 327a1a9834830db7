//! Repository names, tags, and parsed references.

use crate::digest::Digest;
use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Maximum total length of a repository name.
pub const MAX_NAME_LENGTH: usize = 255;

/// Unanchored single-component grammar: lowercase alphanumerics joined by
/// `.`, `_`, `__` or runs of `-`.
const COMPONENT_PATTERN: &str = r"[a-z0-9]+(?:(?:[._]|__|[-]+)[a-z0-9]+)*";

/// Unanchored repository name grammar, exposed so other grammars (metadata
/// keys) can embed it.
pub const NAME_PATTERN: &str =
    r"[a-z0-9]+(?:(?:[._]|__|[-]+)[a-z0-9]+)*(?:/[a-z0-9]+(?:(?:[._]|__|[-]+)[a-z0-9]+)*)*";

/// Unanchored tag grammar, exposed so other grammars (metadata keys) can
/// embed it.
pub const TAG_PATTERN: &str = r"[A-Za-z0-9_][A-Za-z0-9._-]{0,127}";

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    let component = COMPONENT_PATTERN;
    Regex::new(&format!("^{component}(?:/{component})*$")).expect("repository name regex")
});

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{TAG_PATTERN}$")).expect("tag regex"));

/// A validated repository name, e.g. `library/ubuntu`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryName(String);

impl RepositoryName {
    /// Parse a repository name against the path grammar.
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() > MAX_NAME_LENGTH {
            return Err(Error::NameInvalid(format!(
                "{}...: exceeds {MAX_NAME_LENGTH} characters",
                &s[..32]
            )));
        }
        if !NAME_RE.is_match(s) {
            return Err(Error::NameInvalid(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepositoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for RepositoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepositoryName({})", self.0)
    }
}

impl FromStr for RepositoryName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RepositoryName {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<RepositoryName> for String {
    fn from(name: RepositoryName) -> String {
        name.0
    }
}

/// Validate a tag name against the tag grammar.
pub fn validate_tag(tag: &str) -> Result<()> {
    if TAG_RE.is_match(tag) {
        Ok(())
    } else {
        Err(Error::TagInvalid(tag.to_string()))
    }
}

/// The optional target of a reference: a tag or a digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReferenceTarget {
    Tag(String),
    Digest(Digest),
}

/// A parsed reference: a repository name, optionally with a `:tag` or
/// `@digest`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reference {
    name: RepositoryName,
    target: Option<ReferenceTarget>,
}

impl Reference {
    /// Parse a reference of the form `name[:tag][@digest]`.
    pub fn parse(s: &str) -> Result<Self> {
        let (rest, digest) = match s.split_once('@') {
            Some((rest, dgst)) => (rest, Some(Digest::parse(dgst)?)),
            None => (s, None),
        };

        // A colon after the last slash separates the tag; earlier colons
        // would belong to a registry host, which this grammar does not admit.
        let last_component = rest.rsplit('/').next().unwrap_or(rest);
        let (name, tag) = match last_component.split_once(':') {
            Some((_, tag)) => {
                let name = &rest[..rest.len() - tag.len() - 1];
                validate_tag(tag)?;
                (name, Some(tag.to_string()))
            }
            None => (rest, None),
        };

        let name = RepositoryName::parse(name)?;
        let target = match (digest, tag) {
            (Some(dgst), _) => Some(ReferenceTarget::Digest(dgst)),
            (None, Some(tag)) => Some(ReferenceTarget::Tag(tag)),
            (None, None) => None,
        };
        Ok(Self { name, target })
    }

    /// Construct a reference to a name with a tag.
    pub fn with_tag(name: RepositoryName, tag: &str) -> Result<Self> {
        validate_tag(tag)?;
        Ok(Self {
            name,
            target: Some(ReferenceTarget::Tag(tag.to_string())),
        })
    }

    /// Construct a reference to a name with a digest.
    pub fn with_digest(name: RepositoryName, digest: Digest) -> Self {
        Self {
            name,
            target: Some(ReferenceTarget::Digest(digest)),
        }
    }

    /// The repository name.
    pub fn name(&self) -> &RepositoryName {
        &self.name
    }

    /// The tag, if this reference carries one.
    pub fn tag(&self) -> Option<&str> {
        match &self.target {
            Some(ReferenceTarget::Tag(tag)) => Some(tag),
            _ => None,
        }
    }

    /// The digest, if this reference carries one.
    pub fn digest(&self) -> Option<&Digest> {
        match &self.target {
            Some(ReferenceTarget::Digest(dgst)) => Some(dgst),
            _ => None,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(ReferenceTarget::Tag(tag)) => write!(f, "{}:{}", self.name, tag),
            Some(ReferenceTarget::Digest(dgst)) => write!(f, "{}@{}", self.name, dgst),
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_grammar() {
        for good in [
            "ubuntu",
            "library/ubuntu",
            "a/b/c",
            "foo-bar",
            "foo--bar",
            "foo__bar",
            "foo.bar_baz",
            "0123/456",
        ] {
            assert!(RepositoryName::parse(good).is_ok(), "rejected {good:?}");
        }
        for bad in [
            "",
            "Library/ubuntu",
            "/ubuntu",
            "ubuntu/",
            "a//b",
            "-leading",
            "trailing-",
            "a/.b",
            "sp ace",
        ] {
            assert!(RepositoryName::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn name_length_bound() {
        let long = "a/".repeat(200) + "a";
        assert!(RepositoryName::parse(&long).is_err());
    }

    #[test]
    fn tag_grammar() {
        assert!(validate_tag("latest").is_ok());
        assert!(validate_tag("v1.2.3-rc_4").is_ok());
        assert!(validate_tag("_private").is_ok());
        assert!(validate_tag("").is_err());
        assert!(validate_tag(".dot").is_err());
        assert!(validate_tag(&"x".repeat(129)).is_err());
    }

    #[test]
    fn parse_reference_forms() {
        let plain = Reference::parse("library/ubuntu").unwrap();
        assert_eq!(plain.name().as_str(), "library/ubuntu");
        assert!(plain.tag().is_none() && plain.digest().is_none());

        let tagged = Reference::parse("library/ubuntu:latest").unwrap();
        assert_eq!(tagged.tag(), Some("latest"));

        let dgst = crate::digest::Digest::from_bytes(b"payload");
        let canonical = Reference::parse(&format!("library/ubuntu@{dgst}")).unwrap();
        assert_eq!(canonical.digest(), Some(&dgst));
    }

    #[test]
    fn reference_display_roundtrip() {
        for s in ["library/ubuntu", "library/ubuntu:latest"] {
            assert_eq!(Reference::parse(s).unwrap().to_string(), s);
        }
    }
}
