//! Content-addressed digests of the form `<algorithm>:<hex>`.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// The canonical digest algorithm.
pub const CANONICAL_ALGORITHM: &str = "sha256";

/// Hex length of a sha256 digest.
const SHA256_HEX_LEN: usize = 64;

/// Unanchored digest grammar, exposed so other grammars (metadata keys) can
/// embed it.
pub const DIGEST_PATTERN: &str = r"[A-Za-z0-9_+.-]+:[A-Fa-f0-9]+";

static DIGEST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{DIGEST_PATTERN}$")).expect("digest regex"));

/// A content-addressed identifier, e.g. `sha256:6c3c62...`.
///
/// Digests are immutable and globally unique. The stored form is the
/// lowercase canonical string, so a `Digest` can be used directly as a
/// metadata key component.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Parse and canonicalise a digest string.
    pub fn parse(s: &str) -> Result<Self> {
        if !DIGEST_RE.is_match(s) {
            return Err(Error::DigestInvalid(s.to_string()));
        }
        let canonical = s.to_ascii_lowercase();
        let (algorithm, hex) = canonical
            .split_once(':')
            .ok_or_else(|| Error::DigestInvalid(s.to_string()))?;
        if algorithm == CANONICAL_ALGORITHM && hex.len() != SHA256_HEX_LEN {
            return Err(Error::DigestInvalid(format!(
                "{s}: expected {SHA256_HEX_LEN} hex characters for {CANONICAL_ALGORITHM}"
            )));
        }
        Ok(Self(canonical))
    }

    /// Compute the canonical digest of a byte slice.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut digester = Digester::new();
        digester.update(data);
        digester.finalize()
    }

    /// The algorithm component, e.g. `sha256`.
    pub fn algorithm(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }

    /// The hex component.
    pub fn hex(&self) -> &str {
        self.0.split(':').nth(1).unwrap_or_default()
    }

    /// The full canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.0)
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Digest {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Digest> for String {
    fn from(d: Digest) -> String {
        d.0
    }
}

/// Incremental digester for the canonical algorithm.
///
/// Used by blob upload writers to accumulate a digest over streamed chunks.
pub struct Digester(Sha256);

impl Digester {
    /// Create a new digester.
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    /// Update the digester with data.
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Finalize and return the digest.
    pub fn finalize(self) -> Digest {
        let hex: String = self.0.finalize().iter().map(|b| format!("{b:02x}")).collect();
        Digest(format!("{CANONICAL_ALGORITHM}:{hex}"))
    }
}

impl Default for Digester {
    fn default() -> Self {
        Self::new()
    }
}
