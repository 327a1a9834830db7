//! The metadata service capability.

use crate::error::MetadataResult;
use crate::keys::IterKind;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;
use stevedore_core::descriptor::Descriptor;
use stevedore_core::digest::Digest;
use stevedore_core::reference::RepositoryName;

/// A value stored under a metadata key.
///
/// Equality over values is the comparison `batch_put` uses for its
/// expected-value preconditions.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A blob or tag descriptor.
    Descriptor(Descriptor),

    /// A bare digest (manifest keys written outside a transaction).
    Digest(Digest),

    /// Raw payload bytes (manifest keys written inside a transaction).
    Bytes(Bytes),

    /// A plain string (upload timestamps and paths).
    Text(String),
}

impl Value {
    /// The descriptor, if this value holds one.
    pub fn as_descriptor(&self) -> Option<&Descriptor> {
        match self {
            Self::Descriptor(desc) => Some(desc),
            _ => None,
        }
    }

    /// The text, if this value holds a string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// One entry of a transactional batch write: the new value (`None` deletes)
/// and the value the store is expected to currently hold.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateRecord {
    pub actual: Option<Value>,
    pub expected: Option<Value>,
}

/// Parameters for [`MetadataService::iterate`].
#[derive(Clone, Debug)]
pub struct IterateParams {
    /// The key variant to deliver.
    pub kind: IterKind,

    /// Exclusive lexicographic start cursor; empty iterates from the
    /// beginning.
    pub from: String,
}

impl IterateParams {
    /// Iterate all entries of a variant.
    pub fn all(kind: IterKind) -> Self {
        Self {
            kind,
            from: String::new(),
        }
    }

    /// Iterate entries strictly after `from`.
    pub fn starting_after(kind: IterKind, from: impl Into<String>) -> Self {
        Self {
            kind,
            from: from.into(),
        }
    }
}

/// Callback invoked per iterated entry with the projected entity string and
/// the stored value (`None` for global repository iteration). Returning
/// [`MetadataError::FinishedWalk`](crate::MetadataError::FinishedWalk) stops
/// the walk without surfacing an error.
pub type IterFn<'a> = dyn FnMut(&str, Option<&Value>) -> MetadataResult<()> + Send + 'a;

/// The operations of a metadata service.
///
/// Implementations are shared across requests and must be safe for
/// concurrent use. Repository-scoped views share the underlying state with
/// their siblings and with the base service.
#[async_trait]
pub trait MetadataService: Send + Sync {
    /// Put a value under a key, unconditionally.
    async fn put(&self, key: &str, value: Value) -> MetadataResult<()>;

    /// Get the value for a key. Missing keys are `Ok(None)`, not an error.
    async fn get(&self, key: &str) -> MetadataResult<Option<Value>>;

    /// Remove the value for a key. Missing keys are
    /// [`MetadataError::KeyNotFound`](crate::MetadataError::KeyNotFound).
    async fn delete(&self, key: &str) -> MetadataResult<()>;

    /// Whether the key exists.
    async fn exists(&self, key: &str) -> MetadataResult<bool>;

    /// Iterate the scoped repository's entries in ascending key order,
    /// delivering each entry whose decoded key matches `params.kind`. When
    /// the kind is [`IterKind::Repo`] the global repository list is iterated
    /// instead. An empty repository scope yields
    /// [`MetadataError::RepositoryUnknown`](crate::MetadataError::RepositoryUnknown).
    async fn iterate(&self, params: IterateParams, f: &mut IterFn<'_>) -> MetadataResult<()>;

    /// Transactional batch write: every record's `expected` value must match
    /// the store's current value or the whole batch aborts with
    /// [`MetadataError::TransactionRetry`](crate::MetadataError::TransactionRetry)
    /// and no change is applied. A `None` actual deletes the key.
    async fn batch_put(&self, updates: BTreeMap<String, UpdateRecord>) -> MetadataResult<()>;

    /// A view of this service whose non-repo operations target `repo`'s
    /// namespace.
    fn repository_scoped(self: Arc<Self>, repo: &RepositoryName) -> Arc<dyn MetadataService>;
}
