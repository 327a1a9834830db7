//! Tag service: mutable pointers from tag names to descriptors.

use crate::error::{MetadataError, MetadataResult};
use crate::keys::{IterKind, Key};
use crate::service::{IterateParams, MetadataService, Value};
use crate::transaction::Transaction;
use std::sync::Arc;
use stevedore_core::descriptor::Descriptor;
use stevedore_core::error::Error;
use stevedore_core::reference::{RepositoryName, validate_tag};

/// The tag service for one repository.
///
/// Writes route through the request's transaction when one is supplied,
/// falling back to direct puts otherwise.
pub struct TagStore {
    repo: RepositoryName,
    store: Arc<dyn MetadataService>,
}

impl TagStore {
    /// Create a tag store over a repository-scoped metadata service.
    pub fn new(repo: RepositoryName, store: Arc<dyn MetadataService>) -> Self {
        Self { repo, store }
    }

    /// The repository this store serves.
    pub fn repository(&self) -> &RepositoryName {
        &self.repo
    }

    /// Resolve a tag to its descriptor.
    pub async fn get(&self, tag: &str) -> MetadataResult<Descriptor> {
        let key = Key::Tag(tag.to_string()).to_string();
        match self.store.get(&key).await? {
            None => Err(Error::TagUnknown(tag.to_string()).into()),
            Some(Value::Descriptor(desc)) => Ok(desc),
            Some(_) => Err(MetadataError::TypeMismatch { key }),
        }
    }

    /// Associate `tag` with `desc`, updating any current association.
    pub async fn tag(
        &self,
        tx: Option<&Transaction>,
        tag: &str,
        desc: Descriptor,
    ) -> MetadataResult<()> {
        validate_tag(tag)?;
        let key = Key::Tag(tag.to_string());
        match tx {
            Some(tx) => tx.update(&key, Some(Value::Descriptor(desc))).await,
            None => self.store.put(&key.to_string(), Value::Descriptor(desc)).await,
        }
    }

    /// Remove the tag association.
    pub async fn untag(&self, tx: Option<&Transaction>, tag: &str) -> MetadataResult<()> {
        let key = Key::Tag(tag.to_string());
        match tx {
            Some(tx) => tx.update(&key, None).await,
            None => self.store.delete(&key.to_string()).await,
        }
    }

    /// All tag names in this repository.
    pub async fn all(&self) -> MetadataResult<Vec<String>> {
        let mut tags = Vec::new();
        self.store
            .iterate(IterateParams::all(IterKind::Tag), &mut |tag, _| {
                tags.push(tag.to_string());
                Ok(())
            })
            .await?;
        Ok(tags)
    }

    /// All tags whose stored descriptor matches `desc`'s digest. A repository
    /// with no metadata yet yields an empty list, not an error.
    pub async fn lookup(&self, desc: &Descriptor) -> MetadataResult<Vec<String>> {
        let mut tags = Vec::new();
        let result = self
            .store
            .iterate(IterateParams::all(IterKind::Tag), &mut |tag, value| {
                match value {
                    Some(Value::Descriptor(stored)) => {
                        if stored.digest == desc.digest {
                            tags.push(tag.to_string());
                        }
                        Ok(())
                    }
                    _ => Err(MetadataError::TypeMismatch {
                        key: Key::Tag(tag.to_string()).to_string(),
                    }),
                }
            })
            .await;
        match result {
            Ok(()) => Ok(tags),
            // The tag service has been initialized but not yet populated.
            Err(MetadataError::RepositoryUnknown(_)) => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inmemory::InMemoryMetadataStore;
    use crate::transaction::update_repository;
    use stevedore_core::digest::Digest;

    fn setup() -> (TagStore, Arc<dyn MetadataService>) {
        let repo = RepositoryName::parse("library/ubuntu").unwrap();
        let store = InMemoryMetadataStore::new().repository_scoped(&repo);
        (TagStore::new(repo, store.clone()), store)
    }

    fn desc(seed: &[u8]) -> Descriptor {
        Descriptor::new(
            "application/vnd.docker.distribution.manifest.v2+json",
            7,
            Digest::from_bytes(seed),
        )
    }

    #[tokio::test]
    async fn tag_then_get_returns_descriptor() {
        let (tags, _) = setup();
        let d = desc(b"m1");
        tags.tag(None, "latest", d.clone()).await.unwrap();
        assert_eq!(tags.get("latest").await.unwrap(), d);
    }

    #[tokio::test]
    async fn get_missing_is_tag_unknown() {
        let (tags, _) = setup();
        assert!(matches!(
            tags.get("nope").await,
            Err(MetadataError::Domain(Error::TagUnknown(_)))
        ));
    }

    #[tokio::test]
    async fn tag_rejects_invalid_name() {
        let (tags, _) = setup();
        assert!(matches!(
            tags.tag(None, ".bad", desc(b"m")).await,
            Err(MetadataError::Domain(Error::TagInvalid(_)))
        ));
    }

    #[tokio::test]
    async fn untag_removes_association() {
        let (tags, _) = setup();
        tags.tag(None, "latest", desc(b"m1")).await.unwrap();
        tags.untag(None, "latest").await.unwrap();
        assert!(matches!(
            tags.get("latest").await,
            Err(MetadataError::Domain(Error::TagUnknown(_)))
        ));
    }

    #[tokio::test]
    async fn retag_is_idempotent_for_same_descriptor() {
        let (tags, _) = setup();
        let d = desc(b"m1");
        tags.tag(None, "latest", d.clone()).await.unwrap();
        tags.tag(None, "latest", d.clone()).await.unwrap();
        assert_eq!(tags.get("latest").await.unwrap(), d);
    }

    #[tokio::test]
    async fn all_lists_tags_sorted() {
        let (tags, _) = setup();
        for name in ["v2", "latest", "v1"] {
            tags.tag(None, name, desc(b"m")).await.unwrap();
        }
        assert_eq!(tags.all().await.unwrap(), vec!["latest", "v1", "v2"]);
    }

    #[tokio::test]
    async fn lookup_matches_by_digest() {
        let (tags, _) = setup();
        let wanted = desc(b"wanted");
        tags.tag(None, "a", wanted.clone()).await.unwrap();
        tags.tag(None, "b", desc(b"other")).await.unwrap();
        tags.tag(None, "c", wanted.clone()).await.unwrap();

        assert_eq!(tags.lookup(&wanted).await.unwrap(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn lookup_on_empty_repository_is_empty() {
        let (tags, _) = setup();
        assert!(tags.lookup(&desc(b"any")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transactional_writes_are_buffered() {
        let (tags, store) = setup();
        let d = desc(b"m1");

        update_repository::<_, MetadataError, _, _>(store.clone(), |tx| {
            let tags = &tags;
            let d = d.clone();
            async move { tags.tag(Some(&*tx), "latest", d).await }
        })
        .await
        .unwrap();

        assert_eq!(tags.get("latest").await.unwrap(), d);
    }
}
