//! In-memory metadata store.

use crate::error::{MetadataError, MetadataResult};
use crate::keys::{IterKind, Key};
use crate::service::{IterFn, IterateParams, MetadataService, UpdateRecord, Value};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use stevedore_core::reference::RepositoryName;

type RepositoryEntries = HashMap<String, Value>;

#[derive(Default)]
struct State {
    repositories: HashMap<RepositoryName, RepositoryEntries>,
}

/// An in-memory metadata store guarded by a single read/write lock.
///
/// Reads hold the read lock; writes hold the write lock for the entire
/// operation, including `batch_put`'s compare-and-apply. Repository-scoped
/// views are cheap handles sharing the state through an `Arc`.
pub struct InMemoryMetadataStore {
    state: Arc<RwLock<State>>,
    repo: Option<RepositoryName>,
}

impl InMemoryMetadataStore {
    /// Create a new, unscoped store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(RwLock::new(State::default())),
            repo: None,
        })
    }

    fn repo(&self) -> MetadataResult<&RepositoryName> {
        self.repo.as_ref().ok_or(MetadataError::NotScoped)
    }

    fn iterate_repositories(
        &self,
        params: &IterateParams,
        f: &mut IterFn<'_>,
    ) -> MetadataResult<()> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<&RepositoryName> = state.repositories.keys().collect();
        names.sort();

        for name in names {
            if !params.from.is_empty() && params.from.as_str() >= name.as_str() {
                continue;
            }
            match f(name.as_str(), None) {
                Ok(()) => {}
                Err(MetadataError::FinishedWalk) => return Ok(()),
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn iterate_repository(&self, params: &IterateParams, f: &mut IterFn<'_>) -> MetadataResult<()> {
        let repo = self.repo()?;
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let entries = match state.repositories.get(repo) {
            Some(entries) if !entries.is_empty() => entries,
            // Conflates "no keys of any type" with "repository absent";
            // callers that care treat this as a soft signal.
            _ => return Err(MetadataError::RepositoryUnknown(repo.to_string())),
        };

        let mut keys: Vec<&String> = entries.keys().collect();
        keys.sort();

        for key_str in keys {
            let key = Key::parse(key_str)?;
            let Some((kind, projected)) = key.iter_parts() else {
                // Upload scratch keys are not iterable.
                continue;
            };
            if kind != params.kind {
                continue;
            }
            if !params.from.is_empty() && params.from.as_str() >= projected {
                continue;
            }
            match f(projected, entries.get(key_str)) {
                Ok(()) => {}
                Err(MetadataError::FinishedWalk) => return Ok(()),
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataService for InMemoryMetadataStore {
    async fn put(&self, key: &str, value: Value) -> MetadataResult<()> {
        let repo = self.repo()?.clone();
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state
            .repositories
            .entry(repo)
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> MetadataResult<Option<Value>> {
        let repo = self.repo()?;
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .repositories
            .get(repo)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn delete(&self, key: &str) -> MetadataResult<()> {
        let repo = self.repo()?;
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let removed = state
            .repositories
            .get_mut(repo)
            .and_then(|entries| entries.remove(key));
        match removed {
            Some(_) => Ok(()),
            None => Err(MetadataError::KeyNotFound(key.to_string())),
        }
    }

    async fn exists(&self, key: &str) -> MetadataResult<bool> {
        let repo = self.repo()?;
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .repositories
            .get(repo)
            .is_some_and(|entries| entries.contains_key(key)))
    }

    async fn iterate(&self, params: IterateParams, f: &mut IterFn<'_>) -> MetadataResult<()> {
        if params.kind == IterKind::Repo {
            self.iterate_repositories(&params, f)
        } else {
            self.iterate_repository(&params, f)
        }
    }

    async fn batch_put(&self, updates: BTreeMap<String, UpdateRecord>) -> MetadataResult<()> {
        let repo = self.repo()?.clone();
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let entries = state.repositories.entry(repo).or_default();

        for (key, record) in &updates {
            let current = entries.get(key);
            if current != record.expected.as_ref() {
                tracing::debug!(
                    key = %key,
                    current = ?current,
                    expected = ?record.expected,
                    "batch put precondition failed"
                );
                return Err(MetadataError::TransactionRetry);
            }
        }

        for (key, record) in updates {
            match record.actual {
                Some(value) => {
                    entries.insert(key, value);
                }
                None => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn repository_scoped(self: Arc<Self>, repo: &RepositoryName) -> Arc<dyn MetadataService> {
        {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            state.repositories.entry(repo.clone()).or_default();
        }
        Arc::new(Self {
            state: self.state.clone(),
            repo: Some(repo.clone()),
        })
    }
}
