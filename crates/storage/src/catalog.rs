//! Paged repository enumeration.
//!
//! Two implementations sit behind [`Registry::repositories`]: iteration of
//! the metadata service's global repository list, and a walk of the driver
//! tree that recognises repositories by their `_layers` directory. Both
//! page lexicographically with an exclusive `last` cursor.

use crate::driver::{StorageDriver, WalkDecision};
use crate::error::{StorageError, StorageResult};
use crate::paths;
use crate::registry::Registry;
use stevedore_metadata::{IterKind, IterateParams, MetadataError};

/// Canonical page size used by the enumeration loop.
pub const CATALOG_PAGE_SIZE: usize = 100;

/// One page of repository names.
#[derive(Clone, Debug)]
pub struct CatalogPage {
    /// Repository names in ascending order.
    pub repositories: Vec<String>,

    /// Whether enumeration finished: no names sort after the last entry.
    pub complete: bool,
}

impl Registry {
    /// Return up to `limit` repository names sorting strictly after `last`.
    pub async fn repositories(&self, limit: usize, last: &str) -> StorageResult<CatalogPage> {
        if limit == 0 {
            return Err(StorageError::Internal("no space in page".to_string()));
        }
        if self.options().catalog_from_storage {
            walk_repositories(self.driver().as_ref(), limit, last).await
        } else {
            self.metadata_repositories(limit, last).await
        }
    }

    async fn metadata_repositories(&self, limit: usize, last: &str) -> StorageResult<CatalogPage> {
        let mut repositories = Vec::new();
        self.metadata()
            .iterate(
                IterateParams::starting_after(IterKind::Repo, last),
                &mut |name, _| {
                    repositories.push(name.to_string());
                    if repositories.len() >= limit {
                        return Err(MetadataError::FinishedWalk);
                    }
                    Ok(())
                },
            )
            .await?;

        let complete = repositories.len() < limit;
        Ok(CatalogPage {
            repositories,
            complete,
        })
    }

    /// Apply `ingester` to every repository, paging internally.
    pub async fn enumerate(
        &self,
        ingester: &mut (dyn FnMut(&str) -> StorageResult<()> + Send),
    ) -> StorageResult<()> {
        let mut last = String::new();
        loop {
            let page = self.repositories(CATALOG_PAGE_SIZE, &last).await?;
            let Some(tail) = page.repositories.last() else {
                break;
            };
            last = tail.clone();
            for name in &page.repositories {
                ingester(name)?;
            }
            if page.complete {
                break;
            }
        }
        Ok(())
    }
}

/// Walk the repositories tree, emitting the parent of every `_layers`
/// directory. Underscore-prefixed subtrees are never descended into, and
/// the walk ends as soon as the page is full.
pub(crate) async fn walk_repositories(
    driver: &dyn StorageDriver,
    limit: usize,
    last: &str,
) -> StorageResult<CatalogPage> {
    let root = paths::repositories_root();
    let mut found: Vec<String> = Vec::new();
    let mut stopped = false;

    let walk_result = driver
        .walk(&root, &mut |info| {
            if !info.is_dir {
                return WalkDecision::Continue;
            }
            let Some(rel) = info.path.strip_prefix(&root) else {
                return WalkDecision::Continue;
            };
            let rel = rel.trim_start_matches('/');
            let base = rel.rsplit('/').next().unwrap_or(rel);

            if base == "_layers" {
                let repo = rel.trim_end_matches("/_layers");
                if repo > last {
                    found.push(repo.to_string());
                    if found.len() >= limit {
                        stopped = true;
                        return WalkDecision::Stop;
                    }
                }
                return WalkDecision::SkipDir;
            }
            if base.starts_with('_') {
                return WalkDecision::SkipDir;
            }
            WalkDecision::Continue
        })
        .await;

    match walk_result {
        Ok(()) => {}
        // An empty registry has no repositories directory yet.
        Err(StorageError::PathNotFound(_)) => {}
        Err(err) => return Err(err),
    }

    Ok(CatalogPage {
        repositories: found,
        complete: !stopped,
    })
}
