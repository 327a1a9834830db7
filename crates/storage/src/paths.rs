//! The registry path layout.
//!
//! All driver paths live under a fixed version-tagged root:
//!
//! ```text
//! /docker/registry/v2/
//!   blobs/<algorithm>/<prefix>/<hex>/data
//!   repositories/<name>/_layers/<algorithm>/<hex>/link
//!   repositories/<name>/_uploads/<id>/data
//! ```

use stevedore_core::digest::Digest;
use stevedore_core::reference::RepositoryName;

/// Root of the registry tree inside the driver.
pub const ROOT: &str = "/docker/registry/v2";

/// Root of the per-repository tree.
pub fn repositories_root() -> String {
    format!("{ROOT}/repositories")
}

/// The content-addressed data path for a blob.
pub fn blob_data_path(dgst: &Digest) -> String {
    let hex = dgst.hex();
    let prefix = &hex[..hex.len().min(2)];
    format!("{ROOT}/blobs/{}/{}/{}/data", dgst.algorithm(), prefix, hex)
}

/// The link path recording a blob's membership in a repository.
pub fn layer_link_path(repo: &RepositoryName, dgst: &Digest) -> String {
    format!(
        "{ROOT}/repositories/{}/_layers/{}/{}/link",
        repo,
        dgst.algorithm(),
        dgst.hex()
    )
}

/// The root of one upload's scratch state.
pub fn upload_root(repo: &RepositoryName, id: &str) -> String {
    format!("{ROOT}/repositories/{repo}/_uploads/{id}")
}

/// The data path bytes are streamed into during an upload.
pub fn upload_data_path(repo: &RepositoryName, id: &str) -> String {
    format!("{}/data", upload_root(repo, id))
}
