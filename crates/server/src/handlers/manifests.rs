//! Manifest handlers: GET/HEAD with content negotiation, PUT, DELETE.

use crate::error::{ApiErrors, ErrorCode};
use crate::metrics::{
    MANIFEST_PUT_DURATION, MANIFESTS_DELETED, MANIFESTS_DOWNCONVERTED, MANIFESTS_FETCHED,
    MANIFESTS_PUT, RequestMetrics,
};
use crate::state::AppState;
use axum::body::Body;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use stevedore_core::descriptor::Descriptor;
use stevedore_core::digest::Digest;
use stevedore_core::error::Error;
use stevedore_core::manifest::{
    MEDIA_TYPE_MANIFEST_LIST, MEDIA_TYPE_MANIFEST_V2, Manifest, schema1::ManifestBuilder, schema2,
};
use stevedore_core::reference::{Reference, RepositoryName};
use stevedore_metadata::{MetadataError, update_repository};
use stevedore_storage::Repository;

/// Platform selected from a manifest list for clients that cannot consume
/// lists.
const DEFAULT_ARCH: &str = "amd64";
const DEFAULT_OS: &str = "linux";

/// Parse the Accept header list for the media types the client can consume.
fn parse_accept(headers: &HeaderMap) -> (bool, bool) {
    let mut supports_schema2 = false;
    let mut supports_list = false;
    for value in headers.get_all(header::ACCEPT) {
        let Ok(value) = value.to_str() else { continue };
        // Each header value may carry a comma-separated list, with optional
        // ";q=..." parameters.
        for media_type in value.split(',') {
            let media_type = media_type.split(';').next().unwrap_or_default().trim();
            if media_type == MEDIA_TYPE_MANIFEST_V2 {
                supports_schema2 = true;
            }
            if media_type == MEDIA_TYPE_MANIFEST_LIST {
                supports_list = true;
            }
        }
    }
    (supports_schema2, supports_list)
}

/// Whether If-None-Match matches the digest, quoted or raw.
fn etag_match(headers: &HeaderMap, digest: &str) -> bool {
    headers.get_all(header::IF_NONE_MATCH).iter().any(|value| {
        value
            .to_str()
            .map(|v| v == digest || v == format!("\"{digest}\""))
            .unwrap_or(false)
    })
}

/// GET/HEAD /v2/<name>/manifests/<reference>
pub(crate) async fn get_manifest(
    state: &AppState,
    metrics: &RequestMetrics,
    name: RepositoryName,
    reference: &str,
    headers: &HeaderMap,
    include_body: bool,
) -> Result<Response, ApiErrors> {
    let repo = state.registry.repository(name.clone());
    let manifests = repo.manifests();

    let (mut digest, tag) = match Digest::parse(reference) {
        Ok(digest) => (digest, None),
        Err(_) => {
            // We just have a tag.
            let desc = repo.tags().get(reference).await?;
            (desc.digest, Some(reference.to_string()))
        }
    };

    if etag_match(headers, digest.as_str()) {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    let mut manifest = manifests.get(&digest).await?;
    metrics.increment("manifest.get");

    let (supports_schema2, supports_list) = parse_accept(headers);

    // Only rewrite manifests fetched by tag. A digest-addressed response
    // must return content matching the requested digest.
    if tag.is_some() {
        if let Manifest::List(list) = &manifest {
            if !supports_list {
                tracing::info!(
                    digest = %digest,
                    "rewriting manifest list for client without list support"
                );
                let sub = list
                    .find_platform(DEFAULT_ARCH, DEFAULT_OS)
                    .cloned()
                    .ok_or_else(|| {
                        ApiErrors::single(
                            ErrorCode::ManifestUnknown,
                            format!("no {DEFAULT_OS}/{DEFAULT_ARCH} manifest in list"),
                        )
                    })?;
                digest = sub.digest;
                manifest = manifests.get(&digest).await?;
            }
        }
        if let Manifest::Schema2(schema2_manifest) = &manifest {
            if !supports_schema2 {
                tracing::info!(
                    digest = %digest,
                    "rewriting schema2 manifest for legacy client"
                );
                let (converted, converted_digest) =
                    convert_schema2(state, &repo, &name, tag.as_deref(), schema2_manifest).await?;
                manifest = converted;
                digest = converted_digest;
            }
        }
    }

    MANIFESTS_FETCHED.inc();

    let payload = manifest.payload().clone();
    let body = if include_body {
        Body::from(payload.clone())
    } else {
        Body::empty()
    };
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, manifest.media_type())
        .header(header::CONTENT_LENGTH, payload.len())
        .header("Docker-Content-Digest", digest.as_str())
        .header(header::ETAG, format!("\"{digest}\""))
        .body(body)
        .map_err(|e| ApiErrors::single(ErrorCode::Unknown, e.to_string()))
}

/// Down-convert a schema2 manifest to a signed schema1 manifest using the
/// registry trust key and the referenced image configuration.
async fn convert_schema2(
    state: &AppState,
    repo: &Repository,
    name: &RepositoryName,
    tag: Option<&str>,
    manifest: &schema2::Manifest,
) -> Result<(Manifest, Digest), ApiErrors> {
    let trust_key = state.registry.trust_key().ok_or_else(|| {
        ApiErrors::single(ErrorCode::Unknown, "schema1 signing key not configured")
    })?;

    let config = repo
        .blobs()
        .get(&manifest.target().digest)
        .await
        .map_err(|e| ApiErrors::single(ErrorCode::ManifestInvalid, e.to_string()))?;

    let reference = match tag {
        Some(tag) => Reference::with_tag(name.clone(), tag)?,
        None => Reference::parse(name.as_str())?,
    };

    let mut builder = ManifestBuilder::new(&reference, &config)?;
    for layer in manifest.layers() {
        builder.append_reference(layer);
    }
    let (_, canonical) = builder.build()?;

    let signed = stevedore_signer::sign_manifest(trust_key, &canonical)
        .map_err(|e| ApiErrors::single(ErrorCode::ManifestInvalid, e.to_string()))?;
    let digest = Digest::from_bytes(signed.canonical());

    MANIFESTS_DOWNCONVERTED.inc();
    Ok((Manifest::Schema1(signed), digest))
}

/// PUT /v2/<name>/manifests/<reference>
pub(crate) async fn put_manifest(
    state: &AppState,
    metrics: &RequestMetrics,
    name: RepositoryName,
    reference: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, ApiErrors> {
    let repo = state.registry.repository(name.clone());
    let manifests = repo.manifests();
    let tags = repo.tags();

    let media_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let manifest = Manifest::unmarshal(media_type, body)?;
    let digest = manifest.digest();

    let tag = match Digest::parse(reference) {
        Ok(declared) => {
            if declared != digest {
                tracing::error!(declared = %declared, actual = %digest, "payload digest mismatch");
                return Err(ApiErrors::single(
                    ErrorCode::DigestInvalid,
                    "provided digest does not match manifest payload",
                ));
            }
            None
        }
        Err(_) => Some(reference.to_string()),
    };

    let timer = MANIFEST_PUT_DURATION.start_timer();
    update_repository::<_, ApiErrors, _, _>(repo.metadata(), |tx| {
        let manifests = &manifests;
        let tags = &tags;
        let manifest = &manifest;
        let digest = &digest;
        let tag = &tag;
        async move {
            manifests.put(Some(&*tx), manifest).await?;
            if let Some(tag) = tag {
                let desc = Descriptor::new(
                    manifest.media_type(),
                    manifest.payload().len() as u64,
                    digest.clone(),
                );
                tags.tag(Some(&*tx), tag, desc).await?;
            }
            Ok(())
        }
    })
    .await?;
    timer.observe_duration();

    MANIFESTS_PUT.inc();
    metrics.increment("manifest.put");

    let location = format!("/v2/{name}/manifests/{digest}");
    Ok((
        StatusCode::CREATED,
        [
            (header::LOCATION.as_str(), location.as_str()),
            ("Docker-Content-Digest", digest.as_str()),
        ],
    )
        .into_response())
}

/// DELETE /v2/<name>/manifests/<digest>
pub(crate) async fn delete_manifest(
    state: &AppState,
    metrics: &RequestMetrics,
    name: RepositoryName,
    reference: &str,
) -> Result<Response, ApiErrors> {
    let digest = Digest::parse(reference).map_err(|_| {
        ApiErrors::single(ErrorCode::Unsupported, "deleting by tag is not supported")
    })?;

    let repo = state.registry.repository(name);
    let manifests = repo.manifests();
    let tags = repo.tags();

    update_repository::<_, ApiErrors, _, _>(repo.metadata(), |tx| {
        let manifests = &manifests;
        let tags = &tags;
        let digest = &digest;
        async move {
            manifests.delete(Some(&*tx), digest).await.map_err(|err| {
                // A missing manifest key reports as an unknown manifest, not
                // an unknown blob.
                match err {
                    MetadataError::Domain(Error::BlobUnknown(_)) => ApiErrors::single(
                        ErrorCode::ManifestUnknown,
                        format!("manifest unknown: {digest}"),
                    ),
                    other => other.into(),
                }
            })?;

            let referencing = tags.lookup(&Descriptor::new("", 0, digest.clone())).await?;
            for tag in referencing {
                tags.untag(Some(&*tx), &tag).await?;
            }
            Ok(())
        }
    })
    .await?;

    MANIFESTS_DELETED.inc();
    metrics.increment("manifest.delete");

    Ok(StatusCode::ACCEPTED.into_response())
}
