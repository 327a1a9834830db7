//! Shared fixtures: blob seeding and manifest construction.

use super::{header_str, request};
use axum::Router;
use axum::http::StatusCode;
use bytes::Bytes;
use stevedore_core::descriptor::Descriptor;
use stevedore_core::digest::Digest;
use stevedore_core::manifest::list::{ManifestList, Platform, PlatformDescriptor};
use stevedore_core::manifest::{
    MEDIA_TYPE_IMAGE_CONFIG, MEDIA_TYPE_LAYER, MEDIA_TYPE_MANIFEST_LIST, MEDIA_TYPE_MANIFEST_V2,
    schema2,
};

/// Push a blob through the upload protocol and return its descriptor.
pub async fn push_blob(router: &Router, repo: &str, content: &[u8]) -> Descriptor {
    let (status, headers, _) = request(
        router,
        "POST",
        &format!("/v2/{repo}/blobs/uploads/"),
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let location = header_str(&headers, "location").to_string();

    let digest = Digest::from_bytes(content);
    let (status, _, _) = request(
        router,
        "PUT",
        &format!("{location}?digest={digest}"),
        &[],
        Some(Bytes::copy_from_slice(content)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    Descriptor::new(MEDIA_TYPE_LAYER, content.len() as u64, digest)
}

/// An image config JSON blob for the given architecture.
pub fn image_config(architecture: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "architecture": architecture,
        "os": "linux",
        "config": {"Cmd": ["/bin/sh"]},
        "rootfs": {"type": "layers"},
    }))
    .unwrap()
}

/// Build a schema2 manifest over already-pushed config and layer blobs.
pub fn schema2_manifest(config: Descriptor, layers: Vec<Descriptor>) -> schema2::Manifest {
    let config = Descriptor::new(MEDIA_TYPE_IMAGE_CONFIG, config.size, config.digest);
    schema2::Manifest::new(config, layers).unwrap()
}

/// Push config + layers + a schema2 manifest under `reference`, returning
/// the manifest and its digest.
pub async fn push_image(
    router: &Router,
    repo: &str,
    reference: &str,
    architecture: &str,
    layer_seeds: &[&[u8]],
) -> (schema2::Manifest, Digest) {
    let config = push_blob(router, repo, &image_config(architecture)).await;
    let mut layers = Vec::new();
    for seed in layer_seeds {
        layers.push(push_blob(router, repo, seed).await);
    }
    let manifest = schema2_manifest(config, layers);
    let digest = Digest::from_bytes(manifest.payload());

    let (status, headers, body) = request(
        router,
        "PUT",
        &format!("/v2/{repo}/manifests/{reference}"),
        &[("content-type", MEDIA_TYPE_MANIFEST_V2)],
        Some(manifest.payload().clone()),
    )
    .await;
    assert_eq!(
        status,
        StatusCode::CREATED,
        "manifest push failed: {body:?}"
    );
    assert_eq!(header_str(&headers, "docker-content-digest"), digest.as_str());

    (manifest, digest)
}

/// Build and push a manifest list over stored sub-manifests.
pub async fn push_manifest_list(
    router: &Router,
    repo: &str,
    reference: &str,
    entries: &[(&str, &Digest)],
) -> (ManifestList, Digest) {
    let manifests = entries
        .iter()
        .map(|(arch, digest)| PlatformDescriptor {
            descriptor: Descriptor::new(MEDIA_TYPE_MANIFEST_V2, 0, (*digest).clone()),
            platform: Platform {
                architecture: arch.to_string(),
                os: "linux".to_string(),
                variant: None,
            },
        })
        .collect();
    let list = ManifestList::new(manifests).unwrap();
    let digest = Digest::from_bytes(list.payload());

    let (status, _, body) = request(
        router,
        "PUT",
        &format!("/v2/{repo}/manifests/{reference}"),
        &[("content-type", MEDIA_TYPE_MANIFEST_LIST)],
        Some(list.payload().clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "list push failed: {body:?}");

    (list, digest)
}
