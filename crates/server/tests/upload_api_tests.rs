//! Integration tests for the blob upload protocol: chunked uploads,
//! resumption across requests, mounts, and cancellation.

mod common;

use axum::http::StatusCode;
use bytes::Bytes;
use common::fixtures::push_blob;
use common::{TestServer, error_codes, header_str, request};
use stevedore_core::digest::Digest;
use stevedore_metadata::MetadataService as _;

const REPO: &str = "library/ubuntu";

async fn start_upload(server: &TestServer, repo: &str) -> (String, String) {
    let (status, headers, _) = request(
        &server.router,
        "POST",
        &format!("/v2/{repo}/blobs/uploads/"),
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let location = header_str(&headers, "location").to_string();
    let id = header_str(&headers, "docker-upload-uuid").to_string();
    assert!(location.ends_with(&id));
    (location, id)
}

#[tokio::test]
async fn chunked_upload_with_resume() {
    let server = TestServer::new();
    let (location, id) = start_upload(&server, REPO).await;

    // Two chunks in one "session"...
    let (status, headers, _) = request(
        &server.router,
        "PATCH",
        &location,
        &[],
        Some(Bytes::from_static(b"first-")),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(header_str(&headers, "range"), "0-5");

    let (status, headers, _) = request(
        &server.router,
        "PATCH",
        &location,
        &[],
        Some(Bytes::from_static(b"second-")),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(header_str(&headers, "range"), "0-12");

    // ...then a status probe and a final chunk from a "new request".
    let (status, headers, _) = request(&server.router, "GET", &location, &[], None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(header_str(&headers, "range"), "0-12");
    assert_eq!(header_str(&headers, "docker-upload-uuid"), id);

    let expected = Digest::from_bytes(b"first-second-third");
    let (status, headers, body) = request(
        &server.router,
        "PUT",
        &format!("{location}?digest={expected}"),
        &[],
        Some(Bytes::from_static(b"third")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "commit failed: {body:?}");
    assert_eq!(
        header_str(&headers, "docker-content-digest"),
        expected.as_str()
    );
    assert_eq!(
        header_str(&headers, "location"),
        format!("/v2/{REPO}/blobs/{expected}")
    );

    // The upload state is gone.
    let repo_name = stevedore_core::reference::RepositoryName::parse(REPO).unwrap();
    let metadata = server
        .registry
        .metadata()
        .repository_scoped(&repo_name);
    assert!(
        !metadata
            .exists(&format!("upload::{id}::startedat"))
            .await
            .unwrap()
    );
    assert!(!metadata.exists(&format!("upload::{id}::path")).await.unwrap());

    let (status, _, _) = request(&server.router, "GET", &location, &[], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The committed blob serves the concatenated bytes.
    let (status, headers, body) = request(
        &server.router,
        "GET",
        &format!("/v2/{REPO}/blobs/{expected}"),
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(header_str(&headers, "content-length"), "18");
    assert_eq!(body.as_ref(), b"first-second-third");
}

#[tokio::test]
async fn commit_with_wrong_digest_fails() {
    let server = TestServer::new();
    let (location, _) = start_upload(&server, REPO).await;

    let wrong = Digest::from_bytes(b"declared");
    let (status, _, body) = request(
        &server.router,
        "PUT",
        &format!("{location}?digest={wrong}"),
        &[],
        Some(Bytes::from_static(b"actual")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_codes(&body), vec!["DIGEST_INVALID"]);
}

#[tokio::test]
async fn commit_requires_digest_parameter() {
    let server = TestServer::new();
    let (location, _) = start_upload(&server, REPO).await;

    let (status, _, body) = request(
        &server.router,
        "PUT",
        &location,
        &[],
        Some(Bytes::from_static(b"data")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_codes(&body), vec!["DIGEST_INVALID"]);
}

#[tokio::test]
async fn cancel_upload_removes_state() {
    let server = TestServer::new();
    let (location, _) = start_upload(&server, REPO).await;

    request(
        &server.router,
        "PATCH",
        &location,
        &[],
        Some(Bytes::from_static(b"junk")),
    )
    .await;

    let (status, _, _) = request(&server.router, "DELETE", &location, &[], None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, body) = request(&server.router, "GET", &location, &[], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_codes(&body), vec!["BLOB_UPLOAD_UNKNOWN"]);
}

#[tokio::test]
async fn unknown_upload_is_not_found() {
    let server = TestServer::new();
    let (status, _, body) = request(
        &server.router,
        "PATCH",
        &format!("/v2/{REPO}/blobs/uploads/no-such-upload"),
        &[],
        Some(Bytes::from_static(b"data")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_codes(&body), vec!["BLOB_UPLOAD_UNKNOWN"]);
}

#[tokio::test]
async fn cross_repository_mount_short_circuits() {
    let server = TestServer::new();
    let desc = push_blob(&server.router, "library/source", b"shared layer").await;

    let (status, headers, _) = request(
        &server.router,
        "POST",
        &format!(
            "/v2/library/target/blobs/uploads/?mount={}&from=library%2Fsource",
            desc.digest
        ),
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        header_str(&headers, "location"),
        format!("/v2/library/target/blobs/{}", desc.digest)
    );
    assert_eq!(
        header_str(&headers, "docker-content-digest"),
        desc.digest.as_str()
    );
    assert!(header_str(&headers, "docker-upload-uuid").is_empty());

    // The target repository can serve the blob immediately.
    let (status, headers, _) = request(
        &server.router,
        "HEAD",
        &format!("/v2/library/target/blobs/{}", desc.digest),
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(header_str(&headers, "content-length"), "12");
}

#[tokio::test]
async fn mount_of_unknown_blob_opens_upload() {
    let server = TestServer::new();
    let missing = Digest::from_bytes(b"never pushed");

    let (status, headers, _) = request(
        &server.router,
        "POST",
        &format!("/v2/library/target/blobs/uploads/?mount={missing}&from=library%2Fsource"),
        &[],
        None,
    )
    .await;
    // Falls back to a regular upload session.
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(!header_str(&headers, "docker-upload-uuid").is_empty());
}

#[tokio::test]
async fn blob_delete_gated_by_policy() {
    let server = TestServer::new();
    let desc = push_blob(&server.router, REPO, b"bytes").await;

    // The test configuration enables deletes.
    let (status, _, _) = request(
        &server.router,
        "DELETE",
        &format!("/v2/{REPO}/blobs/{}", desc.digest),
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, _, body) = request(
        &server.router,
        "HEAD",
        &format!("/v2/{REPO}/blobs/{}", desc.digest),
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_codes(&body), vec!["BLOB_UNKNOWN"]);
}
