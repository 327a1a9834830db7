//! Integration tests for catalog pagination.

mod common;

use axum::http::StatusCode;
use common::fixtures::push_blob;
use common::{TestServer, error_codes, header_str, request};

const REPOS: &[&str] = &[
    "library/alpine",
    "library/ubuntu",
    "team-a/api",
    "team-a/worker",
];

async fn seed(server: &TestServer) {
    for repo in REPOS {
        push_blob(&server.router, repo, repo.as_bytes()).await;
    }
}

fn repositories(body: &bytes::Bytes) -> Vec<String> {
    let value: serde_json::Value = serde_json::from_slice(body).unwrap();
    value["repositories"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn catalog_lists_all_repositories() {
    let server = TestServer::new();
    seed(&server).await;

    let (status, _, body) = request(&server.router, "GET", "/v2/_catalog", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(repositories(&body), REPOS);
}

#[tokio::test]
async fn catalog_pages_concatenate_without_gaps() {
    let server = TestServer::new();
    seed(&server).await;

    let mut all = Vec::new();
    let mut uri = "/v2/_catalog?n=2".to_string();
    loop {
        let (status, headers, body) = request(&server.router, "GET", &uri, &[], None).await;
        assert_eq!(status, StatusCode::OK);
        let page = repositories(&body);
        all.extend(page.clone());

        let link = header_str(&headers, "link").to_string();
        if link.is_empty() {
            break;
        }
        // Link: </v2/_catalog?last=...&n=2>; rel="next"
        let next = link
            .trim_start_matches('<')
            .split('>')
            .next()
            .unwrap()
            .to_string();
        uri = next;
    }
    assert_eq!(all, REPOS);
}

#[tokio::test]
async fn catalog_last_cursor_is_exclusive() {
    let server = TestServer::new();
    seed(&server).await;

    let (_, _, body) = request(
        &server.router,
        "GET",
        "/v2/_catalog?last=library/ubuntu",
        &[],
        None,
    )
    .await;
    assert_eq!(repositories(&body), vec!["team-a/api", "team-a/worker"]);
}

#[tokio::test]
async fn empty_catalog_is_empty() {
    let server = TestServer::new();
    let (status, headers, body) = request(&server.router, "GET", "/v2/_catalog", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(repositories(&body).is_empty());
    assert!(header_str(&headers, "link").is_empty());
}

#[tokio::test]
async fn unknown_route_is_rejected() {
    let server = TestServer::new();
    let (status, _, body) =
        request(&server.router, "GET", "/v2/library/ubuntu", &[], None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(error_codes(&body), vec!["UNSUPPORTED"]);
}
