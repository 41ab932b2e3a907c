//! Integration tests for HTTP API endpoints.

mod common;

use axum::body::Body;
use axum::http::StatusCode;
use common::{OWNER, TestServer, chunk_data, split_chunks};
use serde_json::json;

#[tokio::test]
async fn full_upload_roundtrip() {
    let server = TestServer::new().await;
    let data = chunk_data(3, 35);
    let chunks = [data[..10].to_vec(), data[10..30].to_vec(), data[30..].to_vec()];

    let id = server.init("report.pdf", 3).await;
    for index in [1u64, 0, 2] {
        let (status, json) = server
            .put_chunk(&id, index, 3, chunks[index as usize].clone())
            .await;
        assert_eq!(status, StatusCode::OK, "{json}");
        assert_eq!(json["status"], "stored");
        assert_eq!(json["chunk_index"], index);
    }

    let (status, json) = server
        .request("GET", &format!("/v1/uploads/{id}/chunks"), Some(OWNER), Body::empty())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["received_chunks"], json!([0, 1, 2]));

    let (status, json) = server
        .request("POST", &format!("/v1/uploads/{id}/finish"), Some(OWNER), Body::empty())
        .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["success"], true);
    assert_eq!(json["size"], 35);
    assert_eq!(json["stored_path"], format!("files/{id}_report.pdf"));

    let (status, body) = server
        .request_raw("GET", &format!("/v1/uploads/{id}/content"), Some(OWNER), Body::empty())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, data);
}

#[tokio::test]
async fn duplicate_chunk_reports_duplicate() {
    let server = TestServer::new().await;
    let id = server.init("a.bin", 2).await;

    let (_, first) = server.put_chunk(&id, 0, 2, chunk_data(1, 8)).await;
    let (status, again) = server.put_chunk(&id, 0, 2, chunk_data(1, 8)).await;
    assert_eq!(first["status"], "stored");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["status"], "duplicate");
}

#[tokio::test]
async fn finish_incomplete_is_conflict_with_missing_list() {
    let server = TestServer::new().await;
    let id = server.init("gap.bin", 3).await;
    server.put_chunk(&id, 0, 3, chunk_data(1, 4)).await;
    server.put_chunk(&id, 2, 3, chunk_data(2, 4)).await;

    let (status, json) = server
        .request("POST", &format!("/v1/uploads/{id}/finish"), Some(OWNER), Body::empty())
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "incomplete");
    assert_eq!(json["missing"], json!([1]));
    assert_eq!(json["missing_count"], 1);

    // Resume and retry.
    server.put_chunk(&id, 1, 3, chunk_data(3, 4)).await;
    let (status, json) = server
        .request("POST", &format!("/v1/uploads/{id}/finish"), Some(OWNER), Body::empty())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["size"], 12);
}

#[tokio::test]
async fn metadata_reports_progress_then_result() {
    let server = TestServer::new().await;
    let data = chunk_data(9, 50);
    let chunks = split_chunks(&data, 20);
    let id = server.init("progress.bin", chunks.len() as u64).await;

    server.put_chunk(&id, 0, 3, chunks[0].clone()).await;
    server.put_chunk(&id, 2, 3, chunks[2].clone()).await;

    let (status, json) = server
        .request("GET", &format!("/v1/uploads/{id}"), Some(OWNER), Body::empty())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "in_progress");
    assert_eq!(json["size"], 30);
    assert_eq!(json["received_chunks"], json!([0, 2]));
    assert_eq!(json["file_name"], "progress.bin");
    assert!(json.get("stored_path").is_none());

    server.put_chunk(&id, 1, 3, chunks[1].clone()).await;
    server
        .request("POST", &format!("/v1/uploads/{id}/finish"), Some(OWNER), Body::empty())
        .await;

    let (_, json) = server
        .request("GET", &format!("/v1/uploads/{id}"), Some(OWNER), Body::empty())
        .await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["size"], 50);
    assert_eq!(json["received_count"], 3);
    assert_eq!(json["stored_path"], format!("files/{id}_progress.bin"));
}

#[tokio::test]
async fn missing_owner_is_unauthorized() {
    let server = TestServer::new().await;
    let body = serde_json::to_vec(&json!({ "file_name": "a.bin", "total_chunks": 1 })).unwrap();

    let (status, json) = server
        .request("POST", "/v1/uploads", None, Body::from(body))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "unauthorized");
}

#[tokio::test]
async fn other_owners_uploads_are_invisible() {
    let server = TestServer::new().await;
    let id = server.init("private.bin", 1).await;

    for (method, uri) in [
        ("GET", format!("/v1/uploads/{id}")),
        ("GET", format!("/v1/uploads/{id}/chunks")),
        ("POST", format!("/v1/uploads/{id}/finish")),
        ("DELETE", format!("/v1/uploads/{id}")),
    ] {
        let (status, _) = server
            .request(method, &uri, Some("mallory"), Body::empty())
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
    }

    let (status, _) = server
        .request(
            "PUT",
            &format!("/v1/uploads/{id}/chunks/0?total_chunks=1"),
            Some("mallory"),
            Body::from("x"),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_requests_are_bad_requests() {
    let server = TestServer::new().await;
    let id = server.init("v.bin", 2).await;

    let cases = [
        ("/v1/uploads/not-a-uuid/chunks/0?total_chunks=2".to_string(), "bad id"),
        (format!("/v1/uploads/{id}/chunks/abc?total_chunks=2"), "bad index"),
        (format!("/v1/uploads/{id}/chunks/2?total_chunks=2"), "index out of range"),
        (format!("/v1/uploads/{id}/chunks/0?total_chunks=3"), "count mismatch"),
        (format!("/v1/uploads/{id}/chunks/0"), "missing total"),
    ];
    for (uri, what) in cases {
        let (status, json) = server
            .request("PUT", &uri, Some(OWNER), Body::from("x"))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{what}: {json}");
    }

    for body in [
        json!({ "file_name": "", "total_chunks": 1 }),
        json!({ "file_name": "a.bin", "total_chunks": 0 }),
        json!({ "file_name": "a.bin" }),
    ] {
        let (status, _) = server
            .request(
                "POST",
                "/v1/uploads",
                Some(OWNER),
                Body::from(serde_json::to_vec(&body).unwrap()),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    }
}

#[tokio::test]
async fn unknown_upload_is_not_found() {
    let server = TestServer::new().await;
    let id = uuid::Uuid::new_v4();

    let (status, json) = server
        .request("GET", &format!("/v1/uploads/{id}"), Some(OWNER), Body::empty())
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "not_found");
}

#[tokio::test]
async fn oversized_chunk_is_rejected() {
    let server = TestServer::with_config(|config| {
        config.server.max_chunk_size = 16;
    })
    .await;
    let id = server.init("big.bin", 1).await;

    let (status, _) = server.put_chunk(&id, 0, 1, chunk_data(1, 17)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server.put_chunk(&id, 0, 1, chunk_data(1, 16)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn total_chunks_above_limit_is_rejected() {
    let server = TestServer::with_config(|config| {
        config.server.max_total_chunks = 10;
    })
    .await;
    let body = serde_json::to_vec(&json!({ "file_name": "a.bin", "total_chunks": 11 })).unwrap();

    let (status, _) = server
        .request("POST", "/v1/uploads", Some(OWNER), Body::from(body))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn download_before_finish_is_bad_request() {
    let server = TestServer::new().await;
    let id = server.init("early.bin", 1).await;

    let (status, _) = server
        .request("GET", &format!("/v1/uploads/{id}/content"), Some(OWNER), Body::empty())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_removes_upload() {
    let server = TestServer::new().await;
    let id = server.init("gone.bin", 2).await;
    server.put_chunk(&id, 0, 2, chunk_data(1, 4)).await;
    assert!(server.disk_path(&format!("tmp/{id}/chunk_0")).exists());

    let (status, _) = server
        .request("DELETE", &format!("/v1/uploads/{id}"), Some(OWNER), Body::empty())
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!server.disk_path(&format!("tmp/{id}")).exists());

    let (status, _) = server
        .request("GET", &format!("/v1/uploads/{id}"), Some(OWNER), Body::empty())
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_backends() {
    let server = TestServer::new().await;
    let (status, json) = server
        .request("GET", "/v1/health", None, Body::empty())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["storage"], "filesystem");
    assert_eq!(json["presence"], "memory");
}

#[tokio::test]
async fn metrics_endpoint_follows_config() {
    spool_server::metrics::register_metrics();

    let enabled = TestServer::new().await;
    let done = enabled.init("done.bin", 1).await;
    enabled.put_chunk(&done, 0, 1, chunk_data(1, 4)).await;
    let (status, _) = enabled
        .request("POST", &format!("/v1/uploads/{done}/finish"), Some(OWNER), Body::empty())
        .await;
    assert_eq!(status, StatusCode::OK);
    enabled.init("open-a.bin", 2).await;
    enabled.init("open-b.bin", 3).await;

    let (status, body) = enabled
        .request_raw("GET", "/metrics", None, Body::empty())
        .await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("spool_uploads_initialized_total"));
    assert!(text.contains("spool_active_uploads 2"), "{text}");

    let disabled = TestServer::with_config(|config| {
        config.server.metrics_enabled = false;
    })
    .await;
    let (status, _) = disabled
        .request_raw("GET", "/metrics", None, Body::empty())
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
