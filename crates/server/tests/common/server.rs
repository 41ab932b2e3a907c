//! Server test utilities.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use spool_core::config::{AppConfig, MetadataConfig, StorageConfig};
use spool_server::{AppState, build_state, create_router};
use tempfile::TempDir;
use tower::ServiceExt;

/// Owner used by tests unless stated otherwise.
#[allow(dead_code)]
pub const OWNER: &str = "alice";

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let mut config = AppConfig::for_testing();
        config.storage = StorageConfig::Filesystem {
            path: temp_dir.path().join("storage"),
        };
        config.metadata = MetadataConfig::Sqlite {
            path: temp_dir.path().join("metadata.db"),
            query_timeout_secs: None,
        };
        modifier(&mut config);

        let state = build_state(config)
            .await
            .expect("Failed to build server state");
        let router = create_router(state.clone());

        Self {
            router,
            state,
            temp_dir,
        }
    }

    /// On-disk location of a storage key.
    pub fn disk_path(&self, key: &str) -> std::path::PathBuf {
        self.temp_dir.path().join("storage").join(key)
    }

    /// Send a request and return status plus parsed JSON body.
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        owner: Option<&str>,
        body: Body,
    ) -> (StatusCode, Value) {
        let (status, bytes) = self.request_raw(method, uri, owner, body).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Send a request and return status plus raw body bytes.
    pub async fn request_raw(
        &self,
        method: &str,
        uri: &str,
        owner: Option<&str>,
        body: Body,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(owner) = owner {
            builder = builder.header("x-spool-owner", owner);
        }
        self.send(builder.body(body).unwrap()).await
    }

    /// Send a request carrying the owner under an arbitrary header name.
    pub async fn request_with_header(
        &self,
        method: &str,
        uri: &str,
        header: &str,
        owner: &str,
        body: Body,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header, owner)
            .body(body)
            .unwrap();
        let (status, bytes) = self.send(request).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    /// Initialize an upload and return its ID.
    pub async fn init(&self, file_name: &str, total_chunks: u64) -> String {
        let body = serde_json::json!({ "file_name": file_name, "total_chunks": total_chunks });
        let (status, json) = self
            .request(
                "POST",
                "/v1/uploads",
                Some(OWNER),
                Body::from(serde_json::to_vec(&body).unwrap()),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "init failed: {json}");
        json["upload_id"].as_str().unwrap().to_string()
    }

    /// Upload one chunk and return the response.
    pub async fn put_chunk(
        &self,
        upload_id: &str,
        index: u64,
        total_chunks: u64,
        data: Vec<u8>,
    ) -> (StatusCode, Value) {
        self.request(
            "PUT",
            &format!("/v1/uploads/{upload_id}/chunks/{index}?total_chunks={total_chunks}"),
            Some(OWNER),
            Body::from(data),
        )
        .await
    }
}
