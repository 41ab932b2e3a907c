use anyhow::{Context, Result};
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Header carrying the owner identity, matching the server default.
pub const DEFAULT_OWNER_HEADER: &str = "x-spool-owner";

/// Backoff schedule for transient failures.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): base, 2*base, 4*base...
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

/// Error returned by the server, with its decoded body when there is one.
#[derive(Debug, thiserror::Error)]
#[error("API error ({status}): {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub code: Option<String>,
    pub message: String,
    pub missing: Option<Vec<u64>>,
    /// Total missing chunks; the `missing` list may hold only the lowest.
    pub missing_count: Option<u64>,
}

impl ApiError {
    /// Whether `missing` names every missing chunk.
    pub fn missing_is_complete(&self) -> bool {
        match (&self.missing, self.missing_count) {
            (Some(missing), Some(count)) => missing.len() as u64 >= count,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(err) => Self {
                status,
                code: Some(err.code),
                message: err.message,
                missing: err.missing,
                missing_count: err.missing_count,
            },
            Err(_) => Self {
                status,
                code: None,
                message: body,
                missing: None,
                missing_count: None,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(default)]
    missing: Option<Vec<u64>>,
    #[serde(default)]
    missing_count: Option<u64>,
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    owner: String,
    owner_header: String,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(base_url: &str, owner: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid server URL")?;
        if owner.trim().is_empty() {
            anyhow::bail!("owner must not be empty");
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            owner: owner.to_string(),
            owner_header: DEFAULT_OWNER_HEADER.to_string(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_owner_header(mut self, header: &str) -> Self {
        self.owner_header = header.to_string();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("failed to build API URL")
    }

    async fn send(&self, make: impl Fn() -> reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = retry_request(self.retry, || {
            make().header(&self.owner_header, &self.owner).send()
        })
        .await?;
        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await.into());
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        make: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = self.send(make).await?;
        Ok(response.json().await?)
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.url("/v1/health")?;
        self.send_json(|| self.http.get(url.clone())).await
    }

    pub async fn create_upload(&self, file_name: &str, total_chunks: u64) -> Result<String> {
        let url = self.url("/v1/uploads")?;
        let req = CreateUploadRequest {
            file_name: file_name.to_string(),
            total_chunks,
        };
        let response: CreateUploadResponse = self
            .send_json(|| self.http.post(url.clone()).json(&req))
            .await?;
        Ok(response.upload_id)
    }

    pub async fn upload_chunk(
        &self,
        upload_id: &str,
        chunk_index: u64,
        total_chunks: u64,
        data: Bytes,
    ) -> Result<ChunkResponse> {
        let mut url = self.url(&format!("/v1/uploads/{upload_id}/chunks/{chunk_index}"))?;
        url.query_pairs_mut()
            .append_pair("total_chunks", &total_chunks.to_string());
        self.send_json(|| self.http.put(url.clone()).body(data.clone()))
            .await
    }

    pub async fn received_chunks(&self, upload_id: &str) -> Result<Vec<u64>> {
        let url = self.url(&format!("/v1/uploads/{upload_id}/chunks"))?;
        let response: ReceivedChunksResponse =
            self.send_json(|| self.http.get(url.clone())).await?;
        Ok(response.received_chunks)
    }

    pub async fn finish_upload(&self, upload_id: &str) -> Result<FinishResponse> {
        let url = self.url(&format!("/v1/uploads/{upload_id}/finish"))?;
        self.send_json(|| self.http.post(url.clone())).await
    }

    pub async fn get_upload(&self, upload_id: &str) -> Result<UploadMetadataResponse> {
        let url = self.url(&format!("/v1/uploads/{upload_id}"))?;
        self.send_json(|| self.http.get(url.clone())).await
    }

    pub async fn delete_upload(&self, upload_id: &str) -> Result<()> {
        let url = self.url(&format!("/v1/uploads/{upload_id}"))?;
        self.send(|| self.http.delete(url.clone())).await?;
        Ok(())
    }

    /// Stream a completed upload into `dest`, returning the bytes written.
    pub async fn download(&self, upload_id: &str, dest: &Path) -> Result<u64> {
        let url = self.url(&format!("/v1/uploads/{upload_id}/content"))?;
        let response = self.send(|| self.http.get(url.clone())).await?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("failed to create {}", dest.display()))?;
        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("download interrupted")?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

/// Retries an HTTP request with exponential backoff on transient failures.
///
/// Retries on transport errors and 5xx responses. Returns immediately on
/// success or 4xx (client errors that won't resolve with retries).
pub async fn retry_request<F, Fut>(
    policy: RetryPolicy,
    mut make_request: F,
) -> reqwest::Result<reqwest::Response>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = reqwest::Result<reqwest::Response>>,
{
    let mut attempt = 0;

    loop {
        match make_request().await {
            Ok(response) if response.status().is_server_error() => {
                attempt += 1;
                if attempt > policy.max_retries {
                    return Ok(response);
                }
                let delay = policy.delay(attempt);
                tracing::warn!(status = %response.status(), ?delay, "server error, retrying");
                tokio::time::sleep(delay).await;
            }
            Ok(response) => return Ok(response),
            Err(e) => {
                attempt += 1;
                if attempt > policy.max_retries {
                    return Err(e);
                }
                let delay = policy.delay(attempt);
                tracing::warn!(error = %e, ?delay, "request error, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

// =============================================================================
// Request/response types (mirrored from server handlers)
// =============================================================================

#[derive(Debug, Serialize)]
pub struct CreateUploadRequest {
    pub file_name: String,
    pub total_chunks: u64,
}

#[derive(Debug, Deserialize)]
pub struct CreateUploadResponse {
    pub upload_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ChunkResponse {
    pub upload_id: String,
    pub chunk_index: u64,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ReceivedChunksResponse {
    pub upload_id: String,
    pub received_chunks: Vec<u64>,
}

#[derive(Debug, Deserialize)]
pub struct FinishResponse {
    pub success: bool,
    pub upload_id: String,
    pub stored_path: String,
    pub size: u64,
}

#[derive(Debug, Deserialize)]
pub struct UploadMetadataResponse {
    pub upload_id: String,
    pub file_name: String,
    pub total_chunks: u64,
    pub status: String,
    pub size: u64,
    pub received_count: u64,
    pub received_chunks: Vec<u64>,
    #[serde(default)]
    pub stored_path: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub storage: String,
    pub presence: String,
}
