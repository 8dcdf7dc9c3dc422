//! Authenticated HTTP client for one remote site.
//!
//! Credentials come from the `host,user,password` connection strings on
//! storage targets. Responses map onto the error taxonomy: connect errors,
//! timeouts and 5xx are transient, 4xx is permanent.

use std::path::Path;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

use arkiv_core::constants::{REMOTE_JOB_POLL_SECS, REMOTE_TIMEOUT_SECS};
use arkiv_core::models::RemoteCredentials;
use arkiv_core::{Result, StorageError};

use crate::retry::RetryPolicy;

/// Upload chunk size for large payload transfer, in bytes.
const UPLOAD_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Terminal and intermediate states of a job running on another site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RemoteJobStatus {
    Pending,
    Received,
    Started,
    Retry,
    Success,
    Failure,
    Revoked,
}

impl RemoteJobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RemoteJobStatus::Success | RemoteJobStatus::Failure | RemoteJobStatus::Revoked
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RemoteJobStatus::Failure | RemoteJobStatus::Revoked)
    }
}

/// State of a background job on a remote site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteJob {
    pub id: Uuid,
    pub status: RemoteJobStatus,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub exception: Option<String>,
}

/// HTTP client for one remote site, authenticated with basic credentials.
#[derive(Clone, Debug)]
pub struct SiteClient {
    http: Client,
    credentials: RemoteCredentials,
    policy: RetryPolicy,
}

fn transport_error(err: reqwest::Error) -> StorageError {
    StorageError::Network {
        message: err.to_string(),
    }
}

/// `Content-Range: bytes a-b/total` header value for one chunk.
fn content_range(offset: u64, chunk_len: u64, total: u64) -> String {
    format!("bytes {}-{}/{}", offset, offset + chunk_len - 1, total)
}

/// Read up to `limit` bytes, returning short only at end of input.
async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut R, limit: usize) -> std::io::Result<Vec<u8>> {
    let mut chunk = vec![0u8; limit];
    let mut filled = 0;
    while filled < limit {
        let n = reader.read(&mut chunk[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    chunk.truncate(filled);
    Ok(chunk)
}

impl SiteClient {
    pub fn connect(credentials: RemoteCredentials, verify_tls: bool) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REMOTE_TIMEOUT_SECS))
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .map_err(|e| StorageError::Other(anyhow::anyhow!("failed to build HTTP client: {e}")))?;

        Ok(SiteClient {
            http,
            credentials,
            policy: RetryPolicy::remote(),
        })
    }

    /// Parse a `host,user,password` connection string and connect.
    pub fn from_connection_string(connection: &str, verify_tls: bool) -> Result<Self> {
        Self::connect(RemoteCredentials::parse(connection)?, verify_tls)
    }

    pub fn host(&self) -> &str {
        &self.credentials.host
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.credentials.host, path)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.credentials.user, Some(&self.credentials.password))
    }

    /// Classify a non-success status: 5xx retries, 4xx surfaces.
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            Err(StorageError::Network {
                message: format!("{}: {}", status, message),
            })
        } else {
            Err(StorageError::Remote {
                status: status.as_u16(),
                message,
            })
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.policy
            .run(|| async {
                let response = self
                    .authed(self.http.get(self.url(path)))
                    .send()
                    .await
                    .map_err(transport_error)?;
                let response = Self::check(response).await?;
                response.json().await.map_err(|e| StorageError::Remote {
                    status: 200,
                    message: format!("malformed payload: {e}"),
                })
            })
            .await
    }

    /// GET that treats 404 as absence rather than failure.
    pub async fn get_json_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        self.policy
            .run(|| async {
                let response = self
                    .authed(self.http.get(self.url(path)))
                    .send()
                    .await
                    .map_err(transport_error)?;
                if response.status() == StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                let response = Self::check(response).await?;
                let value = response.json().await.map_err(|e| StorageError::Remote {
                    status: 200,
                    message: format!("malformed payload: {e}"),
                })?;
                Ok(Some(value))
            })
            .await
    }

    pub async fn post_json<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<()> {
        self.policy
            .run(|| async {
                let response = self
                    .authed(self.http.post(self.url(path)).json(body))
                    .send()
                    .await
                    .map_err(transport_error)?;
                Self::check(response).await.map(|_| ())
            })
            .await
    }

    pub async fn patch_json<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<()> {
        self.policy
            .run(|| async {
                let response = self
                    .authed(self.http.patch(self.url(path)).json(body))
                    .send()
                    .await
                    .map_err(transport_error)?;
                Self::check(response).await.map(|_| ())
            })
            .await
    }

    // --- chunked file transfer ---

    /// Upload one file to `path` in `Content-Range` chunks, reading one
    /// chunk from disk at a time. The first chunk returns an upload id the
    /// remaining chunks carry; each chunk is retried under the bounded
    /// policy independently.
    pub async fn upload_file(&self, src: &Path, path: &str, dst: &str) -> Result<()> {
        let mut file = tokio::fs::File::open(src)
            .await
            .map_err(|e| StorageError::Other(anyhow::anyhow!("open {}: {e}", src.display())))?;
        let total = file
            .metadata()
            .await
            .map_err(|e| StorageError::Other(anyhow::anyhow!("stat {}: {e}", src.display())))?
            .len();
        let file_name = src
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let mut upload_id: Option<String> = None;
        let mut offset = 0u64;
        // A zero-length file still ships one empty chunk so the destination
        // file gets created.
        loop {
            let chunk = read_chunk(&mut file, UPLOAD_CHUNK_SIZE)
                .await
                .map_err(|e| StorageError::Other(anyhow::anyhow!("read {}: {e}", src.display())))?;
            let chunk_len = chunk.len() as u64;
            let range = content_range(offset, chunk_len.max(1), total.max(1));

            let response: ChunkResponse = self
                .upload_chunk(path, dst, &file_name, chunk, &range, upload_id.as_deref())
                .await?;
            if upload_id.is_none() {
                upload_id = response.upload_id;
            }

            offset += chunk_len;
            // A short read means end of file even if the size changed after
            // the initial stat.
            if offset >= total || chunk_len < UPLOAD_CHUNK_SIZE as u64 {
                break;
            }
        }

        tracing::info!(
            file = %src.display(),
            host = %self.credentials.host,
            size = total,
            "uploaded file to remote site"
        );
        Ok(())
    }

    async fn upload_chunk(
        &self,
        path: &str,
        dst: &str,
        file_name: &str,
        chunk: Vec<u8>,
        range: &str,
        upload_id: Option<&str>,
    ) -> Result<ChunkResponse> {
        self.policy
            .run(|| async {
                let part = reqwest::multipart::Part::bytes(chunk.clone())
                    .file_name(file_name.to_string());
                let mut form = reqwest::multipart::Form::new()
                    .part("file", part)
                    .text("dst", dst.to_string());
                if let Some(id) = upload_id {
                    form = form.text("upload_id", id.to_string());
                }

                let response = self
                    .authed(
                        self.http
                            .post(self.url(path))
                            .header("Content-Range", range)
                            .multipart(form),
                    )
                    .send()
                    .await
                    .map_err(transport_error)?;
                let response = Self::check(response).await?;
                response
                    .json()
                    .await
                    .map_err(|e| StorageError::Remote {
                        status: 200,
                        message: format!("malformed upload response: {e}"),
                    })
            })
            .await
    }

    // --- remote job lifecycle ---

    pub async fn get_job(&self, id: Uuid) -> Result<Option<RemoteJob>> {
        self.get_json_optional(&format!("/api/tasks/{}/", id)).await
    }

    /// Create a job on the remote site and start it.
    pub async fn create_and_run_job(&self, job: &serde_json::Value) -> Result<Uuid> {
        #[derive(Deserialize)]
        struct Created {
            id: Uuid,
        }
        let created: Created = self
            .policy
            .run(|| async {
                let response = self
                    .authed(self.http.post(self.url("/api/tasks/")).json(job))
                    .send()
                    .await
                    .map_err(transport_error)?;
                let response = Self::check(response).await?;
                response.json().await.map_err(|e| StorageError::Remote {
                    status: 200,
                    message: format!("malformed payload: {e}"),
                })
            })
            .await?;
        self.post_json(&format!("/api/tasks/{}/run/", created.id), &serde_json::json!({}))
            .await?;
        Ok(created.id)
    }

    pub async fn retry_job(&self, id: Uuid) -> Result<()> {
        self.post_json(&format!("/api/tasks/{}/retry/", id), &serde_json::json!({}))
            .await
    }

    /// Poll a job until it reaches a terminal status, then re-raise its
    /// failure locally if any.
    pub async fn wait_for_job(&self, id: Uuid) -> Result<RemoteJob> {
        loop {
            let job = self
                .get_job(id)
                .await?
                .ok_or_else(|| StorageError::not_found("remote job", id))?;
            if job.status.is_terminal() {
                if job.status.is_failed() {
                    return Err(StorageError::RemoteJobFailed {
                        message: job
                            .exception
                            .clone()
                            .unwrap_or_else(|| format!("remote job {} failed", id)),
                    });
                }
                return Ok(job);
            }
            tokio::time::sleep(Duration::from_secs(REMOTE_JOB_POLL_SECS)).await;
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChunkResponse {
    #[serde(default)]
    upload_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_is_inclusive() {
        assert_eq!(content_range(0, 3, 3), "bytes 0-2/3");
        assert_eq!(content_range(1, 1, 3), "bytes 1-1/3");
        assert_eq!(content_range(8, 4, 12), "bytes 8-11/12");
    }

    #[tokio::test]
    async fn chunk_reads_are_bounded_and_stop_at_end_of_input() {
        let mut reader = std::io::Cursor::new(vec![7u8; 10]);
        assert_eq!(read_chunk(&mut reader, 4).await.unwrap().len(), 4);
        assert_eq!(read_chunk(&mut reader, 4).await.unwrap().len(), 4);
        assert_eq!(read_chunk(&mut reader, 4).await.unwrap().len(), 2);
        assert!(read_chunk(&mut reader, 4).await.unwrap().is_empty());
    }

    #[test]
    fn remote_job_status_parses_celery_states() {
        let job: RemoteJob = serde_json::from_str(
            r#"{"id":"a50e8400-e29b-41d4-a716-446655440000","status":"STARTED"}"#,
        )
        .unwrap();
        assert_eq!(job.status, RemoteJobStatus::Started);
        assert!(!job.status.is_terminal());

        let job: RemoteJob = serde_json::from_str(
            r#"{"id":"a50e8400-e29b-41d4-a716-446655440000","status":"FAILURE","exception":"boom"}"#,
        )
        .unwrap();
        assert!(job.status.is_terminal());
        assert!(job.status.is_failed());
        assert_eq!(job.exception.as_deref(), Some("boom"));
    }

    #[test]
    fn client_builds_from_connection_string() {
        let client =
            SiteClient::from_connection_string("https://site-b.example.com,admin,secret", true)
                .unwrap();
        assert_eq!(client.host(), "https://site-b.example.com");
        assert!(SiteClient::from_connection_string("not-a-connection", true).is_err());
    }
}
