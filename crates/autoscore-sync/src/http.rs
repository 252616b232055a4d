//! HTTP client for writing scored results back to Label Studio.

use std::time::Duration;

use async_trait::async_trait;
use autoscore_core::{ResultEntry, WriteBack, WriteBackError};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::LabelStudioConfig;

/// Per-request timeout for calls to the Label Studio API.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("LS_URL or LS_API_KEY not configured")]
    NotConfigured,
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
}

impl From<SyncError> for WriteBackError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::NotConfigured => WriteBackError::NotConfigured("LS_URL or LS_API_KEY"),
            SyncError::Http(e) => WriteBackError::Transport(Box::new(e)),
            SyncError::Server { status, body } => WriteBackError::Rejected { status, body },
        }
    }
}

#[derive(Serialize)]
struct PatchBody<'a> {
    result: &'a [ResultEntry],
}

/// Label Studio API client.
pub struct LabelStudioClient {
    client: reqwest::Client,
    config: LabelStudioConfig,
}

impl LabelStudioClient {
    /// Create a client. An unconfigured client can be built; every
    /// write-back then fails with [`SyncError::NotConfigured`].
    pub fn new(config: LabelStudioConfig) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LabelStudioConfig {
        &self.config
    }

    fn annotation_url(&self, annotation_id: u64) -> String {
        format!("{}/api/annotations/{}", self.config.url, annotation_id)
    }

    /// Replace an annotation's `result` list.
    pub async fn patch_annotation_result(
        &self,
        annotation_id: u64,
        result: &[ResultEntry],
    ) -> Result<(), SyncError> {
        if !self.config.is_configured() {
            return Err(SyncError::NotConfigured);
        }

        let url = self.annotation_url(annotation_id);
        debug!(url = %url, entries = result.len(), "patching annotation result");
        let resp = self
            .client
            .patch(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Token {}", self.config.api_key),
            )
            .json(&PatchBody { result })
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Server {
                status: status.as_u16(),
                body,
            });
        }

        info!(annotation_id, status = status.as_u16(), "annotation result updated");
        Ok(())
    }
}

#[async_trait]
impl WriteBack for LabelStudioClient {
    async fn write_back(
        &self,
        annotation_id: u64,
        result: &[ResultEntry],
    ) -> Result<(), WriteBackError> {
        self.patch_annotation_result(annotation_id, result)
            .await
            .map_err(WriteBackError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// What the fake platform saw.
    struct Captured {
        request_line: String,
        authorization: Option<String>,
        body: serde_json::Value,
    }

    /// Accept one request on a loopback port and answer with `status`/`reply`.
    async fn fake_platform(
        status: &'static str,
        reply: &'static str,
    ) -> (String, tokio::task::JoinHandle<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(stream);

            let mut request_line = String::new();
            reader.read_line(&mut request_line).await.unwrap();

            let mut authorization = None;
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    match name.to_ascii_lowercase().as_str() {
                        "authorization" => authorization = Some(value.trim().to_string()),
                        "content-length" => content_length = value.trim().parse().unwrap(),
                        _ => {}
                    }
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).await.unwrap();

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{reply}",
                reply.len()
            );
            let mut stream = reader.into_inner();
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();

            Captured {
                request_line: request_line.trim_end().to_string(),
                authorization,
                body: serde_json::from_slice(&body).unwrap(),
            }
        });
        (base, handle)
    }

    #[test]
    fn annotation_url_format() {
        let client =
            LabelStudioClient::new(LabelStudioConfig::new("https://ls.example.org/", "tok"))
                .unwrap();
        assert_eq!(
            client.annotation_url(42),
            "https://ls.example.org/api/annotations/42"
        );
    }

    #[tokio::test]
    async fn unconfigured_client_refuses() {
        let client = LabelStudioClient::new(LabelStudioConfig::new("", "tok")).unwrap();
        let err = client.patch_annotation_result(1, &[]).await.unwrap_err();
        assert!(matches!(err, SyncError::NotConfigured));
        let err = client.write_back(1, &[]).await.unwrap_err();
        assert!(matches!(err, WriteBackError::NotConfigured(_)));
        assert_eq!(err.to_string(), "LS_URL or LS_API_KEY not configured");
    }

    #[tokio::test]
    async fn patches_result_with_token() {
        let (base, platform) = fake_platform("200 OK", r#"{"id": 7}"#).await;
        let client = LabelStudioClient::new(LabelStudioConfig::new(base, "abc123")).unwrap();
        let entries = vec![ResultEntry::number("final_score", "text", 88)];

        client.write_back(7, &entries).await.unwrap();

        let seen = platform.await.unwrap();
        assert_eq!(seen.request_line, "PATCH /api/annotations/7 HTTP/1.1");
        assert_eq!(seen.authorization.as_deref(), Some("Token abc123"));
        assert_eq!(
            seen.body,
            serde_json::json!({
                "result": [{
                    "type": "number",
                    "from_name": "final_score",
                    "to_name": "text",
                    "value": { "number": 88 }
                }]
            })
        );
    }

    #[tokio::test]
    async fn platform_rejection_surfaces_status() {
        let (base, platform) =
            fake_platform("401 Unauthorized", r#"{"detail":"Invalid token."}"#).await;
        let client = LabelStudioClient::new(LabelStudioConfig::new(base, "bad")).unwrap();

        let err = client.write_back(7, &[]).await.unwrap_err();
        platform.await.unwrap();
        match err {
            WriteBackError::Rejected { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("Invalid token"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_platform_is_transport_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let client = LabelStudioClient::new(LabelStudioConfig::new(base, "tok")).unwrap();
        let err = client.write_back(1, &[]).await.unwrap_err();
        assert!(matches!(err, WriteBackError::Transport(_)));
    }
}
