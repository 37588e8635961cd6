use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use thiserror::Error;

/// The one media type stages speak
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Longest prefix of a failing stage's body carried into the error
pub const ERROR_BODY_LIMIT: usize = 4 * 1024;

const TRUNCATED_MARKER: &str = "... [truncated]";

#[derive(Error, Debug, PartialEq)]
pub enum StageClientError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Stage returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Response exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

// ============================================================================
// SBIO: Trait for abstraction (allows mocking in tests)
// ============================================================================

#[async_trait]
pub trait StageClient: Send + Sync {
    /// POST `body` to a stage and return its full response body
    async fn post(
        &self,
        url: &str,
        body: Bytes,
        request_id: &str,
    ) -> Result<Bytes, StageClientError>;
}

// ============================================================================
// SBIO: I/O implementation (real HTTP client)
// ============================================================================

#[derive(Clone)]
pub struct HttpStageClient {
    client: reqwest::Client,
    max_payload_bytes: usize,
}

impl HttpStageClient {
    pub fn new(timeout: Duration, max_payload_bytes: usize) -> Result<Self, StageClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StageClientError::Http(e.to_string()))?;
        Ok(Self {
            client,
            max_payload_bytes,
        })
    }
}

#[async_trait]
impl StageClient for HttpStageClient {
    async fn post(
        &self,
        url: &str,
        body: Bytes,
        request_id: &str,
    ) -> Result<Bytes, StageClientError> {
        let mut response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, JSON_CONTENT_TYPE)
            .header(reqwest::header::ACCEPT, JSON_CONTENT_TYPE)
            .header("x-request-id", request_id)
            .body(body)
            .send()
            .await
            .map_err(|e| StageClientError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let limit = ERROR_BODY_LIMIT.min(self.max_payload_bytes);
            let body = match read_prefix(&mut response, limit).await {
                Ok((prefix, truncated)) => error_text(&prefix, truncated),
                Err(_) => "Unknown error".to_string(),
            };
            return Err(StageClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if response
            .content_length()
            .is_some_and(|len| len > self.max_payload_bytes as u64)
        {
            return Err(StageClientError::TooLarge {
                limit: self.max_payload_bytes,
            });
        }

        let (buf, truncated) = read_prefix(&mut response, self.max_payload_bytes).await?;
        if truncated {
            return Err(StageClientError::TooLarge {
                limit: self.max_payload_bytes,
            });
        }
        Ok(Bytes::from(buf))
    }
}

/// Read at most `limit` bytes of the body. The flag is set when more was left unread.
async fn read_prefix(
    response: &mut reqwest::Response,
    limit: usize,
) -> Result<(Vec<u8>, bool), StageClientError> {
    let mut buf = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| StageClientError::Http(e.to_string()))?
    {
        let room = limit - buf.len();
        if chunk.len() > room {
            buf.extend_from_slice(&chunk[..room]);
            return Ok((buf, true));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok((buf, false))
}

/// Pure: render a stage's error body for logs and error responses
pub fn error_text(prefix: &[u8], truncated: bool) -> String {
    let mut text = String::from_utf8_lossy(prefix).into_owned();
    if truncated {
        text.push_str(TRUNCATED_MARKER);
    }
    text
}

// ============================================================================
// SBIO: Mock implementation for testing (no I/O)
// ============================================================================

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted behaviour of one stage
    #[derive(Debug, Clone)]
    pub enum MockStage {
        /// Respond with the request body plus this suffix
        Append(&'static str),
        /// Respond with this HTTP status
        Fail(u16),
        /// Report the response as over this cap
        TooLarge(usize),
        /// Never respond
        Hang,
    }

    pub struct MockStageClient {
        stages: HashMap<String, MockStage>,
        visited: Mutex<Vec<String>>,
    }

    impl MockStageClient {
        pub fn new(stages: Vec<(&str, MockStage)>) -> Self {
            Self {
                stages: stages
                    .into_iter()
                    .map(|(url, stage)| (url.to_string(), stage))
                    .collect(),
                visited: Mutex::new(Vec::new()),
            }
        }

        pub fn visited(&self) -> Vec<String> {
            self.visited.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StageClient for MockStageClient {
        async fn post(
            &self,
            url: &str,
            body: Bytes,
            _request_id: &str,
        ) -> Result<Bytes, StageClientError> {
            self.visited.lock().unwrap().push(url.to_string());
            match self.stages.get(url) {
                Some(MockStage::Append(suffix)) => {
                    let mut out = body.to_vec();
                    out.extend_from_slice(suffix.as_bytes());
                    Ok(Bytes::from(out))
                }
                Some(MockStage::Fail(status)) => Err(StageClientError::Status {
                    status: *status,
                    body: "scripted failure".to_string(),
                }),
                Some(MockStage::TooLarge(limit)) => Err(StageClientError::TooLarge { limit: *limit }),
                Some(MockStage::Hang) => std::future::pending().await,
                None => Err(StageClientError::Http("connection refused".to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_text_marks_truncation() {
        assert_eq!(error_text(b"boom", false), "boom");
        assert_eq!(error_text(b"boo", true), "boo... [truncated]");
    }

    #[test]
    fn test_error_text_tolerates_split_utf8() {
        // "é" is two bytes; a prefix may cut it in half
        let text = error_text(&"é".as_bytes()[..1], true);
        assert!(text.ends_with(TRUNCATED_MARKER));
    }

    #[tokio::test]
    async fn test_unreachable_url_is_http_error() {
        let client = HttpStageClient::new(std::time::Duration::from_millis(200), 1024).unwrap();
        let result = client
            .post("http://127.0.0.1:1/", Bytes::from_static(b"{}"), "req")
            .await;
        assert!(matches!(result, Err(StageClientError::Http(_))));
    }
}
