pub use crate::error::ApiError;
use crate::error::{GeminiError, error_message};
use crate::stream::ByteStream;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::{StreamExt, TryStreamExt};
use reqwest::header::CONTENT_TYPE;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// One HTTP exchange as seen by a [`Transport`]. The body, when present, is JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<String>,
}

impl TransportRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: String) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            body: Some(body),
        }
    }
}

/// Status plus a body that is delivered incrementally.
pub struct TransportResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl TransportResponse {
    pub fn new(status: u16, body: ByteStream) -> Self {
        Self { status, body }
    }

    /// Response whose whole body is already in memory.
    pub fn full(status: u16, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self::new(
            status,
            Box::pin(futures_util::stream::once(async move {
                Ok::<_, GeminiError>(body)
            })),
        )
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Collects the remaining body.
    pub async fn bytes(mut self) -> Result<Bytes, GeminiError> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }

    pub async fn text(self) -> Result<String, GeminiError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Turns a non-2xx response into `RequestFailed`, reading the server's
    /// error message from the body.
    pub async fn error_for_status(self) -> Result<Self, GeminiError> {
        if self.is_success() {
            return Ok(self);
        }
        let status = self.status;
        let body = self.text().await.unwrap_or_default();
        Err(GeminiError::RequestFailed {
            status,
            message: error_message(&body),
        })
    }
}

/// Issues HTTP requests for a [`GenerativeModel`](super::GenerativeModel).
///
/// Dropping the future returned by `send`, or the response body stream,
/// must abort the underlying exchange.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, GeminiError>;
}

/// [`Transport`] backed by a `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, GeminiError> {
        let builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self
                .client
                .post(&request.url)
                .header(CONTENT_TYPE, "application/json")
                .body(request.body.unwrap_or_default()),
        };
        let response = builder.send().await?;
        let status = response.status().as_u16();
        debug!("Received HTTP status {}", status);
        let body = response.bytes_stream().map_err(GeminiError::from);
        Ok(TransportResponse::new(status, Box::pin(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_api_envelope() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(error_message(body), "API key not valid. (INVALID_ARGUMENT)");
        assert_eq!(error_message("  upstream timeout \n"), "upstream timeout");
    }

    #[tokio::test]
    async fn non_success_status_becomes_request_failed() {
        let response = TransportResponse::full(
            404,
            r#"{"error":{"code":404,"message":"models/nope is not found"}}"#,
        );
        match response.error_for_status().await {
            Err(GeminiError::RequestFailed { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "models/nope is not found");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn body_collects_all_chunks() {
        let chunks: Vec<Result<Bytes, GeminiError>> =
            vec![Ok(Bytes::from_static(b"hel")), Ok(Bytes::from_static(b"lo"))];
        let body: ByteStream = Box::pin(futures_util::stream::iter(chunks));
        let response = TransportResponse::new(200, body);
        assert!(response.is_success());
        assert_eq!(response.text().await.unwrap(), "hello");
    }
}
