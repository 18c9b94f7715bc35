//! HTTP collaborator for the transfer engines.
//!
//! The engines depend on [`HttpTransport`] only: a ranged GET whose body is a
//! byte stream, and a POST taking a [`ProgressBody`]. [`ReqwestTransport`] is
//! the production implementation; tests substitute scripted transports.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, RANGE};
use reqwest::{Body, Client};
use tracing::{debug, instrument};

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::TransferError;
use super::upload::{ProgressBody, UploadReceipt};
use crate::config::TransferConfig;

/// HTTP 206 Partial Content.
pub const STATUS_PARTIAL_CONTENT: u16 = 206;

/// HTTP 416 Range Not Satisfiable.
pub const STATUS_RANGE_NOT_SATISFIABLE: u16 = 416;

/// Response body as a stream of byte chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransferError>>;

/// Successful response to a ranged GET.
pub struct RangedResponse {
    /// HTTP status (206 when the range was honored).
    pub status: u16,
    /// Bytes remaining in the body, when the server said.
    pub content_length: Option<u64>,
    /// The body.
    pub body: ByteStream,
}

impl RangedResponse {
    /// Whether the server honored the requested range.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.status == STATUS_PARTIAL_CONTENT
    }

    /// Whether the requested range starts at or past the end of the resource.
    #[must_use]
    pub fn is_range_not_satisfiable(&self) -> bool {
        self.status == STATUS_RANGE_NOT_SATISFIABLE
    }
}

impl fmt::Debug for RangedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangedResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Range-aware HTTP operations used by the engines.
///
/// Implementations return `Err` for non-success statuses, except that a 416
/// answering a non-zero offset comes back as an empty [`RangedResponse`].
/// Dropping a returned future or body stream must abort the underlying request.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issues `GET url` with `Range: bytes=<offset>-`.
    async fn get_range(&self, url: &str, offset: u64) -> Result<RangedResponse, TransferError>;

    /// Issues `POST url` with a body of known length.
    async fn post(&self, url: &str, body: ProgressBody) -> Result<UploadReceipt, TransferError>;
}

/// [`HttpTransport`] over a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport with default timeouts (30 s connect, 5 min read).
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a transport with explicit timeout values.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialized.
    pub fn new_with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = build_client(connect_timeout_secs, read_timeout_secs)?;
        Ok(Self { client })
    }

    /// Creates a transport using the timeouts in `config`.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialized.
    pub fn from_config(config: &TransferConfig) -> Result<Self, reqwest::Error> {
        Self::new_with_timeouts(config.connect_timeout_secs, config.read_timeout_secs)
    }

    async fn dispatch(
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, TransferError> {
        request
            .send()
            .await
            .map_err(|e| TransferError::from_reqwest(url, &e))
    }

    async fn send(
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, TransferError> {
        let response = Self::dispatch(url, request).await?;
        check_status(url, &response)?;
        Ok(response)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[instrument(level = "debug", skip(self))]
    async fn get_range(&self, url: &str, offset: u64) -> Result<RangedResponse, TransferError> {
        let request = self.client.get(url).header(RANGE, format!("bytes={offset}-"));
        let response = Self::dispatch(url, request).await?;

        let status = response.status().as_u16();
        if status == STATUS_RANGE_NOT_SATISFIABLE && offset > 0 {
            debug!(status, offset, "range starts past the end of the resource");
            return Ok(RangedResponse {
                status,
                content_length: Some(0),
                body: futures_util::stream::empty().boxed(),
            });
        }
        check_status(url, &response)?;

        let content_length = response.content_length();
        debug!(status, content_length, "ranged response received");

        let owned_url = url.to_string();
        let body = response
            .bytes_stream()
            .map_err(move |e| TransferError::from_reqwest(&owned_url, &e))
            .boxed();

        Ok(RangedResponse {
            status,
            content_length,
            body,
        })
    }

    #[instrument(level = "debug", skip(self, body), fields(len = body.content_length()))]
    async fn post(&self, url: &str, body: ProgressBody) -> Result<UploadReceipt, TransferError> {
        let len = body.content_length();
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, body.content_type())
            .header(CONTENT_LENGTH, len);
        let request = if len == 0 {
            request.body(Body::from(Bytes::new()))
        } else {
            request.body(Body::wrap_stream(body.into_stream()))
        };

        let response = Self::send(url, request).await?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransferError::from_reqwest(url, &e))?;
        debug!(status, reply_len = bytes.len(), "upload accepted");

        Ok(UploadReceipt::new(status, bytes))
    }
}

fn check_status(url: &str, response: &reqwest::Response) -> Result<(), TransferError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(TransferError::http_status(url, status.as_u16()))
    }
}

fn build_client(connect_timeout_secs: u64, read_timeout_secs: u64) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(read_timeout_secs))
        .user_agent(concat!("resumable-transfer/", env!("CARGO_PKG_VERSION")))
        .build()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, ResponseTemplate};

    async fn collect(body: ByteStream) -> Vec<u8> {
        body.try_fold(Vec::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_range_sends_range_header_from_zero() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/a.zip"))
            .and(header("Range", "bytes=0-"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 64]))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let response = transport
            .get_range(&format!("{}/a.zip", mock_server.uri()), 0)
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert!(!response.is_partial());
        assert_eq!(response.content_length, Some(64));
        assert_eq!(collect(response.body).await, vec![7u8; 64]);
    }

    #[tokio::test]
    async fn test_get_range_reports_remaining_length_for_206() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/a.zip"))
            .and(header("Range", "bytes=400-"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(vec![1u8; 600]))
            .mount(&mock_server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let response = transport
            .get_range(&format!("{}/a.zip", mock_server.uri()), 400)
            .await
            .unwrap();

        assert!(response.is_partial());
        assert_eq!(response.content_length, Some(600));
    }

    #[tokio::test]
    async fn test_get_range_maps_error_status() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let error = transport
            .get_range(&format!("{}/missing.zip", mock_server.uri()), 0)
            .await
            .unwrap_err();

        assert!(matches!(error, TransferError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_get_range_returns_416_past_the_end_as_empty_response() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(header("Range", "bytes=1000-"))
            .respond_with(ResponseTemplate::new(416))
            .mount(&mock_server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let response = transport
            .get_range(&format!("{}/a.zip", mock_server.uri()), 1000)
            .await
            .unwrap();

        assert!(response.is_range_not_satisfiable());
        assert_eq!(response.content_length, Some(0));
        assert!(collect(response.body).await.is_empty());
    }

    #[tokio::test]
    async fn test_get_range_maps_416_from_zero_to_error() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(416))
            .mount(&mock_server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let error = transport
            .get_range(&format!("{}/a.zip", mock_server.uri()), 0)
            .await
            .unwrap_err();

        assert!(matches!(error, TransferError::HttpStatus { status: 416, .. }));
    }

    #[tokio::test]
    async fn test_get_range_maps_read_timeout() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0u8; 8])
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&mock_server)
            .await;

        let transport = ReqwestTransport::new_with_timeouts(1, 1).unwrap();
        let error = transport
            .get_range(&format!("{}/slow.zip", mock_server.uri()), 0)
            .await
            .unwrap_err();

        assert!(matches!(error, TransferError::Timeout { .. }), "got: {error:?}");
    }

    #[tokio::test]
    async fn test_post_sends_body_with_length_and_content_type() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let payload = b"# notes\n\nhello upload".to_vec();
        Mock::given(method("POST"))
            .and(path("/upload"))
            .and(header("Content-Type", "text/markdown"))
            .and(header("Content-Length", payload.len().to_string().as_str()))
            .and(body_bytes(payload.clone()))
            .respond_with(ResponseTemplate::new(201).set_body_string("{\"ok\":true}"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let body = ProgressBody::new(Bytes::from(payload), 4, "text/markdown");
        let receipt = transport
            .post(&format!("{}/upload", mock_server.uri()), body)
            .await
            .unwrap();

        assert_eq!(receipt.status(), 201);
        assert_eq!(receipt.body().as_ref(), b"{\"ok\":true}");
    }
}
