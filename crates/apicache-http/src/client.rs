//! HTTP transport for the cache.
//!
//! `HttpApi` sends [`RawRequest`]s to an [`Endpoint`] with optional basic
//! credentials, caps response size, retries rate-limited requests with
//! exponential backoff and classifies non-200 responses via their error
//! envelope.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use apicache_core::{Api, TransportError};

use crate::credentials::Credentials;
use crate::endpoint::Endpoint;
use crate::error::{classify, from_reqwest};
use crate::request::{RawRequest, RawResponse};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Largest response body accepted, in bytes.
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 10_000_000;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    pub timeout: Duration,
    pub max_response_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
        }
    }
}

/// Transport talking JSON over HTTP.
pub struct HttpApi {
    client: Client,
    endpoint: Endpoint,
    credentials: Option<Credentials>,
    options: Options,
    shut_down: AtomicBool,
}

impl HttpApi {
    pub fn new(endpoint: Endpoint, credentials: Option<Credentials>) -> Result<Self, TransportError> {
        Self::with_options(endpoint, credentials, Options::default())
    }

    pub fn with_options(
        endpoint: Endpoint,
        credentials: Option<Credentials>,
        options: Options,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| from_reqwest(&e))?;

        Ok(Self {
            client,
            endpoint,
            credentials,
            options,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Refuse all further requests with [`TransportError::ClientUnavailable`].
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    async fn send(&self, request: &RawRequest) -> Result<reqwest::Response, TransportError> {
        let url = self.endpoint.url_for(request)?;
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let mut builder = self.client.request(request.method.clone(), url.clone());
            if let Some(credentials) = &self.credentials {
                builder = builder.basic_auth(&credentials.username, Some(&credentials.password));
            }
            if let Some(body) = &request.body {
                builder = builder
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(body.clone());
            }

            debug!(method = %request.method, url = %url, "Sending request");
            let response = builder.send().await.map_err(|e| {
                warn!(method = %request.method, url = %url, error = %e, "Request failed");
                from_reqwest(&e)
            })?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }

            retries += 1;
            if retries > MAX_RATE_LIMIT_RETRIES {
                return Ok(response);
            }
            warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            backoff_ms *= 2;
        }
    }

    /// Read the whole body, failing once it exceeds the size cap.
    async fn read_body(&self, mut response: reqwest::Response) -> Result<Vec<u8>, TransportError> {
        let limit = self.options.max_response_size;
        if let Some(length) = response.content_length() {
            if length > limit as u64 {
                return Err(too_large(limit));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| from_reqwest(&e))? {
            if body.len() + chunk.len() > limit {
                return Err(too_large(limit));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

fn too_large(limit: usize) -> TransportError {
    TransportError::MalformedResponse(format!("Response exceeds {} bytes", limit))
}

/// Statuses that never carry a body worth decoding.
fn has_no_body(status: StatusCode) -> bool {
    status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

impl Api for HttpApi {
    type RawRequest = RawRequest;
    type RawResponse = RawResponse;
    type Error = TransportError;

    async fn make_request(&self, request: RawRequest) -> Result<RawResponse, TransportError> {
        if self.is_shut_down() {
            return Err(TransportError::ClientUnavailable);
        }

        let response = self.send(&request).await?;
        let status = response.status();
        if has_no_body(status) {
            return Err(TransportError::MalformedResponse(format!("Status {}", status)));
        }

        let body = self.read_body(response).await?;
        if status == StatusCode::OK {
            return Ok(RawResponse::Success(body));
        }

        classify(status, &body)
    }

    fn report_error(&self, error: &TransportError) {
        warn!(host = %self.endpoint.host, error = %error, "Transport error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Scheme;

    fn api() -> HttpApi {
        HttpApi::new(Endpoint::new(Scheme::Http, "localhost", 9), None).expect("client")
    }

    #[test]
    fn test_default_options() {
        let options = Options::default();
        assert_eq!(options.timeout, Duration::from_secs(10));
        assert_eq!(options.max_response_size, 10_000_000);
    }

    #[test]
    fn test_statuses_without_body() {
        assert!(has_no_body(StatusCode::NO_CONTENT));
        assert!(has_no_body(StatusCode::CONTINUE));
        assert!(!has_no_body(StatusCode::OK));
        assert!(!has_no_body(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_shut_down_client_is_unavailable() {
        let api = api();
        api.shutdown();

        let request = RawRequest::new(reqwest::Method::GET, vec!["notes".into()]);
        assert_eq!(
            api.make_request(request).await,
            Err(TransportError::ClientUnavailable)
        );
    }

    #[tokio::test]
    async fn test_invalid_endpoint_is_invalid_request() {
        let api = HttpApi::new(Endpoint::new(Scheme::Http, "bad host", 80), None).expect("client");
        let request = RawRequest::new(reqwest::Method::GET, vec!["notes".into()]);
        assert!(matches!(
            api.make_request(request).await,
            Err(TransportError::InvalidRequest(_))
        ));
    }
}
