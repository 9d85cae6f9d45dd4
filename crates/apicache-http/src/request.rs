//! Raw HTTP request/response shapes and response decoding.

use std::collections::BTreeMap;
use std::fmt;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

/// A request as the transport sends it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    pub method: Method,
    /// Path segments below the endpoint, unencoded.
    pub path: Vec<String>,
    pub query: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl RawRequest {
    pub fn new(method: Method, path: Vec<String>) -> Self {
        Self {
            method,
            path,
            query: BTreeMap::new(),
            body: None,
        }
    }

    pub fn with_query(mut self, query: BTreeMap<String, String>) -> Self {
        self.query = query;
        self
    }

    /// Attach `value` as a JSON body. An unencodable value is logged and
    /// sent without a body, which the server rejects as an invalid request.
    pub fn with_json<T: Serialize>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => self.body = Some(body),
            Err(e) => warn!(error = %e, path = ?self.path, "Failed to encode request body"),
        }
        self
    }
}

/// What a completed exchange produced, short of a transport error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawResponse {
    Success(Vec<u8>),
    Disallowed,
    NotFound,
}

/// Domain failures every HTTP request can run into.
pub trait HttpFailure: Clone + fmt::Debug + Send + Sync + 'static {
    fn not_found() -> Self;
    fn disallowed() -> Self;
    fn decoding(message: String) -> Self;
}

/// Stock failure type for requests without failures of their own.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestFailure {
    #[error("Resource not found")]
    NotFound,

    #[error("Access disallowed")]
    Disallowed,

    #[error("Failed to decode response: {0}")]
    Decoding(String),
}

impl HttpFailure for RequestFailure {
    fn not_found() -> Self {
        RequestFailure::NotFound
    }

    fn disallowed() -> Self {
        RequestFailure::Disallowed
    }

    fn decoding(message: String) -> Self {
        RequestFailure::Decoding(message)
    }
}

/// Decode a JSON success body, mapping the domain-level responses to failures.
pub fn decode_json<T, F>(response: RawResponse) -> Result<T, F>
where
    T: DeserializeOwned,
    F: HttpFailure,
{
    match response {
        RawResponse::Success(body) => {
            serde_json::from_slice(&body).map_err(|e| F::decoding(e.to_string()))
        }
        RawResponse::Disallowed => Err(F::disallowed()),
        RawResponse::NotFound => Err(F::not_found()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_success() {
        let decoded: Result<Vec<u32>, RequestFailure> =
            decode_json(RawResponse::Success(b"[1,2,3]".to_vec()));
        assert_eq!(decoded, Ok(vec![1, 2, 3]));
    }

    #[test]
    fn test_decode_domain_responses() {
        assert_eq!(
            decode_json::<u32, RequestFailure>(RawResponse::NotFound),
            Err(RequestFailure::NotFound)
        );
        assert_eq!(
            decode_json::<u32, RequestFailure>(RawResponse::Disallowed),
            Err(RequestFailure::Disallowed)
        );
    }

    #[test]
    fn test_decode_error_is_failure() {
        let decoded = decode_json::<u32, RequestFailure>(RawResponse::Success(b"{".to_vec()));
        assert!(matches!(decoded, Err(RequestFailure::Decoding(_))));
    }

    #[test]
    fn test_with_json_sets_body() {
        let request = RawRequest::new(Method::POST, vec!["notes".into()])
            .with_json(&serde_json::json!({ "title": "x" }));
        assert_eq!(request.body.as_deref(), Some(br#"{"title":"x"}"#.as_slice()));
    }
}
