use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use apicache_core::TransportError;

use crate::request::RawResponse;

/// Error codes a server may put in its error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    MissingAuthentication,
    InvalidAuthentication,
    Disallowed,
    InvalidQuery,
    InvalidRequestBody,
    NotFound,
    InternalError,
}

impl ErrorCode {
    /// The HTTP status each code must arrive with.
    pub fn expected_status(&self) -> StatusCode {
        match self {
            ErrorCode::MissingAuthentication | ErrorCode::InvalidAuthentication => {
                StatusCode::UNAUTHORIZED
            }
            ErrorCode::Disallowed => StatusCode::FORBIDDEN,
            ErrorCode::InvalidQuery | ErrorCode::InvalidRequestBody => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Body of a non-200 response: `{ "error": code, "description": text? }`.
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorCode,
    #[serde(default)]
    pub description: Option<String>,
}

/// Turn a non-200 response into either a domain-level raw response
/// (`Disallowed`, `NotFound`) or a transport error.
///
/// The body must be a well-formed envelope whose code matches the status;
/// anything else is a malformed response.
pub fn classify(status: StatusCode, body: &[u8]) -> Result<RawResponse, TransportError> {
    let envelope = match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(envelope) if envelope.error.expected_status() == status => envelope,
        Ok(envelope) => {
            debug!(status = %status, code = ?envelope.error, "Error code does not match status");
            return Err(unexpected_status(status, body));
        }
        Err(e) => {
            debug!(status = %status, error = %e, "Undecodable error envelope");
            return Err(unexpected_status(status, body));
        }
    };

    let detail = envelope.description.unwrap_or_default();
    match envelope.error {
        ErrorCode::MissingAuthentication | ErrorCode::InvalidAuthentication => {
            Err(TransportError::InvalidAuthentication)
        }
        ErrorCode::Disallowed => Ok(RawResponse::Disallowed),
        ErrorCode::NotFound => Ok(RawResponse::NotFound),
        ErrorCode::InvalidQuery | ErrorCode::InvalidRequestBody => Err(
            TransportError::InvalidRequest(TransportError::truncate_detail(&detail)),
        ),
        ErrorCode::InternalError => Err(TransportError::ServerError(
            TransportError::truncate_detail(&detail),
        )),
    }
}

fn unexpected_status(status: StatusCode, body: &[u8]) -> TransportError {
    let body = String::from_utf8_lossy(body);
    TransportError::MalformedResponse(format!(
        "Status {}: {}",
        status,
        TransportError::truncate_detail(&body)
    ))
}

/// Map a reqwest failure that happened before any response arrived.
pub fn from_reqwest(error: &reqwest::Error) -> TransportError {
    if error.is_builder() {
        TransportError::InvalidRequest(error.to_string())
    } else if error.is_timeout() {
        TransportError::Other(format!("Request timed out: {}", error))
    } else {
        TransportError::Other(error.to_string())
    }
}
