use thiserror::Error;

/// Errors raised by a transport before a response could be decoded.
///
/// These never end up in the cache's failure records: a transport error says
/// nothing about the entity or query itself, so previously cached values are
/// left as they were and the error is only handed to the waiting callers.
pub trait ApiError: std::error::Error + Clone + Send + Sync + 'static {
    /// Whether the error should be passed to [`Api::report_error`](crate::Api::report_error).
    fn should_report(&self) -> bool {
        true
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Authentication missing or rejected")]
    InvalidAuthentication,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Client is unavailable")]
    ClientUnavailable,

    #[error("Transport error: {0}")]
    Other(String),
}

/// Maximum length for detail text carried inside a transport error
const MAX_DETAIL_LENGTH: usize = 500;

impl TransportError {
    /// Truncate detail text to avoid logging excessive data
    pub fn truncate_detail(detail: &str) -> String {
        if detail.len() <= MAX_DETAIL_LENGTH {
            return detail.to_string();
        }
        let mut end = MAX_DETAIL_LENGTH;
        while !detail.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}... (truncated, {} total bytes)",
            &detail[..end],
            detail.len()
        )
    }

    pub fn malformed(detail: impl AsRef<str>) -> Self {
        TransportError::MalformedResponse(Self::truncate_detail(detail.as_ref()))
    }
}

impl ApiError for TransportError {
    fn should_report(&self) -> bool {
        // A deliberately shut down client is not worth surfacing again.
        !matches!(self, TransportError::ClientUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_detail_short() {
        assert_eq!(TransportError::truncate_detail("boom"), "boom");
    }

    #[test]
    fn test_truncate_detail_long() {
        let body = "x".repeat(MAX_DETAIL_LENGTH + 10);
        let truncated = TransportError::truncate_detail(&body);
        assert!(truncated.starts_with(&"x".repeat(MAX_DETAIL_LENGTH)));
        assert!(truncated.ends_with("(truncated, 510 total bytes)"));
    }

    #[test]
    fn test_truncate_detail_respects_char_boundaries() {
        let body = "é".repeat(MAX_DETAIL_LENGTH);
        let truncated = TransportError::truncate_detail(&body);
        assert!(truncated.contains("truncated"));
    }

    #[test]
    fn test_should_report() {
        assert!(TransportError::InvalidAuthentication.should_report());
        assert!(TransportError::ServerError("down".into()).should_report());
        assert!(!TransportError::ClientUnavailable.should_report());
    }
}
