//! Transport contract consumed by the cache.

use std::future::Future;

use crate::error::ApiError;

/// A remote API that turns raw requests into raw responses.
///
/// The cache never looks inside `RawRequest` or `RawResponse`; building and
/// decoding them is left to the [`Request`](crate::Request) implementations.
pub trait Api: Send + Sync + 'static {
    type RawRequest: Send + 'static;
    type RawResponse: Send + 'static;
    type Error: ApiError;

    /// Send a raw request and wait for the raw response.
    fn make_request(
        &self,
        request: Self::RawRequest,
    ) -> impl Future<Output = Result<Self::RawResponse, Self::Error>> + Send;

    /// Hook for transport errors that should be surfaced globally
    /// (connectivity banners, re-authentication, ...).
    ///
    /// Called once per failed operation, however many callers wait on it.
    fn report_error(&self, _error: &Self::Error) {}
}
