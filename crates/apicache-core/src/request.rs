//! Request contracts consumed by the cache.
//!
//! A request knows how to build the transport's raw request and how to decode
//! the raw response into a typed value or a request-specific domain failure.
//! The cache decides when (and whether) to send it.

use std::fmt;
use std::hash::Hash;

use uuid::Uuid;

use crate::api::Api;
use crate::model::{Entity, Model, ModelContainer, SoftDeletable};

pub trait Request: Send + Sync + 'static {
    type Api: Api;
    type Response: Send + 'static;
    type Failure: Clone + fmt::Debug + Send + Sync + 'static;

    /// Assemble the raw request to send to the API.
    fn make_raw_request(&self) -> <Self::Api as Api>::RawRequest;

    /// Decode the raw response, failing with a domain failure if it is unusable.
    fn decode_raw_response(
        &self,
        response: <Self::Api as Api>::RawResponse,
    ) -> Result<Self::Response, Self::Failure>;
}

/// Send a request and decode its response.
///
/// The outer `Result` carries transport errors, the inner one domain failures.
pub async fn run<R: Request>(
    request: &R,
    api: &R::Api,
) -> Result<Result<R::Response, R::Failure>, <R::Api as Api>::Error> {
    let raw = request.make_raw_request();
    let response = api.make_request(raw).await?;
    Ok(request.decode_raw_response(response))
}

/// Fetches every entity matching a filter.
///
/// The filter is a selection such as "all notes that are archived", not
/// sorting or paging; the cache uses it both to coalesce identical queries
/// and to find cached entities that the server no longer returns.
pub trait ListRequest: Request<Response = Vec<ModelContainer<<Self as ListRequest>::Model>>> {
    type Model: Model;
    type Filter: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static;

    fn filter(&self) -> Self::Filter;

    /// Whether a cached entity belongs to this request's selection.
    fn matches(&self, entity: &Entity<<Self as ListRequest>::Model>) -> bool;
}

pub trait FindRequest: Request<Response = ModelContainer<<Self as FindRequest>::Model>> {
    type Model: Model;

    fn id(&self) -> Uuid;
}

pub trait CreateRequest: Request<Response = ModelContainer<<Self as CreateRequest>::Model>> {
    type Model: Model;

    fn properties(&self) -> &<<Self as CreateRequest>::Model as Model>::Properties;
}

pub trait UpdateRequest: Request<Response = ModelContainer<<Self as UpdateRequest>::Model>> {
    type Model: Model;

    fn id(&self) -> Uuid;
    fn properties(&self) -> &<<Self as UpdateRequest>::Model as Model>::Properties;
}

pub trait DeleteRequest: Request<Response = ModelContainer<<Self as DeleteRequest>::Model>> {
    type Model: Model;

    fn id(&self) -> Uuid;
}

pub trait RestoreRequest: Request<Response = ModelContainer<<Self as RestoreRequest>::Model>> {
    type Model: SoftDeletable;

    fn id(&self) -> Uuid;
}
