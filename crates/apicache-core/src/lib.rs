//! Typed in-memory cache for remote resource APIs.
//!
//! A [`Cache`] sits in front of an [`Api`] transport and keeps one canonical
//! copy of every entity it has seen, keyed by id. On top of that store it:
//!
//! - coalesces identical in-flight `list` and `find` requests into a single
//!   transport call whose outcome every caller shares;
//! - merges list responses into the store, dropping cached entities that a
//!   filter no longer returns;
//! - orders mutations per id: updates run strictly in submission order, and a
//!   delete never overlaps a restore of the same entity;
//! - exposes synchronous [`CacheEntry`] snapshots (value, last failure,
//!   loading) and a change counter to re-read them on.
//!
//! Requests are plain types implementing [`ListRequest`], [`FindRequest`] and
//! friends; they build the transport's raw request and decode its raw
//! response, and the cache decides when to send them.

mod api;
mod cache;
mod entry;
mod error;
mod model;
mod mutation;
mod operation;
mod request;
mod signature;
mod store;

#[cfg(test)]
mod testing;

pub use api::Api;
pub use cache::Cache;
pub use entry::CacheEntry;
pub use error::{ApiError, TransportError};
pub use model::{Entity, Model, ModelContainer, SoftDeletable};
pub use operation::{Operation, OperationId, Outcome};
pub use request::{
    run, CreateRequest, DeleteRequest, FindRequest, ListRequest, Request, RestoreRequest,
    UpdateRequest,
};
pub use signature::ListSignature;
pub use store::ModelStore;
