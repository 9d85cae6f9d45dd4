//! HTTP transport and stock REST requests for `apicache-core`.
//!
//! [`HttpApi`] implements the core's `Api` contract over JSON/HTTP, and
//! [`Resource`] builds list/find/create/update/delete/restore requests for a
//! model served at `/api/{scheme}`.

pub mod client;
pub mod config;
pub mod credentials;
pub mod endpoint;
pub mod error;
pub mod query;
pub mod request;
pub mod resource;

pub use client::{HttpApi, Options};
pub use config::{ConfigError, HttpConfig};
pub use credentials::{CredentialStore, Credentials};
pub use endpoint::{Endpoint, Scheme};
pub use query::encode_query;
pub use request::{decode_json, HttpFailure, RawRequest, RawResponse, RequestFailure};
pub use reqwest::Method;
pub use resource::{AllModels, Create, Delete, Find, List, ListFilter, Resource, Restore, Update};
