//! Stock requests for a conventional REST resource.
//!
//! | request  | method | path          | extras                         |
//! |----------|--------|---------------|--------------------------------|
//! | list     | GET    | `[scheme]`    | filter query parameters        |
//! | find     | GET    | `[scheme, id]`|                                |
//! | create   | POST   | `[scheme]`    | JSON body                      |
//! | update   | PATCH  | `[scheme, id]`| JSON body, scalar query params |
//! | delete   | DELETE | `[scheme, id]`| `force=true` when forced       |
//! | restore  | PUT    | `[scheme, id]`|                                |

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use reqwest::Method;
use uuid::Uuid;

use apicache_core::{
    CreateRequest, DeleteRequest, Entity, FindRequest, ListRequest, Model, ModelContainer, Request,
    RestoreRequest, SoftDeletable, UpdateRequest,
};

use crate::client::HttpApi;
use crate::query::encode_query;
use crate::request::{decode_json, HttpFailure, RawRequest, RawResponse, RequestFailure};

/// A selection of entities of `M` for list requests.
pub trait ListFilter<M: Model>: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static {
    /// Query parameters sent to the server.
    fn query(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Whether a cached entity falls inside the selection.
    fn matches(&self, entity: &Entity<M>) -> bool;
}

/// Selects every entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AllModels;

impl<M: Model> ListFilter<M> for AllModels {
    fn matches(&self, _entity: &Entity<M>) -> bool {
        true
    }
}

fn collection_path<M: Model>() -> Vec<String> {
    vec![M::SCHEME.to_string()]
}

fn entity_path<M: Model>(id: Uuid) -> Vec<String> {
    vec![M::SCHEME.to_string(), id.to_string()]
}

type Marker<M, F> = PhantomData<fn() -> (M, F)>;

/// Request suite for one model.
pub struct Resource<M, F = RequestFailure> {
    _marker: Marker<M, F>,
}

impl<M, F> Default for Resource<M, F> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<M, F> Clone for Resource<M, F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M, F> Copy for Resource<M, F> {}

impl<M: Model, F: HttpFailure> Resource<M, F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> List<M, F> {
        self.list_where(AllModels)
    }

    pub fn list_where<P: ListFilter<M>>(&self, filter: P) -> List<M, F, P> {
        List {
            filter,
            _marker: PhantomData,
        }
    }

    pub fn find(&self, id: Uuid) -> Find<M, F> {
        Find {
            id,
            _marker: PhantomData,
        }
    }

    pub fn create(&self, properties: M::Properties) -> Create<M, F> {
        Create {
            properties,
            _marker: PhantomData,
        }
    }

    pub fn update(&self, id: Uuid, properties: M::Properties) -> Update<M, F> {
        Update {
            id,
            properties,
            _marker: PhantomData,
        }
    }

    pub fn delete(&self, id: Uuid) -> Delete<M, F> {
        Delete {
            id,
            force: false,
            _marker: PhantomData,
        }
    }

    /// Delete bypassing soft deletion.
    ///
    /// The cache joins deletes by id, so a forced delete issued while a
    /// plain delete of the same id is pending resolves with that plain
    /// delete and sends nothing. Await the pending delete first to force.
    pub fn force_delete(&self, id: Uuid) -> Delete<M, F> {
        Delete {
            id,
            force: true,
            _marker: PhantomData,
        }
    }
}

impl<M: SoftDeletable, F: HttpFailure> Resource<M, F> {
    pub fn restore(&self, id: Uuid) -> Restore<M, F> {
        Restore {
            id,
            _marker: PhantomData,
        }
    }
}

// ===== List =====

pub struct List<M, F = RequestFailure, P = AllModels> {
    filter: P,
    _marker: Marker<M, F>,
}

impl<M: Model, F: HttpFailure, P: ListFilter<M>> Request for List<M, F, P> {
    type Api = HttpApi;
    type Response = Vec<ModelContainer<M>>;
    type Failure = F;

    fn make_raw_request(&self) -> RawRequest {
        RawRequest::new(Method::GET, collection_path::<M>()).with_query(self.filter.query())
    }

    fn decode_raw_response(&self, response: RawResponse) -> Result<Self::Response, F> {
        decode_json(response)
    }
}

impl<M: Model, F: HttpFailure, P: ListFilter<M>> ListRequest for List<M, F, P> {
    type Model = M;
    type Filter = P;

    fn filter(&self) -> P {
        self.filter.clone()
    }

    fn matches(&self, entity: &Entity<M>) -> bool {
        self.filter.matches(entity)
    }
}

// ===== Find =====

pub struct Find<M, F = RequestFailure> {
    id: Uuid,
    _marker: Marker<M, F>,
}

impl<M: Model, F: HttpFailure> Request for Find<M, F> {
    type Api = HttpApi;
    type Response = ModelContainer<M>;
    type Failure = F;

    fn make_raw_request(&self) -> RawRequest {
        RawRequest::new(Method::GET, entity_path::<M>(self.id))
    }

    fn decode_raw_response(&self, response: RawResponse) -> Result<ModelContainer<M>, F> {
        decode_json(response)
    }
}

impl<M: Model, F: HttpFailure> FindRequest for Find<M, F> {
    type Model = M;

    fn id(&self) -> Uuid {
        self.id
    }
}

// ===== Create =====

pub struct Create<M: Model, F = RequestFailure> {
    properties: M::Properties,
    _marker: Marker<M, F>,
}

impl<M: Model, F: HttpFailure> Request for Create<M, F> {
    type Api = HttpApi;
    type Response = ModelContainer<M>;
    type Failure = F;

    fn make_raw_request(&self) -> RawRequest {
        RawRequest::new(Method::POST, collection_path::<M>()).with_json(&self.properties)
    }

    fn decode_raw_response(&self, response: RawResponse) -> Result<ModelContainer<M>, F> {
        decode_json(response)
    }
}

impl<M: Model, F: HttpFailure> CreateRequest for Create<M, F> {
    type Model = M;

    fn properties(&self) -> &M::Properties {
        &self.properties
    }
}

// ===== Update =====

pub struct Update<M: Model, F = RequestFailure> {
    id: Uuid,
    properties: M::Properties,
    _marker: Marker<M, F>,
}

impl<M: Model, F: HttpFailure> Request for Update<M, F> {
    type Api = HttpApi;
    type Response = ModelContainer<M>;
    type Failure = F;

    fn make_raw_request(&self) -> RawRequest {
        RawRequest::new(Method::PATCH, entity_path::<M>(self.id))
            .with_query(encode_query(&self.properties))
            .with_json(&self.properties)
    }

    fn decode_raw_response(&self, response: RawResponse) -> Result<ModelContainer<M>, F> {
        decode_json(response)
    }
}

impl<M: Model, F: HttpFailure> UpdateRequest for Update<M, F> {
    type Model = M;

    fn id(&self) -> Uuid {
        self.id
    }

    fn properties(&self) -> &M::Properties {
        &self.properties
    }
}

// ===== Delete / Restore =====

pub struct Delete<M, F = RequestFailure> {
    id: Uuid,
    force: bool,
    _marker: Marker<M, F>,
}

impl<M, F> Delete<M, F> {
    pub fn is_forced(&self) -> bool {
        self.force
    }
}

impl<M: Model, F: HttpFailure> Request for Delete<M, F> {
    type Api = HttpApi;
    type Response = ModelContainer<M>;
    type Failure = F;

    fn make_raw_request(&self) -> RawRequest {
        let mut request = RawRequest::new(Method::DELETE, entity_path::<M>(self.id));
        if self.force {
            request.query.insert("force".to_string(), "true".to_string());
        }
        request
    }

    fn decode_raw_response(&self, response: RawResponse) -> Result<ModelContainer<M>, F> {
        decode_json(response)
    }
}

impl<M: Model, F: HttpFailure> DeleteRequest for Delete<M, F> {
    type Model = M;

    fn id(&self) -> Uuid {
        self.id
    }
}

pub struct Restore<M, F = RequestFailure> {
    id: Uuid,
    _marker: Marker<M, F>,
}

impl<M: SoftDeletable, F: HttpFailure> Request for Restore<M, F> {
    type Api = HttpApi;
    type Response = ModelContainer<M>;
    type Failure = F;

    fn make_raw_request(&self) -> RawRequest {
        RawRequest::new(Method::PUT, entity_path::<M>(self.id))
    }

    fn decode_raw_response(&self, response: RawResponse) -> Result<ModelContainer<M>, F> {
        decode_json(response)
    }
}

impl<M: SoftDeletable, F: HttpFailure> RestoreRequest for Restore<M, F> {
    type Model = M;

    fn id(&self) -> Uuid {
        self.id
    }
}
