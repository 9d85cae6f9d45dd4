//! Test fixtures: a scripted in-memory transport and a small note model.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::api::Api;
use crate::error::TransportError;
use crate::model::{Entity, Model, ModelContainer, SoftDeletable};
use crate::request::{
    CreateRequest, DeleteRequest, FindRequest, ListRequest, Request, RestoreRequest, UpdateRequest,
};

// ===== Models =====

pub struct Note;

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteProps {
    pub title: String,
    pub archived: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl NoteProps {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }
}

impl Model for Note {
    type Properties = NoteProps;

    const SCHEME: &'static str = "notes";

    fn deleted_at(properties: &NoteProps) -> Option<DateTime<Utc>> {
        properties.deleted_at
    }
}

impl SoftDeletable for Note {}

pub struct Tag;

impl Model for Tag {
    type Properties = String;

    const SCHEME: &'static str = "tags";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteFailure {
    NotFound,
    Invalid(String),
}

// ===== Transport =====

/// What a request handed to the mock transport.
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub op: &'static str,
    pub id: Option<Uuid>,
    pub title: Option<String>,
}

impl MockRequest {
    fn new(op: &'static str) -> Self {
        Self {
            op,
            id: None,
            title: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum MockResponse {
    Notes(Vec<(Uuid, NoteProps)>),
    Failure(NoteFailure),
}

impl MockResponse {
    pub fn one(id: Uuid, properties: NoteProps) -> Self {
        Self::Notes(vec![(id, properties)])
    }

    pub fn many(notes: Vec<(Uuid, NoteProps)>) -> Self {
        Self::Notes(notes)
    }
}

/// Blocks scripted responses until opened.
#[derive(Clone)]
pub struct Gate(Arc<Semaphore>);

impl Gate {
    pub fn new() -> Self {
        Self(Arc::new(Semaphore::new(0)))
    }

    /// Release every current and future waiter.
    pub fn open(&self) {
        self.0.close();
    }

    async fn wait(&self) {
        match self.0.acquire().await {
            Err(_closed) => {}
            Ok(_) => unreachable!("gate permits are never added"),
        }
    }
}

struct Scripted {
    gate: Option<Gate>,
    result: Result<MockResponse, TransportError>,
}

#[derive(Default)]
struct MockState {
    script: VecDeque<Scripted>,
    calls: Vec<MockRequest>,
    reported: Vec<TransportError>,
}

/// Transport that answers requests from a script, in call order.
#[derive(Clone, Default)]
pub struct MockApi {
    state: Arc<Mutex<MockState>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, gate: Option<Gate>, result: Result<MockResponse, TransportError>) {
        self.state
            .lock()
            .expect("mock state")
            .script
            .push_back(Scripted { gate, result });
    }

    pub fn respond(&self, response: MockResponse) {
        self.push(None, Ok(response));
    }

    /// Script a response that is only delivered once `gate` opens.
    pub fn respond_after(&self, gate: &Gate, response: MockResponse) {
        self.push(Some(gate.clone()), Ok(response));
    }

    pub fn fail(&self, error: TransportError) {
        self.push(None, Err(error));
    }

    pub fn calls(&self) -> Vec<MockRequest> {
        self.state.lock().expect("mock state").calls.clone()
    }

    pub fn reported(&self) -> Vec<TransportError> {
        self.state.lock().expect("mock state").reported.clone()
    }
}

impl Api for MockApi {
    type RawRequest = MockRequest;
    type RawResponse = MockResponse;
    type Error = TransportError;

    async fn make_request(&self, request: MockRequest) -> Result<MockResponse, TransportError> {
        let scripted = {
            let mut state = self.state.lock().expect("mock state");
            state.calls.push(request);
            state.script.pop_front()
        };

        let Some(scripted) = scripted else {
            return Err(TransportError::Other("no scripted response".into()));
        };
        if let Some(gate) = scripted.gate {
            gate.wait().await;
        }
        scripted.result
    }

    fn report_error(&self, error: &TransportError) {
        self.state
            .lock()
            .expect("mock state")
            .reported
            .push(error.clone());
    }
}

/// Let spawned operations run until they block.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

// ===== Requests =====

fn containers(response: MockResponse) -> Result<Vec<ModelContainer<Note>>, NoteFailure> {
    match response {
        MockResponse::Notes(notes) => Ok(notes
            .into_iter()
            .map(|(id, properties)| ModelContainer::new(id, properties))
            .collect()),
        MockResponse::Failure(failure) => Err(failure),
    }
}

fn single(response: MockResponse) -> Result<ModelContainer<Note>, NoteFailure> {
    containers(response)?
        .into_iter()
        .next()
        .ok_or(NoteFailure::NotFound)
}

pub struct ListNotes {
    archived: Option<bool>,
}

impl ListNotes {
    pub fn all() -> Self {
        Self { archived: None }
    }

    pub fn archived(archived: bool) -> Self {
        Self {
            archived: Some(archived),
        }
    }
}

impl Request for ListNotes {
    type Api = MockApi;
    type Response = Vec<ModelContainer<Note>>;
    type Failure = NoteFailure;

    fn make_raw_request(&self) -> MockRequest {
        MockRequest::new("list")
    }

    fn decode_raw_response(&self, response: MockResponse) -> Result<Self::Response, NoteFailure> {
        containers(response)
    }
}

impl ListRequest for ListNotes {
    type Model = Note;
    type Filter = Option<bool>;

    fn filter(&self) -> Option<bool> {
        self.archived
    }

    fn matches(&self, entity: &Entity<Note>) -> bool {
        self.archived
            .map_or(true, |archived| entity.properties.archived == archived)
    }
}

macro_rules! by_id_request {
    ($name:ident, $trait:ident, $op:literal) => {
        pub struct $name {
            id: Uuid,
        }

        impl $name {
            pub fn new(id: Uuid) -> Self {
                Self { id }
            }
        }

        impl Request for $name {
            type Api = MockApi;
            type Response = ModelContainer<Note>;
            type Failure = NoteFailure;

            fn make_raw_request(&self) -> MockRequest {
                MockRequest {
                    id: Some(self.id),
                    ..MockRequest::new($op)
                }
            }

            fn decode_raw_response(
                &self,
                response: MockResponse,
            ) -> Result<ModelContainer<Note>, NoteFailure> {
                single(response)
            }
        }

        impl $trait for $name {
            type Model = Note;

            fn id(&self) -> Uuid {
                self.id
            }
        }
    };
}

by_id_request!(FindNote, FindRequest, "find");
by_id_request!(DeleteNote, DeleteRequest, "delete");
by_id_request!(RestoreNote, RestoreRequest, "restore");

pub struct CreateNote {
    properties: NoteProps,
}

impl CreateNote {
    pub fn new(properties: NoteProps) -> Self {
        Self { properties }
    }
}

impl Request for CreateNote {
    type Api = MockApi;
    type Response = ModelContainer<Note>;
    type Failure = NoteFailure;

    fn make_raw_request(&self) -> MockRequest {
        MockRequest {
            title: Some(self.properties.title.clone()),
            ..MockRequest::new("create")
        }
    }

    fn decode_raw_response(&self, response: MockResponse) -> Result<ModelContainer<Note>, NoteFailure> {
        single(response)
    }
}

impl CreateRequest for CreateNote {
    type Model = Note;

    fn properties(&self) -> &NoteProps {
        &self.properties
    }
}

pub struct UpdateNote {
    id: Uuid,
    properties: NoteProps,
}

impl UpdateNote {
    pub fn new(id: Uuid, properties: NoteProps) -> Self {
        Self { id, properties }
    }
}

impl Request for UpdateNote {
    type Api = MockApi;
    type Response = ModelContainer<Note>;
    type Failure = NoteFailure;

    fn make_raw_request(&self) -> MockRequest {
        MockRequest {
            id: Some(self.id),
            title: Some(self.properties.title.clone()),
            ..MockRequest::new("update")
        }
    }

    fn decode_raw_response(&self, response: MockResponse) -> Result<ModelContainer<Note>, NoteFailure> {
        single(response)
    }
}

impl UpdateRequest for UpdateNote {
    type Model = Note;

    fn id(&self) -> Uuid {
        self.id
    }

    fn properties(&self) -> &NoteProps {
        &self.properties
    }
}
