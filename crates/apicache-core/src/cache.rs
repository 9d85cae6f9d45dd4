//! The cache: model store, operation registries and outcome records behind
//! one lock, plus list/find execution and the synchronous view.
//!
//! All state lives in a single [`CacheState`] guarded by a mutex that is never
//! held across an `.await`. Registry checks, registrations and store merges
//! are therefore atomic with respect to each other; the only suspension
//! points are the transport call inside an operation and, for mutations,
//! waiting on an earlier conflicting operation.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::Api;
use crate::entry::CacheEntry;
use crate::error::ApiError;
use crate::model::{Entity, Model, ModelContainer};
use crate::operation::{Operation, OperationId, Outcome, Registry};
use crate::request::{self, FindRequest, ListRequest};
use crate::signature::ListSignature;
use crate::store::ModelStore;

/// Outcome of the last completed attempt for an id or list signature.
///
/// Present once any attempt has completed; `failure` holds the domain
/// failure if that attempt failed.
#[derive(Clone, Default)]
pub(crate) struct RequestRecord {
    failure: Option<Arc<dyn Any + Send + Sync>>,
}

impl RequestRecord {
    pub fn succeeded() -> Self {
        Self { failure: None }
    }

    pub fn failed<F: Send + Sync + 'static>(failure: F) -> Self {
        Self {
            failure: Some(Arc::new(failure)),
        }
    }

    /// The recorded failure, if it is of type `F`.
    pub fn failure<F: Clone + 'static>(&self) -> Option<F> {
        self.failure
            .as_ref()
            .and_then(|failure| failure.downcast_ref::<F>())
            .cloned()
    }
}

pub(crate) struct CacheState {
    pub store: ModelStore,
    pub find_records: HashMap<Uuid, RequestRecord>,
    pub list_records: HashMap<ListSignature, RequestRecord>,
    pub list_ops: Registry<ListSignature>,
    pub find_ops: Registry<Uuid>,
    pub update_ops: Registry<Uuid>,
    pub delete_ops: Registry<Uuid>,
    pub restore_ops: Registry<Uuid>,
    next_operation: u64,
}

impl CacheState {
    fn new() -> Self {
        Self {
            store: ModelStore::new(),
            find_records: HashMap::new(),
            list_records: HashMap::new(),
            list_ops: Registry::new(),
            find_ops: Registry::new(),
            update_ops: Registry::new(),
            delete_ops: Registry::new(),
            restore_ops: Registry::new(),
            next_operation: 0,
        }
    }

    pub fn next_operation_id(&mut self) -> OperationId {
        self.next_operation += 1;
        OperationId::new(self.next_operation)
    }

    /// Upsert an entity. A fresh value supersedes any failure recorded for
    /// its id.
    pub fn set_model<M: Model>(&mut self, id: Uuid, properties: M::Properties) -> Entity<M> {
        self.clear_find_failure(&id);
        self.store.upsert::<M>(id, properties)
    }

    pub fn remove_model(&mut self, id: &Uuid) {
        self.clear_find_failure(id);
        self.store.remove(id);
    }

    /// Drop the failure recorded for `id`, keeping the fact that a find
    /// completed.
    fn clear_find_failure(&mut self, id: &Uuid) {
        if let Some(record) = self.find_records.get_mut(id) {
            *record = RequestRecord::succeeded();
        }
    }

    /// Reconcile a successful list response into the store.
    ///
    /// Cached entities matching the request's filter that the response no
    /// longer contains are removed; every returned entity is upserted.
    fn merge_list<R: ListRequest>(
        &mut self,
        request: &R,
        signature: &ListSignature,
        containers: Vec<ModelContainer<R::Model>>,
    ) -> Vec<Entity<R::Model>> {
        let returned: HashSet<Uuid> = containers.iter().map(|c| c.id).collect();
        let vanished: Vec<Uuid> = self
            .store
            .iter::<R::Model>()
            .filter(|entity| request.matches(entity) && !returned.contains(&entity.id))
            .map(|entity| entity.id)
            .collect();

        for id in &vanished {
            self.remove_model(id);
        }

        debug!(
            scheme = signature.scheme(),
            received = containers.len(),
            removed = vanished.len(),
            "Merged list response"
        );

        let entities = containers
            .into_iter()
            .map(|container| self.set_model::<R::Model>(container.id, container.properties))
            .collect();

        self.list_records
            .insert(signature.clone(), RequestRecord::succeeded());
        entities
    }

    fn pending_operations(&self) -> usize {
        self.list_ops.len()
            + self.find_ops.len()
            + self.update_ops.len()
            + self.delete_ops.len()
            + self.restore_ops.len()
    }
}

pub(crate) struct Inner<A: Api> {
    pub api: A,
    state: Mutex<CacheState>,
    changes: watch::Sender<u64>,
}

impl<A: Api> Inner<A> {
    pub fn lock(&self) -> MutexGuard<'_, CacheState> {
        // State is only touched in short sections that cannot leave it half
        // updated, so a poisoned lock is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn notify(&self) {
        self.changes.send_modify(|revision| *revision += 1);
    }

    /// Apply an operation's outcome to the cache and deregister it.
    ///
    /// `merge` runs on success, `record_failure` on a domain failure and
    /// `release` always; all three run under one lock acquisition. Transport
    /// errors touch no state besides the release.
    pub fn complete<T, V, F>(
        &self,
        kind: &'static str,
        outcome: Outcome<T, F, A::Error>,
        merge: impl FnOnce(&mut CacheState, T) -> V,
        record_failure: impl FnOnce(&mut CacheState, &F),
        release: impl FnOnce(&mut CacheState),
    ) -> Outcome<V, F, A::Error>
    where
        F: std::fmt::Debug,
    {
        let result = {
            let mut guard = self.lock();
            let state: &mut CacheState = &mut guard;
            let result = match outcome {
                Ok(Ok(response)) => Ok(Ok(merge(&mut *state, response))),
                Ok(Err(failure)) => {
                    debug!(kind, failure = ?failure, "Operation completed with failure");
                    record_failure(&mut *state, &failure);
                    Ok(Err(failure))
                }
                Err(error) => Err(error),
            };
            release(state);
            result
        };

        if let Err(error) = &result {
            warn!(kind, error = %error, "Operation failed in transport");
            if error.should_report() {
                self.api.report_error(error);
            }
        }

        self.notify();
        result
    }
}

/// Typed in-memory cache in front of an [`Api`].
///
/// Cloning is cheap and yields a handle to the same cache. Operations are
/// spawned onto the current Tokio runtime, so `list`, `find` and the mutation
/// methods must be called from within one.
pub struct Cache<A: Api> {
    pub(crate) inner: Arc<Inner<A>>,
}

impl<A: Api> Clone for Cache<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: Api> Cache<A> {
    pub fn new(api: A) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                api,
                state: Mutex::new(CacheState::new()),
                changes,
            }),
        }
    }

    pub fn api(&self) -> &A {
        &self.inner.api
    }

    // ===== Execution =====

    /// Fetch every entity matching a list request.
    ///
    /// Joins the pending operation if an identical query is already in
    /// flight; otherwise starts one. On success, cached entities matching the
    /// filter but missing from the response are removed.
    pub fn list<R>(&self, request: R) -> Operation<Vec<Entity<R::Model>>, R::Failure, A::Error>
    where
        R: ListRequest<Api = A>,
    {
        let signature = ListSignature::of(&request);
        let mut state = self.inner.lock();

        if let Some(operation) = state.list_ops.get(&signature) {
            debug!(
                scheme = signature.scheme(),
                operation = %operation.id(),
                "Joining pending list operation"
            );
            return operation;
        }

        let id = state.next_operation_id();
        let inner = Arc::clone(&self.inner);
        let key = signature.clone();
        let operation = Operation::new(id, async move {
            let outcome = request::run(&request, &inner.api).await;
            inner.complete(
                "list",
                outcome,
                |state, containers| state.merge_list(&request, &key, containers),
                |state, failure| {
                    state
                        .list_records
                        .insert(key.clone(), RequestRecord::failed(failure.clone()));
                },
                |state| {
                    state.list_ops.release(&key, id);
                },
            )
        });

        debug!(scheme = signature.scheme(), operation = %id, filter = ?signature, "Starting list operation");
        state.list_ops.insert(signature, &operation);
        drop(state);

        operation.start();
        self.inner.notify();
        operation
    }

    /// Fetch one entity by id.
    ///
    /// A domain failure is recorded for the id but leaves a previously cached
    /// entity in place.
    pub fn find<R>(&self, request: R) -> Operation<Entity<R::Model>, R::Failure, A::Error>
    where
        R: FindRequest<Api = A>,
    {
        let entity_id = request.id();
        let scheme = <R::Model as Model>::SCHEME;
        let mut state = self.inner.lock();

        if let Some(operation) = state.find_ops.get(&entity_id) {
            debug!(
                scheme,
                id = %entity_id,
                operation = %operation.id(),
                "Joining pending find operation"
            );
            return operation;
        }

        let id = state.next_operation_id();
        let inner = Arc::clone(&self.inner);
        let operation = Operation::new(id, async move {
            let outcome = request::run(&request, &inner.api).await;
            inner.complete(
                "find",
                outcome,
                |state, container| {
                    let entity = state.set_model::<R::Model>(container.id, container.properties);
                    state.find_records.insert(entity_id, RequestRecord::succeeded());
                    entity
                },
                |state, failure| {
                    state
                        .find_records
                        .insert(entity_id, RequestRecord::failed(failure.clone()));
                },
                |state| {
                    state.find_ops.release(&entity_id, id);
                },
            )
        });

        debug!(scheme, id = %entity_id, operation = %id, "Starting find operation");
        state.find_ops.insert(entity_id, &operation);
        drop(state);

        operation.start();
        self.inner.notify();
        operation
    }

    // ===== Views =====

    /// Snapshot for a list request, or `None` if the query was never issued,
    /// is not pending and no matching entity is cached.
    pub fn list_entry<R>(
        &self,
        request: &R,
    ) -> Option<CacheEntry<HashMap<Uuid, Entity<R::Model>>, R::Failure>>
    where
        R: ListRequest<Api = A>,
    {
        let signature = ListSignature::of(request);
        let state = self.inner.lock();

        let value: HashMap<Uuid, Entity<R::Model>> = state
            .store
            .iter::<R::Model>()
            .filter(|entity| request.matches(entity))
            .map(|entity| (entity.id, entity.clone()))
            .collect();
        let record = state.list_records.get(&signature);
        let loading = state.list_ops.contains(&signature);

        if record.is_none() && !loading && value.is_empty() {
            return None;
        }

        let failure = record.and_then(RequestRecord::failure::<R::Failure>);
        Some(CacheEntry::new(value, failure, loading))
    }

    /// Snapshot for a find request, or `None` if the id was never fetched,
    /// is not pending and is not cached.
    pub fn find_entry<R>(&self, request: &R) -> Option<CacheEntry<Option<Entity<R::Model>>, R::Failure>>
    where
        R: FindRequest<Api = A>,
    {
        let id = request.id();
        let state = self.inner.lock();

        let value = state.store.get::<R::Model>(&id);
        let record = state.find_records.get(&id);
        let loading = state.find_ops.contains(&id);

        if record.is_none() && !loading && value.is_none() {
            return None;
        }

        let failure = record.and_then(RequestRecord::failure::<R::Failure>);
        Some(CacheEntry::new(value, failure, loading))
    }

    /// A cached entity, regardless of which request produced it.
    pub fn entity<M: Model>(&self, id: &Uuid) -> Option<Entity<M>> {
        self.inner.lock().store.get::<M>(id)
    }

    /// All cached entities of one model.
    pub fn entities<M: Model>(&self) -> HashMap<Uuid, Entity<M>> {
        self.inner.lock().store.all::<M>()
    }

    /// Number of operations currently registered.
    pub fn pending_operations(&self) -> usize {
        self.inner.lock().pending_operations()
    }

    // ===== Invalidation =====

    /// Receiver for the change counter, bumped on every state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.inner.changes.borrow()
    }

    /// Clear all cached entities and outcome records.
    ///
    /// Pending operations keep running and merge their results once done.
    pub fn nuke(&self) {
        {
            let mut state = self.inner.lock();
            debug!(
                entities = state.store.len(),
                pending = state.pending_operations(),
                "Nuking cache"
            );
            state.store.clear();
            state.find_records.clear();
            state.list_records.clear();
        }
        self.inner.notify();
    }
}
