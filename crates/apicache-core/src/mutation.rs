//! Create, update, delete and restore, with their ordering rules.
//!
//! - Updates of one id form a FIFO chain: each update registers as the new
//!   tail at call time and only reaches the transport once the previous tail
//!   has completed. A slow update can never overwrite a later one.
//! - Deletes and restores of one id exclude each other: each waits for a
//!   pending operation of the opposite kind before sending its own request.
//!   A pending delete (or restore) is joined only while no operation of the
//!   opposite kind was submitted after it.
//! - Creates have no ordering constraint.
//!
//! Domain failures of mutations are returned to the caller but not recorded.

use std::sync::Arc;

use tracing::debug;

use crate::api::Api;
use crate::cache::Cache;
use crate::model::{Entity, Model};
use crate::operation::{Completion, Operation, OperationId};
use crate::request::{self, CreateRequest, DeleteRequest, RestoreRequest, UpdateRequest};

type Properties<M> = <M as Model>::Properties;

impl<A: Api> Cache<A> {
    pub fn create<R>(&self, request: R) -> Operation<Entity<R::Model>, R::Failure, A::Error>
    where
        R: CreateRequest<Api = A>,
    {
        let id = self.inner.lock().next_operation_id();
        let inner = Arc::clone(&self.inner);
        let operation = Operation::new(id, async move {
            let outcome = request::run(&request, &inner.api).await;
            inner.complete(
                "create",
                outcome,
                |state, container| state.set_model::<R::Model>(container.id, container.properties),
                |_, _| {},
                |_| {},
            )
        });

        let scheme = <R::Model as Model>::SCHEME;
        debug!(scheme, operation = %id, "Starting create operation");
        operation.start();
        operation
    }

    pub fn update<R>(&self, request: R) -> Operation<Entity<R::Model>, R::Failure, A::Error>
    where
        R: UpdateRequest<Api = A>,
    {
        let entity_id = request.id();
        let mut state = self.inner.lock();
        let previous = state.update_ops.completion(&entity_id);
        let id = state.next_operation_id();

        let inner = Arc::clone(&self.inner);
        let operation = Operation::new(id, async move {
            if let Some((previous_id, previous)) = previous {
                debug!(
                    id = %entity_id,
                    operation = %id,
                    waiting_for = %previous_id,
                    "Update queued behind pending update"
                );
                previous.await;
            }

            let outcome = request::run(&request, &inner.api).await;
            inner.complete(
                "update",
                outcome,
                |state, container| state.set_model::<R::Model>(container.id, container.properties),
                |_, _| {},
                |state| {
                    state.update_ops.release(&entity_id, id);
                },
            )
        });

        let scheme = <R::Model as Model>::SCHEME;
        debug!(scheme, id = %entity_id, operation = %id, "Starting update operation");
        state.update_ops.insert(entity_id, &operation);
        drop(state);

        operation.start();
        self.inner.notify();
        operation
    }

    /// Delete an entity.
    ///
    /// If the response still carries the entity with a deletion timestamp
    /// (soft delete), the tombstone is cached; otherwise the entity is
    /// removed. Resolves to the properties returned by the server.
    ///
    /// Deletes are joined by id alone: a second delete of an id whose delete
    /// is still pending gets that operation back, whatever its own request
    /// parameters are.
    pub fn delete<R>(&self, request: R) -> Operation<Properties<R::Model>, R::Failure, A::Error>
    where
        R: DeleteRequest<Api = A>,
    {
        let entity_id = request.id();
        let mut state = self.inner.lock();
        let pending_restore = state.restore_ops.completion(&entity_id);

        if let Some(operation) =
            state.delete_ops.get::<Properties<R::Model>, R::Failure, A::Error>(&entity_id)
        {
            if is_latest(operation.id(), pending_restore.as_ref()) {
                debug!(id = %entity_id, operation = %operation.id(), "Joining pending delete operation");
                return operation;
            }
        }

        let id = state.next_operation_id();

        let inner = Arc::clone(&self.inner);
        let operation = Operation::new(id, async move {
            if let Some((restore_id, restore)) = pending_restore {
                debug!(
                    id = %entity_id,
                    operation = %id,
                    waiting_for = %restore_id,
                    "Delete waiting for pending restore"
                );
                restore.await;
            }

            let outcome = request::run(&request, &inner.api).await;
            inner.complete(
                "delete",
                outcome,
                |state, container| {
                    if <R::Model as Model>::deleted_at(&container.properties).is_some() {
                        state.set_model::<R::Model>(container.id, container.properties.clone());
                    } else {
                        state.remove_model(&container.id);
                    }
                    container.properties
                },
                |_, _| {},
                |state| {
                    state.delete_ops.release(&entity_id, id);
                },
            )
        });

        let scheme = <R::Model as Model>::SCHEME;
        debug!(scheme, id = %entity_id, operation = %id, "Starting delete operation");
        state.delete_ops.insert(entity_id, &operation);
        drop(state);

        operation.start();
        self.inner.notify();
        operation
    }

    /// Restore a soft-deleted entity.
    pub fn restore<R>(&self, request: R) -> Operation<Entity<R::Model>, R::Failure, A::Error>
    where
        R: RestoreRequest<Api = A>,
    {
        let entity_id = request.id();
        let mut state = self.inner.lock();
        let pending_delete = state.delete_ops.completion(&entity_id);

        if let Some(operation) =
            state.restore_ops.get::<Entity<R::Model>, R::Failure, A::Error>(&entity_id)
        {
            if is_latest(operation.id(), pending_delete.as_ref()) {
                debug!(id = %entity_id, operation = %operation.id(), "Joining pending restore operation");
                return operation;
            }
        }

        let id = state.next_operation_id();

        let inner = Arc::clone(&self.inner);
        let operation = Operation::new(id, async move {
            if let Some((delete_id, delete)) = pending_delete {
                debug!(
                    id = %entity_id,
                    operation = %id,
                    waiting_for = %delete_id,
                    "Restore waiting for pending delete"
                );
                delete.await;
            }

            let outcome = request::run(&request, &inner.api).await;
            inner.complete(
                "restore",
                outcome,
                |state, container| state.set_model::<R::Model>(container.id, container.properties),
                |_, _| {},
                |state| {
                    state.restore_ops.release(&entity_id, id);
                },
            )
        });

        let scheme = <R::Model as Model>::SCHEME;
        debug!(scheme, id = %entity_id, operation = %id, "Starting restore operation");
        state.restore_ops.insert(entity_id, &operation);
        drop(state);

        operation.start();
        self.inner.notify();
        operation
    }
}

/// Whether `pending` was submitted after any pending operation of the
/// opposite kind, and may therefore be joined.
fn is_latest(pending: OperationId, opposite: Option<&(OperationId, Completion)>) -> bool {
    opposite.map_or(true, |(opposite, _)| pending > *opposite)
}
