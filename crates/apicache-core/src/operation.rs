//! Shared asynchronous operations and the registries that track them.
//!
//! An [`Operation`] wraps one execution of a request (transport call, decode
//! and cache merge) behind a shared future: every clone awaits the same
//! single execution and observes the same [`Outcome`]. Operations are spawned
//! onto the Tokio runtime when started, so dropping a waiter never cancels the
//! work for anyone else.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::hash::Hash;

use futures::future::{BoxFuture, FutureExt, Shared};

/// Result of an operation: transport error, domain failure or value.
pub type Outcome<V, F, E> = Result<Result<V, F>, E>;

/// Identity of one operation within a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(u64);

impl OperationId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Resolves once an operation has finished, whatever its outcome.
pub type Completion = Shared<BoxFuture<'static, ()>>;

/// Handle to an in-flight or finished operation.
pub struct Operation<V, F, E> {
    id: OperationId,
    shared: Shared<BoxFuture<'static, Outcome<V, F, E>>>,
}

impl<V, F, E> Operation<V, F, E>
where
    V: Clone + Send + Sync + 'static,
    F: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Wrap a future without running it yet; see [`Operation::start`].
    pub(crate) fn new<Fut>(id: OperationId, future: Fut) -> Self
    where
        Fut: Future<Output = Outcome<V, F, E>> + Send + 'static,
    {
        Self {
            id,
            shared: future.boxed().shared(),
        }
    }

    /// Drive the operation to completion on its own task.
    pub(crate) fn start(&self) {
        tokio::spawn(self.shared.clone());
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    /// The outcome, if the operation has already finished.
    pub fn peek(&self) -> Option<Outcome<V, F, E>> {
        self.shared.peek().cloned()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.peek().is_some()
    }

    pub(crate) fn completion(&self) -> Completion {
        self.shared.clone().map(|_| ()).boxed().shared()
    }
}

impl<V, F, E> Clone for Operation<V, F, E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            shared: self.shared.clone(),
        }
    }
}

impl<V, F, E> fmt::Debug for Operation<V, F, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation").field("id", &self.id).finish_non_exhaustive()
    }
}

impl<V, F, E> IntoFuture for Operation<V, F, E>
where
    V: Clone,
    F: Clone,
    E: Clone,
{
    type Output = Outcome<V, F, E>;
    type IntoFuture = Shared<BoxFuture<'static, Outcome<V, F, E>>>;

    fn into_future(self) -> Self::IntoFuture {
        self.shared
    }
}

struct Pending {
    id: OperationId,
    handle: Box<dyn Any + Send + Sync>,
    completion: Completion,
}

/// Pending operations keyed by signature, at most one per key.
pub(crate) struct Registry<K> {
    pending: HashMap<K, Pending>,
}

impl<K: Hash + Eq> Registry<K> {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// The pending operation for `key`, if it produces the requested types.
    pub fn get<V, F, E>(&self, key: &K) -> Option<Operation<V, F, E>>
    where
        V: 'static,
        F: 'static,
        E: 'static,
    {
        self.pending
            .get(key)
            .and_then(|pending| pending.handle.downcast_ref::<Operation<V, F, E>>())
            .cloned()
    }

    /// Completion of the pending operation for `key`, whatever its types.
    pub fn completion(&self, key: &K) -> Option<(OperationId, Completion)> {
        self.pending
            .get(key)
            .map(|pending| (pending.id, pending.completion.clone()))
    }

    /// Register `operation` under `key`, replacing any previous entry.
    pub fn insert<V, F, E>(&mut self, key: K, operation: &Operation<V, F, E>)
    where
        V: Clone + Send + Sync + 'static,
        F: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        self.pending.insert(
            key,
            Pending {
                id: operation.id(),
                handle: Box::new(operation.clone()),
                completion: operation.completion(),
            },
        );
    }

    /// Remove the entry for `key` only if it still belongs to operation `id`.
    pub fn release(&mut self, key: &K, id: OperationId) -> bool {
        match self.pending.get(key) {
            Some(pending) if pending.id == id => {
                self.pending.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    type TestOperation = Operation<u32, String, String>;

    #[tokio::test]
    async fn test_waiters_share_single_execution() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);

        let op = TestOperation::new(OperationId::new(1), async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Ok(42))
        });
        op.start();

        let (a, b) = tokio::join!(op.clone(), op.clone());
        assert_eq!(a, Ok(Ok(42)));
        assert_eq!(b, Ok(Ok(42)));
        assert_eq!(op.peek(), Some(Ok(Ok(42))));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_waiter_does_not_cancel() {
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let permit = Arc::clone(&gate);

        let op = TestOperation::new(OperationId::new(1), async move {
            let _permit = permit.acquire().await.expect("semaphore open");
            Ok(Err("late".to_string()))
        });
        op.start();
        drop(op.clone());

        let completion = op.completion();
        drop(op);
        gate.add_permits(1);
        completion.await;
    }

    #[test]
    fn test_registry_release_only_matching_operation() {
        let mut registry: Registry<&str> = Registry::new();
        let first = TestOperation::new(OperationId::new(1), async { Ok(Ok(1)) });
        let second = TestOperation::new(OperationId::new(2), async { Ok(Ok(2)) });

        registry.insert("key", &first);
        registry.insert("key", &second);

        assert!(!registry.release(&"key", first.id()));
        assert!(registry.contains(&"key"));
        assert!(registry.release(&"key", second.id()));
        assert!(!registry.contains(&"key"));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_registry_get_checks_types() {
        let mut registry: Registry<&str> = Registry::new();
        let op = TestOperation::new(OperationId::new(3), async { Ok(Ok(1)) });
        registry.insert("key", &op);

        assert_eq!(
            registry.get::<u32, String, String>(&"key").map(|op| op.id()),
            Some(OperationId::new(3))
        );
        assert!(registry.get::<u64, String, String>(&"key").is_none());
        assert_eq!(registry.completion(&"key").map(|(id, _)| id), Some(OperationId::new(3)));
    }

    #[test]
    fn test_operation_id_display() {
        assert_eq!(OperationId::new(12).to_string(), "op-12");
    }
}
