//! Request signatures: the identity of "the same logical query".
//!
//! Two list requests share a signature when they target the same model type,
//! fail with the same failure type and carry structurally equal filters.
//! Equality always compares the full filter value; the hash only picks the
//! bucket, so two filters whose hashes collide never coalesce.

use std::any::{Any, TypeId};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::model::Model;
use crate::request::ListRequest;

/// Object-safe view of a filter value.
trait ErasedFilter: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn eq_erased(&self, other: &dyn ErasedFilter) -> bool;
    fn hash_erased(&self) -> u64;
    fn fmt_erased(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<T> ErasedFilter for T
where
    T: Hash + Eq + fmt::Debug + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_erased(&self, other: &dyn ErasedFilter) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn hash_erased(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        TypeId::of::<T>().hash(&mut hasher);
        self.hash(&mut hasher);
        hasher.finish()
    }

    fn fmt_erased(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Signature of a list query.
#[derive(Clone)]
pub struct ListSignature {
    model: TypeId,
    scheme: &'static str,
    failure: TypeId,
    filter: Arc<dyn ErasedFilter>,
}

impl ListSignature {
    pub fn of<R: ListRequest>(request: &R) -> Self {
        Self::new::<R::Model, R::Failure, R::Filter>(request.filter())
    }

    pub fn new<M, F, P>(filter: P) -> Self
    where
        M: Model,
        F: 'static,
        P: Hash + Eq + fmt::Debug + Send + Sync + 'static,
    {
        Self {
            model: TypeId::of::<M>(),
            scheme: M::SCHEME,
            failure: TypeId::of::<F>(),
            filter: Arc::new(filter),
        }
    }

    /// Resource name of the listed model, for logging.
    pub fn scheme(&self) -> &'static str {
        self.scheme
    }
}

impl PartialEq for ListSignature {
    fn eq(&self, other: &Self) -> bool {
        self.model == other.model
            && self.failure == other.failure
            && self.filter.eq_erased(other.filter.as_ref())
    }
}

impl Eq for ListSignature {}

impl Hash for ListSignature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.model.hash(state);
        self.failure.hash(state);
        state.write_u64(self.filter.hash_erased());
    }
}

impl fmt::Debug for ListSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        struct Filter<'a>(&'a dyn ErasedFilter);
        impl fmt::Debug for Filter<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt_erased(f)
            }
        }

        f.debug_struct("ListSignature")
            .field("scheme", &self.scheme)
            .field("filter", &Filter(self.filter.as_ref()))
            .finish()
    }
}
