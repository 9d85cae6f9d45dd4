/// Snapshot of what the cache knows about one query.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V, F> {
    /// Cached value; may be stale if `failure` is set.
    pub value: V,
    /// Domain failure of the most recent completed attempt, until superseded
    /// by a success.
    pub failure: Option<F>,
    /// Whether an operation for this query is in flight.
    pub loading: bool,
}

impl<V, F> CacheEntry<V, F> {
    pub fn new(value: V, failure: Option<F>, loading: bool) -> Self {
        Self {
            value,
            failure,
            loading,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> CacheEntry<U, F> {
        CacheEntry {
            value: f(self.value),
            failure: self.failure,
            loading: self.loading,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}
