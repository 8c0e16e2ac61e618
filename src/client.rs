//! Query client owning the shared state store and cache.

use std::future::Future;
use std::sync::Arc;

use crate::cancel::CancellationToken;
use crate::engine::QueryBuilder;
use crate::error::FetchError;
use crate::fetch::Fetch;
use crate::state::LifecycleState;
use crate::storage::CacheStorage;
use crate::store::StateStore;
use crate::tracer::{NoopTracer, Tracer};

/// The query client owns the lifecycle states and cached values shared by all
/// engines built from it.
///
/// This is cheap to clone - all data is behind `Arc`. Create one per
/// application (or one per test for isolation) and hand clones to every place
/// that builds queries. Engines built from clones of the same client share
/// states and cache entries by key.
///
/// # Example
///
/// ```ignore
/// let client = QueryClient::new();
///
/// let user = client
///     .query("user:1", |_: (), _| async { Ok(User::load(1).await?) })
///     .build();
///
/// let first = user.execute(()).await;   // runs the fetch
/// let second = user.execute(()).await;  // served from cache
/// ```
#[derive(Clone)]
pub struct QueryClient {
    states: Arc<StateStore>,
    cache: Arc<CacheStorage>,
    tracer: Arc<dyn Tracer>,
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryClient {
    /// Create a new client with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for configuring the client.
    pub fn builder() -> QueryClientBuilder {
        QueryClientBuilder::new()
    }

    /// Start building an engine bound to `key` and a fetch closure.
    pub fn query<P, T, F, Fut>(&self, key: impl Into<Arc<str>>, fetch: F) -> QueryBuilder<P, T>
    where
        P: Send + 'static,
        T: Send + Sync + 'static,
        F: Fn(P, Option<CancellationToken>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        self.query_with(key, fetch)
    }

    /// Start building an engine bound to `key` and any [`Fetch`] implementation.
    pub fn query_with<P, T, F>(&self, key: impl Into<Arc<str>>, fetch: F) -> QueryBuilder<P, T>
    where
        P: Send + 'static,
        T: Send + Sync + 'static,
        F: Fetch<P, T>,
    {
        QueryBuilder::new(self.clone(), key.into(), Arc::new(fetch))
    }

    /// The shared lifecycle state store.
    pub fn states(&self) -> &Arc<StateStore> {
        &self.states
    }

    /// The shared value cache.
    pub fn cache(&self) -> &Arc<CacheStorage> {
        &self.cache
    }

    pub(crate) fn tracer(&self) -> &Arc<dyn Tracer> {
        &self.tracer
    }

    /// Current state of `key`.
    pub fn state(&self, key: &str) -> LifecycleState {
        self.states.get_state(key)
    }

    /// Cached value of `key`, if one of type `T` is present.
    pub fn data<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        self.cache.get::<T>(key)
    }

    /// Seed or overwrite the cached value of `key` without touching its state.
    pub fn set_data<T: Send + Sync + 'static>(&self, key: &str, value: T) {
        self.cache.insert(key, Arc::new(value));
        self.tracer.on_cache_update(key);
    }

    /// Drop both the state and the cached value of `key`.
    ///
    /// Returns `true` if either was present.
    pub fn remove(&self, key: &str) -> bool {
        let had_state = self.states.remove(key);
        let had_data = self.cache.remove(key);
        had_state || had_data
    }

    /// Drop every state and cached value.
    pub fn clear(&self) {
        self.states.clear();
        self.cache.clear();
    }
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("states", &self.states)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// Builder for creating a [`QueryClient`] with custom settings.
///
/// # Example
///
/// ```ignore
/// let client = QueryClient::builder()
///     .tracer(LogTracer::new())
///     .build();
/// ```
pub struct QueryClientBuilder {
    tracer: Arc<dyn Tracer>,
}

impl Default for QueryClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            tracer: Arc::new(NoopTracer),
        }
    }

    /// Set the tracer receiving execute, cache and state events.
    ///
    /// The default is [`NoopTracer`].
    pub fn tracer<T: Tracer>(self, tracer: T) -> Self {
        self.shared_tracer(Arc::new(tracer))
    }

    /// Set a tracer that is also held elsewhere, e.g. to inspect it in tests.
    pub fn shared_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    /// Build the client with the configured settings.
    pub fn build(self) -> QueryClient {
        QueryClient {
            states: Arc::new(StateStore::with_tracer(self.tracer.clone())),
            cache: Arc::new(CacheStorage::new()),
            tracer: self.tracer,
        }
    }
}
