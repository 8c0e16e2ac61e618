//! Query engine: one key, one fetch function, cached results.

use std::sync::Arc;

use crate::cancel::CancellationToken;
use crate::client::QueryClient;
use crate::error::FetchError;
use crate::fetch::Fetch;
use crate::state::LifecycleState;
use crate::store::{PromiseState, SubscriptionId};
use crate::tracer::ExecutionResult;

/// Callback receiving the error of a failed fetch.
pub type ErrorHandler = Arc<dyn Fn(&FetchError) + Send + Sync>;

/// Predicate marking a cached value as unusable for the cache short-circuit.
pub type EmptyPredicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Builder for a [`QueryEngine`], created by [`QueryClient::query`] or
/// [`QueryClient::query_with`].
pub struct QueryBuilder<P, T> {
    client: QueryClient,
    key: Arc<str>,
    fetch: Arc<dyn Fetch<P, T>>,
    cancellable: bool,
    error_handler: Option<ErrorHandler>,
    empty_when: Option<EmptyPredicate<T>>,
}

impl<P, T> QueryBuilder<P, T>
where
    P: Send + 'static,
    T: Send + Sync + 'static,
{
    pub(crate) fn new(client: QueryClient, key: Arc<str>, fetch: Arc<dyn Fetch<P, T>>) -> Self {
        Self {
            client,
            key,
            fetch,
            cancellable: true,
            error_handler: None,
            empty_when: None,
        }
    }

    /// Whether the engine hands a [`CancellationToken`] to the fetch function.
    ///
    /// Defaults to `true`. A non-cancellable engine passes `None` and ignores
    /// [`QueryEngine::abort`].
    pub fn cancellable(mut self, cancellable: bool) -> Self {
        self.cancellable = cancellable;
        self
    }

    /// Called once with the error of every failed fetch.
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&FetchError) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Treat cached values matching `predicate` as absent.
    ///
    /// A matching value is still readable through [`QueryEngine::data`], but
    /// `execute` runs the fetch function instead of returning it. Useful to
    /// re-fetch empty results such as `Vec::is_empty`.
    pub fn empty_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.empty_when = Some(Arc::new(predicate));
        self
    }

    /// Build the engine.
    pub fn build(self) -> QueryEngine<P, T> {
        QueryEngine {
            token: self.cancellable.then(CancellationToken::new),
            client: self.client,
            key: self.key,
            fetch: self.fetch,
            error_handler: self.error_handler,
            empty_when: self.empty_when,
        }
    }
}

/// Runs the fetch function of one key and memoizes its result.
///
/// This is cheap to clone; clones share the cancellation token.
///
/// Every execute moves the key to [`LifecycleState::Pending`], then either
/// serves the cached value (`Success`) or awaits the fetch function once.
/// A successful fetch is cached and moves the key to `Success`; a failed
/// fetch runs the error handler, moves the key to `Error` and leaves the cache
/// untouched. `execute` itself never fails: it yields `None` instead.
///
/// Overlapping executes on the same key are not serialized. Each one sets
/// `Pending`, and whichever finishes last decides the final state and value.
///
/// # Example
///
/// ```ignore
/// let engine = client
///     .query("user:1", |id: u32, _| async move { fetch_user(id).await })
///     .error_handler(|err| eprintln!("{err}"))
///     .build();
///
/// let user = engine.execute(1).await;
/// assert!(!engine.is_loading());
/// let fresh = engine.refresh(1).await;
/// ```
pub struct QueryEngine<P, T> {
    client: QueryClient,
    key: Arc<str>,
    fetch: Arc<dyn Fetch<P, T>>,
    token: Option<CancellationToken>,
    error_handler: Option<ErrorHandler>,
    empty_when: Option<EmptyPredicate<T>>,
}

impl<P, T> Clone for QueryEngine<P, T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            key: self.key.clone(),
            fetch: self.fetch.clone(),
            token: self.token.clone(),
            error_handler: self.error_handler.clone(),
            empty_when: self.empty_when.clone(),
        }
    }
}

impl<P, T> QueryEngine<P, T>
where
    P: Send + 'static,
    T: Send + Sync + 'static,
{
    /// Execute using the cache when possible.
    pub async fn execute(&self, params: P) -> Option<Arc<T>> {
        self.execute_with(params, false).await
    }

    /// Execute, skipping the cache when `force_update` is `true`.
    pub async fn execute_with(&self, params: P, force_update: bool) -> Option<Arc<T>> {
        let tracer = self.client.tracer();
        let span_id = tracer.new_span_id();
        tracer.on_execute_start(span_id, &self.key, force_update);

        self.set_state(LifecycleState::Pending);

        if !force_update {
            let cached = self.cached();
            tracer.on_cache_check(span_id, &self.key, cached.is_some());
            if let Some(value) = cached {
                self.set_state(LifecycleState::Success);
                tracer.on_execute_end(span_id, &self.key, ExecutionResult::CacheHit);
                return Some(value);
            }
        }

        tracer.on_fetch_start(span_id, &self.key);
        match self.fetch.fetch(params, self.token.clone()).await {
            Ok(value) => {
                let value = Arc::new(value);
                self.client.cache().insert(self.key.clone(), value.clone());
                tracer.on_cache_update(&self.key);
                self.set_state(LifecycleState::Success);
                tracer.on_execute_end(span_id, &self.key, ExecutionResult::Fetched);
                Some(value)
            }
            Err(err) => {
                if let Some(handler) = &self.error_handler {
                    handler(&err);
                }
                self.set_state(LifecycleState::Error);
                let result = match &err {
                    FetchError::Cancelled { reason } => ExecutionResult::Cancelled {
                        reason: reason.clone(),
                    },
                    FetchError::Failed(e) => ExecutionResult::Error {
                        message: e.to_string(),
                    },
                };
                tracer.on_execute_end(span_id, &self.key, result);
                None
            }
        }
    }

    /// Execute with a live fetch regardless of the cache.
    pub async fn refresh(&self, params: P) -> Option<Arc<T>> {
        self.execute_with(params, true).await
    }

    /// Signal the cancellation token. No-op when not cancellable.
    ///
    /// The state is not touched. If the fetch function honors the token, its
    /// failure goes through the usual error path. The token stays cancelled, so
    /// later executes of this engine see a cancelled token too.
    pub fn abort(&self, reason: Option<&str>) {
        if let Some(token) = &self.token {
            self.client.tracer().on_abort(&self.key, reason);
            token.cancel(reason.map(str::to_string));
        }
    }

    /// Overwrite the cached value without touching the state.
    pub fn update_cached_data(&self, value: T) {
        self.client.cache().insert(self.key.clone(), Arc::new(value));
        self.client.tracer().on_cache_update(&self.key);
    }

    /// Drop the cached value without touching the state.
    pub fn clear_cached_data(&self) -> bool {
        self.client.cache().remove(&self.key)
    }

    /// Cached value of the key, if any.
    pub fn data(&self) -> Option<Arc<T>> {
        self.client.cache().get::<T>(&self.key)
    }

    fn cached(&self) -> Option<Arc<T>> {
        let value = self.data()?;
        match &self.empty_when {
            Some(is_empty) if is_empty(&*value) => None,
            _ => Some(value),
        }
    }
}

impl<P, T> QueryEngine<P, T> {
    /// The key this engine is bound to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current state of the key.
    pub fn state(&self) -> LifecycleState {
        self.client.state(&self.key)
    }

    /// Returns `true` while the key is pending.
    pub fn is_loading(&self) -> bool {
        self.state() == LifecycleState::Pending
    }

    /// Returns `true` if this engine hands a token to its fetch function.
    pub fn is_cancellable(&self) -> bool {
        self.token.is_some()
    }

    /// The token handed to the fetch function, if cancellable.
    pub fn cancellation_token(&self) -> Option<&CancellationToken> {
        self.token.as_ref()
    }

    /// The client this engine was built from.
    pub fn client(&self) -> &QueryClient {
        &self.client
    }

    /// A state handle bound to this engine's key.
    pub fn promise_state(&self) -> PromiseState {
        self.client.states().promise_state(self.key.clone())
    }

    /// Listen to state changes of the key, from this or any other engine.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&str, LifecycleState, LifecycleState) + Send + Sync + 'static,
    {
        self.client.states().subscribe(&self.key, listener)
    }

    /// Stop a subscription created by [`QueryEngine::subscribe`].
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.client.states().unsubscribe(id)
    }

    fn set_state(&self, state: LifecycleState) {
        self.client.states().set_state(&self.key, state);
    }
}

impl<P, T> std::fmt::Debug for QueryEngine<P, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("key", &self.key)
            .field("state", &self.state())
            .field("cancellable", &self.is_cancellable())
            .finish_non_exhaustive()
    }
}
