//! Tracer trait for observing query execution.
//!
//! This module defines the [`Tracer`] trait and related types for observing
//! executes, cache checks and state changes. The default [`NoopTracer`]
//! discards everything. With the `tracing` feature enabled, [`LogTracer`]
//! forwards every event to the `tracing` crate.
//!
//! # Example
//!
//! ```ignore
//! use query_cache::{QueryClient, SpanId, Tracer};
//!
//! struct PrintTracer;
//!
//! impl Tracer for PrintTracer {
//!     fn new_span_id(&self) -> SpanId {
//!         SpanId(1)
//!     }
//!
//!     fn on_fetch_start(&self, _span_id: SpanId, key: &str) {
//!         println!("fetching {key}");
//!     }
//! }
//!
//! let client = QueryClient::builder().tracer(PrintTracer).build();
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use crate::state::LifecycleState;

/// Unique identifier for one execute call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(pub u64);

/// How an execute call finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// The fetch function ran and its value was cached.
    Fetched,
    /// The cached value was returned without running the fetch function.
    CacheHit,
    /// The fetch function observed a cancellation.
    Cancelled { reason: Option<String> },
    /// The fetch function failed.
    Error { message: String },
}

/// Tracer trait for observing query execution.
///
/// All methods except [`Tracer::new_span_id`] have empty default
/// implementations, so only the interesting events need overriding.
///
/// Implementations must be `Send + Sync`: executes may run on several threads
/// at once.
pub trait Tracer: Send + Sync + 'static {
    /// Generate a new unique span ID. Called once per execute.
    fn new_span_id(&self) -> SpanId;

    /// Called when an execute starts.
    #[inline]
    fn on_execute_start(&self, _span_id: SpanId, _key: &str, _force_update: bool) {}

    /// Called after the cache has been consulted. Not called for forced refreshes.
    #[inline]
    fn on_cache_check(&self, _span_id: SpanId, _key: &str, _hit: bool) {}

    /// Called right before the fetch function is invoked.
    #[inline]
    fn on_fetch_start(&self, _span_id: SpanId, _key: &str) {}

    /// Called when an execute ends.
    #[inline]
    fn on_execute_end(&self, _span_id: SpanId, _key: &str, _result: ExecutionResult) {}

    /// Called when the stored state of a key changes.
    #[inline]
    fn on_state_change(&self, _key: &str, _previous: LifecycleState, _current: LifecycleState) {}

    /// Called when a cancellable engine is aborted.
    #[inline]
    fn on_abort(&self, _key: &str, _reason: Option<&str>) {}

    /// Called when a cache entry is written, by a fetch or manually.
    #[inline]
    fn on_cache_update(&self, _key: &str) {}
}

/// Tracer that discards all events.
///
/// This is the default tracer for [`QueryClient`](crate::QueryClient).
pub struct NoopTracer;

/// Global span counter for NoopTracer.
static NOOP_SPAN_COUNTER: AtomicU64 = AtomicU64::new(1);

impl Tracer for NoopTracer {
    #[inline(always)]
    fn new_span_id(&self) -> SpanId {
        SpanId(NOOP_SPAN_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Tracer that emits every event through the `tracing` crate.
///
/// Lifecycle events are logged at `debug`, failures at `warn`.
#[cfg(feature = "tracing")]
#[derive(Default)]
pub struct LogTracer {
    next_span: AtomicU64,
}

#[cfg(feature = "tracing")]
impl LogTracer {
    /// Create a new log tracer.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "tracing")]
impl Tracer for LogTracer {
    fn new_span_id(&self) -> SpanId {
        SpanId(self.next_span.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn on_execute_start(&self, span_id: SpanId, key: &str, force_update: bool) {
        tracing::debug!(span_id = span_id.0, key, force_update, "execute started");
    }

    fn on_cache_check(&self, span_id: SpanId, key: &str, hit: bool) {
        tracing::trace!(span_id = span_id.0, key, hit, "cache checked");
    }

    fn on_fetch_start(&self, span_id: SpanId, key: &str) {
        tracing::debug!(span_id = span_id.0, key, "fetch started");
    }

    fn on_execute_end(&self, span_id: SpanId, key: &str, result: ExecutionResult) {
        match result {
            ExecutionResult::Fetched => {
                tracing::debug!(span_id = span_id.0, key, "execute fetched")
            }
            ExecutionResult::CacheHit => {
                tracing::debug!(span_id = span_id.0, key, "execute served from cache")
            }
            ExecutionResult::Cancelled { reason } => {
                tracing::warn!(span_id = span_id.0, key, ?reason, "execute cancelled")
            }
            ExecutionResult::Error { message } => {
                tracing::warn!(span_id = span_id.0, key, %message, "execute failed")
            }
        }
    }

    fn on_state_change(&self, key: &str, previous: LifecycleState, current: LifecycleState) {
        tracing::trace!(key, %previous, %current, "state changed");
    }

    fn on_abort(&self, key: &str, reason: Option<&str>) {
        tracing::debug!(key, ?reason, "abort signalled");
    }

    fn on_cache_update(&self, key: &str) {
        tracing::trace!(key, "cache updated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::client::QueryClient;

    /// Records the span id of every execute start and end.
    #[derive(Default)]
    struct SpanLog {
        next: AtomicU64,
        starts: Mutex<Vec<SpanId>>,
        ends: Mutex<Vec<SpanId>>,
    }

    impl Tracer for SpanLog {
        fn new_span_id(&self) -> SpanId {
            SpanId(self.next.fetch_add(1, Ordering::Relaxed))
        }

        fn on_execute_start(&self, span_id: SpanId, _key: &str, _force_update: bool) {
            self.starts.lock().push(span_id);
        }

        fn on_execute_end(&self, span_id: SpanId, _key: &str, _result: ExecutionResult) {
            self.ends.lock().push(span_id);
        }
    }

    #[tokio::test]
    async fn test_each_execute_opens_and_closes_one_span() {
        let tracer = Arc::new(SpanLog::default());
        let client = QueryClient::builder().shared_tracer(tracer.clone()).build();
        let engine = client.query("n", |n: u32, _| async move { Ok(n) }).build();

        engine.execute(1).await;
        engine.execute(1).await;
        engine.refresh(2).await;

        let starts = tracer.starts.lock().clone();
        assert_eq!(starts.len(), 3);
        assert_eq!(*tracer.ends.lock(), starts);
        assert_eq!(starts.iter().collect::<HashSet<_>>().len(), 3);
    }

    #[tokio::test]
    async fn test_default_client_uses_noop_tracer() {
        let client = QueryClient::new();
        let engine = client.query("n", |n: u32, _| async move { Ok(n) }).build();
        assert_eq!(engine.execute(7).await.as_deref(), Some(&7));
        assert_ne!(client.tracer().new_span_id(), client.tracer().new_span_id());
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn test_log_tracer_span_ids_are_unique() {
        let tracer = LogTracer::new();
        assert_eq!(tracer.new_span_id(), SpanId(1));
        assert_eq!(tracer.new_span_id(), SpanId(2));
    }
}
