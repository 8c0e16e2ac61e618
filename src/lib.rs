//! Query-Cache: a small keyed data-fetching cache with lifecycle tracking.
//!
//! A [`QueryClient`] owns two maps shared by every engine built from it: the
//! lifecycle state of each key ([`StateStore`]) and the last fetched value of
//! each key ([`CacheStorage`]). A [`QueryEngine`] binds one key to one async
//! fetch function and memoizes its result.
//!
//! # Key Features
//!
//! - **Lifecycle states**: `idle`, `pending`, `success`, `error` per key, readable
//!   at any time and observable through subscriptions
//! - **Memoization**: repeated executes are served from the cache; `refresh`
//!   forces a live fetch
//! - **Cooperative cancellation**: fetch functions receive a [`CancellationToken`]
//! - **Errors as state**: failed fetches go to an error handler and the `error`
//!   state, never to the caller
//! - **Route queries**: typed reads of URL query parameters through [`RouteQuery`]
//!
//! # Example
//!
//! ```ignore
//! use query_cache::{FetchError, QueryClient};
//!
//! let client = QueryClient::new();
//! let user = client
//!     .query("user:1", |id: u32, _token| async move { load_user(id).await })
//!     .error_handler(|err: &FetchError| eprintln!("{err}"))
//!     .build();
//!
//! let first = user.execute(1).await;  // fetches
//! let again = user.execute(1).await;  // served from cache
//! let fresh = user.refresh(1).await;  // fetches again
//! ```

mod cancel;
mod client;
mod engine;
mod error;
mod fetch;
pub mod route;
mod state;
mod storage;
mod store;
pub mod tracer;

pub use cancel::CancellationToken;
pub use client::{QueryClient, QueryClientBuilder};
pub use engine::{EmptyPredicate, ErrorHandler, QueryBuilder, QueryEngine};
pub use error::FetchError;
pub use fetch::Fetch;
pub use route::{Location, MemoryRouter, QueryParam, QueryValue, RouteError, RouteQuery, Router};
pub use state::{LifecycleState, ParseStateError};
pub use storage::CacheStorage;
pub use store::{PromiseState, StateListener, StateStore, SubscriptionId};
#[cfg(feature = "tracing")]
pub use tracer::LogTracer;
pub use tracer::{ExecutionResult, NoopTracer, SpanId, Tracer};

// Re-exported so `Fetch` can be implemented without a direct dependency.
pub use async_trait::async_trait;
