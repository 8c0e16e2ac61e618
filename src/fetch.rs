//! Fetch function trait.

use std::future::Future;

use async_trait::async_trait;

use crate::cancel::CancellationToken;
use crate::error::FetchError;

/// An asynchronous producer of a query's value.
///
/// `token` is `Some` when the engine running the fetch is cancellable. Honoring
/// it is up to the implementation; see [`CancellationToken`].
///
/// Any closure of the shape
/// `Fn(P, Option<CancellationToken>) -> impl Future<Output = Result<T, FetchError>>`
/// implements this trait, so most callers never implement it by hand.
///
/// # Example
///
/// ```ignore
/// let engine = client
///     .query("user:1", |id: u32, token: Option<CancellationToken>| async move {
///         let user = api.user(id).await?;
///         if let Some(token) = token {
///             token.check()?;
///         }
///         Ok(user)
///     })
///     .build();
/// ```
#[async_trait]
pub trait Fetch<P, T>: Send + Sync + 'static {
    /// Run the fetch once.
    async fn fetch(&self, params: P, token: Option<CancellationToken>) -> Result<T, FetchError>;
}

#[async_trait]
impl<P, T, F, Fut> Fetch<P, T> for F
where
    P: Send + 'static,
    T: Send + 'static,
    F: Fn(P, Option<CancellationToken>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
{
    async fn fetch(&self, params: P, token: Option<CancellationToken>) -> Result<T, FetchError> {
        (self)(params, token).await
    }
}
