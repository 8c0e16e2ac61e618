//! Error types for fetch functions.

use std::fmt;
use std::sync::Arc;

/// Failure reported by a fetch function.
///
/// Any `Into<anyhow::Error>` type converts into [`FetchError::Failed`], so a
/// fetch function can propagate its own errors with the `?` operator.
///
/// The engine treats both variants the same way: the error handler runs, the
/// key moves to the error state and `execute` yields no value. The variant only
/// tells the error handler whether the failure came from an abort.
#[derive(Debug, Clone)]
pub enum FetchError {
    /// The fetch function observed its cancellation token.
    Cancelled {
        /// Reason passed to `abort`, if any.
        reason: Option<String>,
    },

    /// The fetch function failed.
    Failed(Arc<anyhow::Error>),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Cancelled { reason: Some(reason) } => {
                write!(f, "fetch cancelled: {}", reason)
            }
            FetchError::Cancelled { reason: None } => write!(f, "fetch cancelled"),
            FetchError::Failed(e) => write!(f, "fetch failed: {}", e),
        }
    }
}

impl<T: Into<anyhow::Error>> From<T> for FetchError {
    fn from(err: T) -> Self {
        FetchError::Failed(Arc::new(err.into()))
    }
}

impl FetchError {
    /// Create a cancellation error.
    pub fn cancelled(reason: Option<String>) -> Self {
        FetchError::Cancelled { reason }
    }

    /// Create a failure from a message.
    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        FetchError::Failed(Arc::new(anyhow::Error::msg(message)))
    }

    /// Returns `true` if this error came from a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled { .. })
    }

    /// Returns the underlying error if this is a `Failed` variant.
    pub fn failure(&self) -> Option<&Arc<anyhow::Error>> {
        match self {
            FetchError::Failed(e) => Some(e),
            FetchError::Cancelled { .. } => None,
        }
    }

    /// Attempts to downcast the failure to a specific type.
    pub fn downcast_ref<E: std::error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
        self.failure().and_then(|e| e.downcast_ref::<E>())
    }
}
