//! Lifecycle state of a keyed fetch.

use std::fmt;
use std::str::FromStr;

/// Fetch status of one key.
///
/// A key that has never been written is [`LifecycleState::Idle`]. The engine
/// drives `Pending` on every execute and finishes with `Success` or `Error`;
/// the store itself accepts any transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    /// Nothing has been requested for this key yet.
    #[default]
    Idle,
    /// An execute is in flight.
    Pending,
    /// The last execute produced a value (fetched or cached).
    Success,
    /// The last execute failed.
    Error,
}

impl LifecycleState {
    /// All states in declaration order.
    pub const ALL: [LifecycleState; 4] = [
        LifecycleState::Idle,
        LifecycleState::Pending,
        LifecycleState::Success,
        LifecycleState::Error,
    ];

    /// Lowercase name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Pending => "pending",
            LifecycleState::Success => "success",
            LifecycleState::Error => "error",
        }
    }

    /// Returns `true` for `Success` and `Error`.
    pub fn is_settled(&self) -> bool {
        matches!(self, LifecycleState::Success | LifecycleState::Error)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unknown state name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown lifecycle state: {0:?}")]
pub struct ParseStateError(pub String);

impl FromStr for LifecycleState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LifecycleState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| ParseStateError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        assert_eq!(LifecycleState::default(), LifecycleState::Idle);
    }

    #[test]
    fn test_display_and_parse() {
        for state in LifecycleState::ALL {
            assert_eq!(state.to_string().parse::<LifecycleState>(), Ok(state));
        }
        assert_eq!(
            "loading".parse::<LifecycleState>(),
            Err(ParseStateError("loading".to_string()))
        );
    }

    #[test]
    fn test_is_settled() {
        assert!(!LifecycleState::Idle.is_settled());
        assert!(!LifecycleState::Pending.is_settled());
        assert!(LifecycleState::Success.is_settled());
        assert!(LifecycleState::Error.is_settled());
    }
}
