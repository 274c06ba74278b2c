//! Error types for lock backends and combination locks

use crate::combination::LockState;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for backend lock operations
pub type LockResult<T> = Result<T, LockError>;

/// Result type for combination lock operations
pub type CombinationResult<T> = Result<T, CombinationError>;

/// Errors reported by a single lock backend
#[derive(Debug, Error)]
pub enum LockError {
    /// The key cannot be used by this backend
    #[error("Invalid lock key: {0}")]
    InvalidKey(String),

    /// The handle already holds its lock (locks are not reentrant)
    #[error("Lock already held by this handle: {0}")]
    AlreadyHeld(String),

    /// Release was requested for a lock this handle does not hold
    #[error("Lock not held: {0}")]
    NotHeld(String),

    /// Waiting for the lock exceeded its deadline
    #[error("Lock timeout: {0}")]
    Timeout(String),

    /// Backend configuration is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Any other backend failure (network, store, protocol)
    #[error("Backend error: {0}")]
    Backend(String),
}

impl LockError {
    /// Create a new backend error
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        Self::Backend(msg.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Check if this error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if this error reports a lock that was not held
    pub fn is_not_held(&self) -> bool {
        matches!(self, Self::NotHeld(_))
    }
}

/// Which side of a combination lock an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// The in-process lock
    Local,
    /// The cross-process lock
    Distributed,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Local => f.write_str("local"),
            Backend::Distributed => f.write_str("distributed"),
        }
    }
}

/// A single failed release inside a combination lock
#[derive(Debug)]
pub struct ReleaseFailure {
    /// Backend whose release failed
    pub backend: Backend,
    /// Cause reported by that backend
    pub source: LockError,
}

impl fmt::Display for ReleaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} release failed: {}", self.backend, self.source)
    }
}

/// Every release failure from one `release()` call, in the order the
/// releases were attempted
#[derive(Debug, Default)]
pub struct ReleaseFailures(Vec<ReleaseFailure>);

impl ReleaseFailures {
    pub(crate) fn new() -> Self {
        Self(Vec::new())
    }

    pub(crate) fn push(&mut self, backend: Backend, source: LockError) {
        self.0.push(ReleaseFailure { backend, source });
    }

    /// Number of failed releases (1 or 2)
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no release failed
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the individual failures
    pub fn iter(&self) -> impl Iterator<Item = &ReleaseFailure> {
        self.0.iter()
    }

    /// Failure reported by the given backend, if any
    pub fn get(&self, backend: Backend) -> Option<&LockError> {
        self.0
            .iter()
            .find(|failure| failure.backend == backend)
            .map(|failure| &failure.source)
    }
}

impl fmt::Display for ReleaseFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

impl IntoIterator for ReleaseFailures {
    type Item = ReleaseFailure;
    type IntoIter = std::vec::IntoIter<ReleaseFailure>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Combination lock errors
#[derive(Debug, Error)]
pub enum CombinationError {
    /// A backend client could not be constructed
    #[error("Failed to initialize {backend} lock backend: {source}")]
    BackendInit {
        backend: Backend,
        #[source]
        source: LockError,
    },

    /// A per-key handle could not be obtained from a backend
    #[error("Failed to create {backend} lock handle for '{key}': {source}")]
    HandleCreation {
        backend: Backend,
        key: String,
        #[source]
        source: LockError,
    },

    /// Acquiring one of the inner locks failed; nothing is left held
    #[error("Failed to acquire {backend} lock for '{key}': {source}")]
    Acquire {
        backend: Backend,
        key: String,
        #[source]
        source: LockError,
    },

    /// One or both inner releases failed
    #[error("Failed to release lock for '{key}': {failures}")]
    Release {
        key: String,
        failures: ReleaseFailures,
    },

    /// The handle already reached a terminal state
    #[error("Lock handle for '{key}' is {state} and cannot be acquired again")]
    HandleConsumed { key: String, state: LockState },
}

impl CombinationError {
    /// Backend responsible for this error, when there is exactly one
    pub fn backend(&self) -> Option<Backend> {
        match self {
            Self::BackendInit { backend, .. }
            | Self::HandleCreation { backend, .. }
            | Self::Acquire { backend, .. } => Some(*backend),
            Self::Release { failures, .. } if failures.len() == 1 => {
                failures.iter().next().map(|failure| failure.backend)
            }
            _ => None,
        }
    }

    /// Check if this error is an acquisition timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Acquire { source, .. } if source.is_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_display() {
        assert_eq!(Backend::Local.to_string(), "local");
        assert_eq!(Backend::Distributed.to_string(), "distributed");
    }

    #[test]
    fn test_release_failures_name_each_backend() {
        let mut failures = ReleaseFailures::new();
        failures.push(Backend::Distributed, LockError::backend("session expired"));
        failures.push(Backend::Local, LockError::NotHeld("jobs/1".into()));

        let err = CombinationError::Release {
            key: "jobs/1".into(),
            failures,
        };
        let msg = err.to_string();

        assert!(msg.contains("distributed release failed: Backend error: session expired"));
        assert!(msg.contains("local release failed: Lock not held: jobs/1"));
        assert_eq!(err.backend(), None);
    }

    #[test]
    fn test_single_release_failure_reports_backend() {
        let mut failures = ReleaseFailures::new();
        failures.push(Backend::Local, LockError::NotHeld("k".into()));
        assert!(failures.get(Backend::Local).is_some());
        assert!(failures.get(Backend::Distributed).is_none());

        let err = CombinationError::Release {
            key: "k".into(),
            failures,
        };
        assert_eq!(err.backend(), Some(Backend::Local));
    }

    #[test]
    fn test_timeout_detection() {
        let err = CombinationError::Acquire {
            backend: Backend::Distributed,
            key: "k".into(),
            source: LockError::Timeout("k".into()),
        };
        assert!(err.is_timeout());

        let err = CombinationError::Acquire {
            backend: Backend::Local,
            key: "k".into(),
            source: LockError::backend("boom"),
        };
        assert!(!err.is_timeout());
    }
}
