//! Redis lock error types.

use combolock_core::LockError;
use thiserror::Error;

/// Result type for Redis lock operations.
pub type Result<T> = std::result::Result<T, RedisLockError>;

/// Redis lock errors.
#[derive(Debug, Error)]
pub enum RedisLockError {
    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout error.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Underlying Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl RedisLockError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }
}

impl From<RedisLockError> for LockError {
    fn from(err: RedisLockError) -> Self {
        match err {
            RedisLockError::Config(msg) => LockError::Config(msg),
            RedisLockError::Timeout(msg) => LockError::Timeout(msg),
            other => LockError::Backend(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_lock_error() {
        let err: LockError = RedisLockError::Config("bad url".into()).into();
        assert!(matches!(err, LockError::Config(_)));

        let err: LockError = RedisLockError::Timeout("locks/a".into()).into();
        assert!(err.is_timeout());

        let err: LockError = RedisLockError::Connection("refused".into()).into();
        assert_eq!(err.to_string(), "Backend error: Connection error: refused");
    }

    #[test]
    fn test_retryable() {
        assert!(RedisLockError::Connection("refused".into()).is_retryable());
        assert!(!RedisLockError::Config("bad".into()).is_retryable());
    }
}
