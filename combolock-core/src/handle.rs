//! Lock capability traits shared by every backend

use crate::error::{LockError, LockResult};
use async_trait::async_trait;

/// A per-key lock capability obtained from a [`LockClient`]
///
/// A handle is bound to one key for its whole lifetime. It is owned by a
/// single caller; concurrent callers each obtain their own handle.
#[async_trait]
pub trait LockHandle: Send {
    /// Key this handle is bound to
    fn key(&self) -> &str;

    /// Acquire the lock, waiting until it is available
    async fn acquire(&mut self) -> LockResult<()>;

    /// Try to acquire the lock without waiting
    ///
    /// Returns `Ok(false)` when another holder has it.
    async fn try_acquire(&mut self) -> LockResult<bool>;

    /// Release the lock
    async fn release(&mut self) -> LockResult<()>;

    /// Drop any hold without waiting on the backend
    ///
    /// Called when an acquisition is cancelled part way. Backends that need
    /// I/O to let go finish it in the background.
    fn abandon(&mut self);

    /// Give back whatever handle creation reserved, without the lock
    /// ever having been acquired
    async fn discard(&mut self) -> LockResult<()> {
        Ok(())
    }
}

/// A lock backend client that mints per-key handles
#[async_trait]
pub trait LockClient: Send + Sync {
    /// Handle type produced by this client
    type Handle: LockHandle;

    /// Create a handle for `key`; no lock is taken yet
    async fn lock_key(&self, key: &str) -> LockResult<Self::Handle>;

    /// Backend name for diagnostics
    fn backend_name(&self) -> &'static str;
}

/// A lock client that can be built from a configuration value
#[async_trait]
pub trait ConnectLockClient: LockClient + Sized {
    /// Connection and option data for the backend
    type Config: Send + 'static;

    /// Construct the client
    async fn connect(config: Self::Config) -> LockResult<Self>;
}

/// Reject keys no backend can lock
pub fn validate_key(key: &str) -> LockResult<()> {
    if key.is_empty() {
        return Err(LockError::InvalidKey("key must not be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("orders/42").is_ok());
        assert!(matches!(validate_key(""), Err(LockError::InvalidKey(_))));
    }
}
