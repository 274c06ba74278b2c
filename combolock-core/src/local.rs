//! In-process lock backend
//!
//! Keeps one async mutex per key in a shared registry. Waiters on the same
//! key are served in FIFO order. Suitable on its own for single-instance
//! deployments; combined with a distributed backend it serializes same-node
//! callers before they reach the distributed store.

use crate::error::{LockError, LockResult};
use crate::handle::{LockClient, LockHandle, validate_key};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, trace};

type Registry = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// In-process lock client
#[derive(Clone, Default)]
pub struct LocalLockClient {
    registry: Registry,
}

impl LocalLockClient {
    /// Create a new local lock client
    pub fn new() -> Self {
        debug!("Creating new local lock client");
        Self {
            registry: Arc::new(DashMap::new()),
        }
    }

    /// Number of keys with live handles (for monitoring)
    pub fn registered_keys(&self) -> usize {
        self.registry.len()
    }
}

#[async_trait]
impl LockClient for LocalLockClient {
    type Handle = LocalLockHandle;

    async fn lock_key(&self, key: &str) -> LockResult<LocalLockHandle> {
        validate_key(key)?;

        let mutex = self
            .registry
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        trace!(key = %key, "Created local lock handle");
        Ok(LocalLockHandle {
            key: key.to_string(),
            mutex,
            guard: None,
            registry: Arc::clone(&self.registry),
        })
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}

/// Handle on one key of a [`LocalLockClient`]
pub struct LocalLockHandle {
    key: String,
    mutex: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    registry: Registry,
}

impl LocalLockHandle {
    /// Whether this handle currently holds the lock
    pub fn is_held(&self) -> bool {
        self.guard.is_some()
    }
}

#[async_trait]
impl LockHandle for LocalLockHandle {
    fn key(&self) -> &str {
        &self.key
    }

    async fn acquire(&mut self) -> LockResult<()> {
        if self.guard.is_some() {
            return Err(LockError::AlreadyHeld(self.key.clone()));
        }

        let guard = Arc::clone(&self.mutex).lock_owned().await;
        self.guard = Some(guard);
        debug!(key = %self.key, "Acquired local lock");
        Ok(())
    }

    async fn try_acquire(&mut self) -> LockResult<bool> {
        if self.guard.is_some() {
            return Err(LockError::AlreadyHeld(self.key.clone()));
        }

        match Arc::clone(&self.mutex).try_lock_owned() {
            Ok(guard) => {
                self.guard = Some(guard);
                debug!(key = %self.key, "Acquired local lock");
                Ok(true)
            }
            Err(_) => {
                trace!(key = %self.key, "Local lock busy");
                Ok(false)
            }
        }
    }

    async fn release(&mut self) -> LockResult<()> {
        match self.guard.take() {
            Some(guard) => {
                drop(guard);
                debug!(key = %self.key, "Released local lock");
                Ok(())
            }
            None => Err(LockError::NotHeld(self.key.clone())),
        }
    }

    fn abandon(&mut self) {
        if self.guard.take().is_some() {
            debug!(key = %self.key, "Abandoned local lock");
        }
    }
}

impl Drop for LocalLockHandle {
    fn drop(&mut self) {
        self.guard.take();
        // Let go of our reference first so concurrent drops cannot each see
        // the other and leave the entry behind
        drop(std::mem::replace(&mut self.mutex, Arc::new(Mutex::new(()))));
        self.registry
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
