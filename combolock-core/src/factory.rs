//! Combination lock client
//!
//! Owns one local and one distributed lock client and mints a
//! [`CombinationLock`] per key.

use crate::combination::CombinationLock;
use crate::error::{Backend, CombinationError, CombinationResult};
use crate::handle::{ConnectLockClient, LockClient, LockHandle};
use crate::local::LocalLockClient;
use std::time::Duration;
use tracing::{debug, warn};

/// Factory for combination locks
///
/// Construct one per process (or per component) and share it; every caller
/// asks it for its own handle.
///
/// # Examples
///
/// ```rust,ignore
/// use combolock::prelude::*;
/// use combolock::redis::{RedisLockClient, RedisLockConfig};
///
/// let config = RedisLockConfig::builder()
///     .url("redis://127.0.0.1/")
///     .base_folder("locks/billing")
///     .build();
/// let client = CombinationLockClient::<RedisLockClient>::connect(config).await?;
///
/// let mut lock = client.lock_key("invoice-42").await?;
/// lock.acquire().await?;
/// // critical section
/// lock.release().await?;
/// ```
pub struct CombinationLockClient<D, L = LocalLockClient> {
    local: L,
    distributed: D,
    acquire_timeout: Option<Duration>,
}

impl<D> CombinationLockClient<D, LocalLockClient>
where
    D: LockClient,
{
    /// Wire an existing distributed client with a fresh local client
    pub fn new(distributed: D) -> Self {
        Self::with_local(LocalLockClient::new(), distributed)
    }
}

impl<D> CombinationLockClient<D, LocalLockClient>
where
    D: ConnectLockClient,
{
    /// Build the distributed client from `config` and pair it with a fresh
    /// local client
    pub async fn connect(config: D::Config) -> CombinationResult<Self> {
        let distributed = D::connect(config)
            .await
            .map_err(|source| CombinationError::BackendInit {
                backend: Backend::Distributed,
                source,
            })?;
        debug!(
            backend = distributed.backend_name(),
            "Combination lock client ready"
        );
        Ok(Self::new(distributed))
    }
}

impl<D, L> CombinationLockClient<D, L>
where
    D: LockClient,
    L: LockClient,
{
    /// Wire existing local and distributed clients
    pub fn with_local(local: L, distributed: D) -> Self {
        Self {
            local,
            distributed,
            acquire_timeout: None,
        }
    }

    /// Default deadline for [`CombinationLock::acquire`] on every handle
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// The local client
    pub fn local(&self) -> &L {
        &self.local
    }

    /// The distributed client
    pub fn distributed(&self) -> &D {
        &self.distributed
    }

    /// Create a combination lock handle for `key`
    ///
    /// The distributed handle is created first. If the local handle then
    /// cannot be created, the distributed handle is discarded before the
    /// error is returned.
    pub async fn lock_key(
        &self,
        key: &str,
    ) -> CombinationResult<CombinationLock<L::Handle, D::Handle>> {
        let mut distributed = self.distributed.lock_key(key).await.map_err(|source| {
            CombinationError::HandleCreation {
                backend: Backend::Distributed,
                key: key.to_string(),
                source,
            }
        })?;

        let local = match self.local.lock_key(key).await {
            Ok(local) => local,
            Err(source) => {
                if let Err(err) = distributed.discard().await {
                    warn!(key = %key, error = %err, "Failed to discard distributed lock handle");
                }
                return Err(CombinationError::HandleCreation {
                    backend: Backend::Local,
                    key: key.to_string(),
                    source,
                });
            }
        };

        debug!(key = %key, "Created combination lock handle");
        Ok(CombinationLock::new(
            key.to_string(),
            local,
            distributed,
            self.acquire_timeout,
        ))
    }
}
