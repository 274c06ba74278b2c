//! Combination lock handle
//!
//! Pairs a local handle with a distributed handle for the same key. The
//! local lock is always taken first, so at most one caller per process is
//! ever contending for the distributed lock on a given key. Release runs in
//! the opposite order and always attempts both sides.

use crate::error::{
    Backend, CombinationError, CombinationResult, LockError, ReleaseFailures,
};
use crate::handle::LockHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

/// Lifecycle state of a [`CombinationLock`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    /// Nothing held yet
    Unheld,
    /// Local lock held, distributed acquisition in progress
    LocalHeld,
    /// Both locks held
    FullyHeld,
    /// Release attempted (terminal)
    Released,
    /// Acquisition failed and was rolled back (terminal)
    Failed,
}

impl LockState {
    /// Whether the handle must be discarded
    pub fn is_terminal(&self) -> bool {
        matches!(self, LockState::Released | LockState::Failed)
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockState::Unheld => "unheld",
            LockState::LocalHeld => "local-held",
            LockState::FullyHeld => "fully-held",
            LockState::Released => "released",
            LockState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A lock held both in-process and across the fleet
///
/// Obtained from [`CombinationLockClient::lock_key`](crate::CombinationLockClient::lock_key).
/// One acquire/release cycle per handle; fetch a new handle afterwards.
pub struct CombinationLock<L, D> {
    key: String,
    local: L,
    distributed: D,
    state: LockState,
    default_timeout: Option<Duration>,
}

impl<L, D> CombinationLock<L, D>
where
    L: LockHandle,
    D: LockHandle,
{
    pub(crate) fn new(
        key: String,
        local: L,
        distributed: D,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            key,
            local,
            distributed,
            state: LockState::Unheld,
            default_timeout,
        }
    }

    /// Key guarded by this lock
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current lifecycle state
    pub fn state(&self) -> LockState {
        self.state
    }

    /// Whether both inner locks are held
    pub fn is_held(&self) -> bool {
        self.state == LockState::FullyHeld
    }

    /// Inner local handle
    pub fn local(&self) -> &L {
        &self.local
    }

    /// Inner distributed handle
    pub fn distributed(&self) -> &D {
        &self.distributed
    }

    /// Acquire the local lock, then the distributed lock
    ///
    /// Uses the client's default timeout when one was configured. On error
    /// nothing is left held and the handle is spent.
    pub async fn acquire(&mut self) -> CombinationResult<()> {
        match self.default_timeout {
            Some(timeout) => self.acquire_timeout(timeout).await,
            None => self.acquire_until(None).await,
        }
    }

    /// Like [`acquire`](Self::acquire), bounded by one deadline covering
    /// both inner acquisitions
    ///
    /// When the deadline cuts the distributed step short, the distributed
    /// handle is abandoned so a lease taken right at the deadline is given
    /// back in the background.
    pub async fn acquire_timeout(&mut self, timeout: Duration) -> CombinationResult<()> {
        // Deadlines past the end of time mean no deadline
        let deadline = Instant::now().checked_add(timeout);
        self.acquire_until(deadline).await
    }

    async fn acquire_until(&mut self, deadline: Option<Instant>) -> CombinationResult<()> {
        self.ensure_unheld()?;

        let local = match deadline {
            Some(deadline) => timeout_at(deadline, self.local.acquire())
                .await
                .unwrap_or_else(|_| Err(LockError::Timeout(self.key.clone()))),
            None => self.local.acquire().await,
        };
        if let Err(source) = local {
            self.state = LockState::Failed;
            return Err(self.acquire_error(Backend::Local, source));
        }
        self.state = LockState::LocalHeld;
        debug!(key = %self.key, "Local lock held, acquiring distributed lock");

        let hold = LocalHold::new(&self.key, &mut self.local, &mut self.state);
        let distributed = match deadline {
            Some(deadline) => timeout_at(deadline, self.distributed.acquire())
                .await
                .unwrap_or_else(|_| Err(LockError::Timeout(self.key.clone()))),
            None => self.distributed.acquire().await,
        };
        hold.disarm();

        if let Err(source) = distributed {
            if source.is_timeout() {
                // The cut-off backend call may have left a hold behind
                self.distributed.abandon();
            }
            self.rollback_local().await;
            self.state = LockState::Failed;
            return Err(self.acquire_error(Backend::Distributed, source));
        }

        self.state = LockState::FullyHeld;
        info!(key = %self.key, "Acquired combination lock");
        Ok(())
    }

    /// Try to acquire both locks without waiting
    ///
    /// Returns `Ok(false)` when either lock is busy; the handle stays
    /// unheld and may be tried again.
    pub async fn try_acquire(&mut self) -> CombinationResult<bool> {
        self.ensure_unheld()?;

        match self.local.try_acquire().await {
            Ok(true) => {}
            Ok(false) => return Ok(false),
            Err(source) => {
                self.state = LockState::Failed;
                return Err(self.acquire_error(Backend::Local, source));
            }
        }
        self.state = LockState::LocalHeld;

        let hold = LocalHold::new(&self.key, &mut self.local, &mut self.state);
        let distributed = self.distributed.try_acquire().await;
        hold.disarm();

        match distributed {
            Ok(true) => {
                self.state = LockState::FullyHeld;
                info!(key = %self.key, "Acquired combination lock");
                Ok(true)
            }
            Ok(false) => {
                debug!(key = %self.key, "Distributed lock busy");
                match self.local.release().await {
                    Ok(()) => {
                        self.state = LockState::Unheld;
                        Ok(false)
                    }
                    Err(source) => {
                        self.state = LockState::Failed;
                        Err(self.acquire_error(Backend::Local, source))
                    }
                }
            }
            Err(source) => {
                self.rollback_local().await;
                self.state = LockState::Failed;
                Err(self.acquire_error(Backend::Distributed, source))
            }
        }
    }

    /// Release the distributed lock, then the local lock
    ///
    /// Both releases are always attempted. Any failures are returned
    /// together; the handle is spent either way.
    pub async fn release(&mut self) -> CombinationResult<()> {
        let mut failures = ReleaseFailures::new();

        if let Err(source) = self.distributed.release().await {
            failures.push(Backend::Distributed, source);
        }
        if let Err(source) = self.local.release().await {
            failures.push(Backend::Local, source);
        }

        self.state = LockState::Released;

        if failures.is_empty() {
            debug!(key = %self.key, "Released combination lock");
            return Ok(());
        }

        let err = CombinationError::Release {
            key: self.key.clone(),
            failures,
        };
        warn!(key = %self.key, error = %err, "Combination lock release incomplete");
        Err(err)
    }

    fn ensure_unheld(&self) -> CombinationResult<()> {
        if self.state == LockState::Unheld {
            Ok(())
        } else {
            Err(CombinationError::HandleConsumed {
                key: self.key.clone(),
                state: self.state,
            })
        }
    }

    async fn rollback_local(&mut self) {
        if let Err(err) = self.local.release().await {
            warn!(key = %self.key, error = %err, "Failed to release local lock after distributed acquire failed");
        }
    }

    fn acquire_error(&self, backend: Backend, source: LockError) -> CombinationError {
        debug!(key = %self.key, backend = %backend, error = %source, "Combination lock acquire failed");
        CombinationError::Acquire {
            backend,
            key: self.key.clone(),
            source,
        }
    }
}

/// Local lock held while the distributed step is in flight
///
/// If the step's future is dropped before [`disarm`](Self::disarm), the
/// local lock is abandoned and the handle marked failed.
struct LocalHold<'a, L: LockHandle> {
    key: &'a str,
    local: &'a mut L,
    state: &'a mut LockState,
    armed: bool,
}

impl<'a, L: LockHandle> LocalHold<'a, L> {
    fn new(key: &'a str, local: &'a mut L, state: &'a mut LockState) -> Self {
        Self {
            key,
            local,
            state,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<L: LockHandle> Drop for LocalHold<'_, L> {
    fn drop(&mut self) {
        if self.armed {
            self.local.abandon();
            *self.state = LockState::Failed;
            warn!(key = %self.key, "Acquisition cancelled with local lock held; local lock abandoned");
        }
    }
}

impl<L, D> fmt::Debug for CombinationLock<L, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombinationLock")
            .field("key", &self.key)
            .field("state", &self.state)
            .finish()
    }
}
