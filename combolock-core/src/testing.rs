//! Instrumented fake lock backends
//!
//! `FakeLockClient` behaves like a real lock backend (one async mutex per
//! key, shared by every clone of the client) and records each call into a
//! [`CallLog`] that can be shared between several fakes, so tests can
//! assert on cross-backend call order. A [`FailurePlan`] injects errors.

use crate::error::{LockError, LockResult};
use crate::handle::{ConnectLockClient, LockClient, LockHandle, validate_key};
use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Operation recorded by a fake backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create,
    Acquire,
    TryAcquire,
    Release,
    Abandon,
    Discard,
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub backend: &'static str,
    pub op: Op,
    pub key: String,
}

/// Shared, ordered record of fake backend calls
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<SyncMutex<Vec<Call>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, backend: &'static str, op: Op, key: &str) {
        self.calls.lock().push(Call {
            backend,
            op,
            key: key.to_string(),
        });
    }

    /// Every call so far
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// `(backend, op)` pairs so far
    pub fn ops(&self) -> Vec<(&'static str, Op)> {
        self.calls
            .lock()
            .iter()
            .map(|call| (call.backend, call.op))
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

/// Errors a fake backend injects
#[derive(Debug, Clone, Default)]
pub struct FailurePlan {
    fail_create: HashSet<String>,
    fail_acquire: bool,
    fail_release: bool,
    busy: bool,
}

impl FailurePlan {
    /// Fail handle creation for `key`
    pub fn fail_create_for(mut self, key: impl Into<String>) -> Self {
        self.fail_create.insert(key.into());
        self
    }

    /// Fail every `acquire` and `try_acquire`
    pub fn fail_acquire(mut self) -> Self {
        self.fail_acquire = true;
        self
    }

    /// Fail every `release` (the lock is still released)
    pub fn fail_release(mut self) -> Self {
        self.fail_release = true;
        self
    }

    /// Report the lock as held elsewhere on `try_acquire`
    pub fn busy(mut self) -> Self {
        self.busy = true;
        self
    }
}

/// Configuration accepted by [`FakeLockClient::connect`]
#[derive(Debug, Clone)]
pub struct FakeConfig {
    label: &'static str,
    log: CallLog,
    fail_connect: bool,
}

impl FakeConfig {
    pub fn new(label: &'static str, log: CallLog) -> Self {
        Self {
            label,
            log,
            fail_connect: false,
        }
    }

    /// Make `connect` fail with a configuration error
    pub fn fail_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }
}

/// Fake lock client with real per-key exclusion
#[derive(Clone)]
pub struct FakeLockClient {
    label: &'static str,
    log: CallLog,
    plan: Arc<FailurePlan>,
    locks: Arc<SyncMutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl FakeLockClient {
    pub fn new(label: &'static str, log: CallLog) -> Self {
        Self {
            label,
            log,
            plan: Arc::new(FailurePlan::default()),
            locks: Arc::new(SyncMutex::new(HashMap::new())),
        }
    }

    pub fn with_plan(mut self, plan: FailurePlan) -> Self {
        self.plan = Arc::new(plan);
        self
    }

    /// Call log shared by this fake
    pub fn log(&self) -> &CallLog {
        &self.log
    }
}

#[async_trait]
impl LockClient for FakeLockClient {
    type Handle = FakeLockHandle;

    async fn lock_key(&self, key: &str) -> LockResult<FakeLockHandle> {
        self.log.record(self.label, Op::Create, key);
        validate_key(key)?;
        if self.plan.fail_create.contains(key) {
            return Err(LockError::backend(format!(
                "{} refused handle for {}",
                self.label, key
            )));
        }

        let mutex = self
            .locks
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        Ok(FakeLockHandle {
            label: self.label,
            key: key.to_string(),
            log: self.log.clone(),
            plan: Arc::clone(&self.plan),
            mutex,
            guard: None,
        })
    }

    fn backend_name(&self) -> &'static str {
        self.label
    }
}

#[async_trait]
impl ConnectLockClient for FakeLockClient {
    type Config = FakeConfig;

    async fn connect(config: FakeConfig) -> LockResult<Self> {
        if config.fail_connect {
            return Err(LockError::config(format!(
                "{} rejected its configuration",
                config.label
            )));
        }
        Ok(Self::new(config.label, config.log))
    }
}

/// Handle produced by [`FakeLockClient`]
pub struct FakeLockHandle {
    label: &'static str,
    key: String,
    log: CallLog,
    plan: Arc<FailurePlan>,
    mutex: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl FakeLockHandle {
    pub fn is_held(&self) -> bool {
        self.guard.is_some()
    }
}

#[async_trait]
impl LockHandle for FakeLockHandle {
    fn key(&self) -> &str {
        &self.key
    }

    async fn acquire(&mut self) -> LockResult<()> {
        self.log.record(self.label, Op::Acquire, &self.key);
        if self.plan.fail_acquire {
            return Err(LockError::backend(format!("{} acquire failed", self.label)));
        }
        if self.guard.is_some() {
            return Err(LockError::AlreadyHeld(self.key.clone()));
        }
        self.guard = Some(Arc::clone(&self.mutex).lock_owned().await);
        Ok(())
    }

    async fn try_acquire(&mut self) -> LockResult<bool> {
        self.log.record(self.label, Op::TryAcquire, &self.key);
        if self.plan.fail_acquire {
            return Err(LockError::backend(format!("{} acquire failed", self.label)));
        }
        if self.plan.busy {
            return Ok(false);
        }
        if self.guard.is_some() {
            return Err(LockError::AlreadyHeld(self.key.clone()));
        }
        match Arc::clone(&self.mutex).try_lock_owned() {
            Ok(guard) => {
                self.guard = Some(guard);
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn release(&mut self) -> LockResult<()> {
        self.log.record(self.label, Op::Release, &self.key);
        let guard = self.guard.take();
        if self.plan.fail_release {
            return Err(LockError::backend(format!("{} release failed", self.label)));
        }
        match guard {
            Some(_) => Ok(()),
            None => Err(LockError::NotHeld(self.key.clone())),
        }
    }

    fn abandon(&mut self) {
        self.log.record(self.label, Op::Abandon, &self.key);
        self.guard.take();
    }

    async fn discard(&mut self) -> LockResult<()> {
        self.log.record(self.label, Op::Discard, &self.key);
        self.guard.take();
        Ok(())
    }
}
