//! Combination locks
//!
//! Mutual exclusion keyed by a string, safe across a fleet of processes and
//! across concurrent tasks inside one process.
//!
//! ## How it works
//!
//! A [`CombinationLock`] pairs two handles for the same key:
//!
//! - a **local** handle ([`LocalLockClient`]), an in-process mutex, and
//! - a **distributed** handle from any [`LockClient`] backed by a shared
//!   store (see the `combolock-redis` crate).
//!
//! `acquire` takes the local lock first, so only one task per process ever
//! waits on the distributed store for a given key. `release` frees the
//! distributed lock first and always attempts both releases, reporting
//! every failure in one [`CombinationError::Release`].
//!
//! ## Quick Start
//!
//! ```rust
//! use combolock_core::{CombinationLockClient, LocalLockClient};
//!
//! # tokio_test::block_on(async {
//! // Any `LockClient` works as the distributed side
//! let client = CombinationLockClient::new(LocalLockClient::new());
//!
//! let mut lock = client.lock_key("invoices/42").await?;
//! lock.acquire().await?;
//! // critical section
//! lock.release().await?;
//! # Ok::<(), combolock_core::CombinationError>(())
//! # }).unwrap();
//! ```

pub mod combination;
pub mod error;
pub mod factory;
pub mod handle;
pub mod local;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use combination::{CombinationLock, LockState};
pub use error::{
    Backend, CombinationError, CombinationResult, LockError, LockResult, ReleaseFailure,
    ReleaseFailures,
};
pub use factory::CombinationLockClient;
pub use handle::{ConnectLockClient, LockClient, LockHandle, validate_key};
pub use local::{LocalLockClient, LocalLockHandle};
