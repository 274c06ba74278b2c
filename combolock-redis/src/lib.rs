//! Redis distributed lock backend
//!
//! Implements the `combolock-core` lock traits on top of Redis leases, so it
//! can serve as the distributed half of a combination lock.
//!
//! ## Features
//!
//! - **Leases** - `SET NX PX` with a random token per acquisition
//! - **Safe release** - token-checked delete, never frees someone else's lock
//! - **Renewal** - background lease extension while the lock is held
//! - **Namespacing** - every key lives under a configurable base folder
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use combolock_core::CombinationLockClient;
//! use combolock_redis::{RedisLockClient, RedisLockConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisLockConfig::builder()
//!         .url("redis://127.0.0.1/")
//!         .base_folder("locks/reports")
//!         .session_ttl(Duration::from_secs(15))
//!         .build();
//!
//!     let client = CombinationLockClient::<RedisLockClient>::connect(config).await?;
//!
//!     let mut lock = client.lock_key("daily").await?;
//!     lock.acquire().await?;
//!     println!("Lock acquired, doing work...");
//!     lock.release().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod lock;

pub use config::{RedisLockConfig, RedisLockConfigBuilder};
pub use error::{RedisLockError, Result};
pub use lock::{RedisLockClient, RedisLockHandle};
