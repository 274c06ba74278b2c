// combolock - keyed mutual exclusion across a fleet of processes
//
// This library layers a process-local mutex under a distributed lock so that
// only one task per process contends for the distributed store at a time.

// Re-export core functionality
pub use combolock_core::*;

// Re-export optional crates
#[cfg(feature = "redis")]
pub use combolock_redis as redis;

/// Combination lock client backed by Redis
#[cfg(feature = "redis")]
pub type RedisCombinationLockClient = CombinationLockClient<combolock_redis::RedisLockClient>;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Backend,
        CombinationError,
        CombinationLock,
        CombinationLockClient,
        CombinationResult,
        ConnectLockClient,
        LocalLockClient,
        LockClient,
        LockError,
        LockHandle,
        LockState,
    };

    #[cfg(feature = "redis")]
    pub use crate::RedisCombinationLockClient;
    #[cfg(feature = "redis")]
    pub use crate::redis::{RedisLockClient, RedisLockConfig};
}
