//! Distributed locks using Redis

use crate::config::RedisLockConfig;
use crate::error::{RedisLockError, Result};
use async_trait::async_trait;
use combolock_core::{
    ConnectLockClient, LockClient, LockError, LockHandle, LockResult, validate_key,
};
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Delete the lease only if it still carries our token
const RELEASE_SCRIPT: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("del", KEYS[1])
    else
        return 0
    end
"#;

/// Extend the lease only if it still carries our token
const RENEW_SCRIPT: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("pexpire", KEYS[1], ARGV[2])
    else
        return 0
    end
"#;

/// Redis-backed distributed lock client
#[derive(Clone)]
pub struct RedisLockClient {
    conn: ConnectionManager,
    config: Arc<RedisLockConfig>,
}

impl RedisLockClient {
    /// Connect to Redis
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use combolock_redis::{RedisLockClient, RedisLockConfig};
    ///
    /// let config = RedisLockConfig::new("redis://127.0.0.1/");
    /// let client = RedisLockClient::new(config).await?;
    /// ```
    pub async fn new(config: RedisLockConfig) -> Result<Self> {
        config.validate()?;

        let client = redis::Client::open(config.connection_url())
            .map_err(|e| RedisLockError::Config(e.to_string()))?;

        let conn = tokio::time::timeout(config.connection_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| RedisLockError::Timeout(format!("connecting to {}", config.url)))?
            .map_err(|e| RedisLockError::Connection(e.to_string()))?;

        info!(url = %config.url, base_folder = %config.base_folder, "Connected Redis lock client");
        Ok(Self::from_connection(conn, config))
    }

    /// Use an existing connection
    pub fn from_connection(conn: ConnectionManager, config: RedisLockConfig) -> Self {
        Self {
            conn,
            config: Arc::new(config),
        }
    }

    /// Client configuration
    pub fn config(&self) -> &RedisLockConfig {
        &self.config
    }
}

#[async_trait]
impl LockClient for RedisLockClient {
    type Handle = RedisLockHandle;

    async fn lock_key(&self, key: &str) -> LockResult<RedisLockHandle> {
        validate_key(key)?;

        let path = self.config.lock_path(key);
        trace!(key = %key, path = %path, "Created Redis lock handle");
        Ok(RedisLockHandle {
            key: key.to_string(),
            path,
            token: None,
            pending: None,
            conn: self.conn.clone(),
            config: Arc::clone(&self.config),
            renewal: None,
        })
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

#[async_trait]
impl ConnectLockClient for RedisLockClient {
    type Config = RedisLockConfig;

    async fn connect(config: RedisLockConfig) -> LockResult<Self> {
        Ok(Self::new(config).await?)
    }
}

/// Handle on one Redis lease
pub struct RedisLockHandle {
    key: String,
    path: String,
    token: Option<String>,
    /// Token of a `SET` whose reply was never seen
    pending: Option<String>,
    conn: ConnectionManager,
    config: Arc<RedisLockConfig>,
    renewal: Option<JoinHandle<()>>,
}

impl RedisLockHandle {
    /// Redis key holding the lease
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether this handle currently holds the lease
    pub fn is_held(&self) -> bool {
        self.token.is_some()
    }

    fn ttl_ms(&self) -> u64 {
        self.config.session_ttl.as_millis() as u64
    }

    /// One `SET NX PX` attempt; returns the token on success
    ///
    /// The token stays in `pending` while the reply is outstanding, so a
    /// cancelled attempt can still be cleaned up by `release` or drop.
    async fn try_set(&mut self) -> Result<Option<String>> {
        let token = Uuid::new_v4().to_string();
        self.pending = Some(token.clone());

        let result: redis::RedisResult<Option<String>> = redis::cmd("SET")
            .arg(&self.path)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(self.ttl_ms())
            .query_async(&mut self.conn)
            .await;

        self.pending = None;
        Ok(result?.map(|_| token))
    }

    fn take_token(&mut self) -> Option<String> {
        self.token.take().or_else(|| self.pending.take())
    }

    fn spawn_release(&self, token: String) {
        // Without a runtime the lease expires on its own
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(path = %self.path, "No runtime to release Redis lock; lease left to expire");
            return;
        };

        let path = self.path.clone();
        let mut conn = self.conn.clone();
        runtime.spawn(async move {
            let result: redis::RedisResult<i32> = redis::Script::new(RELEASE_SCRIPT)
                .key(&path)
                .arg(&token)
                .invoke_async(&mut conn)
                .await;

            match result {
                Ok(_) => debug!(path = %path, "Released Redis lock in background"),
                Err(e) => warn!(path = %path, error = %e, "Background Redis lock release failed"),
            }
        });
    }

    fn on_acquired(&mut self, token: String) {
        info!(key = %self.key, path = %self.path, "Acquired Redis lock");
        if self.config.renew {
            self.renewal = Some(self.spawn_renewal(token.clone()));
        }
        self.token = Some(token);
    }

    fn spawn_renewal(&self, token: String) -> JoinHandle<()> {
        let mut conn = self.conn.clone();
        let path = self.path.clone();
        let ttl_ms = self.ttl_ms();
        let period = self.config.renew_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;

                let result: redis::RedisResult<i32> = redis::Script::new(RENEW_SCRIPT)
                    .key(&path)
                    .arg(&token)
                    .arg(ttl_ms)
                    .invoke_async(&mut conn)
                    .await;

                match result {
                    Ok(1) => trace!(path = %path, "Renewed Redis lease"),
                    Ok(_) => {
                        warn!(path = %path, "Redis lease lost before release; stopping renewal");
                        break;
                    }
                    Err(e) => warn!(path = %path, error = %e, "Failed to renew Redis lease"),
                }
            }
        })
    }

    fn stop_renewal(&mut self) {
        if let Some(task) = self.renewal.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl LockHandle for RedisLockHandle {
    fn key(&self) -> &str {
        &self.key
    }

    async fn acquire(&mut self) -> LockResult<()> {
        if self.token.is_some() {
            return Err(LockError::AlreadyHeld(self.key.clone()));
        }

        let start = Instant::now();
        loop {
            if let Some(token) = self.try_set().await? {
                self.on_acquired(token);
                return Ok(());
            }

            if let Some(wait) = self.config.wait_time
                && start.elapsed() >= wait {
                    return Err(LockError::Timeout(self.path.clone()));
                }

            trace!(path = %self.path, "Redis lock held elsewhere, retrying");
            tokio::time::sleep(self.config.retry_interval).await;
        }
    }

    async fn try_acquire(&mut self) -> LockResult<bool> {
        if self.token.is_some() {
            return Err(LockError::AlreadyHeld(self.key.clone()));
        }

        match self.try_set().await? {
            Some(token) => {
                self.on_acquired(token);
                Ok(true)
            }
            None => {
                debug!(path = %self.path, "Redis lock already held");
                Ok(false)
            }
        }
    }

    async fn release(&mut self) -> LockResult<()> {
        self.stop_renewal();

        let Some(token) = self.take_token() else {
            return Err(LockError::NotHeld(self.path.clone()));
        };

        let result: i32 = redis::Script::new(RELEASE_SCRIPT)
            .key(&self.path)
            .arg(&token)
            .invoke_async(&mut self.conn)
            .await
            .map_err(RedisLockError::from)?;

        if result == 1 {
            debug!(path = %self.path, "Released Redis lock");
            Ok(())
        } else {
            warn!(path = %self.path, "Failed to release Redis lock (not held or expired)");
            Err(LockError::NotHeld(self.path.clone()))
        }
    }

    fn abandon(&mut self) {
        self.stop_renewal();
        if let Some(token) = self.take_token() {
            self.spawn_release(token);
        }
    }
}

impl Drop for RedisLockHandle {
    fn drop(&mut self) {
        self.abandon();
    }
}
