//! Integration tests for combolock-redis

use combolock_core::{
    Backend, CombinationError, CombinationLockClient, LockClient, LockHandle,
};
use combolock_redis::*;
use std::time::Duration;

#[tokio::test]
async fn test_invalid_url_is_backend_init_error() {
    let config = RedisLockConfig::new("memcached://localhost:11211");
    let err = CombinationLockClient::<RedisLockClient>::connect(config)
        .await
        .err()
        .unwrap();

    assert!(matches!(
        err,
        CombinationError::BackendInit {
            backend: Backend::Distributed,
            ..
        }
    ));
}

#[tokio::test]
async fn test_unreachable_server_is_backend_init_error() {
    let config = RedisLockConfig::builder()
        .url("redis://127.0.0.1:1")
        .connection_timeout(Duration::from_millis(500))
        .build();

    let result = CombinationLockClient::<RedisLockClient>::connect(config).await;
    assert!(matches!(
        result,
        Err(CombinationError::BackendInit { .. })
    ));
}

// These tests require Redis running on localhost:6379
// Run with: cargo test -- --ignored

fn local_config(folder: &str) -> RedisLockConfig {
    RedisLockConfig::builder()
        .url("redis://127.0.0.1:6379")
        .base_folder(format!("combolock-tests/{}", folder))
        .session_ttl(Duration::from_secs(5))
        .retry_interval(Duration::from_millis(20))
        .build()
}

#[tokio::test]
#[ignore]
async fn test_redis_acquire_release() {
    let client = RedisLockClient::new(local_config("acquire")).await.unwrap();
    let mut first = client.lock_key("job").await.unwrap();
    let mut second = client.lock_key("job").await.unwrap();

    first.acquire().await.unwrap();
    assert!(first.is_held());
    assert!(!second.try_acquire().await.unwrap());

    first.release().await.unwrap();
    assert!(second.try_acquire().await.unwrap());
    second.release().await.unwrap();

    assert!(first.release().await.unwrap_err().is_not_held());
}

#[tokio::test]
#[ignore]
async fn test_redis_wait_time_expires() {
    let config = RedisLockConfig {
        wait_time: Some(Duration::from_millis(200)),
        ..local_config("wait")
    };
    let client = RedisLockClient::new(config).await.unwrap();
    let mut holder = client.lock_key("job").await.unwrap();
    let mut waiter = client.lock_key("job").await.unwrap();

    holder.acquire().await.unwrap();
    assert!(waiter.acquire().await.unwrap_err().is_timeout());
    holder.release().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_redis_lease_renewed_while_held() {
    let config = RedisLockConfig {
        session_ttl: Duration::from_millis(600),
        ..local_config("renew")
    };
    let client = RedisLockClient::new(config).await.unwrap();
    let mut holder = client.lock_key("job").await.unwrap();
    let mut other = client.lock_key("job").await.unwrap();

    holder.acquire().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!other.try_acquire().await.unwrap());

    holder.release().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_redis_combination_lock() {
    let client = CombinationLockClient::<RedisLockClient>::connect(local_config("combo"))
        .await
        .unwrap();

    let mut first = client.lock_key("report").await.unwrap();
    let mut second = client.lock_key("report").await.unwrap();

    first.acquire().await.unwrap();
    assert!(!second.try_acquire().await.unwrap());
    first.release().await.unwrap();

    assert!(second.try_acquire().await.unwrap());
    second.release().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_redis_drop_releases_in_background() {
    let client = RedisLockClient::new(local_config("drop")).await.unwrap();
    let mut holder = client.lock_key("job").await.unwrap();
    holder.acquire().await.unwrap();
    drop(holder);

    let mut other = client.lock_key("job").await.unwrap();
    let freed = tokio::time::timeout(Duration::from_secs(2), other.acquire()).await;
    assert!(freed.is_ok_and(|res| res.is_ok()));
    other.release().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_redis_cancelled_acquire_leaves_no_lease() {
    let client = RedisLockClient::new(local_config("cancel")).await.unwrap();
    let mut handle = client.lock_key("job").await.unwrap();

    // Cut the acquire off after the SET may already have been sent
    let _ = tokio::time::timeout(Duration::from_micros(1), handle.acquire()).await;
    let _ = handle.release().await;

    let mut other = client.lock_key("job").await.unwrap();
    assert!(other.try_acquire().await.unwrap());
    other.release().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_redis_abandon_frees_lease() {
    let client = RedisLockClient::new(local_config("abandon")).await.unwrap();
    let mut holder = client.lock_key("job").await.unwrap();
    holder.acquire().await.unwrap();
    holder.abandon();
    assert!(!holder.is_held());

    let mut other = client.lock_key("job").await.unwrap();
    let freed = tokio::time::timeout(Duration::from_secs(2), other.acquire()).await;
    assert!(freed.is_ok_and(|res| res.is_ok()));
    other.release().await.unwrap();
}
