//! Advisory per-instance lock.
//!
//! Built entirely on the store's atomic set-if-absent-with-TTL primitive,
//! so it works against any `StoreAdapter` without a dedicated locking
//! command.

use std::time::Duration;
use tracing::warn;

use super::keys;
use super::StoreAdapter;
use crate::error::{Error, Result};

const MAX_ATTEMPTS: u32 = 30;
const RETRY_INTERVAL: Duration = Duration::from_millis(5);
const LEASE_TTL_MS: u64 = 50;

/// Holds the lock for `(group, addr)` until [`LockGuard::release`] is
/// called. `Drop` intentionally does *not* release — release is async and
/// fallible, and the lease's short TTL is the real liveness guarantee.
/// Failures to release are logged but non-fatal.
pub struct LockGuard {
    group: String,
    addr: String,
    key: String,
}

impl LockGuard {
    pub async fn release(self, store: &dyn StoreAdapter, store_name: &str) {
        if let Err(e) = store.unlink(store_name, &self.key).await {
            warn!(group = %self.group, addr = %self.addr, error = %e, "lock release failed, relying on TTL expiry");
        }
    }
}

/// Retries up to 30 times at 5ms intervals; fails with [`Error::LockBusy`]
/// when exhausted. The 50ms lease is deliberately shorter than the ~150ms
/// retry envelope so contention converges.
pub async fn acquire(store: &dyn StoreAdapter, store_name: &str, group: &str, addr: &str) -> Result<LockGuard> {
    let key = keys::service_info_lock(group, addr);
    for attempt in 0..MAX_ATTEMPTS {
        let acquired = store.atomic_set_if_absent_with_ttl(store_name, &key, addr, LEASE_TTL_MS).await?;
        if acquired {
            return Ok(LockGuard { group: group.to_string(), addr: addr.to_string(), key });
        }
        if attempt + 1 < MAX_ATTEMPTS {
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }
    Err(Error::LockBusy { group: group.to_string(), addr: addr.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::keys;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        locks: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl StoreAdapter for FakeStore {
        async fn hash_get(&self, _: &str, _: &str, _: &str) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }
        async fn hash_set_field(&self, _: &str, _: &str, _: &str, _: &[u8]) -> Result<()> {
            Ok(())
        }
        async fn hash_del_field(&self, _: &str, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        async fn hash_scan(&self, _: &str, _: &str) -> Result<Vec<(String, Vec<u8>)>> {
            Ok(vec![])
        }
        async fn set_add(&self, _: &str, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        async fn set_rem(&self, _: &str, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        async fn set_scan(&self, _: &str, _: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn zset_add(&self, _: &str, _: &str, _: f64, _: &str) -> Result<()> {
            Ok(())
        }
        async fn zset_rem(&self, _: &str, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        async fn zset_range_by_score(&self, _: &str, _: &str, _: f64, _: f64) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn atomic_set_if_absent_with_ttl(&self, _: &str, key: &str, value: &str, _: u64) -> Result<bool> {
            let mut locks = self.locks.lock().unwrap();
            if locks.contains_key(key) {
                Ok(false)
            } else {
                locks.insert(key.to_string(), value.to_string());
                Ok(true)
            }
        }
        async fn unlink(&self, _: &str, key: &str) -> Result<()> {
            self.locks.lock().unwrap().remove(key);
            Ok(())
        }
    }

    #[tokio::test]
    async fn second_acquire_fails_while_held() {
        let store = FakeStore::default();
        let guard = acquire(&store, "primary", "g1", "a").await.unwrap();
        assert_eq!(
            store.locks.lock().unwrap().get(&keys::service_info_lock("g1", "a")).cloned(),
            Some("a".to_string())
        );
        guard.release(&store, "primary").await;
        assert!(store.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn exhausted_retries_return_lock_busy() {
        let store = FakeStore::default();
        store.locks.lock().unwrap().insert(keys::service_info_lock("g1", "a"), "other".into());
        let result = acquire(&store, "primary", "g1", "a").await;
        assert!(matches!(result, Err(Error::LockBusy { .. })));
    }
}
