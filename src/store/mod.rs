//! Typed operations over the remote key/value store.
//!
//! [`StoreAdapter`] is the trait boundary tests substitute with an
//! in-memory fake; [`RedisStoreAdapter`] is the production implementation
//! backed by Redis-compatible servers, one bounded `bb8` pool per
//! configured store connection.

pub mod keys;
pub mod lock;

use async_trait::async_trait;
use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use dashmap::DashMap;
use redis::AsyncCommands;

use crate::config::RedisEntry;
use crate::error::{Error, Result};

const SCAN_PAGE_SIZE: u32 = 1024;

#[async_trait]
pub trait StoreAdapter: Send + Sync {
    async fn hash_get(&self, store: &str, key: &str, field: &str) -> Result<Option<Vec<u8>>>;
    async fn hash_set_field(&self, store: &str, key: &str, field: &str, value: &[u8]) -> Result<()>;
    async fn hash_del_field(&self, store: &str, key: &str, field: &str) -> Result<()>;
    /// Full `(field, value)` enumeration of a hash, driven by cursor-based
    /// `HSCAN` with `COUNT 1024` until the cursor returns to zero.
    async fn hash_scan(&self, store: &str, key: &str) -> Result<Vec<(String, Vec<u8>)>>;

    async fn set_add(&self, store: &str, key: &str, member: &str) -> Result<()>;
    async fn set_rem(&self, store: &str, key: &str, member: &str) -> Result<()>;
    async fn set_scan(&self, store: &str, key: &str) -> Result<Vec<String>>;

    async fn zset_add(&self, store: &str, key: &str, score: f64, member: &str) -> Result<()>;
    async fn zset_rem(&self, store: &str, key: &str, member: &str) -> Result<()>;
    async fn zset_range_by_score(&self, store: &str, key: &str, min: f64, max: f64) -> Result<Vec<String>>;

    /// `SET key value NX PX ttl_ms`. `true` iff the key was absent and is
    /// now held by this caller.
    async fn atomic_set_if_absent_with_ttl(&self, store: &str, key: &str, value: &str, ttl_ms: u64) -> Result<bool>;
    async fn unlink(&self, store: &str, key: &str) -> Result<()>;
}

pub struct RedisStoreAdapter {
    pools: DashMap<String, Pool<RedisConnectionManager>>,
}

impl RedisStoreAdapter {
    pub async fn new(entries: &[RedisEntry]) -> Result<Self> {
        let pools = DashMap::new();
        for entry in entries {
            let manager = RedisConnectionManager::new(entry.connection_url())
                .map_err(|e| Error::StorePoolUnavailable { store: entry.name.clone(), reason: e.to_string() })?;
            let pool = Pool::builder()
                .max_size(entry.max_pool_size)
                .build(manager)
                .await
                .map_err(|e| Error::StorePoolUnavailable { store: entry.name.clone(), reason: e.to_string() })?;
            pools.insert(entry.name.clone(), pool);
        }
        Ok(Self { pools })
    }

    fn pool(&self, store: &str) -> Result<Pool<RedisConnectionManager>> {
        self.pools
            .get(store)
            .map(|p| p.clone())
            .ok_or_else(|| Error::StorePoolUnavailable { store: store.to_string(), reason: "no pool configured".into() })
    }
}

#[async_trait]
impl StoreAdapter for RedisStoreAdapter {
    async fn hash_get(&self, store: &str, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        let pool = self.pool(store)?;
        let mut conn = pool.get().await.map_err(pool_err(store))?;
        let value: Option<Vec<u8>> = conn.hget(key, field).await.map_err(Error::from)?;
        Ok(value)
    }

    async fn hash_set_field(&self, store: &str, key: &str, field: &str, value: &[u8]) -> Result<()> {
        let pool = self.pool(store)?;
        let mut conn = pool.get().await.map_err(pool_err(store))?;
        let _: () = conn.hset(key, field, value).await.map_err(Error::from)?;
        Ok(())
    }

    async fn hash_del_field(&self, store: &str, key: &str, field: &str) -> Result<()> {
        let pool = self.pool(store)?;
        let mut conn = pool.get().await.map_err(pool_err(store))?;
        let _: () = conn.hdel(key, field).await.map_err(Error::from)?;
        Ok(())
    }

    async fn hash_scan(&self, store: &str, key: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let pool = self.pool(store)?;
        let mut conn = pool.get().await.map_err(pool_err(store))?;
        let mut out = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<(String, Vec<u8>)>) = redis::cmd("HSCAN")
                .arg(key)
                .arg(cursor)
                .arg("COUNT")
                .arg(SCAN_PAGE_SIZE)
                .query_async(&mut *conn)
                .await
                .map_err(Error::from)?;
            out.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(out)
    }

    async fn set_add(&self, store: &str, key: &str, member: &str) -> Result<()> {
        let pool = self.pool(store)?;
        let mut conn = pool.get().await.map_err(pool_err(store))?;
        let _: () = conn.sadd(key, member).await.map_err(Error::from)?;
        Ok(())
    }

    async fn set_rem(&self, store: &str, key: &str, member: &str) -> Result<()> {
        let pool = self.pool(store)?;
        let mut conn = pool.get().await.map_err(pool_err(store))?;
        let _: () = conn.srem(key, member).await.map_err(Error::from)?;
        Ok(())
    }

    async fn set_scan(&self, store: &str, key: &str) -> Result<Vec<String>> {
        let pool = self.pool(store)?;
        let mut conn = pool.get().await.map_err(pool_err(store))?;
        let mut out = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SSCAN")
                .arg(key)
                .arg(cursor)
                .arg("COUNT")
                .arg(SCAN_PAGE_SIZE)
                .query_async(&mut *conn)
                .await
                .map_err(Error::from)?;
            out.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(out)
    }

    async fn zset_add(&self, store: &str, key: &str, score: f64, member: &str) -> Result<()> {
        let pool = self.pool(store)?;
        let mut conn = pool.get().await.map_err(pool_err(store))?;
        let _: () = conn.zadd(key, member, score).await.map_err(Error::from)?;
        Ok(())
    }

    async fn zset_rem(&self, store: &str, key: &str, member: &str) -> Result<()> {
        let pool = self.pool(store)?;
        let mut conn = pool.get().await.map_err(pool_err(store))?;
        let _: () = conn.zrem(key, member).await.map_err(Error::from)?;
        Ok(())
    }

    async fn zset_range_by_score(&self, store: &str, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        let pool = self.pool(store)?;
        let mut conn = pool.get().await.map_err(pool_err(store))?;
        let members: Vec<String> = conn.zrangebyscore(key, min, max).await.map_err(Error::from)?;
        Ok(members)
    }

    async fn atomic_set_if_absent_with_ttl(&self, store: &str, key: &str, value: &str, ttl_ms: u64) -> Result<bool> {
        let pool = self.pool(store)?;
        let mut conn = pool.get().await.map_err(pool_err(store))?;
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut *conn)
            .await
            .map_err(Error::from)?;
        Ok(result.is_some())
    }

    async fn unlink(&self, store: &str, key: &str) -> Result<()> {
        let pool = self.pool(store)?;
        let mut conn = pool.get().await.map_err(pool_err(store))?;
        let _: () = conn.unlink(key).await.map_err(Error::from)?;
        Ok(())
    }
}

fn pool_err(store: &str) -> impl FnOnce(bb8::RunError<redis::RedisError>) -> Error + '_ {
    move |e| Error::StorePoolUnavailable { store: store.to_string(), reason: e.to_string() }
}
