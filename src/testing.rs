//! In-memory fakes shared by unit tests across modules and by the
//! crate's integration tests: end-to-end scenarios don't need a real
//! Redis to exercise the state machine.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use crate::error::Result;
use crate::store::StoreAdapter;

#[derive(Default)]
struct StoreState {
    hashes: HashMap<String, HashMap<String, Vec<u8>>>,
    hash_writes: HashMap<String, u64>,
    sets: HashMap<String, HashSet<String>>,
    zsets: HashMap<String, BTreeMap<String, i64>>,
    locks: HashMap<String, String>,
}

/// A single-process stand-in for [`StoreAdapter`]. Ignores the `store`
/// name parameter (tests run against one logical store) but keeps it in
/// the signature so call sites are identical to production code.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn set_members(&self, _store: &str, key: &str) -> HashSet<String> {
        self.state.lock().unwrap().sets.get(key).cloned().unwrap_or_default()
    }

    pub fn hash_write_count(&self, _store: &str, key: &str) -> u64 {
        *self.state.lock().unwrap().hash_writes.get(key).unwrap_or(&0)
    }

    pub fn ping_score(&self, _store: &str, key: &str, member: &str) -> Option<i64> {
        self.state.lock().unwrap().zsets.get(key).and_then(|z| z.get(member).copied())
    }

    pub fn hash_fields(&self, _store: &str, key: &str) -> HashMap<String, Vec<u8>> {
        self.state.lock().unwrap().hashes.get(key).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl StoreAdapter for InMemoryStore {
    async fn hash_get(&self, _store: &str, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.state.lock().unwrap().hashes.get(key).and_then(|h| h.get(field)).cloned())
    }

    async fn hash_set_field(&self, _store: &str, key: &str, field: &str, value: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.hashes.entry(key.to_string()).or_default().insert(field.to_string(), value.to_vec());
        *state.hash_writes.entry(key.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn hash_del_field(&self, _store: &str, key: &str, field: &str) -> Result<()> {
        if let Some(h) = self.state.lock().unwrap().hashes.get_mut(key) {
            h.remove(field);
        }
        Ok(())
    }

    async fn hash_scan(&self, _store: &str, key: &str) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .hashes
            .get(key)
            .map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn set_add(&self, _store: &str, key: &str, member: &str) -> Result<()> {
        self.state.lock().unwrap().sets.entry(key.to_string()).or_default().insert(member.to_string());
        Ok(())
    }

    async fn set_rem(&self, _store: &str, key: &str, member: &str) -> Result<()> {
        if let Some(s) = self.state.lock().unwrap().sets.get_mut(key) {
            s.remove(member);
        }
        Ok(())
    }

    async fn set_scan(&self, _store: &str, key: &str) -> Result<Vec<String>> {
        Ok(self.state.lock().unwrap().sets.get(key).map(|s| s.iter().cloned().collect()).unwrap_or_default())
    }

    async fn zset_add(&self, _store: &str, key: &str, score: f64, member: &str) -> Result<()> {
        self.state.lock().unwrap().zsets.entry(key.to_string()).or_default().insert(member.to_string(), score as i64);
        Ok(())
    }

    async fn zset_rem(&self, _store: &str, key: &str, member: &str) -> Result<()> {
        if let Some(z) = self.state.lock().unwrap().zsets.get_mut(key) {
            z.remove(member);
        }
        Ok(())
    }

    async fn zset_range_by_score(&self, _store: &str, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .zsets
            .get(key)
            .map(|z| z.iter().filter(|(_, &score)| (score as f64) >= min && (score as f64) <= max).map(|(m, _)| m.clone()).collect())
            .unwrap_or_default())
    }

    async fn atomic_set_if_absent_with_ttl(&self, _store: &str, key: &str, value: &str, _ttl_ms: u64) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if state.locks.contains_key(key) {
            Ok(false)
        } else {
            state.locks.insert(key.to_string(), value.to_string());
            Ok(true)
        }
    }

    async fn unlink(&self, _store: &str, key: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.locks.remove(key);
        state.hashes.remove(key);
        Ok(())
    }
}
