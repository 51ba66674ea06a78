//! Liveness Monitor: periodic eviction of instances whose heartbeat has
//! gone stale.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::config::ConfigHandle;
use crate::propagate::ChangeQueue;
use crate::registry;
use crate::store::{keys, StoreAdapter};

const TICK_INTERVAL: Duration = Duration::from_secs(3);
const EVICTION_THRESHOLD_MS: i64 = 9_000;

/// Runs until `shutdown` fires. One tick scans every configured group's
/// `PingScore` for addresses past the eviction threshold and evicts each.
pub async fn run(
    store: Arc<dyn StoreAdapter>,
    config: ConfigHandle,
    change_queue: ChangeQueue,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tick(store.as_ref(), &config, &change_queue).await;
            }
            _ = shutdown.recv() => {
                info!("liveness monitor stopping");
                return;
            }
        }
    }
}

async fn tick(store: &dyn StoreAdapter, config: &ConfigHandle, change_queue: &ChangeQueue) {
    let snapshot = config.load();
    let now_ms = now_epoch_ms();
    let cutoff = (now_ms - EVICTION_THRESHOLD_MS) as f64;

    for group_entry in &snapshot.group_list {
        let group = group_entry.group.as_str();
        let Some(store_name) = snapshot.redis_name_for_group(group) else { continue };

        let stale = match store.zset_range_by_score(store_name, &keys::service_ping(group), f64::NEG_INFINITY, cutoff).await {
            Ok(addrs) => addrs,
            Err(e) => {
                warn!(group, error = %e, "liveness scan failed");
                continue;
            }
        };

        for addr in stale {
            match registry::evict(store, store_name, group, &addr).await {
                Ok(Some(evicted)) => {
                    crate::metrics::REGISTRY_EVICTIONS_TOTAL.with_label_values(&[group]).inc();
                    info!(group, addr = %addr, "evicted stale instance");
                    change_queue.push(store_name.to_string(), group.to_string(), evicted);
                }
                Ok(None) => {}
                Err(e) => warn!(group, addr = %addr, error = %e, "eviction failed"),
            }
        }
    }
}

fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64
}
