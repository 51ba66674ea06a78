//! Change Propagator: buffers change events and fans them out to every
//! dependent of the changed instance's service type.

pub mod outbound;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::dependency::alert::Alerter;
use crate::model::{ConnectMode, ServiceInstance};
use crate::registry;
use crate::store::{keys, StoreAdapter};
use outbound::OutboundRpc;

const DRAIN_INTERVAL: Duration = Duration::from_millis(10);
const DRAIN_BATCH: usize = 10;

pub struct ChangeEvent {
    pub store_name: String,
    pub group: String,
    pub instance: ServiceInstance,
}

#[derive(Clone, Copy)]
pub enum AlertKind {
    Registered,
    Online,
    Offline,
}

impl AlertKind {
    fn label(self) -> &'static str {
        match self {
            AlertKind::Registered => "registered",
            AlertKind::Online => "online",
            AlertKind::Offline => "offline",
        }
    }
}

pub struct AlertEvent {
    pub instance: ServiceInstance,
    pub kind: AlertKind,
}

/// Deliberately unbounded: a persistent backlog is meant to be a visible
/// bug, not a silently dropped one. A depth counter feeds the
/// `registry_change_queue_depth` gauge so operators can see backlog
/// growth even though nothing caps it.
#[derive(Clone)]
pub struct ChangeQueue {
    tx: mpsc::UnboundedSender<ChangeEvent>,
    depth: Arc<AtomicI64>,
}

impl ChangeQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChangeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, depth: Arc::new(AtomicI64::new(0)) }, rx)
    }

    pub fn push(&self, store_name: String, group: String, instance: ServiceInstance) {
        if self.tx.send(ChangeEvent { store_name, group, instance }).is_ok() {
            let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
            crate::metrics::REGISTRY_CHANGE_QUEUE_DEPTH.set(depth as f64);
        }
    }

    fn pop(&self) {
        let depth = self.depth.fetch_sub(1, Ordering::Relaxed) - 1;
        crate::metrics::REGISTRY_CHANGE_QUEUE_DEPTH.set(depth.max(0) as f64);
    }
}

#[derive(Clone)]
pub struct AlertQueue {
    tx: mpsc::UnboundedSender<AlertEvent>,
    depth: Arc<AtomicI64>,
}

impl AlertQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AlertEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, depth: Arc::new(AtomicI64::new(0)) }, rx)
    }

    pub fn push(&self, instance: ServiceInstance, kind: AlertKind) {
        if self.tx.send(AlertEvent { instance, kind }).is_ok() {
            let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
            crate::metrics::REGISTRY_ALERT_QUEUE_DEPTH.set(depth as f64);
        }
    }

    fn pop(&self) {
        let depth = self.depth.fetch_sub(1, Ordering::Relaxed) - 1;
        crate::metrics::REGISTRY_ALERT_QUEUE_DEPTH.set(depth.max(0) as f64);
    }
}

/// The fan-out algorithm for one change event on `instance`. Used both
/// by the asynchronous drain loop and, for Offline, the synchronous call
/// path so delivery completes before the RPC returns.
pub async fn fan_out(
    store: &dyn StoreAdapter,
    store_name: &str,
    group: &str,
    outbound: &dyn OutboundRpc,
    instance: &ServiceInstance,
) -> crate::error::Result<()> {
    if instance.connect_mode == ConnectMode::DirectRpc && instance.status.is_live() {
        if outbound.hello(&instance.addr).await.is_err() {
            warn!(group, addr = %instance.addr, "origin hello probe failed, evicting");
            crate::metrics::REGISTRY_NOTIFY_TOTAL.with_label_values(&["origin_hello_failed"]).inc();
            let _ = registry::evict(store, store_name, group, &instance.addr).await;
            return Ok(());
        }
    }

    let dependent_addrs = store.set_scan(store_name, &keys::service_type_level_addr_list(group, instance.service_type)).await?;
    let dependents = registry::hydrate(store, store_name, group, &dependent_addrs).await?;

    for dependent in dependents.iter().filter(|d| d.status.is_live()) {
        if outbound.hello(&dependent.addr).await.is_err() {
            crate::metrics::REGISTRY_NOTIFY_TOTAL.with_label_values(&["hello_failed"]).inc();
            continue;
        }
        match outbound.notify(&dependent.addr, instance).await {
            Ok(()) => crate::metrics::REGISTRY_NOTIFY_TOTAL.with_label_values(&["delivered"]).inc(),
            Err(e) => {
                warn!(group, dependent = %dependent.addr, error = %e, "notify delivery failed");
                crate::metrics::REGISTRY_NOTIFY_TOTAL.with_label_values(&["notify_failed"]).inc();
            }
        }
    }
    Ok(())
}

pub async fn run_change_drain(
    store: Arc<dyn StoreAdapter>,
    outbound: Arc<dyn OutboundRpc>,
    queue: ChangeQueue,
    mut rx: mpsc::UnboundedReceiver<ChangeEvent>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(DRAIN_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for _ in 0..DRAIN_BATCH {
                    let Ok(event) = rx.try_recv() else { break };
                    queue.pop();
                    if let Err(e) = fan_out(store.as_ref(), &event.store_name, &event.group, outbound.as_ref(), &event.instance).await {
                        warn!(group = %event.group, error = %e, "fan-out failed");
                    }
                }
            }
            _ = shutdown.recv() => {
                info!("change propagator stopping");
                return;
            }
        }
    }
}

pub async fn run_alert_drain(
    alerter: Arc<dyn Alerter>,
    queue: AlertQueue,
    mut rx: mpsc::UnboundedReceiver<AlertEvent>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(DRAIN_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for _ in 0..DRAIN_BATCH {
                    let Ok(event) = rx.try_recv() else { break };
                    queue.pop();
                    let title = format!("{}-{}", event.instance.nickname, event.kind.label());
                    if let Err(e) = alerter.send(&title, &event.instance.to_string()).await {
                        warn!(error = %e, "status alert delivery failed");
                    }
                }
            }
            _ = shutdown.recv() => {
                info!("alert drain stopping");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Status;
    use crate::testing::InMemoryStore;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    fn instance(addr: &str, service_type: i32, connect_mode: ConnectMode) -> ServiceInstance {
        ServiceInstance {
            addr: addr.into(),
            host_name: "host".into(),
            status: Status::Online,
            service_type,
            semver: "1.0.0".into(),
            service_weight: 1,
            connect_mode,
            group_tab: "g1".into(),
            service_name: "svc".into(),
            nickname: "nick".into(),
            rely_list: BTreeSet::new(),
        }
    }

    #[derive(Default)]
    struct RecordingRpc {
        notified: Mutex<Vec<String>>,
        hello_should_fail: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl OutboundRpc for RecordingRpc {
        async fn hello(&self, _addr: &str) -> crate::error::Result<()> {
            if self.hello_should_fail.load(std::sync::atomic::Ordering::Relaxed) {
                Err(crate::error::Error::OutboundRpc("forced failure".into()))
            } else {
                Ok(())
            }
        }

        async fn notify(&self, addr: &str, _instance: &ServiceInstance) -> crate::error::Result<()> {
            self.notified.lock().unwrap().push(addr.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn fan_out_notifies_live_dependents_only() {
        let store = InMemoryStore::default();
        registry::refresh(&store, "primary", "g1", &instance("dependent-online", 9, ConnectMode::None)).await.unwrap();
        let mut offline_dep = instance("dependent-offline", 9, ConnectMode::None);
        offline_dep.status = Status::Offline;
        registry::refresh(&store, "primary", "g1", &offline_dep).await.unwrap();
        store
            .set_add("primary", &keys::service_type_level_addr_list("g1", 5), "dependent-online")
            .await
            .unwrap();
        store
            .set_add("primary", &keys::service_type_level_addr_list("g1", 5), "dependent-offline")
            .await
            .unwrap();

        let rpc = RecordingRpc::default();
        let origin = instance("origin", 5, ConnectMode::None);
        fan_out(&store, "primary", "g1", &rpc, &origin).await.unwrap();

        let notified = rpc.notified.lock().unwrap();
        assert_eq!(notified.as_slice(), ["dependent-online"]);
    }

    #[tokio::test]
    async fn origin_hello_failure_evicts_and_aborts_fan_out() {
        let store = InMemoryStore::default();
        let origin = instance("origin", 5, ConnectMode::DirectRpc);
        registry::refresh(&store, "primary", "g1", &origin).await.unwrap();

        let rpc = RecordingRpc::default();
        rpc.hello_should_fail.store(true, std::sync::atomic::Ordering::Relaxed);
        fan_out(&store, "primary", "g1", &rpc, &origin).await.unwrap();

        assert!(rpc.notified.lock().unwrap().is_empty());
        let stored = store.hash_fields("primary", &keys::service_info("g1"));
        let record = ServiceInstance::deserialize(stored.get("origin").unwrap()).unwrap();
        assert_eq!(record.status, Status::Offline);
    }
}
