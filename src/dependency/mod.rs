//! Dependency Monitor: periodically re-derives the dependency graph and
//! alerts when a declared dependency has no satisfying Online provider.

pub mod alert;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::config::ConfigHandle;
use crate::model::{ServiceInstance, Status};
use crate::store::{keys, StoreAdapter};
use alert::Alerter;

const TICK_INTERVAL: Duration = Duration::from_secs(60);

pub async fn run(
    store: Arc<dyn StoreAdapter>,
    config: ConfigHandle,
    alerter: Arc<dyn Alerter>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => tick(store.as_ref(), &config, alerter.as_ref()).await,
            _ = shutdown.recv() => {
                info!("dependency monitor stopping");
                return;
            }
        }
    }
}

async fn tick(store: &dyn StoreAdapter, config: &ConfigHandle, alerter: &dyn Alerter) {
    let snapshot = config.load();
    for group_entry in &snapshot.group_list {
        let group = group_entry.group.as_str();
        let Some(store_name) = snapshot.redis_name_for_group(group) else { continue };

        let raw = match store.hash_scan(store_name, &keys::service_info(group)).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(group, error = %e, "dependency scan failed");
                continue;
            }
        };

        let mut records = Vec::with_capacity(raw.len());
        for (addr, bytes) in raw {
            match ServiceInstance::deserialize(&bytes) {
                Ok(inst) => records.push(inst),
                Err(e) => warn!(group, addr, error = %e, "dropping unparseable record from dependency scan"),
            }
        }

        evaluate(group, &records, snapshot.rely_warning_switch, alerter).await;
    }
}

/// (type, semver) demanded by some Online instance, mapped to the set of
/// demanders that declared it.
type Demand = BTreeMap<(i32, String), BTreeSet<(i32, String)>>;

async fn evaluate(group: &str, records: &[ServiceInstance], rely_warning_switch: bool, alerter: &dyn Alerter) {
    let mut demand: Demand = BTreeMap::new();
    let mut supply: BTreeMap<i32, Vec<&ServiceInstance>> = BTreeMap::new();

    for inst in records {
        supply.entry(inst.service_type).or_default().push(inst);
        if inst.status == Status::Online {
            for rely in &inst.rely_list {
                demand
                    .entry((rely.rely_service_type, rely.rely_semver.clone()))
                    .or_default()
                    .insert((inst.service_type, inst.semver.clone()));
            }
        }
    }

    for ((service_type, required_version), demanders) in &demand {
        let Ok(required) = semver::Version::parse(required_version) else {
            warn!(group, service_type, version = %required_version, "dependency declares unparseable required version, skipping");
            continue;
        };
        let empty = Vec::new();
        let candidates = supply.get(service_type).unwrap_or(&empty);

        let has_online_satisfier = candidates
            .iter()
            .any(|i| i.status == Status::Online && semver::Version::parse(&i.semver).map(|v| v >= required).unwrap_or(false));

        if has_online_satisfier {
            continue;
        }

        crate::metrics::REGISTRY_DEPENDENCY_ALERTS_TOTAL.inc();
        warn!(group, service_type, version = %required_version, ?demanders, "no online provider satisfies declared dependency");

        if !rely_warning_switch {
            continue;
        }

        let title = match select_exemplar(candidates) {
            Some(exemplar) => format!("{}-服务缺失", exemplar.nickname),
            None => format!("type-{service_type}-服务缺失"),
        };
        let body = format!("required {service_type}@{required_version}, demanded by {demanders:?}");
        if let Err(e) = alerter.send(&title, &body).await {
            warn!(group, error = %e, "dependency alert delivery failed");
        }
    }
}

/// First parseable candidate, then upgrade to any strictly-higher
/// parseable candidate, so the alert title names the highest-version
/// instance actually providing this type rather than just the first one
/// enumerated.
fn select_exemplar<'a>(candidates: &[&'a ServiceInstance]) -> Option<&'a ServiceInstance> {
    let mut best: Option<(&ServiceInstance, semver::Version)> = None;
    for candidate in candidates {
        let Ok(version) = semver::Version::parse(&candidate.semver) else { continue };
        match &best {
            None => best = Some((candidate, version)),
            Some((_, best_version)) if version > *best_version => best = Some((candidate, version)),
            _ => {}
        }
    }
    best.map(|(inst, _)| inst)
}
