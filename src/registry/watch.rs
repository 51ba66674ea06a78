//! Watch-list construction and Check-handler comparison.

use std::collections::BTreeMap;

use super::hydrate;
use crate::model::{ConnectMode, ServiceInstance, Status, WatchEntry, WatchList};
use crate::store::{keys, StoreAdapter};
use crate::error::Result;

/// The snapshot returned after Register/Online: for each type named in
/// `rely_list`, every instance currently in that type's address list
/// (any status — the caller decides what to do with it).
pub async fn build_watch_list(
    store: &dyn StoreAdapter,
    store_name: &str,
    group: &str,
    rely_types: &[i32],
) -> Result<WatchList> {
    let mut entries = Vec::with_capacity(rely_types.len());
    for &service_type in rely_types {
        let addrs = store.set_scan(store_name, &keys::service_type_addr_list(group, service_type)).await?;
        let instances = hydrate(store, store_name, group, &addrs).await?;
        entries.push(WatchEntry { service_type, instances });
    }
    Ok(WatchList { entries })
}

/// Attributes compared element-wise by the Check handler. `addr` is the
/// join key; `host_name`/`nickname`/`service_name`/`rely_list` are not
/// part of the comparison.
type Comparable = (Status, String, u32, ConnectMode, String);

fn comparable(inst: &ServiceInstance) -> Comparable {
    (inst.status, inst.semver.clone(), inst.service_weight, inst.connect_mode, inst.group_tab.clone())
}

fn as_map(instances: &[ServiceInstance]) -> BTreeMap<String, Comparable> {
    instances.iter().map(|i| (i.addr.clone(), comparable(i))).collect()
}

/// Rebuilds the authoritative Online/Register set for each type in
/// `client_watch` and compares it against what the client believes.
/// Returns `(is_passed, authoritative_watch_list)`.
pub async fn check(
    store: &dyn StoreAdapter,
    store_name: &str,
    group: &str,
    client_watch: &WatchList,
) -> Result<(bool, WatchList)> {
    let mut passed = true;
    let mut entries = Vec::with_capacity(client_watch.entries.len());

    for claimed in &client_watch.entries {
        let addrs = store.set_scan(store_name, &keys::service_type_addr_list(group, claimed.service_type)).await?;
        let all = hydrate(store, store_name, group, &addrs).await?;
        let authoritative: Vec<ServiceInstance> = all.into_iter().filter(|i| i.status.is_live()).collect();

        // Eviction never removes an address from AddrList/LevelAddrList, it
        // only flips status to Offline, so a client's claimed entry for a
        // since-evicted dependency is never refreshed. Comparing it against
        // the live-only authoritative set would fail forever; only live
        // claimed entries are held to account.
        let live_claimed: Vec<ServiceInstance> = claimed.instances.iter().filter(|i| i.status.is_live()).cloned().collect();

        if as_map(&live_claimed) != as_map(&authoritative) {
            passed = false;
        }
        entries.push(WatchEntry { service_type: claimed.service_type, instances: authoritative });
    }

    Ok((passed, WatchList { entries }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConnectMode, Status};
    use crate::registry::refresh;
    use crate::testing::InMemoryStore;
    use std::collections::BTreeSet;

    fn instance(addr: &str, service_type: i32, status: Status, semver: &str, weight: u32) -> ServiceInstance {
        ServiceInstance {
            addr: addr.into(),
            host_name: "host".into(),
            status,
            service_type,
            semver: semver.into(),
            service_weight: weight,
            connect_mode: ConnectMode::DirectRpc,
            group_tab: "g1".into(),
            service_name: "svc".into(),
            nickname: "nick".into(),
            rely_list: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn watch_list_reflects_type_addr_list_membership() {
        let store = InMemoryStore::default();
        refresh(&store, "primary", "g1", &instance("a", 5, Status::Online, "1.0.0", 1)).await.unwrap();

        let watch = build_watch_list(&store, "primary", "g1", &[5]).await.unwrap();
        assert_eq!(watch.entries[0].instances.len(), 1);
        assert_eq!(watch.entries[0].instances[0].addr, "a");
    }

    #[tokio::test]
    async fn check_detects_weight_drift() {
        let store = InMemoryStore::default();
        refresh(&store, "primary", "g1", &instance("a", 5, Status::Online, "1.0.0", 10)).await.unwrap();

        let claimed = WatchList {
            entries: vec![WatchEntry { service_type: 5, instances: vec![instance("a", 5, Status::Online, "1.0.0", 1)] }],
        };
        let (passed, authoritative) = check(&store, "primary", "g1", &claimed).await.unwrap();
        assert!(!passed);
        assert_eq!(authoritative.entries[0].instances[0].service_weight, 10);
    }

    #[tokio::test]
    async fn check_passes_when_identical() {
        let store = InMemoryStore::default();
        refresh(&store, "primary", "g1", &instance("a", 5, Status::Online, "1.0.0", 10)).await.unwrap();

        let claimed = WatchList {
            entries: vec![WatchEntry { service_type: 5, instances: vec![instance("a", 5, Status::Online, "1.0.0", 10)] }],
        };
        let (passed, _) = check(&store, "primary", "g1", &claimed).await.unwrap();
        assert!(passed);
    }

    #[tokio::test]
    async fn check_excludes_offline_instances_from_authoritative_set() {
        let store = InMemoryStore::default();
        refresh(&store, "primary", "g1", &instance("a", 5, Status::Online, "1.0.0", 10)).await.unwrap();
        crate::registry::evict(&store, "primary", "g1", "a").await.unwrap();

        let claimed = WatchList { entries: vec![WatchEntry { service_type: 5, instances: vec![] }] };
        let (passed, authoritative) = check(&store, "primary", "g1", &claimed).await.unwrap();
        assert!(passed);
        assert!(authoritative.entries[0].instances.is_empty());
    }

    #[tokio::test]
    async fn check_ignores_stale_offline_entry_for_evicted_dependency() {
        let store = InMemoryStore::default();
        refresh(&store, "primary", "g1", &instance("a", 5, Status::Online, "1.0.0", 10)).await.unwrap();
        crate::registry::evict(&store, "primary", "g1", "a").await.unwrap();

        let claimed = WatchList {
            entries: vec![WatchEntry { service_type: 5, instances: vec![instance("a", 5, Status::Offline, "1.0.0", 10)] }],
        };
        let (passed, authoritative) = check(&store, "primary", "g1", &claimed).await.unwrap();
        assert!(passed);
        assert!(authoritative.entries[0].instances.is_empty());
    }
}
