//! The refresh state machine: the single write entry point implementing
//! Register, Online, Offline, and Ping.

pub mod watch;

use tracing::warn;

use crate::model::ServiceInstance;
use crate::store::{keys, lock, StoreAdapter};
use crate::error::{Error, Result};

/// Result of [`refresh`]. A named struct rather than a bare tuple — this is
/// a public API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub is_status_notify: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct DiffFlags {
    clean_type: bool,
    clean_deps: bool,
    clean_all: bool,
    add_type: bool,
    add_deps: bool,
    changed: bool,
}

impl DiffFlags {
    fn any(&self) -> bool {
        self.clean_type || self.clean_deps || self.clean_all || self.add_type || self.add_deps || self.changed
    }
}

fn compute_flags(stored: Option<&ServiceInstance>, incoming: &ServiceInstance) -> DiffFlags {
    let Some(s) = stored else {
        return DiffFlags { clean_type: false, clean_deps: false, clean_all: false, add_type: true, add_deps: true, changed: true };
    };

    let rely_differs = s.rely_list != incoming.rely_list;
    DiffFlags {
        clean_type: s.service_type != incoming.service_type && s.service_type != 0,
        clean_deps: rely_differs && !s.rely_list.is_empty(),
        clean_all: s.group_tab != incoming.group_tab,
        add_type: s.service_type != incoming.service_type,
        add_deps: rely_differs,
        changed: s.semver != incoming.semver
            || s.service_weight != incoming.service_weight
            || s.connect_mode != incoming.connect_mode
            || s.nickname != incoming.nickname
            || s.service_name != incoming.service_name
            || s.group_tab != incoming.group_tab
            || s.service_type != incoming.service_type
            || s.status != incoming.status
            || rely_differs,
    }
}

fn is_status_notify(stored: Option<&ServiceInstance>, incoming: &ServiceInstance) -> bool {
    match stored {
        Some(s) => s.status != incoming.status && incoming.status != crate::model::Status::Register,
        None => false,
    }
}

/// Reads the stored record, falling back to "absent" for unparseable
/// bytes: self-healing, logged at warning, rather than failing the
/// refresh outright.
async fn read_stored(
    store: &dyn StoreAdapter,
    store_name: &str,
    group: &str,
    addr: &str,
) -> Result<Option<ServiceInstance>> {
    let raw = store.hash_get(store_name, &keys::service_info(group), addr).await?;
    match raw {
        None => Ok(None),
        Some(bytes) => match ServiceInstance::deserialize(&bytes) {
            Ok(inst) => Ok(Some(inst)),
            Err(e) => {
                warn!(group, addr, bytes = bytes.len(), error = %e, "stored record unparseable, treating as absent");
                Ok(None)
            }
        },
    }
}

/// The refresh state machine's only write entry point.
pub async fn refresh(
    store: &dyn StoreAdapter,
    store_name: &str,
    group: &str,
    incoming: &ServiceInstance,
) -> Result<RefreshOutcome> {
    if incoming.addr.is_empty() {
        return Err(Error::FieldMissing("addr"));
    }

    let stored = read_stored(store, store_name, group, &incoming.addr).await?;
    let flags = compute_flags(stored.as_ref(), incoming);
    let notify = is_status_notify(stored.as_ref(), incoming);

    if flags.any() {
        apply_mutations(store, store_name, group, stored.as_ref(), incoming, flags).await?;
    }

    // Heartbeat phase: always executed, outside the lock, score-based and
    // idempotent under races.
    let now_ms = now_epoch_ms();
    store.zset_add(store_name, &keys::service_ping(group), now_ms as f64, &incoming.addr).await?;

    Ok(RefreshOutcome { is_status_notify: notify })
}

async fn apply_mutations(
    store: &dyn StoreAdapter,
    store_name: &str,
    group: &str,
    stored: Option<&ServiceInstance>,
    incoming: &ServiceInstance,
    flags: DiffFlags,
) -> Result<()> {
    let guard = lock::acquire(store, store_name, group, &incoming.addr).await?;
    let result = apply_mutations_locked(store, store_name, group, stored, incoming, flags).await;
    guard.release(store, store_name).await;
    result
}

async fn apply_mutations_locked(
    store: &dyn StoreAdapter,
    store_name: &str,
    group: &str,
    stored: Option<&ServiceInstance>,
    incoming: &ServiceInstance,
    flags: DiffFlags,
) -> Result<()> {
    if flags.clean_type {
        let s = stored.expect("clean_type implies stored record exists");
        store.set_rem(store_name, &keys::service_type_addr_list(group, s.service_type), &incoming.addr).await?;
    }
    if flags.clean_deps {
        let s = stored.expect("clean_deps implies stored record exists");
        for t in s.rely_service_types() {
            store.set_rem(store_name, &keys::service_type_level_addr_list(group, t), &incoming.addr).await?;
        }
    }
    if flags.clean_all {
        store.hash_del_field(store_name, &keys::service_info(group), &incoming.addr).await?;
    }
    if flags.add_type {
        store.set_add(store_name, &keys::service_type_addr_list(group, incoming.service_type), &incoming.addr).await?;
    }
    if flags.add_deps {
        for t in incoming.rely_service_types() {
            store.set_add(store_name, &keys::service_type_level_addr_list(group, t), &incoming.addr).await?;
        }
    }
    if flags.changed {
        let bytes = incoming.serialize()?;
        store.hash_set_field(store_name, &keys::service_info(group), &incoming.addr, &bytes).await?;
    }
    Ok(())
}

/// The liveness monitor's eviction entry point. Returns the evicted
/// record (for change-propagation enqueueing) or `None` if the instance
/// was already Offline or missing.
pub async fn evict(store: &dyn StoreAdapter, store_name: &str, group: &str, addr: &str) -> Result<Option<ServiceInstance>> {
    let guard = lock::acquire(store, store_name, group, addr).await?;
    let result = evict_locked(store, store_name, group, addr).await;
    guard.release(store, store_name).await;
    result
}

async fn evict_locked(store: &dyn StoreAdapter, store_name: &str, group: &str, addr: &str) -> Result<Option<ServiceInstance>> {
    let Some(mut stored) = read_stored(store, store_name, group, addr).await? else {
        return Ok(None);
    };
    if !stored.status.is_live() {
        return Ok(None);
    }
    stored.status = crate::model::Status::Offline;
    let bytes = stored.serialize()?;
    store.hash_set_field(store_name, &keys::service_info(group), addr, &bytes).await?;
    Ok(Some(stored))
}

fn now_epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as u64
}

/// Fetches and deserializes every address in `addrs` from `Info[group]`,
/// silently dropping misses and unparseable bytes (same self-healing
/// policy as [`read_stored`]). Shared by watch-list construction and the
/// change propagator's dependent fan-out.
pub(crate) async fn hydrate(
    store: &dyn StoreAdapter,
    store_name: &str,
    group: &str,
    addrs: &[String],
) -> Result<Vec<ServiceInstance>> {
    let key = keys::service_info(group);
    let mut out = Vec::with_capacity(addrs.len());
    for addr in addrs {
        if let Some(bytes) = store.hash_get(store_name, &key, addr).await? {
            match ServiceInstance::deserialize(&bytes) {
                Ok(inst) => out.push(inst),
                Err(e) => warn!(group, addr, error = %e, "dropping unparseable record during hydrate"),
            }
        }
    }
    Ok(out)
}
