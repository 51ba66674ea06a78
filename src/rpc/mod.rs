//! RPC Facade: maps the six request kinds onto the registry state
//! engine, the change propagator, and a read path against the store.
//! Transport-agnostic — [`http`] is the default adapter.

pub mod http;
pub mod wire;

use thiserror::Error;
use tracing::warn;

use crate::config::ConfigHandle;
use crate::dependency::alert::Alerter;
use crate::error::Error;
use crate::propagate::outbound::OutboundRpc;
use crate::propagate::{fan_out, AlertKind, AlertQueue, ChangeQueue};
use crate::registry::{self, watch};
use crate::store::StoreAdapter;
use wire::{CheckRequest, CommandKind, InstanceRequest, Reply, RequestBody};

/// Edge-facing error: wraps the domain [`Error`] plus shapes specific to
/// the RPC boundary, mirroring the core-error/edge-error split used
/// elsewhere in this crate.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("malformed request for {0:?}")]
    MalformedRequest(CommandKind),
    #[error(transparent)]
    Domain(#[from] Error),
}

pub async fn dispatch(
    store: &dyn StoreAdapter,
    config: &ConfigHandle,
    change_queue: &ChangeQueue,
    alert_queue: &AlertQueue,
    outbound: &dyn OutboundRpc,
    kind: CommandKind,
    body: RequestBody,
) -> Result<Reply, RpcError> {
    if kind == CommandKind::Hello {
        return Ok(Reply::Ok);
    }

    if kind == CommandKind::Check {
        let RequestBody::Check(CheckRequest { group, watch_list }) = body else {
            return Err(RpcError::MalformedRequest(kind));
        };
        let store_name = resolve_store(config, &group)?;
        let (passed, authoritative) = watch::check(store, &store_name, &group, &watch_list).await?;
        return Ok(if passed { Reply::Ok } else { Reply::WatchList(authoritative) });
    }

    let RequestBody::Instance(InstanceRequest { group, instance }) = body else {
        return Err(RpcError::MalformedRequest(kind));
    };
    let store_name = resolve_store(config, &group)?;

    let outcome = registry::refresh(store, &store_name, &group, &instance).await?;

    match kind {
        CommandKind::Register | CommandKind::Online => {
            let rely_types: Vec<i32> = instance.rely_service_types().collect();
            let watch_list = watch::build_watch_list(store, &store_name, &group, &rely_types).await?;

            let alert_kind = if kind == CommandKind::Register { AlertKind::Registered } else { AlertKind::Online };
            alert_queue.push(instance.clone(), alert_kind);

            if kind == CommandKind::Online && outcome.is_status_notify {
                change_queue.push(store_name, group.clone(), instance);
            }
            Ok(Reply::WatchList(watch_list))
        }
        CommandKind::Offline => {
            alert_queue.push(instance.clone(), AlertKind::Offline);
            if outcome.is_status_notify {
                if let Err(e) = fan_out(store, &store_name, &group, outbound, &instance).await {
                    warn!(group, addr = %instance.addr, error = %e, "synchronous offline fan-out failed");
                }
            }
            Ok(Reply::Ok)
        }
        CommandKind::Ping => {
            if outcome.is_status_notify {
                change_queue.push(store_name, group, instance);
            }
            Ok(Reply::Ok)
        }
        CommandKind::Hello | CommandKind::Check => unreachable!("handled above"),
    }
}

fn resolve_store(config: &ConfigHandle, group: &str) -> Result<String, RpcError> {
    let snapshot = config.load();
    snapshot
        .redis_name_for_group(group)
        .map(str::to_string)
        .ok_or_else(|| Error::UnknownGroup(group.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawConfig;
    use crate::model::{ConnectMode, Status};
    use crate::testing::InMemoryStore;
    use async_trait::async_trait;
    use std::collections::BTreeSet;

    struct NoopRpc;
    #[async_trait]
    impl OutboundRpc for NoopRpc {
        async fn hello(&self, _addr: &str) -> crate::error::Result<()> {
            Ok(())
        }
        async fn notify(&self, _addr: &str, _instance: &crate::model::ServiceInstance) -> crate::error::Result<()> {
            Ok(())
        }
    }

    fn config_with_group() -> ConfigHandle {
        let mut cfg = RawConfig::default();
        cfg.redis_list.push(crate::config::RedisEntry {
            name: "primary".into(),
            ip: "127.0.0.1".into(),
            port: 6379,
            crypto: false,
            password: None,
            index: 0,
            max_pool_size: 10,
        });
        cfg.group_list.push(crate::config::GroupEntry { group: "g1".into(), redis_name: "primary".into() });
        ConfigHandle::new(cfg)
    }

    fn instance(addr: &str) -> crate::model::ServiceInstance {
        crate::model::ServiceInstance {
            addr: addr.into(),
            host_name: "h".into(),
            status: Status::Register,
            service_type: 5,
            semver: "1.0.0".into(),
            service_weight: 1,
            connect_mode: ConnectMode::None,
            group_tab: "g1".into(),
            service_name: "svc".into(),
            nickname: "nick".into(),
            rely_list: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn register_returns_empty_watch_list_with_no_deps() {
        let store = InMemoryStore::default();
        let config = config_with_group();
        let (change_queue, _crx) = ChangeQueue::new();
        let (alert_queue, _arx) = AlertQueue::new();
        let rpc = NoopRpc;

        let body = RequestBody::Instance(InstanceRequest { group: "g1".into(), instance: instance("a") });
        let reply = dispatch(&store, &config, &change_queue, &alert_queue, &rpc, CommandKind::Register, body).await.unwrap();
        match reply {
            Reply::WatchList(w) => assert!(w.entries.is_empty()),
            _ => panic!("expected watch list reply"),
        }
    }

    #[tokio::test]
    async fn unknown_group_is_rejected() {
        let store = InMemoryStore::default();
        let config = config_with_group();
        let (change_queue, _crx) = ChangeQueue::new();
        let (alert_queue, _arx) = AlertQueue::new();
        let rpc = NoopRpc;

        let body = RequestBody::Instance(InstanceRequest { group: "unknown".into(), instance: instance("a") });
        let result = dispatch(&store, &config, &change_queue, &alert_queue, &rpc, CommandKind::Register, body).await;
        assert!(matches!(result, Err(RpcError::Domain(Error::UnknownGroup(_)))));
    }

    #[tokio::test]
    async fn online_status_notify_pushes_change_event() {
        let store = InMemoryStore::default();
        let config = config_with_group();
        let (change_queue, mut crx) = ChangeQueue::new();
        let (alert_queue, _arx) = AlertQueue::new();
        let rpc = NoopRpc;

        let body = RequestBody::Instance(InstanceRequest { group: "g1".into(), instance: instance("a") });
        dispatch(&store, &config, &change_queue, &alert_queue, &rpc, CommandKind::Register, body).await.unwrap();

        let mut online = instance("a");
        online.status = Status::Online;
        let body = RequestBody::Instance(InstanceRequest { group: "g1".into(), instance: online });
        dispatch(&store, &config, &change_queue, &alert_queue, &rpc, CommandKind::Online, body).await.unwrap();

        assert!(crx.try_recv().is_ok());
    }
}
