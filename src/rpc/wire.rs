//! Wire schema for the RPC facade: the six command kinds and the
//! request/reply envelopes a transport adapter decodes into before
//! calling [`super::dispatch`].

use serde::{Deserialize, Serialize};

use crate::model::{ServiceInstance, WatchList};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Hello,
    Register,
    Online,
    Offline,
    Ping,
    Check,
}

/// `group` selects the store binding (`RawConfig::redis_name_for_group`);
/// it is the routing key, distinct from `instance.group_tab`'s tenant
/// data field, which is free to change across refreshes of the same addr.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstanceRequest {
    pub group: String,
    pub instance: ServiceInstance,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckRequest {
    pub group: String,
    pub watch_list: WatchList,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RequestBody {
    Instance(InstanceRequest),
    Check(CheckRequest),
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum Reply {
    Ok,
    WatchList(WatchList),
}
