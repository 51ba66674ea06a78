//! The canonical service instance record and its wire schema.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Lifecycle state of an instance. The numbering is a deployment
/// contract shared with every RPC client, not free to renumber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum Status {
    Register = 1,
    Online = 2,
    Offline = 3,
}

impl Status {
    /// `true` for the two states that count as present in the registry.
    pub fn is_live(self) -> bool {
        matches!(self, Status::Register | Status::Online)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Register => "Register",
            Status::Online => "Online",
            Status::Offline => "Offline",
        };
        write!(f, "{s}")
    }
}

/// Transport capability tag. Only `DirectRpc` instances are "pingable"
/// by the change propagator — the registry never speaks the transport
/// itself, so this is named after what the registry observes, not a
/// protocol choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectMode {
    DirectRpc,
    None,
}

/// A single dependency declaration: at least `rely_semver` of `rely_service_type`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelyEntry {
    pub rely_service_type: i32,
    pub rely_semver: String,
}

/// The canonical record for one process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub addr: String,
    pub host_name: String,
    pub status: Status,
    pub service_type: i32,
    pub semver: String,
    pub service_weight: u32,
    pub connect_mode: ConnectMode,
    pub group_tab: String,
    pub service_name: String,
    pub nickname: String,
    /// Unordered by construction: `BTreeSet` gives us set-equality via
    /// derived `PartialEq` for the diff phase's "differs as unordered sets" rule.
    pub rely_list: BTreeSet<RelyEntry>,
}

impl ServiceInstance {
    pub fn rely_service_types(&self) -> impl Iterator<Item = i32> + '_ {
        self.rely_list.iter().map(|r| r.rely_service_type)
    }

    /// Bytes stored in `Info[group]`. Kept as a free function boundary
    /// (`serialize`/`deserialize`) so the wire format can change without
    /// touching the state engine.
    pub fn serialize(&self) -> crate::error::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(Into::into)
    }

    pub fn deserialize(bytes: &[u8]) -> crate::error::Result<Self> {
        serde_json::from_slice(bytes).map_err(Into::into)
    }
}

impl fmt::Display for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "addr={}, host_name={}, status={}, service_type={}, semver={}, \
             service_weight={}, group_tab={}, service_name={}, nickname={}",
            self.addr,
            self.host_name,
            self.status,
            self.service_type,
            self.semver,
            self.service_weight,
            self.group_tab,
            self.service_name,
            self.nickname
        )?;
        if !self.rely_list.is_empty() {
            write!(f, ", rely_list=[")?;
            for (idx, rely) in self.rely_list.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}:{}", rely.rely_service_type, rely.rely_semver)?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

/// The snapshot of dependency providers returned after Register/Online,
/// or compared against during Check (spec glossary: "Watch list").
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WatchList {
    pub entries: Vec<WatchEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchEntry {
    pub service_type: i32,
    pub instances: Vec<ServiceInstance>,
}

impl fmt::Display for WatchList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            write!(f, "[service_type={}, instances=[", entry.service_type)?;
            for (idx, inst) in entry.instances.iter().enumerate() {
                if idx > 0 {
                    write!(f, " | ")?;
                }
                write!(f, "{inst}")?;
            }
            write!(f, "]]")?;
        }
        Ok(())
    }
}
