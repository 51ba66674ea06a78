//! Configuration: loading, validation, and hot-reloading.

use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod loader;
pub mod validation;
pub mod watcher;

pub use loader::ConfigLoader;
pub use watcher::ConfigHandle;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(rename = "redis", default)]
    pub redis_list: Vec<RedisEntry>,
    #[serde(rename = "groups", default)]
    pub group_list: Vec<GroupEntry>,
    #[serde(default)]
    pub lark_webhook: Option<String>,
    #[serde(default)]
    pub rely_warning_switch: bool,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_ip")]
    pub bind_ip: String,
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,
    #[serde(default = "default_nicename")]
    pub nicename: String,
    #[serde(default = "default_process_name")]
    pub process_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: default_bind_ip(),
            bind_port: default_bind_port(),
            nicename: default_nicename(),
            process_name: default_process_name(),
        }
    }
}

fn default_bind_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_bind_port() -> u16 {
    7500
}
fn default_nicename() -> String {
    "registry-coordinator".to_string()
}
fn default_process_name() -> String {
    "registry-coordinator".to_string()
}

/// One Redis-compatible store connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisEntry {
    pub name: String,
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub crypto: bool,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub index: i64,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
}

fn default_max_pool_size() -> u32 {
    50
}

impl RedisEntry {
    /// Connection URL understood by the `redis` crate.
    pub fn connection_url(&self) -> String {
        let scheme = if self.crypto { "rediss" } else { "redis" };
        match &self.password {
            Some(pw) if !pw.is_empty() => {
                format!("{scheme}://:{pw}@{}:{}/{}", self.ip, self.port, self.index)
            }
            _ => format!("{scheme}://{}:{}/{}", self.ip, self.port, self.index),
        }
    }
}

/// Binds a tenant group to a named store connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroupEntry {
    pub group: String,
    pub redis_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            redis_list: Vec::new(),
            group_list: Vec::new(),
            lark_webhook: None,
            rely_warning_switch: false,
            observability: ObservabilityConfig::default(),
        }
    }
}

impl RawConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Internal(format!("failed to read config file: {e}")))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("yaml");

        let config: RawConfig = match extension {
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .map_err(|e| Error::Internal(format!("failed to parse YAML: {e}")))?,
            "toml" => toml::from_str(&content)
                .map_err(|e| Error::Internal(format!("failed to parse TOML: {e}")))?,
            other => return Err(Error::Internal(format!("unsupported config format: {other}"))),
        };

        validation::validate(&config)?;
        Ok(config)
    }

    /// Resolve the store connection name bound to a group, if any is
    /// configured (an unresolved group is the caller's `UnknownGroup`
    /// edge case to handle).
    pub fn redis_name_for_group(&self, group: &str) -> Option<&str> {
        self.group_list
            .iter()
            .find(|g| g.group == group)
            .map(|g| g.redis_name.as_str())
    }

    pub fn redis_entry(&self, name: &str) -> Option<&RedisEntry> {
        self.redis_list.iter().find(|r| r.name == name)
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.group_list.iter().map(|g| g.group.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_connection_url_with_password() {
        let entry = RedisEntry {
            name: "primary".into(),
            ip: "127.0.0.1".into(),
            port: 6379,
            crypto: false,
            password: Some("secret".into()),
            index: 2,
            max_pool_size: 10,
        };
        assert_eq!(entry.connection_url(), "redis://:secret@127.0.0.1:6379/2");
    }

    #[test]
    fn redis_name_for_group_resolves() {
        let config = RawConfig {
            group_list: vec![GroupEntry { group: "g1".into(), redis_name: "primary".into() }],
            ..Default::default()
        };
        assert_eq!(config.redis_name_for_group("g1"), Some("primary"));
        assert_eq!(config.redis_name_for_group("unknown"), None);
    }
}
