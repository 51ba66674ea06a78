//! Configuration validation, performed once at load and again before
//! every hot-reload swap: no reader ever observes a partially-updated
//! snapshot.

use super::RawConfig;
use crate::error::{Error, Result};
use std::collections::HashSet;

pub fn validate(config: &RawConfig) -> Result<()> {
    let mut names = HashSet::new();
    for entry in &config.redis_list {
        if entry.name.is_empty() {
            return Err(Error::Internal("redis entry missing name".into()));
        }
        if !names.insert(entry.name.as_str()) {
            return Err(Error::Internal(format!("duplicate redis entry name: {}", entry.name)));
        }
    }

    let mut groups = HashSet::new();
    for group in &config.group_list {
        if group.group.is_empty() {
            return Err(Error::Internal("group entry missing group tab".into()));
        }
        if !groups.insert(group.group.as_str()) {
            return Err(Error::Internal(format!("duplicate group: {}", group.group)));
        }
        if !names.contains(group.redis_name.as_str()) {
            return Err(Error::UnknownGroup(format!(
                "group {} binds to undeclared store {}",
                group.group, group.redis_name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GroupEntry, RedisEntry};

    fn redis(name: &str) -> RedisEntry {
        RedisEntry {
            name: name.into(),
            ip: "127.0.0.1".into(),
            port: 6379,
            crypto: false,
            password: None,
            index: 0,
            max_pool_size: 10,
        }
    }

    #[test]
    fn rejects_group_with_unknown_store() {
        let config = RawConfig {
            redis_list: vec![redis("primary")],
            group_list: vec![GroupEntry { group: "g1".into(), redis_name: "missing".into() }],
            ..Default::default()
        };
        assert!(matches!(validate(&config), Err(Error::UnknownGroup(_))));
    }

    #[test]
    fn accepts_well_formed_config() {
        let config = RawConfig {
            redis_list: vec![redis("primary")],
            group_list: vec![GroupEntry { group: "g1".into(), redis_name: "primary".into() }],
            ..Default::default()
        };
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn rejects_duplicate_redis_names() {
        let config = RawConfig { redis_list: vec![redis("primary"), redis("primary")], ..Default::default() };
        assert!(validate(&config).is_err());
    }
}
