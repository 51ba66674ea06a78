//! Ties file-change detection (`watcher.rs`) to validated config reloads.
//!
//! A detected change is parsed and validated before it ever reaches the
//! live [`ConfigHandle`]; a bad edit is logged and the previous snapshot
//! stays in effect: readers never see a partially-updated config, and an
//! operator's typo never takes the coordinator down.

use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use super::watcher::{ConfigHandle, ConfigWatcher};
use super::RawConfig;
use crate::error::Result;

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Owns the watched file, the live [`ConfigHandle`], and a broadcast of
/// reload generations for components that need to react to a swap rather
/// than just read the latest value lazily.
pub struct ConfigLoader {
    config_path: PathBuf,
    handle: ConfigHandle,
    reload_tx: watch::Sender<u64>,
    _watcher: Option<ConfigWatcher>,
}

impl ConfigLoader {
    pub fn new(config_path: PathBuf) -> Result<Self> {
        let initial = RawConfig::from_file(&config_path)?;
        let (reload_tx, _reload_rx) = watch::channel(0);
        Ok(Self {
            config_path,
            handle: ConfigHandle::new(initial),
            reload_tx,
            _watcher: None,
        })
    }

    /// Starts watching `config_path` for changes, reloading and validating
    /// on every debounced write. Consumes and returns `self` so callers can
    /// chain it onto [`ConfigLoader::new`].
    pub fn watch(mut self) -> Result<Self> {
        let (watcher, mut rx) = ConfigWatcher::new(&self.config_path, DEFAULT_DEBOUNCE)?;
        self._watcher = Some(watcher);

        let handle = self.handle.clone();
        let reload_tx = self.reload_tx.clone();
        let config_path = self.config_path.clone();

        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                match RawConfig::from_file(&config_path) {
                    Ok(new_config) => {
                        handle.swap(new_config);
                        let next = *reload_tx.borrow() + 1;
                        let _ = reload_tx.send(next);
                        info!(path = %config_path.display(), "configuration reloaded");
                    }
                    Err(e) => {
                        error!(path = %config_path.display(), error = %e, "configuration reload rejected, keeping previous snapshot");
                    }
                }
            }
        });

        Ok(self)
    }

    pub fn handle(&self) -> ConfigHandle {
        self.handle.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.reload_tx.subscribe()
    }

    /// Forces an immediate reload outside of the file watcher, used by the
    /// `validate` CLI subcommand and by tests.
    pub fn reload(&self) -> Result<()> {
        let new_config = RawConfig::from_file(&self.config_path)?;
        self.handle.swap(new_config);
        let next = *self.reload_tx.borrow() + 1;
        let _ = self.reload_tx.send(next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_config(path: &std::path::Path, bind_port: u16) {
        fs::write(
            path,
            format!(
                "server:\n  bind_port: {bind_port}\nredis:\n  - name: primary\n    ip: 127.0.0.1\n    port: 6379\ngroups: []\n"
            ),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn initial_load_reads_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        write_config(file.path(), 8080);

        let loader = ConfigLoader::new(file.path().to_path_buf()).unwrap();
        assert_eq!(loader.handle().load().server.bind_port, 8080);
    }

    #[tokio::test]
    async fn watched_change_swaps_snapshot() {
        let file = tempfile::NamedTempFile::new().unwrap();
        write_config(file.path(), 8080);

        let loader = ConfigLoader::new(file.path().to_path_buf()).unwrap().watch().unwrap();
        let mut reload_rx = loader.subscribe();

        tokio::time::sleep(Duration::from_millis(100)).await;
        write_config(file.path(), 9090);

        tokio::select! {
            _ = reload_rx.changed() => {
                assert_eq!(loader.handle().load().server.bind_port, 9090);
            }
            _ = tokio::time::sleep(Duration::from_secs(2)) => panic!("reload timeout"),
        }
    }

    #[tokio::test]
    async fn invalid_reload_keeps_previous_snapshot() {
        let file = tempfile::NamedTempFile::new().unwrap();
        write_config(file.path(), 8080);

        let loader = ConfigLoader::new(file.path().to_path_buf()).unwrap().watch().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(file.path(), "not: [valid").unwrap();
        tokio::time::sleep(Duration::from_millis(800)).await;

        assert_eq!(loader.handle().load().server.bind_port, 8080);
    }

    #[test]
    fn manual_reload_updates_handle() {
        let file = tempfile::NamedTempFile::new().unwrap();
        write_config(file.path(), 8080);
        let loader = ConfigLoader::new(file.path().to_path_buf()).unwrap();

        write_config(file.path(), 5000);
        loader.reload().unwrap();

        assert_eq!(loader.handle().load().server.bind_port, 5000);
    }
}
