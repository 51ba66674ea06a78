//! Double-buffered configuration storage and raw file-change detection.
//!
//! `ConfigHandle` is the snapshot every hot path reads: an `ArcSwap` gives
//! lock-free, allocation-free loads so the liveness monitor, propagator and
//! RPC facade never contend with a reload in progress. `ConfigWatcher` only
//! detects that the file changed and debounces rapid editor saves; it does
//! not parse or validate anything itself (see `loader.rs`).

use arc_swap::ArcSwap;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::config::RawConfig;

/// Lock-free snapshot of the active configuration.
///
/// Readers call [`ConfigHandle::load`] and get an `Arc` to a point-in-time
/// config; a concurrent [`ConfigHandle::swap`] never blocks them and they
/// never observe a partially-updated value.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<ArcSwap<RawConfig>>,
}

impl ConfigHandle {
    pub fn new(config: RawConfig) -> Self {
        Self { inner: Arc::new(ArcSwap::from_pointee(config)) }
    }

    pub fn load(&self) -> Arc<RawConfig> {
        self.inner.load_full()
    }

    pub fn swap(&self, config: RawConfig) {
        self.inner.store(Arc::new(config));
    }
}

#[derive(Debug, Clone)]
pub struct ConfigChangeEvent {
    pub path: PathBuf,
    pub detected_at: Instant,
}

#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),
}

/// Watches one file and emits a debounced [`ConfigChangeEvent`] per burst
/// of writes, so an editor's multi-step save doesn't trigger a reload per
/// write.
pub struct ConfigWatcher {
    config_path: PathBuf,
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    pub fn new(
        config_path: impl AsRef<Path>,
        debounce: Duration,
    ) -> Result<(Self, mpsc::Receiver<ConfigChangeEvent>), WatcherError> {
        let config_path = config_path.as_ref().to_path_buf();
        let (tx, rx) = mpsc::channel(8);

        let watched_path = config_path.clone();
        let handle = tokio::runtime::Handle::current();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "config watcher error");
                    return;
                }
            };
            if !is_relevant(&event) {
                return;
            }
            let tx = tx.clone();
            let path = watched_path.clone();
            handle.spawn(async move {
                tokio::time::sleep(debounce).await;
                if path.exists() {
                    let _ = tx.send(ConfigChangeEvent { path, detected_at: Instant::now() }).await;
                }
            });
        })?;

        watcher.watch(&config_path, RecursiveMode::NonRecursive)?;

        Ok((Self { config_path, _watcher: watcher }, rx))
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

fn is_relevant(event: &Event) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_swap_is_visible_to_loads() {
        let handle = ConfigHandle::new(RawConfig::default());
        assert_eq!(handle.load().server.bind_port, 7500);

        let mut updated = RawConfig::default();
        updated.server.bind_port = 9001;
        handle.swap(updated);

        assert_eq!(handle.load().server.bind_port, 9001);
    }

    #[tokio::test]
    async fn watcher_detects_file_write() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let (_watcher, mut rx) = ConfigWatcher::new(file.path(), Duration::from_millis(20)).unwrap();

        std::fs::write(file.path(), "server:\n  bind_port: 1\n").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert!(event.is_ok());
    }
}
