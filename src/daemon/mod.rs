//! Process signal handling and graceful shutdown.
//!
//! The coordinator runs in the foreground under a process supervisor
//! (systemd, Kubernetes) rather than forking itself. What remains is
//! turning SIGINT/SIGTERM/SIGQUIT into an orderly stop: broadcast the
//! shutdown, give in-flight work a grace window, then return.

use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// How long components get to finish in-flight work after shutdown is
/// signaled before the process exits regardless.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Broadcasts a single shutdown signal to every subscriber. Cloning a
/// [`ShutdownHandle`] hands each long-running task (liveness monitor,
/// propagator, RPC server) its own receiver.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: broadcast::Sender<()>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    fn fire(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for SIGINT, SIGTERM, or (on unix) SIGQUIT, then fires the
/// shutdown broadcast. Intended to be spawned once for the life of the
/// process.
pub async fn wait_for_shutdown(handle: ShutdownHandle) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut quit = signal(SignalKind::quit()).expect("failed to install SIGQUIT handler");
        tokio::select! {
            _ = term.recv() => {}
            _ = quit.recv() => {}
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received termination signal, shutting down"),
    }

    handle.fire();
    warn!(grace_seconds = SHUTDOWN_GRACE.as_secs(), "waiting for in-flight work before exit");
}
