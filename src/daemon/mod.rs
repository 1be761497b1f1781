//! Daemon lifecycle: single-instance enforcement, signal-driven shutdown,
//! and the final flush (SPEC_FULL §4.6).

pub mod pidfile;

use crate::cache::CacheStore;
use crate::error::DaemonError;
use crate::registry::Registry;
use crate::scheduler::Scheduler;
use log::info;
use pidfile::PidFile;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Builds the registry once the cache directory is confirmed usable, so
/// adapters that reload state from disk at construction time (sysmetrics'
/// ring buffers) see the real cache rather than a placeholder.
pub type RegistryFactory = Box<dyn FnOnce(&CacheStore) -> Registry + Send>;

pub struct Daemon {
    cache_dir: PathBuf,
    pidfile: PidFile,
    registry_factory: RegistryFactory,
    tick_interval: Duration,
}

impl Daemon {
    pub fn new(cache_dir: PathBuf, pid_path: PathBuf, registry_factory: RegistryFactory, tick_interval: Duration) -> Self {
        Self {
            cache_dir,
            pidfile: PidFile::new(pid_path),
            registry_factory,
            tick_interval,
        }
    }

    /// Runs to completion: startup checks, one immediate pass, the tick
    /// loop, then graceful shutdown on SIGINT/SIGTERM.
    pub async fn run(self) -> Result<(), DaemonError> {
        self.pidfile.check_and_clear_stale()?;

        let cache = Arc::new(CacheStore::new(&self.cache_dir).map_err(|source| DaemonError::CacheDirUnusable {
            path: self.cache_dir.display().to_string(),
            source,
        })?);

        let registry = (self.registry_factory)(&cache);

        self.pidfile.write_current_pid()?;
        info!("daemon started, pid {}", std::process::id());

        let ctx = CancellationToken::new();
        install_signal_handlers(ctx.clone());

        let scheduler = Scheduler::new(Arc::new(registry), Arc::clone(&cache), self.tick_interval);
        scheduler.run(ctx).await;

        info!("daemon shutting down cleanly");
        self.pidfile.remove();
        Ok(())
    }
}

/// Cancels `ctx` on SIGINT or SIGTERM. Spawned as a background task; the
/// scheduler's tick loop observes cancellation at its next suspension
/// point and the daemon awaits its completion before exiting.
fn install_signal_handlers(ctx: CancellationToken) {
    tokio::spawn(async move {
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(_) => return,
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => return,
        };
        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
        ctx.cancel();
    });
}
