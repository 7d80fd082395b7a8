//! Configuration file watcher for hot-reload support

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::AppConfig;
use crate::shell::ShellHandle;

/// Let editors finish writing before re-reading
const SETTLE_DELAY: Duration = Duration::from_millis(100);
/// Collapse the burst of modify events a single save produces
const DEBOUNCE: Duration = Duration::from_millis(500);

/// Watches the config file and requests a reconfigure when it changes
///
/// A modified file is only reported once it parses and validates; a broken
/// edit keeps the running session on the old config.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl ConfigWatcher {
    /// Must be called from within a Tokio runtime
    pub fn new(config_path: impl Into<PathBuf>, shell: ShellHandle) -> Result<Self> {
        let path = config_path.into();
        let watched = path.clone();
        let last_fired: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));

        // notify callbacks run on their own OS thread, not in Tokio context
        let runtime_handle = tokio::runtime::Handle::current();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) if matches!(event.kind, EventKind::Modify(_)) => {
                    debug!("Config file modified: {:?}", event.paths);

                    {
                        let mut last = last_fired.lock();
                        if last.is_some_and(|t| t.elapsed() < DEBOUNCE) {
                            return;
                        }
                        *last = Some(Instant::now());
                    }

                    let path = watched.clone();
                    let shell = shell.clone();
                    runtime_handle.spawn(async move {
                        tokio::time::sleep(SETTLE_DELAY).await;

                        match AppConfig::load(&path).await {
                            Ok(_) => {
                                info!("Configuration changed, reconfiguring");
                                if !shell.reconfigure() {
                                    debug!("Worker gone, dropping reconfigure");
                                }
                            }
                            Err(e) => {
                                warn!("Failed to reload config (keeping old config): {:#}", e);
                            }
                        }
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Watch error: {}", e);
                }
            }
        })?;

        watcher
            .watch(Path::new(&path), RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config file: {}", path.display()))?;

        info!("Config file watcher started for: {}", path.display());

        Ok(Self {
            _watcher: watcher,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
