//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::ConfigError;

/// A watcher that reports changes to the settings file.
///
/// The parent directory is watched so that editors replacing the file
/// (write to temp + rename) are still observed.
pub struct ConfigWatcher {
    path: PathBuf,
    change_tx: mpsc::UnboundedSender<()>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver yielding one item per raw change event.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (change_tx, change_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                change_tx,
            },
            change_rx,
        )
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, ConfigError> {
        let tx = self.change_tx.clone();
        let file_name = self.path.file_name().map(|n| n.to_os_string());
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    let touches_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if touches_file {
                        tracing::debug!(kind = ?event.kind, "Config file change detected");
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}
