//! Configuration store: layered load, validation, hot reload and publication.
//!
//! # Responsibilities
//! - Build a fresh validated `AppSetting` from file + environment on demand
//! - Log one warning per repaired field
//! - Watch the settings file and debounce change bursts
//! - Publish each reloaded snapshot on a single-item-latest channel
//!
//! # Design Decisions
//! - Subscribers hold a `watch::Receiver`; dropping it unsubscribes
//! - The latest snapshot is also kept in an `ArcSwap` for lock-free reads
//! - A missing or unreadable file is logged and treated as an empty layer

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::debounce::Debouncer;
use crate::config::loader::{self, ConfigError};
use crate::config::schema::{AppSetting, RawAppSetting};
use crate::config::validation::validate;
use crate::config::watcher::ConfigWatcher;
use crate::observability::{metrics, LogEntry, SharedLog, WarningLevel};

const SENDER: &str = "ConfigStore";

/// Default settings file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/ServerSettings.json";

/// Where the environment layer comes from.
#[derive(Debug, Clone)]
pub enum EnvLayer {
    /// `RELAY_*` variables of the running process.
    Process,
    /// A fixed layer, independent of the process environment.
    Fixed(RawAppSetting),
}

/// Settings sources.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    pub env: EnvLayer,
    pub debounce: Option<Duration>,
}

impl ConfigSource {
    /// Settings file plus process environment, default debounce interval.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            env: EnvLayer::Process,
            debounce: None,
        }
    }

    pub fn with_env(mut self, env: EnvLayer) -> Self {
        self.env = env;
        self
    }

    pub fn with_debounce(mut self, delay: Duration) -> Self {
        self.debounce = Some(delay);
        self
    }
}

/// Produces validated settings snapshots and notifies subscribers of changes.
pub struct ConfigStore {
    source: ConfigSource,
    log: SharedLog,
    current: ArcSwap<AppSetting>,
    tx: watch::Sender<Arc<AppSetting>>,
    debouncer: Debouncer,
}

impl ConfigStore {
    /// Create the store and load the initial snapshot.
    pub fn new(source: ConfigSource, log: SharedLog) -> Arc<Self> {
        let debouncer = Debouncer::new(source.debounce, log.clone());
        let (tx, _) = watch::channel(Arc::new(AppSetting::default()));

        let store = Arc::new(Self {
            source,
            log,
            current: ArcSwap::from_pointee(AppSetting::default()),
            tx,
            debouncer,
        });

        let initial = Arc::new(store.get_configuration());
        store.current.store(initial.clone());
        store.tx.send_replace(initial);
        store
    }

    pub fn path(&self) -> &Path {
        &self.source.path
    }

    /// Read every layer into a fresh, validated snapshot.
    pub fn get_configuration(&self) -> AppSetting {
        let file = match loader::load_file(&self.source.path) {
            Ok(raw) => raw,
            Err(e) => {
                self.log.write(LogEntry::error(&e, SENDER));
                RawAppSetting::default()
            }
        };

        let env = match &self.source.env {
            EnvLayer::Process => loader::load_env(),
            EnvLayer::Fixed(raw) => raw.clone(),
        };

        let (setting, violations) = validate(&file.merge(env));
        for violation in violations {
            self.log.write(
                LogEntry::warning(WarningLevel::Normal, SENDER, violation.to_string())
                    .with_arg(violation.field)
                    .with_arg(&violation.substituted),
            );
        }

        setting
    }

    /// Latest published snapshot.
    pub fn current(&self) -> Arc<AppSetting> {
        self.current.load_full()
    }

    /// Subscribe to published snapshots. The receiver starts at the latest one.
    pub fn subscribe(&self) -> watch::Receiver<Arc<AppSetting>> {
        self.tx.subscribe()
    }

    /// Load, validate and publish a snapshot immediately.
    pub fn reload_now(&self) -> Arc<AppSetting> {
        let setting = Arc::new(self.get_configuration());
        self.current.store(setting.clone());
        self.tx.send_replace(setting.clone());
        metrics::record_config_reload();

        self.log.write(LogEntry::warning(
            WarningLevel::Normal,
            SENDER,
            "Configuration changed. Reboot services ...",
        ));
        setting
    }

    /// Start watching the settings file until `cancel` fires.
    ///
    /// Change events are debounced; each surviving burst publishes one snapshot.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> Result<JoinHandle<()>, ConfigError> {
        let (watcher, mut changes) = ConfigWatcher::new(&self.source.path);
        let watcher = watcher.run()?;
        let store = Arc::clone(self);

        Ok(tokio::spawn(async move {
            let _watcher = watcher;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    change = changes.recv() => {
                        if change.is_none() {
                            break;
                        }
                        let target = Arc::clone(&store);
                        store.debouncer.debounce(async move {
                            target.reload_now();
                        });
                    }
                }
            }
            store.debouncer.cancel();
            tracing::info!(path = ?store.source.path, "Config watcher stopped");
        }))
    }
}
