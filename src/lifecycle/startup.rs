//! Startup orchestration.
//!
//! # Responsibilities
//! - Construct every component explicitly and hand each its collaborators
//! - Start the settings watcher and signal handlers
//! - Run the host until shutdown
//!
//! # Design Decisions
//! - Configuration first, then the hub, then the host (traffic only when ready)
//! - A watcher failure is logged; the relay still serves the initial snapshot

use std::sync::Arc;

use crate::auth::JwtKeys;
use crate::config::{ConfigSource, ConfigStore};
use crate::host::HostController;
use crate::hub::Hub;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::{LogEntry, SharedLog, WarningLevel};
use crate::persistence::{InMemoryUnitOfWork, UnitOfWork};

/// Every long-lived component of a running relay.
pub struct Relay {
    pub store: Arc<ConfigStore>,
    pub hub: Arc<Hub>,
    pub host: Arc<HostController>,
    pub uow: Arc<dyn UnitOfWork>,
    pub log: SharedLog,
    pub shutdown: Shutdown,
}

impl Relay {
    pub fn new(source: ConfigSource, keys: JwtKeys, log: SharedLog) -> Self {
        if keys.is_development() {
            log.write(LogEntry::warning(
                WarningLevel::High,
                "Relay",
                "RELAY_JWT_SECRET is not set; tokens are signed with the development key",
            ));
        }

        let shutdown = Shutdown::new();
        let store = ConfigStore::new(source, log.clone());
        let hub = Arc::new(Hub::new(log.clone()));
        let uow: Arc<dyn UnitOfWork> = Arc::new(InMemoryUnitOfWork::new());
        let host = Arc::new(
            HostController::new(hub.clone(), Arc::new(keys), uow.clone(), log.clone())
                .with_cancellation(shutdown.subscribe()),
        );

        Self {
            store,
            hub,
            host,
            uow,
            log,
            shutdown,
        }
    }

    /// Run until SIGINT/SIGTERM or `shutdown.trigger()`.
    pub async fn run(self) {
        let watcher = match self.store.start(self.shutdown.subscribe()) {
            Ok(handle) => Some(handle),
            Err(e) => {
                self.log.write(LogEntry::error(&e, "Relay"));
                None
            }
        };
        let signals = signals::spawn(self.store.clone(), self.shutdown.clone());

        self.host.run(self.store.subscribe()).await;

        self.shutdown.trigger();
        if let Some(watcher) = watcher {
            let _ = watcher.await;
        }
        let _ = signals.await;
        tracing::info!("Shutdown complete");
    }
}
