//! Listener lifecycle.
//!
//! # Responsibilities
//! - Start one listener per configured port serving the HTTP API and the hub
//! - Stop listeners gracefully within the configured close timeout
//! - Reboot (stop then start) whenever a new settings snapshot is published
//!
//! # Design Decisions
//! - A single async mutex guards the running host; start, stop and reboot hold it
//!   for their whole duration, so reboots serialize and listeners never overlap
//! - A failed start leaves the host `Stopped`; partially bound ports are released
//! - Errors are logged here and returned to the caller; the run loop keeps going

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum_server::Handle;
use thiserror::Error;
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::auth::JwtKeys;
use crate::config::AppSetting;
use crate::host::listener;
use crate::http::server::{build_router, AppState};
use crate::hub::Hub;
use crate::observability::{metrics, LogEntry, SharedLog, WarningLevel};
use crate::persistence::UnitOfWork;

const SENDER: &str = "HostController";

/// Interval at which `stop` checks for sessions that are still open.
const DRAIN_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum HostError {
    #[error("host is already running")]
    AlreadyRunning,

    #[error("host is not running")]
    NotRunning,

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("host operation cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

struct RunningHost {
    setting: Arc<AppSetting>,
    addrs: Vec<SocketAddr>,
    handles: Vec<Handle>,
    servers: Vec<JoinHandle<std::io::Result<()>>>,
    sessions: CancellationToken,
}

/// Owns the listener and drives it from settings snapshots.
pub struct HostController {
    hub: Arc<Hub>,
    keys: Arc<JwtKeys>,
    uow: Arc<dyn UnitOfWork>,
    log: SharedLog,
    cancel: CancellationToken,
    running: Mutex<Option<RunningHost>>,
    state: watch::Sender<HostState>,
}

impl HostController {
    pub fn new(hub: Arc<Hub>, keys: Arc<JwtKeys>, uow: Arc<dyn UnitOfWork>, log: SharedLog) -> Self {
        let (state, _) = watch::channel(HostState::Stopped);
        Self {
            hub,
            keys,
            uow,
            log,
            cancel: CancellationToken::new(),
            running: Mutex::new(None),
            state,
        }
    }

    /// Tie the controller to an external cancellation signal.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn state(&self) -> HostState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<HostState> {
        self.state.subscribe()
    }

    /// Addresses of the live listeners, empty when stopped.
    pub async fn local_addrs(&self) -> Vec<SocketAddr> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|r| r.addrs.clone())
            .unwrap_or_default()
    }

    /// Settings the live listener was started with.
    pub async fn current_setting(&self) -> Option<Arc<AppSetting>> {
        self.running.lock().await.as_ref().map(|r| r.setting.clone())
    }

    /// Bind and serve. Fails if a listener is already running.
    pub async fn start(&self, setting: Arc<AppSetting>) -> Result<(), HostError> {
        let mut running = self.lock("Start").await?;
        if running.is_some() {
            return Err(self.fail("Start", HostError::AlreadyRunning));
        }
        self.start_locked(&mut running, setting).await
    }

    /// Stop the listener and close every session.
    pub async fn stop(&self) -> Result<(), HostError> {
        let mut running = self.running.lock().await;
        self.stop_locked(&mut running).await
    }

    /// Stop the current listener if any, then start with `setting`.
    pub async fn reboot(&self, setting: Arc<AppSetting>) -> Result<(), HostError> {
        let mut running = self.lock("Reboot").await?;
        metrics::record_reboot();
        self.log.write(LogEntry::message(SENDER, "Rebooting host"));

        if running.is_some() {
            self.stop_locked(&mut running).await?;
        }
        self.start_locked(&mut running, setting).await
    }

    /// Start with the current snapshot and reboot on every new one until cancelled.
    pub async fn run(&self, mut settings: watch::Receiver<Arc<AppSetting>>) {
        let initial = settings.borrow_and_update().clone();
        let _ = self.start(initial).await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                changed = settings.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let setting = settings.borrow_and_update().clone();
                    let _ = self.reboot(setting).await;
                }
            }
        }

        if self.state() != HostState::Stopped {
            let _ = self.stop().await;
        }
        self.log.write(LogEntry::message(SENDER, "Host run loop finished"));
    }

    async fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, Option<RunningHost>>, HostError> {
        tokio::select! {
            guard = self.running.lock() => Ok(guard),
            _ = self.cancel.cancelled() => Err(self.fail(operation, HostError::Cancelled)),
        }
    }

    async fn start_locked(
        &self,
        running: &mut Option<RunningHost>,
        setting: Arc<AppSetting>,
    ) -> Result<(), HostError> {
        self.state.send_replace(HostState::Starting);

        match self.launch(setting).await {
            Ok(host) => {
                self.log.write(
                    LogEntry::message(SENDER, "Server started")
                        .with_arg(host.setting.urls().join(", "))
                        .with_arg(&host.setting.route_hub),
                );
                *running = Some(host);
                self.state.send_replace(HostState::Running);
                Ok(())
            }
            Err(e) => {
                self.state.send_replace(HostState::Stopped);
                Err(self.fail("Start", e))
            }
        }
    }

    async fn launch(&self, setting: Arc<AppSetting>) -> Result<RunningHost, HostError> {
        let tls = listener::load_tls(&setting).await?;
        let listeners = listener::bind_all(&setting.host, &setting.port)?;
        let addrs = listener::local_addrs(&listeners);

        let sessions = self.cancel.child_token();
        let router = build_router(
            AppState {
                hub: self.hub.clone(),
                keys: self.keys.clone(),
                uow: self.uow.clone(),
                sessions: sessions.clone(),
            },
            &setting,
        );

        let mut handles = Vec::with_capacity(listeners.len());
        let mut servers = Vec::with_capacity(listeners.len());
        for std_listener in listeners {
            let handle = Handle::new();
            let app = router.clone().into_make_service();
            let server = match &tls {
                Some(config) => {
                    let server = axum_server::tls_rustls::from_tcp_rustls(std_listener, config.clone())
                        .handle(handle.clone());
                    tokio::spawn(async move { server.serve(app).await })
                }
                None => {
                    let server = axum_server::from_tcp(std_listener).handle(handle.clone());
                    tokio::spawn(async move { server.serve(app).await })
                }
            };
            handles.push(handle);
            servers.push(server);
        }

        Ok(RunningHost {
            setting,
            addrs,
            handles,
            servers,
            sessions,
        })
    }

    async fn stop_locked(&self, running: &mut Option<RunningHost>) -> Result<(), HostError> {
        let Some(host) = running.take() else {
            return Err(self.fail("Stop", HostError::NotRunning));
        };
        self.state.send_replace(HostState::Stopping);

        let close_timeout = host.setting.close_timeout();
        host.sessions.cancel();
        for handle in &host.handles {
            handle.graceful_shutdown(Some(close_timeout));
        }
        for server in host.servers {
            match server.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => self.log.write(LogEntry::error(&e, SENDER)),
                Err(e) => self.log.write(LogEntry::error(&e, SENDER)),
            }
        }

        self.drain_sessions(close_timeout).await;
        self.state.send_replace(HostState::Stopped);
        self.log.write(
            LogEntry::message(SENDER, "Server stopped").with_arg(host.setting.urls().join(", ")),
        );
        Ok(())
    }

    /// Wait for cancelled sessions to leave the hub, then evict whatever is left.
    async fn drain_sessions(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while self.hub.session_count() > 0 && Instant::now() < deadline {
            tokio::time::sleep(DRAIN_POLL).await;
        }

        let evicted = self.hub.evict_all("Host stopped");
        if evicted > 0 {
            self.log.write(
                LogEntry::warning(
                    WarningLevel::Normal,
                    SENDER,
                    "Evicted sessions still open after close timeout",
                )
                .with_arg(evicted),
            );
        }
    }

    fn fail(&self, operation: &'static str, error: HostError) -> HostError {
        self.log
            .write(LogEntry::error(&error, format!("{}.{}", SENDER, operation)));
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MemoryLog;
    use crate::persistence::InMemoryUnitOfWork;

    fn new_controller(log: Arc<MemoryLog>) -> HostController {
        let hub = Arc::new(Hub::new(log.clone()));
        HostController::new(
            hub,
            Arc::new(JwtKeys::new("test")),
            Arc::new(InMemoryUnitOfWork::new()),
            log,
        )
    }

    fn controller() -> (Arc<HostController>, Arc<MemoryLog>) {
        let log = MemoryLog::new();
        (Arc::new(new_controller(log.clone())), log)
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn setting(port: u16) -> Arc<AppSetting> {
        Arc::new(AppSetting {
            host: "127.0.0.1".into(),
            port: vec![port],
            close_timeout: 1,
            ..AppSetting::default()
        })
    }

    #[tokio::test]
    async fn test_start_stop_state_machine() {
        let (host, _log) = controller();
        assert_eq!(host.state(), HostState::Stopped);

        host.start(setting(28411)).await.unwrap();
        assert_eq!(host.state(), HostState::Running);
        assert_eq!(host.local_addrs().await, vec![addr("127.0.0.1:28411")]);

        assert!(matches!(host.start(setting(28412)).await, Err(HostError::AlreadyRunning)));

        host.stop().await.unwrap();
        assert_eq!(host.state(), HostState::Stopped);
        assert!(host.local_addrs().await.is_empty());

        // The port is free again.
        std::net::TcpListener::bind("127.0.0.1:28411").unwrap();
    }

    #[tokio::test]
    async fn test_stop_when_not_running_fails() {
        let (host, log) = controller();
        assert!(matches!(host.stop().await, Err(HostError::NotRunning)));
        assert_eq!(log.errors()[0].sender, "HostController.Stop");
    }

    #[tokio::test]
    async fn test_failed_start_stays_stopped() {
        let (host, _log) = controller();
        let _taken = std::net::TcpListener::bind("127.0.0.1:28413").unwrap();

        let mut both = (*setting(28414)).clone();
        both.port = vec![28414, 28413];
        assert!(matches!(host.start(Arc::new(both)).await, Err(HostError::Bind { .. })));
        assert_eq!(host.state(), HostState::Stopped);

        // The first port was released with the failed start.
        std::net::TcpListener::bind("127.0.0.1:28414").unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_reboots_never_overlap() {
        let (host, log) = controller();
        host.start(setting(28415)).await.unwrap();

        let first = {
            let host = host.clone();
            tokio::spawn(async move { host.reboot(setting(28415)).await })
        };
        let second = {
            let host = host.clone();
            tokio::spawn(async move { host.reboot(setting(28415)).await })
        };

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert_eq!(host.state(), HostState::Running);
        assert!(log.errors().is_empty());
        assert_eq!(host.current_setting().await, Some(setting(28415)));

        host.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_run_reboots_on_new_snapshot() {
        let cancel = CancellationToken::new();
        let host = Arc::new(new_controller(MemoryLog::new()).with_cancellation(cancel.clone()));
        let (tx, rx) = watch::channel(setting(28416));

        let runner = {
            let host = host.clone();
            tokio::spawn(async move { host.run(rx).await })
        };

        let mut states = host.watch_state();
        states.wait_for(|s| *s == HostState::Running).await.unwrap();
        tx.send_replace(setting(28417));

        tokio::time::timeout(Duration::from_secs(5), async {
            while host.local_addrs().await != vec![addr("127.0.0.1:28417")] {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(host.current_setting().await, Some(setting(28417)));

        cancel.cancel();
        runner.await.unwrap();
        assert_eq!(host.state(), HostState::Stopped);
        assert_eq!(host.current_setting().await, None);
    }

    #[tokio::test]
    async fn test_drain_logs_evicted_sessions() {
        let log = MemoryLog::new();
        let host = new_controller(log.clone());
        // Nothing drives this session, so it outlives the close timeout.
        let (_id, _outbound) = host.hub.connect(Some("alice"));

        host.drain_sessions(Duration::from_millis(100)).await;

        assert_eq!(host.hub.session_count(), 0);
        let evicted: Vec<_> = log
            .warnings()
            .into_iter()
            .filter(|w| w.sender == SENDER)
            .collect();
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].arguments, vec!["1".to_string()]);
    }
}
