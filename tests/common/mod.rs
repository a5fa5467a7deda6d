//! Shared utilities for integration and load testing.

use std::sync::Arc;
use std::time::Duration;

use relay_hub::auth::JwtKeys;
use relay_hub::config::AppSetting;
use relay_hub::host::HostController;
use relay_hub::hub::Hub;
use relay_hub::observability::MemoryLog;
use relay_hub::persistence::InMemoryUnitOfWork;
use relay_sdk::{HubConnection, RelayClient};

pub const TEST_SECRET: &str = "integration-test-secret";

/// A host started directly, without a settings file.
#[allow(dead_code)]
pub struct TestRelay {
    pub host: Arc<HostController>,
    pub hub: Arc<Hub>,
    pub uow: Arc<InMemoryUnitOfWork>,
    pub log: Arc<MemoryLog>,
    pub port: u16,
}

#[allow(dead_code)]
impl TestRelay {
    pub fn base_url(&self) -> String {
        base_url(self.port)
    }

    /// Log in as `user` and open a hub session.
    pub async fn session(&self, user: &str) -> (RelayClient, HubConnection) {
        let mut client = RelayClient::new(&self.base_url());
        client.login(user, "password").await.expect("login failed");
        let connection = client.connect_hub("/hub").await.expect("hub handshake failed");
        (client, connection)
    }
}

pub fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}", port)
}

pub fn setting(port: u16) -> Arc<AppSetting> {
    Arc::new(AppSetting {
        host: "127.0.0.1".into(),
        port: vec![port],
        close_timeout: 2,
        ..AppSetting::default()
    })
}

/// Start a host on `port` serving `/hub`.
pub async fn start_relay(port: u16) -> TestRelay {
    let log = MemoryLog::new();
    let hub = Arc::new(Hub::new(log.clone()));
    let uow = Arc::new(InMemoryUnitOfWork::new());
    let host = Arc::new(HostController::new(
        hub.clone(),
        Arc::new(JwtKeys::new(TEST_SECRET)),
        uow.clone(),
        log.clone(),
    ));
    host.start(setting(port)).await.expect("host failed to start");

    TestRelay {
        host,
        hub,
        uow,
        log,
        port,
    }
}

/// Poll `check` until it holds or `timeout` elapses.
#[allow(dead_code)]
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// Wait for an invocation of `target` whose arguments satisfy `matches`.
#[allow(dead_code)]
pub async fn expect_invocation<F>(
    connection: &mut HubConnection,
    target: &str,
    matches: F,
) -> Vec<serde_json::Value>
where
    F: Fn(&[serde_json::Value]) -> bool,
{
    let wait = async {
        loop {
            match connection.next_invocation(target).await {
                Ok(Some(args)) if matches(&args) => return args,
                Ok(Some(_)) => continue,
                Ok(None) => panic!("connection closed while waiting for {}", target),
                Err(e) => panic!("hub read failed while waiting for {}: {}", target, e),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", target))
}
