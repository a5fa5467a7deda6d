//! Listener sockets and TLS material for one host start.

use std::net::{SocketAddr, TcpListener};
use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;

use crate::config::{AppSetting, TlsSetting};
use crate::host::HostError;

/// Bind one listener per configured port.
///
/// Either every port binds or none stays bound.
pub fn bind_all(host: &str, ports: &[u16]) -> Result<Vec<TcpListener>, HostError> {
    let mut listeners = Vec::with_capacity(ports.len());
    for &port in ports {
        let addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(addr.as_str())
            .and_then(|l| l.set_nonblocking(true).map(|()| l))
            .map_err(|source| HostError::Bind {
                addr: addr.clone(),
                source,
            })?;

        tracing::debug!(address = %addr, "Listener bound");
        listeners.push(listener);
    }
    Ok(listeners)
}

pub fn local_addrs(listeners: &[TcpListener]) -> Vec<SocketAddr> {
    listeners.iter().filter_map(|l| l.local_addr().ok()).collect()
}

/// Load certificate and key when the setting asks for `https`.
pub async fn load_tls(setting: &AppSetting) -> Result<Option<RustlsConfig>, HostError> {
    if !setting.is_https() {
        return Ok(None);
    }
    let TlsSetting {
        cert_path,
        key_path,
    } = setting
        .tls
        .as_ref()
        .ok_or_else(|| HostError::Tls("protocol is https but no Tls section is configured".into()))?;

    for path in [cert_path, key_path] {
        if !Path::new(path).exists() {
            return Err(HostError::Tls(format!("file not found: {}", path)));
        }
    }

    RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map(Some)
        .map_err(|e| HostError::Tls(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_all_releases_on_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let busy = taken.local_addr().unwrap().port();

        let err = bind_all("127.0.0.1", &[0, busy]).unwrap_err();
        assert!(matches!(err, HostError::Bind { .. }));
    }

    #[tokio::test]
    async fn test_https_without_tls_section_fails() {
        let setting = AppSetting {
            protocol: "https".into(),
            ..AppSetting::default()
        };
        assert!(matches!(load_tls(&setting).await, Err(HostError::Tls(_))));
        assert!(load_tls(&AppSetting::default()).await.unwrap().is_none());
    }
}
