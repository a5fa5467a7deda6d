//! Configuration schema definitions.
//!
//! `RawAppSetting` is the layered, not yet validated form read from the settings
//! file and environment. Every field stays a loose `serde_json::Value` so that one
//! malformed field never prevents the others from loading. `AppSetting` is the
//! validated, immutable snapshot built from it by `validation::validate`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Hard-coded defaults substituted for invalid fields.
pub mod defaults {
    pub const CONNECTION_STRING: &str =
        "host=localhost;port=5432;Database=AlarmsExchange;Username=postgres;Password=postgres";
    pub const HOST: &str = "localhost";
    pub const PROTOCOL: &str = "http";
    pub const PORT: &[u16] = &[8080];
    pub const ROUTE_HUB: &str = "/hub";
    pub const CLOSE_TIMEOUT_SECS: u64 = 15;
    pub const MESSAGE_BUS_PROTOCOL: &str = "https";
    pub const MESSAGE_BUS_HOST: &str = "localhost";
    pub const MESSAGE_BUS_PORT: &[u16] = &[3050, 3052];
}

/// Validated server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppSetting {
    /// Connection string of the persistence service.
    pub connection_string: String,

    /// Hostname the listener binds to.
    pub host: String,

    /// `http` or `https`.
    pub protocol: String,

    /// One listener per port.
    pub port: Vec<u16>,

    /// Path of the hub endpoint (e.g. `/hub`).
    pub route_hub: String,

    /// Seconds clients get to close their sessions when the listener stops.
    pub close_timeout: u64,

    pub message_bus_protocol: String,
    pub message_bus_host: String,
    pub message_bus_port: Vec<u16>,

    /// Certificate material, required when `protocol` is `https`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSetting>,
}

impl Default for AppSetting {
    fn default() -> Self {
        Self {
            connection_string: defaults::CONNECTION_STRING.to_string(),
            host: defaults::HOST.to_string(),
            protocol: defaults::PROTOCOL.to_string(),
            port: defaults::PORT.to_vec(),
            route_hub: defaults::ROUTE_HUB.to_string(),
            close_timeout: defaults::CLOSE_TIMEOUT_SECS,
            message_bus_protocol: defaults::MESSAGE_BUS_PROTOCOL.to_string(),
            message_bus_host: defaults::MESSAGE_BUS_HOST.to_string(),
            message_bus_port: defaults::MESSAGE_BUS_PORT.to_vec(),
            tls: None,
        }
    }
}

impl AppSetting {
    /// Listener URLs, one per port.
    pub fn urls(&self) -> Vec<String> {
        self.port
            .iter()
            .map(|port| format!("{}://{}:{}", self.protocol, self.host, port))
            .collect()
    }

    /// Message bus URLs, one per message bus port.
    pub fn message_bus_urls(&self) -> Vec<String> {
        self.message_bus_port
            .iter()
            .map(|port| format!("{}://{}:{}", self.message_bus_protocol, self.message_bus_host, port))
            .collect()
    }

    pub fn is_https(&self) -> bool {
        self.protocol == "https"
    }

    pub fn close_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.close_timeout)
    }
}

/// TLS certificate and key (PEM).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TlsSetting {
    pub cert_path: String,
    pub key_path: String,
}

/// Layered settings before validation. `None` means "not provided by any layer".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RawAppSetting {
    pub connection_string: Option<Value>,
    pub host: Option<Value>,
    pub protocol: Option<Value>,
    pub port: Option<Value>,
    pub route_hub: Option<Value>,
    pub close_timeout: Option<Value>,
    pub message_bus_protocol: Option<Value>,
    pub message_bus_host: Option<Value>,
    pub message_bus_port: Option<Value>,
    pub tls: Option<Value>,
}

impl RawAppSetting {
    /// Overlay `other` on top of `self`: fields present in `other` win.
    pub fn merge(mut self, other: RawAppSetting) -> Self {
        fn pick(base: &mut Option<Value>, top: Option<Value>) {
            if top.is_some() {
                *base = top;
            }
        }
        pick(&mut self.connection_string, other.connection_string);
        pick(&mut self.host, other.host);
        pick(&mut self.protocol, other.protocol);
        pick(&mut self.port, other.port);
        pick(&mut self.route_hub, other.route_hub);
        pick(&mut self.close_timeout, other.close_timeout);
        pick(&mut self.message_bus_protocol, other.message_bus_protocol);
        pick(&mut self.message_bus_host, other.message_bus_host);
        pick(&mut self.message_bus_port, other.message_bus_port);
        pick(&mut self.tls, other.tls);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_per_port() {
        let setting = AppSetting {
            port: vec![8080, 8081],
            ..AppSetting::default()
        };
        assert_eq!(
            setting.urls(),
            vec!["http://localhost:8080".to_string(), "http://localhost:8081".to_string()]
        );
        assert_eq!(
            setting.message_bus_urls(),
            vec!["https://localhost:3050".to_string(), "https://localhost:3052".to_string()]
        );
    }

    #[test]
    fn test_raw_merge_prefers_top_layer() {
        let file: RawAppSetting =
            serde_json::from_str(r#"{"Host":"file-host","Port":[9000]}"#).unwrap();
        let env = RawAppSetting {
            host: Some(Value::String("env-host".into())),
            ..RawAppSetting::default()
        };

        let merged = file.merge(env);
        assert_eq!(merged.host, Some(Value::String("env-host".into())));
        assert_eq!(merged.port, Some(serde_json::json!([9000])));
        assert!(merged.route_hub.is_none());
    }
}
