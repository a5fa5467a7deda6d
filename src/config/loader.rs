//! Configuration loading from disk and environment.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde_json::Value;
use thiserror::Error;

use crate::config::schema::RawAppSetting;

/// Prefix of environment variables overriding file values.
pub const ENV_PREFIX: &str = "RELAY_";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

/// Read the JSON settings file into its raw layer.
pub fn load_file(path: &Path) -> Result<RawAppSetting, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Build the environment layer from the process environment.
pub fn load_env() -> RawAppSetting {
    env_layer(std::env::vars())
}

/// Build the environment layer from arbitrary `(key, value)` pairs.
///
/// Values are kept as strings; validation parses numbers and port lists.
pub fn env_layer<I>(vars: I) -> RawAppSetting
where
    I: IntoIterator<Item = (String, String)>,
{
    let vars: HashMap<String, String> = vars
        .into_iter()
        .filter(|(k, _)| k.starts_with(ENV_PREFIX))
        .collect();

    let get = |name: &str| -> Option<Value> {
        vars.get(&format!("{}{}", ENV_PREFIX, name))
            .map(|v| Value::String(v.clone()))
    };

    RawAppSetting {
        connection_string: get("CONNECTION_STRING"),
        host: get("HOST"),
        protocol: get("PROTOCOL"),
        port: get("PORT"),
        route_hub: get("ROUTE_HUB"),
        close_timeout: get("CLOSE_TIMEOUT"),
        message_bus_protocol: get("MESSAGE_BUS_PROTOCOL"),
        message_bus_host: get("MESSAGE_BUS_HOST"),
        message_bus_port: get("MESSAGE_BUS_PORT"),
        tls: None,
    }
}
