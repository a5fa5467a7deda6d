//! Configuration validation.
//!
//! # Responsibilities
//! - Convert each raw field to its typed form
//! - Check value rules (formats, ranges, uniqueness)
//! - Substitute the field's default on any violation
//!
//! # Design Decisions
//! - Validation never rejects a snapshot; it returns the repaired setting and
//!   the list of violations so the caller can log them
//! - A wrong JSON type is a violation of that field only
//! - Validation is a pure function: RawAppSetting → (AppSetting, Vec<Violation>)

use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::config::schema::{defaults, AppSetting, RawAppSetting, TlsSetting};

/// A single field that failed validation and was replaced by its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Settings key, as written in the settings file.
    pub field: &'static str,
    pub reason: String,
    /// Display form of the substituted default.
    pub substituted: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} Default value {} is used.",
            self.field, self.reason, self.substituted
        )
    }
}

fn connection_string_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^host=[^;]*;port=[^;]*;Database=[^;]*;Username=[^;]*;Password=.*$")
            .expect("connection string pattern is valid")
    })
}

fn host_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9.-]+$").expect("host pattern is valid"))
}

fn route_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/[a-zA-Z0-9/]*$").expect("route pattern is valid"))
}

/// Maximum close timeout in seconds.
pub const MAX_CLOSE_TIMEOUT_SECS: u64 = 60;

/// Validate a raw setting, repairing every invalid field.
pub fn validate(raw: &RawAppSetting) -> (AppSetting, Vec<Violation>) {
    let mut violations = Vec::new();

    let connection_string = field(
        "ConnectionString",
        raw.connection_string.as_ref(),
        defaults::CONNECTION_STRING.to_string(),
        |v| {
            let s = as_string(v)?;
            if !connection_string_re().is_match(&s) {
                return Err("Connection string format is invalid.".into());
            }
            Ok(s)
        },
        &mut violations,
    );

    let host = field(
        "Host",
        raw.host.as_ref(),
        defaults::HOST.to_string(),
        check_host,
        &mut violations,
    );

    let protocol = field(
        "Protocol",
        raw.protocol.as_ref(),
        defaults::PROTOCOL.to_string(),
        check_protocol,
        &mut violations,
    );

    let port = field(
        "Port",
        raw.port.as_ref(),
        defaults::PORT.to_vec(),
        check_ports,
        &mut violations,
    );

    let route_hub = field(
        "RouteHub",
        raw.route_hub.as_ref(),
        defaults::ROUTE_HUB.to_string(),
        |v| {
            let s = as_string(v)?;
            if !route_re().is_match(&s) {
                return Err("RouteHub must start with '/' and contain only alphanumeric characters and slashes.".into());
            }
            if s.ends_with('/') {
                return Err("RouteHub must not end with '/'.".into());
            }
            Ok(s)
        },
        &mut violations,
    );

    let close_timeout = field(
        "CloseTimeout",
        raw.close_timeout.as_ref(),
        defaults::CLOSE_TIMEOUT_SECS,
        |v| {
            let secs = as_integer(v)?;
            if secs <= 0 || secs > MAX_CLOSE_TIMEOUT_SECS as i64 {
                return Err(format!(
                    "CloseTimeout must be greater than zero and at most {} seconds.",
                    MAX_CLOSE_TIMEOUT_SECS
                ));
            }
            Ok(secs as u64)
        },
        &mut violations,
    );

    let message_bus_protocol = field(
        "MessageBusProtocol",
        raw.message_bus_protocol.as_ref(),
        defaults::MESSAGE_BUS_PROTOCOL.to_string(),
        check_protocol,
        &mut violations,
    );

    let message_bus_host = field(
        "MessageBusHost",
        raw.message_bus_host.as_ref(),
        defaults::MESSAGE_BUS_HOST.to_string(),
        check_host,
        &mut violations,
    );

    let message_bus_port = field(
        "MessageBusPort",
        raw.message_bus_port.as_ref(),
        defaults::MESSAGE_BUS_PORT.to_vec(),
        check_ports,
        &mut violations,
    );

    let tls = field(
        "Tls",
        raw.tls.as_ref(),
        None,
        |v| match v {
            Value::Null => Ok(None),
            other => serde_json::from_value::<TlsSetting>(other.clone())
                .map(Some)
                .map_err(|e| format!("Tls section is invalid: {}.", e)),
        },
        &mut violations,
    );

    let setting = AppSetting {
        connection_string,
        host,
        protocol,
        port,
        route_hub,
        close_timeout,
        message_bus_protocol,
        message_bus_host,
        message_bus_port,
        tls,
    };

    (setting, violations)
}

/// Check one field. A missing field takes its default silently.
fn field<T, F>(
    name: &'static str,
    value: Option<&Value>,
    default: T,
    check: F,
    violations: &mut Vec<Violation>,
) -> T
where
    T: fmt::Debug,
    F: FnOnce(&Value) -> Result<T, String>,
{
    let Some(value) = value else {
        return default;
    };

    match check(value) {
        Ok(v) => v,
        Err(reason) => {
            violations.push(Violation {
                field: name,
                reason,
                substituted: format!("{:?}", default),
            });
            default
        }
    }
}

fn as_string(v: &Value) -> Result<String, String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Value::String(_) => Err("Value cannot be empty.".into()),
        other => Err(format!("Expected a string, found {}.", other)),
    }
}

fn as_integer(v: &Value) -> Result<i64, String> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| format!("Expected an integer, found {}.", n)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("Expected an integer, found \"{}\".", s)),
        other => Err(format!("Expected an integer, found {}.", other)),
    }
}

fn check_host(v: &Value) -> Result<String, String> {
    let s = as_string(v)?;
    if !host_re().is_match(&s) {
        return Err("Host must be a valid hostname or 'localhost'.".into());
    }
    Ok(s)
}

fn check_protocol(v: &Value) -> Result<String, String> {
    let s = as_string(v)?;
    match s.as_str() {
        "http" | "https" => Ok(s),
        _ => Err("Protocol must be either 'http' or 'https'.".into()),
    }
}

/// Accepts a JSON array of integers, a single integer, or a comma-separated string.
fn check_ports(v: &Value) -> Result<Vec<u16>, String> {
    let raw: Vec<i64> = match v {
        Value::Array(items) => items.iter().map(as_integer).collect::<Result<_, _>>()?,
        Value::String(s) => s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(|part| as_integer(&Value::String(part.to_string())))
            .collect::<Result<_, _>>()?,
        Value::Number(_) => vec![as_integer(v)?],
        other => return Err(format!("Expected a list of ports, found {}.", other)),
    };

    if raw.is_empty() {
        return Err("At least one port must be specified.".into());
    }
    if raw.iter().any(|p| !(1..=65535).contains(p)) {
        return Err("All ports must be valid (1-65535).".into());
    }

    let mut seen = HashSet::new();
    if !raw.iter().all(|p| seen.insert(*p)) {
        return Err("Ports must be unique.".into());
    }

    Ok(raw.into_iter().map(|p| p as u16).collect())
}
