//! Domain messages exchanged through the hub and persisted by the data layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content plus the moment it was created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// An alarm raised by a monitored source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    #[serde(flatten)]
    pub message: Message,
    pub value: Option<f64>,
    #[serde(default)]
    pub quality: bool,
}

impl Alarm {
    pub fn new(content: Option<&str>, value: Option<f64>, quality: bool) -> Self {
        Self {
            message: Message::new(content.unwrap_or_default()),
            value,
            quality,
        }
    }
}

/// A notification addressed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(flatten)]
    pub message: Message,
    pub value: Option<f64>,
    #[serde(default)]
    pub quality: bool,
}

impl Notification {
    pub fn new(content: Option<&str>, value: Option<f64>, quality: bool) -> Self {
        Self {
            message: Message::new(content.unwrap_or_default()),
            value,
            quality,
        }
    }

    pub fn content(&self) -> &str {
        &self.message.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_equality() {
        let a = Notification::new(Some("content"), Some(1.5), true);
        let b = a.clone();
        assert_eq!(a, b);

        let mut c = a.clone();
        c.quality = false;
        assert_ne!(a, c);
    }

    #[test]
    fn test_notification_body_without_timestamp() {
        let n: Notification =
            serde_json::from_str(r#"{"content":"boiler","value":97.2,"quality":true}"#).unwrap();
        assert_eq!(n.content(), "boiler");
        assert_eq!(n.value, Some(97.2));
        assert!(n.quality);
    }

    #[test]
    fn test_alarm_defaults_missing_content() {
        let alarm = Alarm::new(None, None, false);
        assert_eq!(alarm.message.content, "");
        assert!(alarm.value.is_none());
    }
}
