//! Typed notifications emitted by the supervisor for push subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of event types on the push stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "service.started")]
    ServiceStarted,
    #[serde(rename = "service.stopped")]
    ServiceStopped,
    #[serde(rename = "service.failed")]
    ServiceFailed,
    #[serde(rename = "service.restarted")]
    ServiceRestarted,
    #[serde(rename = "service.added")]
    ServiceAdded,
    #[serde(rename = "service.removed")]
    ServiceRemoved,
    #[serde(rename = "service.updated")]
    ServiceUpdated,
    #[serde(rename = "service.log")]
    ServiceLog,
    #[serde(rename = "daemon.started")]
    DaemonStarted,
    #[serde(rename = "daemon.stopping")]
    DaemonStopping,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ServiceStarted => "service.started",
            EventType::ServiceStopped => "service.stopped",
            EventType::ServiceFailed => "service.failed",
            EventType::ServiceRestarted => "service.restarted",
            EventType::ServiceAdded => "service.added",
            EventType::ServiceRemoved => "service.removed",
            EventType::ServiceUpdated => "service.updated",
            EventType::ServiceLog => "service.log",
            EventType::DaemonStarted => "daemon.started",
            EventType::DaemonStopping => "daemon.stopping",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Daemon-scoped event with the current timestamp.
    pub fn daemon(kind: EventType) -> Self {
        Self {
            kind,
            service: None,
            message: None,
            data: None,
            timestamp: Utc::now(),
        }
    }

    /// Service-scoped event with the current timestamp.
    pub fn service(kind: EventType, service: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            service: Some(service.to_string()),
            message: Some(message.into()),
            data: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_types_serialize_to_dotted_names() {
        let ev = Event::service(EventType::ServiceStarted, "web", "service started");
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "service.started");
        assert_eq!(json["service"], "web");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn event_round_trips_through_json() {
        let ev = Event::service(EventType::ServiceFailed, "web", "exceeded max restarts")
            .with_data(serde_json::json!({"restarts": 3}));
        let text = serde_json::to_string(&ev).unwrap();
        let back: Event = serde_json::from_str(&text).unwrap();
        assert_eq!(back.kind, EventType::ServiceFailed);
        assert_eq!(back.service.as_deref(), Some("web"));
        assert_eq!(back.data.unwrap()["restarts"], 3);
    }
}
