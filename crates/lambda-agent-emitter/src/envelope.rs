//! The CloudEvents v1.0 JSON envelope.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::event_type::EventType;

pub const SPEC_VERSION: &str = "1.0";
pub const CONTENT_TYPE: &str = "application/cloudevents+json";

#[derive(Serialize, Clone, Debug)]
pub struct CloudEvent {
    pub id: String,
    pub source: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub specversion: &'static str,
    pub subject: String,
    pub time: DateTime<Utc>,
    pub correlationid: String,
    pub data: serde_json::Value,
}

impl CloudEvent {
    /// Builds one envelope. `service_root` is the emitter's configured
    /// source prefix; `namespace`/`name` identify the agent the event is
    /// about; `correlation_id` threads one reconcile's events together.
    pub fn new(
        service_root: &str,
        namespace: &str,
        name: &str,
        event_type: EventType,
        correlation_id: &str,
        data: serde_json::Value,
    ) -> Self {
        CloudEvent {
            id: Uuid::new_v4().to_string(),
            source: format!("{service_root}/{namespace}/{name}"),
            event_type,
            specversion: SPEC_VERSION,
            subject: format!("{namespace}/{name}"),
            time: Utc::now(),
            correlationid: correlation_id.to_string(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_and_subject_follow_the_documented_shape() {
        let event = CloudEvent::new(
            "https://lambda-agent.example.com",
            "demo-ns",
            "demo-agent",
            EventType::ServiceReady,
            "corr-1",
            serde_json::json!({}),
        );
        assert_eq!(event.source, "https://lambda-agent.example.com/demo-ns/demo-agent");
        assert_eq!(event.subject, "demo-ns/demo-agent");
        assert_eq!(event.specversion, "1.0");
    }

    #[test]
    fn serialized_envelope_uses_the_canonical_event_type() {
        let event = CloudEvent::new(
            "root",
            "ns",
            "name",
            EventType::BuildFailed,
            "corr",
            serde_json::json!({"reason": "timeout"}),
        );
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "build.failed");
        assert_eq!(json["data"]["reason"], "timeout");
    }
}
