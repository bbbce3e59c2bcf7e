//! The closed set of CloudEvent types this operator may emit. Canonical
//! names are always written; a handful carry a `#[serde(alias = ...)]` so
//! older consumers' pre-rename spelling still decodes.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Build,
    Service,
    Invoke,
    Response,
    Notification,
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventCategory::Build => "build",
            EventCategory::Service => "service",
            EventCategory::Invoke => "invoke",
            EventCategory::Response => "response",
            EventCategory::Notification => "notification",
        };
        f.write_str(s)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // Command (present-tense requests)
    #[serde(rename = "build.start")]
    BuildStart,
    #[serde(rename = "build.cancel")]
    BuildCancel,
    #[serde(rename = "service.create")]
    ServiceCreate,
    #[serde(rename = "service.update")]
    ServiceUpdate,
    #[serde(rename = "service.delete")]
    ServiceDelete,

    // Lifecycle (past-tense facts)
    #[serde(rename = "function.created")]
    FunctionCreated,
    #[serde(rename = "function.updated")]
    FunctionUpdated,
    #[serde(rename = "function.deleted")]
    FunctionDeleted,
    #[serde(rename = "function.ready")]
    FunctionReady,
    #[serde(rename = "function.degraded")]
    FunctionDegraded,
    #[serde(rename = "build.started")]
    BuildStarted,
    #[serde(rename = "build.progressing")]
    BuildProgressing,
    #[serde(rename = "build.completed")]
    BuildCompleted,
    #[serde(rename = "build.failed")]
    BuildFailed,
    #[serde(rename = "build.timeout")]
    BuildTimeout,
    #[serde(rename = "build.cancelled")]
    BuildCancelled,
    #[serde(rename = "service.created")]
    ServiceCreated,
    #[serde(rename = "service.updated")]
    ServiceUpdated,
    #[serde(rename = "service.deleted")]
    ServiceDeleted,
    #[serde(rename = "service.ready")]
    ServiceReady,
    #[serde(rename = "service.scaled")]
    ServiceScaled,

    // Invoke (present-tense requests)
    #[serde(rename = "invoke.sync", alias = "sync.invoke")]
    InvokeSync,
    #[serde(rename = "invoke.async", alias = "async.invoke")]
    InvokeAsync,
    #[serde(rename = "invoke.scheduled", alias = "scheduled.invoke")]
    InvokeScheduled,
    #[serde(rename = "invoke.retry", alias = "retry.invoke")]
    InvokeRetry,

    // Response (past-tense facts)
    #[serde(rename = "response.success", alias = "success.response")]
    ResponseSuccess,
    #[serde(rename = "response.error", alias = "error.response")]
    ResponseError,
    #[serde(rename = "response.timeout", alias = "timeout.response")]
    ResponseTimeout,

    // Notification (past-tense facts)
    #[serde(rename = "alert.critical")]
    AlertCritical,
    #[serde(rename = "alert.warning")]
    AlertWarning,
    #[serde(rename = "alert.info")]
    AlertInfo,
    #[serde(rename = "audit.access")]
    AuditAccess,
    #[serde(rename = "audit.change")]
    AuditChange,
}

impl EventType {
    /// The canonical wire spelling; emission always uses this, never an
    /// alias.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::BuildStart => "build.start",
            EventType::BuildCancel => "build.cancel",
            EventType::ServiceCreate => "service.create",
            EventType::ServiceUpdate => "service.update",
            EventType::ServiceDelete => "service.delete",
            EventType::FunctionCreated => "function.created",
            EventType::FunctionUpdated => "function.updated",
            EventType::FunctionDeleted => "function.deleted",
            EventType::FunctionReady => "function.ready",
            EventType::FunctionDegraded => "function.degraded",
            EventType::BuildStarted => "build.started",
            EventType::BuildProgressing => "build.progressing",
            EventType::BuildCompleted => "build.completed",
            EventType::BuildFailed => "build.failed",
            EventType::BuildTimeout => "build.timeout",
            EventType::BuildCancelled => "build.cancelled",
            EventType::ServiceCreated => "service.created",
            EventType::ServiceUpdated => "service.updated",
            EventType::ServiceDeleted => "service.deleted",
            EventType::ServiceReady => "service.ready",
            EventType::ServiceScaled => "service.scaled",
            EventType::InvokeSync => "invoke.sync",
            EventType::InvokeAsync => "invoke.async",
            EventType::InvokeScheduled => "invoke.scheduled",
            EventType::InvokeRetry => "invoke.retry",
            EventType::ResponseSuccess => "response.success",
            EventType::ResponseError => "response.error",
            EventType::ResponseTimeout => "response.timeout",
            EventType::AlertCritical => "alert.critical",
            EventType::AlertWarning => "alert.warning",
            EventType::AlertInfo => "alert.info",
            EventType::AuditAccess => "audit.access",
            EventType::AuditChange => "audit.change",
        }
    }

    pub fn category(&self) -> EventCategory {
        match self {
            EventType::BuildStart
            | EventType::BuildCancel
            | EventType::BuildStarted
            | EventType::BuildProgressing
            | EventType::BuildCompleted
            | EventType::BuildFailed
            | EventType::BuildTimeout
            | EventType::BuildCancelled => EventCategory::Build,

            EventType::ServiceCreate
            | EventType::ServiceUpdate
            | EventType::ServiceDelete
            | EventType::ServiceCreated
            | EventType::ServiceUpdated
            | EventType::ServiceDeleted
            | EventType::ServiceReady
            | EventType::ServiceScaled => EventCategory::Service,

            EventType::InvokeSync
            | EventType::InvokeAsync
            | EventType::InvokeScheduled
            | EventType::InvokeRetry => EventCategory::Invoke,

            EventType::ResponseSuccess | EventType::ResponseError | EventType::ResponseTimeout => {
                EventCategory::Response
            }

            EventType::FunctionCreated
            | EventType::FunctionUpdated
            | EventType::FunctionDeleted
            | EventType::FunctionReady
            | EventType::FunctionDegraded
            | EventType::AlertCritical
            | EventType::AlertWarning
            | EventType::AlertInfo
            | EventType::AuditAccess
            | EventType::AuditChange => EventCategory::Notification,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_round_trips_through_json() {
        let json = serde_json::to_string(&EventType::ServiceReady).unwrap();
        assert_eq!(json, "\"service.ready\"");
        let decoded: EventType = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, EventType::ServiceReady);
    }

    #[test]
    fn legacy_alias_decodes_to_canonical_variant() {
        let decoded: EventType = serde_json::from_str("\"async.invoke\"").unwrap();
        assert_eq!(decoded, EventType::InvokeAsync);
    }

    #[test]
    fn emission_never_writes_the_alias_spelling() {
        let json = serde_json::to_string(&EventType::InvokeAsync).unwrap();
        assert_eq!(json, "\"invoke.async\"");
    }

    #[test]
    fn every_variant_reports_its_documented_category() {
        assert_eq!(EventType::BuildFailed.category(), EventCategory::Build);
        assert_eq!(EventType::ServiceScaled.category(), EventCategory::Service);
        assert_eq!(EventType::InvokeRetry.category(), EventCategory::Invoke);
        assert_eq!(EventType::ResponseTimeout.category(), EventCategory::Response);
        assert_eq!(EventType::AlertCritical.category(), EventCategory::Notification);
    }
}
