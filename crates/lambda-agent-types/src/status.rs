//! The operator-written `status` half of a [`crate::LambdaAgent`].

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The reconciliation phase.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum Phase {
    #[default]
    Pending,
    Deploying,
    Ready,
    Failed,
    Deleting,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Pending => "Pending",
            Phase::Deploying => "Deploying",
            Phase::Ready => "Ready",
            Phase::Failed => "Failed",
            Phase::Deleting => "Deleting",
        };
        f.write_str(s)
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Phase::Pending),
            "Deploying" => Ok(Phase::Deploying),
            "Ready" => Ok(Phase::Ready),
            "Failed" => Ok(Phase::Failed),
            "Deleting" => Ok(Phase::Deleting),
            other => Err(format!("unrecognized phase: {other}")),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_revision: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventingStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_url: Option<String>,
    /// Per-trigger readiness, keyed by event type.
    #[serde(default)]
    pub triggers: BTreeMap<String, bool>,
    /// Set once a persistent eventing failure has produced an `alert.warning`
    /// notification, so the same failure window never alerts twice. Cleared
    /// automatically the next time eventing reconciles successfully.
    #[serde(default)]
    pub alert_fired: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub available: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionStatus {
    #[serde(default)]
    pub broker_allowed: bool,
    #[serde(default)]
    pub trigger_allowed: bool,
    #[serde(default)]
    pub function_allowed: bool,
}

/// Observed state of a `LambdaAgent`, written only by the operator.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LambdaAgentStatus {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub service_status: ServiceStatus,
    #[serde(default)]
    pub eventing_status: EventingStatus,
    #[serde(default)]
    pub ai_status: AiStatus,
    #[serde(default)]
    pub permission_status: PermissionStatus,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl LambdaAgentStatus {
    /// Updates the condition with matching `type_` in place, inserting a
    /// new entry if none matches. `last_transition_time` only advances when
    /// `status` actually changes; at most one entry per `type_` ever
    /// exists.
    pub fn set_condition(&mut self, mut cond: Condition) {
        if let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.type_ == cond.type_)
        {
            if existing.status == cond.status {
                cond.last_transition_time = existing.last_transition_time.clone();
            } else {
                cond.last_transition_time = Time(Utc::now());
            }
            *existing = cond;
        } else {
            cond.last_transition_time = Time(Utc::now());
            self.conditions.push(cond);
        }
    }

    /// Linear lookup by `type_`.
    pub fn get_condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

/// Identity tuple stored as a child's back-reference to its owning agent,
/// resolving the agent <-> children cyclic reference without storing a
/// pointer.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AgentRef {
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for AgentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn condition(type_: &str, status: &str) -> Condition {
        Condition {
            type_: type_.to_string(),
            status: status.to_string(),
            reason: "Reason".to_string(),
            message: "message".to_string(),
            last_transition_time: Time(Utc::now()),
            observed_generation: None,
        }
    }

    #[test]
    fn set_condition_preserves_transition_time_when_status_unchanged() {
        let mut status = LambdaAgentStatus::default();
        status.set_condition(condition("Ready", "True"));
        let first = status.get_condition("Ready").unwrap().last_transition_time.clone();

        status.set_condition(condition("Ready", "True"));
        let second = status.get_condition("Ready").unwrap().last_transition_time.clone();

        assert_eq!(first.0, second.0);
    }

    #[test]
    fn set_condition_never_duplicates_type() {
        let mut status = LambdaAgentStatus::default();
        status.set_condition(condition("Ready", "True"));
        status.set_condition(condition("Ready", "False"));
        status.set_condition(condition("Eventing", "True"));

        assert_eq!(status.conditions.len(), 2);
        assert_eq!(status.get_condition("Ready").unwrap().status, "False");
    }
}
