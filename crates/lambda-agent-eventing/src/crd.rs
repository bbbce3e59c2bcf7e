//! Minimal CRD-shaped wire types for the eventing mesh's `Broker` /
//! `Trigger` / DLQ primitives. The mesh itself is an external
//! collaborator; these structs describe only the interface this operator
//! needs from it.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "eventing.lambda.babylonhealth.io",
    version = "v1",
    kind = "Broker",
    plural = "brokers",
    namespaced,
    status = "BrokerStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BrokerSpec {
    /// Name of the dead-letter queue this broker forwards undeliverable
    /// events to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead_letter_queue: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BrokerStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "eventing.lambda.babylonhealth.io",
    version = "v1",
    kind = "Trigger",
    plural = "triggers",
    namespaced,
    status = "TriggerStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSpec {
    pub broker: String,
    pub event_type: String,
    pub subscriber_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_backoff_seconds: Option<u32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerStatus {
    #[serde(default)]
    pub ready: bool,
}

/// A cross-agent forward: routes a set of event types from this agent's
/// broker to another agent's ingress.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "eventing.lambda.babylonhealth.io",
    version = "v1",
    kind = "Forward",
    plural = "forwards",
    namespaced,
    status = "ForwardStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ForwardSpec {
    pub source_broker: String,
    pub event_types: Vec<String>,
    pub target_agent: String,
    pub target_namespace: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForwardStatus {
    #[serde(default)]
    pub ready: bool,
}
