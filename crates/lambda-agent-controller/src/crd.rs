//! Locally-owned wire types for the two external-runtime primitives the
//! engine applies children against: the Knative-shaped `Service` and the
//! metrics platform's `ScrapeTarget` record. Neither is reconciled by this
//! crate; both are owned and read back by it.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, PodSpec, Probe, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "serving.knative.dev",
    version = "v1",
    kind = "Service",
    plural = "services",
    namespaced,
    status = "KnativeServiceStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct KnativeServiceSpec {
    pub template: RevisionTemplateSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevisionTemplateSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RevisionTemplateMetadata>,
    pub spec: PodSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevisionTemplateMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KnativeServiceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_ready_revision_name: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl KnativeServiceStatus {
    /// Knative's own `Ready` condition on the `Service` resource, distinct
    /// from this operator's `LambdaAgent.status.conditions["Ready"]`.
    pub fn ready_condition(&self) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == "Ready")
    }
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "metrics.lambda.babylonhealth.io",
    version = "v1",
    kind = "ScrapeTarget",
    plural = "scrapetargets",
    namespaced,
    status = "ScrapeTargetStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeTargetSpec {
    pub selector_service: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeTargetStatus {
    #[serde(default)]
    pub ready: bool,
}

/// Builds the container the revision template runs, from the projector's
/// pure description.
pub fn build_container(desired: &lambda_agent_projector::DesiredService) -> Container {
    Container {
        name: "agent".to_string(),
        image: Some(desired.image_uri.clone()),
        command: desired.command.clone(),
        args: desired.args.clone(),
        ports: Some(vec![k8s_openapi::api::core::v1::ContainerPort {
            container_port: desired.port as i32,
            ..Default::default()
        }]),
        env: Some(desired.env.clone()),
        readiness_probe: Some(probe_from(&desired.readiness_probe)),
        liveness_probe: Some(probe_from(&desired.liveness_probe)),
        resources: Some(resource_requirements(desired)),
        ..Default::default()
    }
}

fn probe_from(probe: &lambda_agent_projector::Probe) -> Probe {
    Probe {
        http_get: Some(k8s_openapi::api::core::v1::HTTPGetAction {
            path: Some(probe.path.clone()),
            port: k8s_openapi::apimachinery::pkg::util::intstr::IntOrString::Int(probe.port as i32),
            ..Default::default()
        }),
        initial_delay_seconds: Some(probe.initial_delay_seconds as i32),
        period_seconds: Some(probe.period_seconds as i32),
        ..Default::default()
    }
}

fn resource_requirements(
    desired: &lambda_agent_projector::DesiredService,
) -> ResourceRequirements {
    let mut requests = BTreeMap::new();
    let mut limits = BTreeMap::new();
    if let Some(cpu) = &desired.cpu_request {
        requests.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(memory) = &desired.memory_request {
        requests.insert("memory".to_string(), Quantity(memory.clone()));
    }
    if let Some(cpu) = &desired.cpu_limit {
        limits.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(memory) = &desired.memory_limit {
        limits.insert("memory".to_string(), Quantity(memory.clone()));
    }
    ResourceRequirements {
        requests: (!requests.is_empty()).then_some(requests),
        limits: (!limits.is_empty()).then_some(limits),
        ..Default::default()
    }
}

/// Builds the full Knative `Service` spec, injecting the pull-secret
/// reference when the projector set one.
pub fn build_service_spec(
    desired: &lambda_agent_projector::DesiredService,
) -> KnativeServiceSpec {
    let image_pull_secrets = desired
        .injected_pull_secret
        .as_ref()
        .map(|name| vec![k8s_openapi::api::core::v1::LocalObjectReference { name: Some(name.clone()) }]);

    KnativeServiceSpec {
        template: RevisionTemplateSpec {
            metadata: Some(RevisionTemplateMetadata {
                annotations: Some(desired.annotations.clone()),
            }),
            spec: PodSpec {
                containers: vec![build_container(desired)],
                service_account_name: desired.service_account_name.clone(),
                image_pull_secrets,
                ..Default::default()
            },
        },
    }
}
