//! The desired Knative-shaped `Service` child.

use k8s_openapi::api::core::v1::EnvVar;
use std::collections::BTreeMap;

use lambda_agent_types::LambdaAgentSpec;

/// The autoscaler class the projector always pins: concurrency-based,
/// never CPU-based.
pub const AUTOSCALER_CLASS: &str = "kpa.autoscaling.knative.dev";
pub const READINESS_PATH: &str = "/health";

/// A readiness/liveness probe, modelled the way the reference orchestrator
/// models pod-level health checks: initial delay + period on a named path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Probe {
    pub path: String,
    pub port: u16,
    pub initial_delay_seconds: u32,
    pub period_seconds: u32,
}

/// Pure description of the desired Knative `Service`: a pod template plus
/// scaling annotations. The operator applies this against the actual
/// Knative Service API; the projector never talks to the cluster.
#[derive(Clone, Debug, PartialEq)]
pub struct DesiredService {
    pub name: String,
    pub image_uri: String,
    pub port: u16,
    pub command: Option<Vec<String>>,
    pub args: Option<Vec<String>>,
    pub env: Vec<EnvVar>,
    pub service_account_name: Option<String>,
    pub cpu_request: Option<String>,
    pub cpu_limit: Option<String>,
    pub memory_request: Option<String>,
    pub memory_limit: Option<String>,
    pub readiness_probe: Probe,
    pub liveness_probe: Probe,
    /// Scaling and rollout annotations set on the revision template.
    pub annotations: BTreeMap<String, String>,
    /// Set only when the repository matches the supported registry and the
    /// spec does not already carry `pullSecrets`.
    pub injected_pull_secret: Option<String>,
}

pub(crate) fn project_service(
    name: &str,
    spec: &LambdaAgentSpec,
    injected_pull_secret: Option<String>,
) -> DesiredService {
    let port = spec.image.effective_port();
    let mut annotations = BTreeMap::new();
    annotations.insert(
        "autoscaling.knative.dev/minScale".to_string(),
        spec.scaling.min_replicas.to_string(),
    );
    annotations.insert(
        "autoscaling.knative.dev/maxScale".to_string(),
        spec.scaling.max_replicas.to_string(),
    );
    annotations.insert(
        "autoscaling.knative.dev/target".to_string(),
        spec.scaling.target_concurrency.to_string(),
    );
    annotations.insert(
        "autoscaling.knative.dev/class".to_string(),
        AUTOSCALER_CLASS.to_string(),
    );
    if let Some(grace) = &spec.scaling.scale_to_zero_grace_period {
        annotations.insert(
            "autoscaling.knative.dev/scaleToZeroPodRetentionPeriod".to_string(),
            grace.clone(),
        );
    }
    // Force immediate traffic shift to the latest revision.
    annotations.insert(
        "serving.knative.dev/rolloutDuration".to_string(),
        "0s".to_string(),
    );

    let env = build_env(spec);

    DesiredService {
        name: name.to_string(),
        image_uri: spec.image.resolved_uri(),
        port,
        command: spec.image.command.clone(),
        args: spec.image.args.clone(),
        env,
        service_account_name: spec.service_account_name.clone(),
        cpu_request: spec.resources.requests.cpu.clone(),
        cpu_limit: spec.resources.limits.cpu.clone(),
        memory_request: spec.resources.requests.memory.clone(),
        memory_limit: spec.resources.limits.memory.clone(),
        readiness_probe: Probe {
            path: READINESS_PATH.to_string(),
            port,
            initial_delay_seconds: 5,
            period_seconds: 10,
        },
        liveness_probe: Probe {
            path: READINESS_PATH.to_string(),
            port,
            initial_delay_seconds: 15,
            period_seconds: 20,
        },
        annotations,
        injected_pull_secret,
    }
}

fn build_env(spec: &LambdaAgentSpec) -> Vec<EnvVar> {
    // BTreeMap so that output is deterministic regardless of insertion
    // order, then rendered in sorted key order.
    let mut derived: BTreeMap<String, String> = BTreeMap::new();

    derived.insert("AI_PROVIDER".to_string(), format!("{:?}", spec.ai.provider));
    if let Some(endpoint) = &spec.ai.endpoint {
        derived.insert("AI_ENDPOINT".to_string(), endpoint.clone());
    }
    if let Some(model) = &spec.ai.model {
        derived.insert("AI_MODEL".to_string(), model.clone());
    }
    if let Some(temperature) = spec.ai.temperature {
        derived.insert("AI_TEMPERATURE".to_string(), temperature.to_string());
    }
    if let Some(max_tokens) = spec.ai.max_tokens {
        derived.insert("AI_MAX_TOKENS".to_string(), max_tokens.to_string());
    }

    derived.insert(
        "OBSERVABILITY_METRICS_ENABLED".to_string(),
        spec.observability.metrics_enabled.to_string(),
    );
    derived.insert(
        "OBSERVABILITY_METRICS_PATH".to_string(),
        spec.observability.metrics_path.clone(),
    );
    if let Some(tracing_endpoint) = &spec.observability.tracing_endpoint {
        derived.insert("OBSERVABILITY_TRACING_ENDPOINT".to_string(), tracing_endpoint.clone());
    }

    for (flag, enabled) in &spec.behavior {
        derived.insert(format!("BEHAVIOR_{}", flag.to_uppercase()), enabled.to_string());
    }

    let mut env: Vec<EnvVar> = derived
        .into_iter()
        .map(|(name, value)| EnvVar {
            name,
            value: Some(value),
            value_from: None,
        })
        .collect();

    if let Some(secret_ref) = &spec.ai.api_key_secret_ref {
        env.push(EnvVar {
            name: "AI_API_KEY".to_string(),
            value: None,
            value_from: Some(k8s_openapi::api::core::v1::EnvVarSource {
                secret_key_ref: Some(k8s_openapi::api::core::v1::SecretKeySelector {
                    name: Some(secret_ref.name.clone()),
                    key: secret_ref.key.clone(),
                    optional: Some(false),
                }),
                ..Default::default()
            }),
        });
    }

    env.extend(spec.env.iter().cloned());
    env
}
