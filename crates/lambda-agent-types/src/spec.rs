//! The user-facing `spec` half of a [`crate::LambdaAgent`].

use k8s_openapi::api::core::v1::EnvVar;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::status::LambdaAgentStatus;

/// The `LambdaAgent` custom resource: a declarative description of one
/// auto-scaling, event-driven serverless agent.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "lambda.babylonhealth.io",
    version = "v1",
    kind = "LambdaAgent",
    plural = "lambdaagents",
    singular = "lambdaagent",
    shortname = "lagent",
    namespaced,
    status = "LambdaAgentStatus",
    derive = "Default",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type == 'Ready')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct LambdaAgentSpec {
    /// The container image to run.
    pub image: ImageSpec,

    /// AI provider wiring for the agent.
    #[serde(default)]
    pub ai: AiSpec,

    /// Scale-to-zero / concurrency-based autoscaling knobs.
    #[serde(default)]
    pub scaling: ScalingSpec,

    /// CPU and memory requests/limits for the running container.
    #[serde(default)]
    pub resources: ResourcesSpec,

    /// The eventing fabric this agent participates in.
    #[serde(default)]
    pub eventing: EventingSpec,

    /// Metrics and tracing configuration.
    #[serde(default)]
    pub observability: ObservabilitySpec,

    /// Gates on which child objects the operator is allowed to create.
    #[serde(default)]
    pub permissions: PermissionsSpec,

    /// Additional environment variables injected into the container,
    /// on top of the ones the operator derives from `ai`/`behavior`/
    /// `observability`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// The service account the running pod should use. Defaults to the
    /// namespace's `default` service account when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    /// Feature toggles that do not warrant a dedicated field.
    #[serde(default)]
    pub behavior: BTreeMap<String, bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    /// e.g. `ghcr.io/acme/demo`. Must be non-empty and whitespace-free.
    pub repository: String,
    /// Mutually shadowed by `digest` when both are present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// `sha256:` + 64 lowercase hex characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    /// Container port. `0` means "use the default", which is 8080.
    #[serde(default)]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pull_secrets: Vec<String>,
}

/// The registry the secret propagator and projector auto-wire an
/// image-pull credential for.
pub const SUPPORTED_REGISTRY_PREFIX: &str = "ghcr.io/";

/// The fixed name of the namespace-local image-pull credential the secret
/// propagator maintains and the projector references.
pub const PULL_SECRET_NAME: &str = "lambda-agent-registry-pull";

impl ImageSpec {
    /// The default port used when `port` is `0`.
    pub const DEFAULT_PORT: u16 = 8080;

    /// Whether this image is hosted on the registry the operator knows how
    /// to auto-provision a pull credential for.
    pub fn uses_supported_registry(&self) -> bool {
        self.repository.starts_with(SUPPORTED_REGISTRY_PREFIX)
    }

    pub fn effective_port(&self) -> u16 {
        if self.port == 0 {
            Self::DEFAULT_PORT
        } else {
            self.port
        }
    }

    /// Resolves the image URI following digest > tag > implicit `:latest`
    /// precedence.
    pub fn resolved_uri(&self) -> String {
        if let Some(digest) = &self.digest {
            format!("{}@{}", self.repository, digest)
        } else if let Some(tag) = &self.tag {
            format!("{}:{}", self.repository, tag)
        } else {
            format!("{}:latest", self.repository)
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    Ollama,
    OpenAi,
    Anthropic,
    #[default]
    None,
}

impl AiProvider {
    /// Cloud providers require an `apiKeySecretRef`.
    pub fn requires_api_key(&self) -> bool {
        matches!(self, AiProvider::OpenAi | AiProvider::Anthropic)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiSpec {
    #[serde(default)]
    pub provider: AiProvider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_secret_ref: Option<SecretKeyRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScalingSpec {
    #[serde(default)]
    pub min_replicas: u32,
    #[serde(default)]
    pub max_replicas: u32,
    #[serde(default)]
    pub target_concurrency: u32,
    /// `<positive-number>{s|m|h}`, e.g. `30s`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_to_zero_grace_period: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesSpec {
    #[serde(default)]
    pub requests: ResourceQuantities,
    #[serde(default)]
    pub limits: ResourceQuantities,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQuantities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventingSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subscriptions: Vec<Subscription>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forwards: Vec<Forward>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dlq: Option<DlqSpec>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Reverse-DNS-shaped CloudEvent type, e.g. `function.ready`.
    pub event_type: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Forward {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_types: Vec<String>,
    pub target_agent: String,
    pub target_namespace: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DlqSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub retry_max_attempts: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObservabilitySpec {
    #[serde(default)]
    pub metrics_enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracing_endpoint: Option<String>,
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionsSpec {
    #[serde(default)]
    pub disable_broker_creation: bool,
    #[serde(default)]
    pub disable_trigger_creation: bool,
    #[serde(default)]
    pub disable_function_creation: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_uri_precedence() {
        let digest = format!("sha256:{}", "a".repeat(64));
        let image = ImageSpec {
            repository: "ghcr.io/acme/demo".into(),
            tag: Some("v1".into()),
            digest: Some(digest.clone()),
            ..Default::default()
        };
        assert_eq!(image.resolved_uri(), format!("ghcr.io/acme/demo@{digest}"));
    }

    #[test]
    fn image_uri_tag_without_digest() {
        let image = ImageSpec {
            repository: "ghcr.io/acme/demo".into(),
            tag: Some("v1".into()),
            ..Default::default()
        };
        assert_eq!(image.resolved_uri(), "ghcr.io/acme/demo:v1");
    }

    #[test]
    fn image_uri_implicit_latest() {
        let image = ImageSpec {
            repository: "ghcr.io/acme/demo".into(),
            ..Default::default()
        };
        assert_eq!(image.resolved_uri(), "ghcr.io/acme/demo:latest");
    }

    #[test]
    fn effective_port_defaults() {
        let image = ImageSpec {
            repository: "ghcr.io/acme/demo".into(),
            ..Default::default()
        };
        assert_eq!(image.effective_port(), ImageSpec::DEFAULT_PORT);
    }
}
