//! Pure, synchronous admission validation for [`LambdaAgentSpec`].
//!
//! `validate` never touches the network or the clock; update validation is
//! stateless (the old object, if any, is never consulted).

mod error;

pub use error::{ValidationCode, ValidationError};

use ipnet::IpNet;
use lambda_agent_types::{AiSpec, EventingSpec, ImageSpec, LambdaAgentSpec, ResourcesSpec};
use once_cell::sync::Lazy;
use regex::Regex;
use std::net::IpAddr;
use std::str::FromStr;

static DIGEST_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^sha256:[a-f0-9]{64}$").unwrap());
static EVENT_TYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+(\.[A-Za-z0-9_-]+)+$").unwrap());
static GRACE_PERIOD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)?[smh]$").unwrap());
static QUANTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)?(m|Ki|Mi|Gi|Ti|Pi|Ei|[kKMGTPE])?$").unwrap());
static SHELL_METACHARS: &[char] = &[
    ';', '&', '|', '`', '$', '(', ')', '<', '>', '\n', '\\', '"', '\'', '*', '?', '~', '{', '}',
];

const METADATA_SERVICE_HOSTS: &[&str] = &["169.254.169.254", "metadata.google.internal"];

/// Private/loopback ranges that are disallowed for a non-internal endpoint.
static PRIVATE_RANGES: Lazy<Vec<IpNet>> = Lazy::new(|| {
    [
        "127.0.0.0/8",
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "169.254.0.0/16",
        "::1/128",
        "fc00::/7",
    ]
    .iter()
    .map(|s| IpNet::from_str(s).unwrap())
    .collect()
});

/// Validates a spec, returning every violation found. An empty result means
/// the spec is admissible; any non-empty result rejects the change.
pub fn validate(spec: &LambdaAgentSpec) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    validate_image(&spec.image, &mut errors);
    validate_ai(&spec.ai, &mut errors);
    validate_scaling(spec, &mut errors);
    validate_eventing(&spec.eventing, &mut errors);
    validate_resources(&spec.resources, &mut errors);
    validate_security(spec, &mut errors);
    errors
}

fn validate_image(image: &ImageSpec, errors: &mut Vec<ValidationError>) {
    if image.repository.trim().is_empty() {
        errors.push(ValidationError::new(
            "spec.image.repository",
            ValidationCode::ImageRepositoryEmpty,
            "repository must not be empty",
        ));
    } else if image.repository.chars().any(char::is_whitespace) {
        errors.push(ValidationError::new(
            "spec.image.repository",
            ValidationCode::ImageRepositoryWhitespace,
            "repository must not contain whitespace",
        ));
    }

    if image.port != 0 && !(1..=65535).contains(&image.port) {
        errors.push(ValidationError::new(
            "spec.image.port",
            ValidationCode::ImagePortOutOfRange,
            "port must be in [1, 65535] or 0 for the default",
        ));
    }

    if let Some(digest) = &image.digest {
        if !DIGEST_RE.is_match(digest) {
            errors.push(ValidationError::new(
                "spec.image.digest",
                ValidationCode::ImageDigestMalformed,
                "digest must match sha256:<64 lowercase hex>",
            ));
        }
    }
}

fn validate_ai(ai: &AiSpec, errors: &mut Vec<ValidationError>) {
    if let Some(temperature) = ai.temperature {
        if !(0.0..=2.0).contains(&temperature) {
            errors.push(ValidationError::new(
                "spec.ai.temperature",
                ValidationCode::AiTemperatureOutOfRange,
                "temperature must be in [0, 2]",
            ));
        }
    }

    if let Some(max_tokens) = ai.max_tokens {
        if !(0..=1_000_000).contains(&max_tokens) {
            errors.push(ValidationError::new(
                "spec.ai.maxTokens",
                ValidationCode::AiMaxTokensOutOfRange,
                "maxTokens must be in [0, 1000000]",
            ));
        }
    }

    if let Some(endpoint) = &ai.endpoint {
        if url::Url::parse(endpoint).is_err() {
            errors.push(ValidationError::new(
                "spec.ai.endpoint",
                ValidationCode::AiEndpointInvalidUrl,
                "endpoint must be a valid URL",
            ));
        }
    }

    if ai.provider.requires_api_key() {
        match &ai.api_key_secret_ref {
            None => errors.push(ValidationError::new(
                "spec.ai.apiKeySecretRef",
                ValidationCode::AiMissingApiKeyRef,
                "cloud providers require apiKeySecretRef",
            )),
            Some(secret_ref) => {
                if secret_ref.name.trim().is_empty() || secret_ref.key.trim().is_empty() {
                    errors.push(ValidationError::new(
                        "spec.ai.apiKeySecretRef",
                        ValidationCode::AiApiKeyRefIncomplete,
                        "apiKeySecretRef.name and .key must both be non-empty",
                    ));
                }
            }
        }
    }
}

fn validate_scaling(spec: &LambdaAgentSpec, errors: &mut Vec<ValidationError>) {
    let scaling = &spec.scaling;
    if scaling.min_replicas > scaling.max_replicas {
        errors.push(ValidationError::new(
            "spec.scaling.minReplicas",
            ValidationCode::ScalingMinGreaterThanMax,
            "minReplicas must be <= maxReplicas",
        ));
    }
    if let Some(grace) = &scaling.scale_to_zero_grace_period {
        if !GRACE_PERIOD_RE.is_match(grace) {
            errors.push(ValidationError::new(
                "spec.scaling.scaleToZeroGracePeriod",
                ValidationCode::ScalingGracePeriodMalformed,
                "grace period must match <positive-number>{s|m|h}",
            ));
        }
    }
}

fn validate_eventing(eventing: &EventingSpec, errors: &mut Vec<ValidationError>) {
    for (i, sub) in eventing.subscriptions.iter().enumerate() {
        if !EVENT_TYPE_RE.is_match(&sub.event_type) {
            errors.push(ValidationError::new(
                format!("spec.eventing.subscriptions[{i}].eventType"),
                ValidationCode::EventingSubscriptionTypeMalformed,
                "event type must be reverse-DNS-shaped (a.b.c), no leading/trailing dot",
            ));
        }
    }
    for (i, fwd) in eventing.forwards.iter().enumerate() {
        if fwd.event_types.is_empty() {
            errors.push(ValidationError::new(
                format!("spec.eventing.forwards[{i}].eventTypes"),
                ValidationCode::EventingForwardMissingEventTypes,
                "a forward must name at least one event type",
            ));
        }
        if fwd.target_agent.trim().is_empty() || fwd.target_namespace.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("spec.eventing.forwards[{i}].targetAgent"),
                ValidationCode::EventingForwardMissingTarget,
                "a forward must name a non-empty target agent and namespace",
            ));
        }
    }
    if let Some(dlq) = &eventing.dlq {
        if dlq.retry_max_attempts > 100 {
            errors.push(ValidationError::new(
                "spec.eventing.dlq.retryMaxAttempts",
                ValidationCode::EventingDlqMaxAttemptsOutOfRange,
                "retryMaxAttempts must be in [0, 100]",
            ));
        }
    }
}

fn validate_resources(resources: &ResourcesSpec, errors: &mut Vec<ValidationError>) {
    let quantities = [
        ("spec.resources.requests.cpu", &resources.requests.cpu),
        ("spec.resources.requests.memory", &resources.requests.memory),
        ("spec.resources.limits.cpu", &resources.limits.cpu),
        ("spec.resources.limits.memory", &resources.limits.memory),
    ];
    for (field, quantity) in quantities {
        if let Some(q) = quantity {
            if !QUANTITY_RE.is_match(q) {
                errors.push(ValidationError::new(
                    field,
                    ValidationCode::ResourceQuantityMalformed,
                    "quantity must use a recognised suffix (m, Ki, Mi, Gi, ...)",
                ));
            }
        }
    }
}

/// Rule 6: security filters on every free-text field that ever reaches a
/// shell or URL.
fn validate_security(spec: &LambdaAgentSpec, errors: &mut Vec<ValidationError>) {
    if let Some(command) = &spec.image.command {
        check_shell_safe("spec.image.command", command, errors);
    }
    if let Some(args) = &spec.image.args {
        check_shell_safe("spec.image.args", args, errors);
    }

    if let Some(endpoint) = &spec.ai.endpoint {
        check_url_target("spec.ai.endpoint", endpoint, errors);
    }
    if let Some(endpoint) = &spec.observability.tracing_endpoint {
        check_url_target("spec.observability.tracingEndpoint", endpoint, errors);
    }
}

fn check_shell_safe(field: &str, values: &[String], errors: &mut Vec<ValidationError>) {
    for value in values {
        if value.contains(SHELL_METACHARS) {
            errors.push(ValidationError::new(
                field,
                ValidationCode::SecurityShellMetacharacter,
                "value must not contain shell metacharacters",
            ));
            return;
        }
    }
}

fn check_url_target(field: &str, raw_url: &str, errors: &mut Vec<ValidationError>) {
    let Ok(parsed) = url::Url::parse(raw_url) else {
        return; // shape already reported by the endpoint-URL check.
    };
    let Some(host) = parsed.host_str() else {
        return;
    };

    if METADATA_SERVICE_HOSTS.contains(&host) {
        errors.push(ValidationError::new(
            field,
            ValidationCode::SecurityUrlTargetsMetadataService,
            "URL must not target a cloud metadata service",
        ));
        return;
    }

    let is_internal_cluster_domain = host.ends_with(".svc.cluster.local") || host == "localhost";
    if parsed.scheme() == "http" && is_internal_cluster_domain {
        return;
    }

    if let Ok(ip) = IpAddr::from_str(host) {
        if PRIVATE_RANGES.iter().any(|net| net.contains(&ip)) {
            errors.push(ValidationError::new(
                field,
                ValidationCode::SecurityUrlTargetsPrivateNetwork,
                "URL must not target a loopback or private-range IP",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lambda_agent_types::{AiProvider, SecretKeyRef, Subscription};
    use proptest::prelude::*;

    fn base_spec() -> LambdaAgentSpec {
        LambdaAgentSpec {
            image: ImageSpec {
                repository: "ghcr.io/acme/demo".into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn empty_repository_is_rejected() {
        let mut spec = base_spec();
        spec.image.repository = "".into();
        let errors = validate(&spec);
        assert!(errors
            .iter()
            .any(|e| e.code == ValidationCode::ImageRepositoryEmpty));
    }

    #[test]
    fn digest_overrides_tag_is_not_itself_a_validation_error() {
        let mut spec = base_spec();
        spec.image.tag = Some("v1".into());
        spec.image.digest = Some(format!("sha256:{}", "a".repeat(64)));
        assert!(validate(&spec).is_empty());
    }

    #[test]
    fn malformed_digest_is_rejected() {
        let mut spec = base_spec();
        spec.image.digest = Some("sha256:not-hex".into());
        let errors = validate(&spec);
        assert!(errors
            .iter()
            .any(|e| e.code == ValidationCode::ImageDigestMalformed));
    }

    #[test]
    fn cloud_provider_without_key_ref_is_rejected() {
        let mut spec = base_spec();
        spec.ai.provider = AiProvider::OpenAi;
        let errors = validate(&spec);
        assert!(errors
            .iter()
            .any(|e| e.code == ValidationCode::AiMissingApiKeyRef));
    }

    #[test]
    fn cloud_provider_with_complete_key_ref_passes() {
        let mut spec = base_spec();
        spec.ai.provider = AiProvider::Anthropic;
        spec.ai.api_key_secret_ref = Some(SecretKeyRef {
            name: "api-keys".into(),
            key: "anthropic".into(),
        });
        assert!(validate(&spec).is_empty());
    }

    #[test]
    fn scaling_min_greater_than_max_is_rejected() {
        let mut spec = base_spec();
        spec.scaling.min_replicas = 5;
        spec.scaling.max_replicas = 1;
        let errors = validate(&spec);
        assert!(errors
            .iter()
            .any(|e| e.code == ValidationCode::ScalingMinGreaterThanMax));
    }

    #[test]
    fn malformed_event_type_is_rejected() {
        let mut spec = base_spec();
        spec.eventing.subscriptions.push(Subscription {
            event_type: ".bad".into(),
        });
        let errors = validate(&spec);
        assert!(errors
            .iter()
            .any(|e| e.code == ValidationCode::EventingSubscriptionTypeMalformed));
    }

    #[test]
    fn malformed_resource_quantity_is_rejected() {
        let mut spec = base_spec();
        spec.resources.limits.memory = Some("not-a-quantity".into());
        let errors = validate(&spec);
        assert!(errors
            .iter()
            .any(|e| e.code == ValidationCode::ResourceQuantityMalformed));
    }

    #[test]
    fn shell_metacharacters_in_args_are_rejected() {
        let mut spec = base_spec();
        spec.image.args = Some(vec!["; rm -rf /".into()]);
        let errors = validate(&spec);
        assert!(errors
            .iter()
            .any(|e| e.code == ValidationCode::SecurityShellMetacharacter));
    }

    #[test]
    fn metadata_service_endpoint_is_rejected() {
        let mut spec = base_spec();
        spec.ai.endpoint = Some("http://169.254.169.254/latest/meta-data".into());
        let errors = validate(&spec);
        assert!(errors
            .iter()
            .any(|e| e.code == ValidationCode::SecurityUrlTargetsMetadataService));
    }

    #[test]
    fn loopback_endpoint_is_rejected() {
        let mut spec = base_spec();
        spec.ai.endpoint = Some("https://127.0.0.1:9999".into());
        let errors = validate(&spec);
        assert!(errors
            .iter()
            .any(|e| e.code == ValidationCode::SecurityUrlTargetsPrivateNetwork));
    }

    #[test]
    fn internal_cluster_domain_over_http_is_allowed() {
        let mut spec = base_spec();
        spec.ai.endpoint = Some("http://ollama.default.svc.cluster.local:11434".into());
        assert!(validate(&spec).is_empty());
    }

    proptest! {
        #[test]
        fn determinism_over_repository_strings(repo in "[a-z0-9./-]{0,40}") {
            let mut spec = base_spec();
            spec.image.repository = repo;
            let first = validate(&spec);
            let second = validate(&spec);
            prop_assert_eq!(first, second);
        }
    }
}
