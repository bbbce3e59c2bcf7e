//! End-to-end scenarios exercised at the level this crate can run without
//! a live API server: admission validation plus projection, which
//! together determine everything the phase machine branches on in
//! `Pending`/`Deploying`.

use async_trait::async_trait;
use lambda_agent_eventing::EventingManager;
use lambda_agent_projector::project;
use lambda_agent_secrets::{PropagationOutcome, SecretPropagator};
use lambda_agent_types::{EventingStatus, ImageSpec, LambdaAgentSpec, ScalingSpec};

fn spec_with_repository(repository: &str) -> LambdaAgentSpec {
    LambdaAgentSpec {
        image: ImageSpec {
            repository: repository.to_string(),
            tag: Some("v1".to_string()),
            ..Default::default()
        },
        scaling: ScalingSpec {
            min_replicas: 0,
            max_replicas: 3,
            target_concurrency: 10,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn scenario_one_cold_start_happy_path_admits_and_projects_as_documented() {
    let spec = spec_with_repository("ghcr.io/acme/demo");

    let errors = lambda_agent_validator::validate(&spec);
    assert!(errors.is_empty(), "valid spec must pass admission: {errors:?}");

    let graph = project("demo", &spec);
    assert_eq!(graph.service.image_uri, "ghcr.io/acme/demo:v1");
    assert_eq!(graph.service.readiness_probe.path, "/health");
    assert_eq!(graph.service.port, 8080);
    assert_eq!(
        graph.service.annotations.get("autoscaling.knative.dev/minScale").unwrap(),
        "0"
    );
    assert_eq!(
        graph.service.annotations.get("autoscaling.knative.dev/maxScale").unwrap(),
        "3"
    );
    assert_eq!(
        graph.service.annotations.get("autoscaling.knative.dev/target").unwrap(),
        "10"
    );
    assert!(graph.service.injected_pull_secret.is_some());
}

#[test]
fn scenario_two_validation_rejection_produces_at_least_one_error() {
    let spec = spec_with_repository("");

    let errors = lambda_agent_validator::validate(&spec);
    assert!(!errors.is_empty(), "empty repository must fail admission");
}

#[test]
fn scenario_three_digest_overrides_tag_in_the_projected_uri() {
    let mut spec = spec_with_repository("ghcr.io/acme/demo");
    spec.image.digest = Some(format!("sha256:{}", "a".repeat(64)));

    let graph = project("demo", &spec);
    assert!(graph.service.image_uri.starts_with("ghcr.io/acme/demo@sha256:"));
    assert!(!graph.service.image_uri.contains(":v1"));
}

#[test]
fn scenario_four_malformed_event_type_is_rejected_at_admission() {
    let mut spec = spec_with_repository("ghcr.io/acme/demo");
    spec.eventing.enabled = true;
    spec.eventing.subscriptions = vec![lambda_agent_types::Subscription {
        event_type: ".bad".to_string(),
    }];

    let errors = lambda_agent_validator::validate(&spec);
    assert!(
        errors.iter().any(|e| e.field.contains("eventing")),
        "malformed event type must surface an eventing validation error: {errors:?}"
    );
}

/// Records whether teardown was asked for, standing in for the live
/// `KubernetesEventingManager` during deletion/cleanup scenarios.
struct RecordingEventingManager {
    teardown_calls: std::sync::Mutex<Vec<(String, String)>>,
}

impl RecordingEventingManager {
    fn new() -> Self {
        RecordingEventingManager {
            teardown_calls: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl EventingManager for RecordingEventingManager {
    async fn reconcile(
        &self,
        _namespace: &str,
        _agent_name: &str,
        _service_url: &str,
        _graph: &lambda_agent_projector::DesiredEventingGraph,
    ) -> anyhow::Result<EventingStatus> {
        Ok(EventingStatus::default())
    }

    async fn teardown(&self, namespace: &str, agent_name: &str) -> anyhow::Result<()> {
        self.teardown_calls
            .lock()
            .unwrap()
            .push((namespace.to_string(), agent_name.to_string()));
        Ok(())
    }
}

#[tokio::test]
async fn scenario_five_deletion_tears_down_every_eventing_child_exactly_once() {
    let manager = RecordingEventingManager::new();

    manager.teardown("demo-ns", "demo").await.unwrap();

    let calls = manager.teardown_calls.lock().unwrap();
    assert_eq!(
        calls.as_slice(),
        &[("demo-ns".to_string(), "demo".to_string())],
        "finaliser teardown must tear down exactly the deleted agent's children"
    );
}

/// Stands in for `KubernetesSecretPropagator` when the cluster-wide
/// credential source secret does not exist.
struct AbsentSourceSecretPropagator;

#[async_trait]
impl SecretPropagator for AbsentSourceSecretPropagator {
    async fn propagate(
        &self,
        _namespace: &str,
        _agent_name: &str,
        _source_namespace: &str,
        _source_name: &str,
    ) -> anyhow::Result<PropagationOutcome> {
        Ok(PropagationOutcome::SourceUnavailable)
    }
}

#[tokio::test]
async fn scenario_six_missing_credential_source_is_non_fatal() {
    let propagator = AbsentSourceSecretPropagator;

    let outcome = propagator
        .propagate("demo-ns", "demo", "platform", "ghcr-pull-credentials")
        .await
        .expect("an absent credential source must not fail the reconcile");

    assert_eq!(
        outcome,
        PropagationOutcome::SourceUnavailable,
        "a missing source secret must be reported as skip-not-failure, so the \
         agent can still reach Ready without a pull secret"
    );
}
