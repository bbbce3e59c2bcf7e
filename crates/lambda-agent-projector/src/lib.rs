//! Pure function from a [`LambdaAgentSpec`] to the set of its desired
//! children. Deterministic: the same spec always produces a byte-identical
//! (field-for-field equal) [`DesiredGraph`].

mod eventing;
mod scrape;
mod service;

pub use eventing::{DesiredDlq, DesiredEventingGraph, DesiredForward, DesiredTrigger};
pub use scrape::DesiredScrapeTarget;
pub use service::{DesiredService, Probe, AUTOSCALER_CLASS, READINESS_PATH};

use lambda_agent_types::{LambdaAgentSpec, PULL_SECRET_NAME};

#[derive(Clone, Debug, PartialEq)]
pub struct DesiredGraph {
    pub service: DesiredService,
    pub scrape_target: Option<DesiredScrapeTarget>,
    pub eventing: DesiredEventingGraph,
}

/// Projects `spec` into the full desired child graph for the agent named
/// `name` in `namespace`.
pub fn project(name: &str, spec: &LambdaAgentSpec) -> DesiredGraph {
    let injected_pull_secret = if spec.image.pull_secrets.is_empty() && spec.image.uses_supported_registry()
    {
        Some(PULL_SECRET_NAME.to_string())
    } else {
        None
    };

    DesiredGraph {
        service: service::project_service(name, spec, injected_pull_secret),
        scrape_target: scrape::project_scrape_target(name, &spec.observability),
        eventing: eventing::project_eventing(name, &spec.eventing, &spec.permissions),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lambda_agent_types::{
        EventingSpec, ImageSpec, ObservabilitySpec, PermissionsSpec, ScalingSpec, Subscription,
    };
    use proptest::prelude::*;

    fn spec_with_image(repository: &str) -> LambdaAgentSpec {
        LambdaAgentSpec {
            image: ImageSpec {
                repository: repository.to_string(),
                tag: Some("v1".into()),
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
    fn cold_start_happy_path_matches_scenario_one() {
        let spec = spec_with_image("ghcr.io/acme/demo");
        let graph = project("demo", &spec);

        assert_eq!(graph.service.image_uri, "ghcr.io/acme/demo:v1");
        assert_eq!(graph.service.readiness_probe.path, "/health");
        assert_eq!(graph.service.readiness_probe.port, 8080);
        assert_eq!(
            graph.service.annotations.get("autoscaling.knative.dev/minScale"),
            Some(&"0".to_string())
        );
        assert_eq!(
            graph.service.annotations.get("autoscaling.knative.dev/maxScale"),
            Some(&"3".to_string())
        );
        assert_eq!(
            graph.service.annotations.get("autoscaling.knative.dev/target"),
            Some(&"10".to_string())
        );
        assert_eq!(
            graph.service.injected_pull_secret,
            Some(PULL_SECRET_NAME.to_string())
        );
    }

    #[test]
    fn digest_overrides_tag() {
        let mut spec = spec_with_image("ghcr.io/acme/demo");
        spec.image.digest = Some(format!("sha256:{}", "a".repeat(64)));
        let graph = project("demo", &spec);
        assert!(graph.service.image_uri.starts_with("ghcr.io/acme/demo@sha256:"));
        assert!(!graph.service.image_uri.contains(":v1"));
    }

    #[test]
    fn unsupported_registry_does_not_get_a_pull_secret() {
        let spec = spec_with_image("docker.io/acme/demo");
        let graph = project("demo", &spec);
        assert_eq!(graph.service.injected_pull_secret, None);
    }

    #[test]
    fn explicit_pull_secrets_suppress_auto_injection() {
        let mut spec = spec_with_image("ghcr.io/acme/demo");
        spec.image.pull_secrets = vec!["my-own-secret".to_string()];
        let graph = project("demo", &spec);
        assert_eq!(graph.service.injected_pull_secret, None);
    }

    #[test]
    fn eventing_disabled_produces_empty_graph() {
        let spec = spec_with_image("ghcr.io/acme/demo");
        let graph = project("demo", &spec);
        assert_eq!(graph.eventing.broker_name, None);
        assert!(graph.eventing.triggers.is_empty());
    }

    #[test]
    fn eventing_enabled_with_subscriptions_projects_triggers() {
        let mut spec = spec_with_image("ghcr.io/acme/demo");
        spec.eventing = EventingSpec {
            enabled: true,
            subscriptions: vec![Subscription {
                event_type: "function.ready".into(),
            }],
            ..Default::default()
        };
        let graph = project("demo", &spec);
        assert_eq!(graph.eventing.broker_name, Some("demo-broker".to_string()));
        assert_eq!(graph.eventing.triggers.len(), 1);
        assert_eq!(graph.eventing.triggers[0].event_type, "function.ready");
    }

    #[test]
    fn broker_permission_disable_suppresses_whole_graph_even_when_enabled() {
        let mut spec = spec_with_image("ghcr.io/acme/demo");
        spec.eventing.enabled = true;
        spec.permissions = PermissionsSpec {
            disable_broker_creation: true,
            ..Default::default()
        };
        let graph = project("demo", &spec);
        assert_eq!(graph.eventing.broker_name, None);
    }

    #[test]
    fn scrape_target_only_projected_when_metrics_enabled() {
        let mut spec = spec_with_image("ghcr.io/acme/demo");
        assert!(project("demo", &spec).scrape_target.is_none());

        spec.observability = ObservabilitySpec {
            metrics_enabled: true,
            metrics_path: "/metrics".into(),
            ..Default::default()
        };
        let graph = project("demo", &spec);
        assert_eq!(graph.scrape_target.unwrap().path, "/metrics");
    }

    proptest! {
        #[test]
        fn determinism(repo in "[a-z0-9./-]{1,40}", tag in "[a-z0-9.-]{1,20}") {
            let mut spec = spec_with_image(&repo);
            spec.image.tag = Some(tag);
            let first = project("demo", &spec);
            let second = project("demo", &spec);
            prop_assert_eq!(first, second);
        }
    }
}
