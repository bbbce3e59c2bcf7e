//! The phase state machine: given one `LambdaAgent`, advance at most one
//! phase per call and return the next requeue interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::{Resource, ResourceExt};
use tracing::{info, warn};

use lambda_agent_emitter::{CloudEvent, EventType};
use lambda_agent_projector::project;
use lambda_agent_types::{AiStatus, LambdaAgent, LambdaAgentSpec, LambdaAgentStatus, Phase};

use crate::apply::{apply_scrape_target, apply_service, delete_scrape_target, delete_service};
use crate::context::{Context, FIELD_MANAGER, FINALIZER_NAME};
use crate::error::ReconcileError;

const REQUEUE_TRANSIENT: Duration = Duration::from_secs(30);
const REQUEUE_AWAITING_READY: Duration = Duration::from_secs(5);
const REQUEUE_STEADY_STATE: Duration = Duration::from_secs(60);
const REQUEUE_AFTER_FAILED: Duration = Duration::from_secs(60);
const REQUEUE_IMMEDIATE: Duration = Duration::from_secs(0);
const REQUEUE_INTERNAL: Duration = Duration::from_secs(30);

/// How long the `Eventing` condition must stay `False` before it is
/// considered persistent rather than a transient blip worth a quiet retry.
const EVENTING_ALERT_THRESHOLD: chrono::Duration = chrono::Duration::minutes(5);

enum PendingDecision {
    Proceed,
    Rejected { message: String },
}

/// Admission check a `Pending` agent must pass before its children are
/// applied. Pure: never touches the cluster.
fn decide_pending(spec: &LambdaAgentSpec) -> PendingDecision {
    let errors = lambda_agent_validator::validate(spec);
    if errors.is_empty() {
        PendingDecision::Proceed
    } else {
        let message = errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        PendingDecision::Rejected { message }
    }
}

fn failed_to_pending_requeue() -> Duration {
    REQUEUE_AFTER_FAILED
}

fn deleting_requeue() -> Duration {
    REQUEUE_STEADY_STATE
}

struct ServiceCheckOutcome {
    phase: Phase,
    reason: &'static str,
    message: &'static str,
    requeue: Duration,
}

/// What `deploy()` does with the current agent once it knows whether the
/// service was even allowed to be created, and if so, its readiness. Pure:
/// takes only the three booleans that decide the branch.
fn decide_after_service_check(
    function_creation_disabled: bool,
    service_failed: bool,
    service_ready: bool,
) -> ServiceCheckOutcome {
    if function_creation_disabled {
        return ServiceCheckOutcome {
            phase: Phase::Deploying,
            reason: "FunctionCreationDisabled",
            message: "permissions.disableFunctionCreation forbids creating the service",
            requeue: REQUEUE_STEADY_STATE,
        };
    }
    if service_failed {
        return ServiceCheckOutcome {
            phase: Phase::Failed,
            reason: "RevisionFailed",
            message: "service revision failed",
            requeue: REQUEUE_AFTER_FAILED,
        };
    }
    if service_ready {
        return ServiceCheckOutcome {
            phase: Phase::Ready,
            reason: "Ready",
            message: "service is ready",
            requeue: REQUEUE_STEADY_STATE,
        };
    }
    ServiceCheckOutcome {
        phase: Phase::Deploying,
        reason: "AwaitingReadiness",
        message: "waiting for service readiness",
        requeue: REQUEUE_AWAITING_READY,
    }
}

/// Whether an `Eventing` condition that has been `False` since
/// `failing_since` (`None` if it was never observed failing) has crossed
/// the threshold a single `alert.warning` notification is worth firing for.
fn eventing_failure_is_persistent(failing_since: Option<chrono::DateTime<Utc>>) -> bool {
    failing_since
        .map(|since| Utc::now() - since >= EVENTING_ALERT_THRESHOLD)
        .unwrap_or(false)
}

pub async fn reconcile(agent: Arc<LambdaAgent>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let namespace = agent
        .namespace()
        .ok_or_else(|| ReconcileError::Internal("agent has no namespace".to_string()))?;
    let api: Api<LambdaAgent> = Api::namespaced(ctx.client.clone(), &namespace);

    let result = finalizer(&api, FINALIZER_NAME, agent.clone(), |event| async {
        match event {
            FinalizerEvent::Apply(agent) => apply_agent(agent, ctx.clone()).await,
            FinalizerEvent::Cleanup(agent) => cleanup_agent(agent, ctx.clone()).await,
        }
    })
    .await;

    match result {
        Ok(action) => {
            ctx.metrics.record_success();
            Ok(action)
        }
        Err(e) => {
            ctx.metrics.record_failure();
            Err(e.into())
        }
    }
}

pub fn error_policy(_agent: Arc<LambdaAgent>, error: &ReconcileError, _ctx: Arc<Context>) -> Action {
    warn!(error = %error, "reconcile failed");
    Action::requeue(REQUEUE_INTERNAL)
}

async fn apply_agent(agent: Arc<LambdaAgent>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let namespace = agent
        .namespace()
        .ok_or_else(|| ReconcileError::Internal("agent has no namespace".to_string()))?;
    let name = agent.name_any();
    let generation = agent.meta().generation;
    let agents: Api<LambdaAgent> = Api::namespaced(ctx.client.clone(), &namespace);

    let mut status = agent.status.clone().unwrap_or_default();
    let correlation_id = format!("{name}-{}", generation.unwrap_or_default());

    let action = match status.phase {
        Phase::Pending => match decide_pending(&agent.spec) {
            PendingDecision::Proceed => {
                status.phase = Phase::Deploying;
                set_ready_condition(&mut status, generation, "False", "Deploying", "applying children");
                REQUEUE_IMMEDIATE
            }
            PendingDecision::Rejected { message } => {
                status.phase = Phase::Failed;
                set_ready_condition(&mut status, generation, "False", "ValidationFailed", &message);
                REQUEUE_AFTER_FAILED
            }
        },
        Phase::Deploying => {
            deploy(&agent, &namespace, &name, &correlation_id, &mut status, &ctx).await?
        }
        Phase::Ready => {
            deploy(&agent, &namespace, &name, &correlation_id, &mut status, &ctx).await?
        }
        Phase::Failed => {
            status.phase = Phase::Pending;
            failed_to_pending_requeue()
        }
        Phase::Deleting => deleting_requeue(),
    };

    status.observed_generation = generation;
    patch_status(&agents, &name, &status).await?;

    Ok(Action::requeue(action))
}

/// Shared by `Deploying` and `Ready`: propagate the credential, project
/// and apply children, reconcile eventing and scrape targets, then poll
/// service readiness to decide the next phase.
async fn deploy(
    agent: &LambdaAgent,
    namespace: &str,
    name: &str,
    correlation_id: &str,
    status: &mut LambdaAgentStatus,
    ctx: &Context,
) -> Result<Duration, ReconcileError> {
    let previously_had_service = status.service_status.service_name.is_some();
    let was_ready = status.phase == Phase::Ready;

    if agent.spec.image.pull_secrets.is_empty() && agent.spec.image.uses_supported_registry() {
        match ctx
            .secret_propagator
            .propagate(
                namespace,
                name,
                &ctx.credential_source_namespace,
                &ctx.credential_source_name,
            )
            .await
        {
            Ok(outcome) => info!(%name, ?outcome, "credential propagation"),
            Err(e) => warn!(%name, error = %e, "credential propagation failed; continuing"),
        }
    }

    let graph = project(name, &agent.spec);

    let function_creation_disabled = agent.spec.permissions.disable_function_creation;

    let (service_ready, service_failed) = if function_creation_disabled {
        if previously_had_service {
            delete_service(&ctx.client, namespace, name).await?;
        }
        status.service_status.service_name = None;
        status.service_status.url = None;
        status.service_status.ready = false;
        status.service_status.latest_revision = None;
        (false, false)
    } else {
        let observed_service = match apply_service(&ctx.client, namespace, agent, &graph.service).await {
            Ok(observed) => observed,
            Err(ReconcileError::TransientApply(e)) => {
                warn!(%name, error = %e, "transient error applying service");
                return Ok(REQUEUE_TRANSIENT);
            }
            Err(permanent) => return Err(permanent),
        };

        let service_ready = observed_service
            .status
            .as_ref()
            .and_then(|s| s.ready_condition())
            .map(|c| c.status == "True")
            .unwrap_or(false);
        let service_failed = observed_service
            .status
            .as_ref()
            .and_then(|s| s.ready_condition())
            .map(|c| c.status == "False" && c.reason == "RevisionFailed")
            .unwrap_or(false);

        status.service_status.service_name = Some(graph.service.name.clone());
        status.service_status.url = observed_service.status.as_ref().and_then(|s| s.url.clone());
        status.service_status.ready = service_ready;
        status.service_status.latest_revision = observed_service
            .status
            .as_ref()
            .and_then(|s| s.latest_ready_revision_name.clone());

        if !previously_had_service {
            ctx.emitter
                .emit(CloudEvent::new(
                    &ctx.emitter_source_root,
                    namespace,
                    name,
                    EventType::ServiceCreated,
                    correlation_id,
                    serde_json::json!({ "image": graph.service.image_uri }),
                ))
                .await;
        }

        (service_ready, service_failed)
    };

    match ctx
        .eventing_manager
        .reconcile(
            namespace,
            name,
            &format!("http://{name}.{namespace}.svc.cluster.local"),
            &graph.eventing,
        )
        .await
    {
        Ok(eventing_status) => {
            status.eventing_status = eventing_status;
            set_condition(
                status,
                "Eventing",
                if status.eventing_status.ready { "True" } else { "False" },
                "Reconciled",
                "eventing graph reconciled",
            );
        }
        Err(e) => {
            warn!(%name, error = %e, "eventing reconcile failed; isolated on Eventing condition");
            let failing_since = status
                .get_condition("Eventing")
                .filter(|c| c.status == "False")
                .map(|c| c.last_transition_time.0);
            set_condition(status, "Eventing", "False", "EventingFailed", &e.to_string());

            if eventing_failure_is_persistent(failing_since) && !status.eventing_status.alert_fired {
                ctx.emitter
                    .emit(CloudEvent::new(
                        &ctx.emitter_source_root,
                        namespace,
                        name,
                        EventType::AlertWarning,
                        correlation_id,
                        serde_json::json!({
                            "reason": "eventing_reconcile_failed",
                            "detail": e.to_string(),
                        }),
                    ))
                    .await;
                status.eventing_status.alert_fired = true;
            }
        }
    }

    if let Some(scrape) = &graph.scrape_target {
        if let Err(e) = apply_scrape_target(&ctx.client, namespace, agent, scrape).await {
            warn!(%name, error = %e, "failed to apply scrape target");
        }
    } else if status.service_status.service_name.is_some() {
        let scrape_name = format!("{name}-scrape");
        let _ = delete_scrape_target(&ctx.client, namespace, &scrape_name).await;
    }

    status.ai_status = AiStatus {
        provider: Some(format!("{:?}", agent.spec.ai.provider)),
        endpoint: agent.spec.ai.endpoint.clone(),
        model: agent.spec.ai.model.clone(),
        available: agent.spec.ai.provider != lambda_agent_types::AiProvider::None,
    };
    status.permission_status.broker_allowed = !agent.spec.permissions.disable_broker_creation;
    status.permission_status.trigger_allowed = !agent.spec.permissions.disable_trigger_creation;
    status.permission_status.function_allowed = !agent.spec.permissions.disable_function_creation;

    let outcome = decide_after_service_check(function_creation_disabled, service_failed, service_ready);
    let cond_status = if outcome.phase == Phase::Ready { "True" } else { "False" };
    status.phase = outcome.phase;
    set_ready_condition(status, agent.meta().generation, cond_status, outcome.reason, outcome.message);

    if outcome.phase == Phase::Ready && !was_ready {
        ctx.emitter
            .emit(CloudEvent::new(
                &ctx.emitter_source_root,
                namespace,
                name,
                EventType::FunctionReady,
                correlation_id,
                serde_json::json!({}),
            ))
            .await;
    }

    Ok(outcome.requeue)
}

async fn cleanup_agent(agent: Arc<LambdaAgent>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let namespace = agent
        .namespace()
        .ok_or_else(|| ReconcileError::Internal("agent has no namespace".to_string()))?;
    let name = agent.name_any();

    ctx.eventing_manager
        .teardown(&namespace, &name)
        .await
        .map_err(ReconcileError::Eventing)?;

    let scrape_name = format!("{name}-scrape");
    delete_scrape_target(&ctx.client, &namespace, &scrape_name).await?;
    delete_service(&ctx.client, &namespace, &name).await?;

    info!(%name, %namespace, "agent children torn down");
    Ok(Action::await_change())
}

async fn patch_status(
    api: &Api<LambdaAgent>,
    name: &str,
    status: &LambdaAgentStatus,
) -> Result<(), ReconcileError> {
    let patch = serde_json::json!({
        "apiVersion": "lambda.babylonhealth.io/v1",
        "kind": "LambdaAgent",
        "status": status,
    });
    api.patch_status(name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(patch))
        .await
        .map_err(crate::error::classify_apply_error)?;
    Ok(())
}

fn set_ready_condition(
    status: &mut LambdaAgentStatus,
    observed_generation: Option<i64>,
    cond_status: &str,
    reason: &str,
    message: &str,
) {
    status.set_condition(Condition {
        type_: "Ready".to_string(),
        status: cond_status.to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
        observed_generation,
        last_transition_time: Time(Utc::now()),
    });
}

fn set_condition(status: &mut LambdaAgentStatus, type_: &str, cond_status: &str, reason: &str, message: &str) {
    status.set_condition(Condition {
        type_: type_.to_string(),
        status: cond_status.to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
        observed_generation: None,
        last_transition_time: Time(Utc::now()),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use lambda_agent_types::ImageSpec;

    fn valid_spec() -> LambdaAgentSpec {
        LambdaAgentSpec {
            image: ImageSpec {
                repository: "ghcr.io/acme/demo".to_string(),
                tag: Some("v1".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn pending_admits_a_valid_spec() {
        assert!(matches!(decide_pending(&valid_spec()), PendingDecision::Proceed));
    }

    #[test]
    fn pending_rejects_and_joins_every_validation_message() {
        let mut spec = valid_spec();
        spec.image.repository = String::new();
        match decide_pending(&spec) {
            PendingDecision::Rejected { message } => {
                assert!(message.contains("spec.image.repository"));
            }
            PendingDecision::Proceed => panic!("empty repository must be rejected"),
        }
    }

    #[test]
    fn failed_phase_always_requeues_after_the_failed_backoff() {
        assert_eq!(failed_to_pending_requeue(), REQUEUE_AFTER_FAILED);
    }

    #[test]
    fn deleting_phase_requeues_at_the_steady_state_interval() {
        assert_eq!(deleting_requeue(), REQUEUE_STEADY_STATE);
    }

    #[test]
    fn function_creation_disabled_overrides_every_other_outcome() {
        let outcome = decide_after_service_check(true, true, true);
        assert_eq!(outcome.phase, Phase::Deploying);
        assert_eq!(outcome.reason, "FunctionCreationDisabled");
        assert_eq!(outcome.requeue, REQUEUE_STEADY_STATE);
    }

    #[test]
    fn a_failed_revision_moves_to_failed() {
        let outcome = decide_after_service_check(false, true, false);
        assert_eq!(outcome.phase, Phase::Failed);
        assert_eq!(outcome.reason, "RevisionFailed");
        assert_eq!(outcome.requeue, REQUEUE_AFTER_FAILED);
    }

    #[test]
    fn a_ready_service_moves_to_ready() {
        let outcome = decide_after_service_check(false, false, true);
        assert_eq!(outcome.phase, Phase::Ready);
        assert_eq!(outcome.reason, "Ready");
        assert_eq!(outcome.requeue, REQUEUE_STEADY_STATE);
    }

    #[test]
    fn a_service_that_is_neither_ready_nor_failed_keeps_deploying() {
        let outcome = decide_after_service_check(false, false, false);
        assert_eq!(outcome.phase, Phase::Deploying);
        assert_eq!(outcome.reason, "AwaitingReadiness");
        assert_eq!(outcome.requeue, REQUEUE_AWAITING_READY);
    }

    #[test]
    fn eventing_failure_with_no_prior_observation_is_never_persistent() {
        assert!(!eventing_failure_is_persistent(None));
    }

    #[test]
    fn eventing_failure_younger_than_the_threshold_is_not_persistent() {
        let since = Utc::now() - chrono::Duration::minutes(1);
        assert!(!eventing_failure_is_persistent(Some(since)));
    }

    #[test]
    fn eventing_failure_older_than_the_threshold_is_persistent() {
        let since = Utc::now() - chrono::Duration::minutes(10);
        assert!(eventing_failure_is_persistent(Some(since)));
    }
}
