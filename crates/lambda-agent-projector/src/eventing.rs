//! Desired shape of the per-agent eventing graph: broker, triggers, cross-
//! agent forwards, and the optional dead-letter queue.

use lambda_agent_types::{EventingSpec, PermissionsSpec};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesiredTrigger {
    pub name: String,
    pub event_type: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesiredForward {
    pub name: String,
    pub event_types: Vec<String>,
    pub target_agent: String,
    pub target_namespace: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesiredDlq {
    pub queue_name: String,
    pub retry_max_attempts: u32,
}

/// `None` broker name means the graph is disabled (either `eventing.enabled`
/// is false, or permissions forbid broker creation).
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct DesiredEventingGraph {
    pub broker_name: Option<String>,
    pub triggers: Vec<DesiredTrigger>,
    pub forwards: Vec<DesiredForward>,
    pub dlq: Option<DesiredDlq>,
}

pub(crate) fn project_eventing(
    agent_name: &str,
    eventing: &EventingSpec,
    permissions: &PermissionsSpec,
) -> DesiredEventingGraph {
    if !eventing.enabled || permissions.disable_broker_creation {
        return DesiredEventingGraph::default();
    }

    let broker_name = Some(format!("{agent_name}-broker"));

    let triggers = if permissions.disable_trigger_creation {
        Vec::new()
    } else {
        eventing
            .subscriptions
            .iter()
            .map(|sub| DesiredTrigger {
                name: format!("{agent_name}-{}", sub.event_type.replace('.', "-")),
                event_type: sub.event_type.clone(),
            })
            .collect()
    };

    let forwards = eventing
        .forwards
        .iter()
        .enumerate()
        .map(|(i, fwd)| DesiredForward {
            name: format!("{agent_name}-forward-{i}"),
            event_types: fwd.event_types.clone(),
            target_agent: fwd.target_agent.clone(),
            target_namespace: fwd.target_namespace.clone(),
        })
        .collect();

    let dlq = eventing.dlq.as_ref().and_then(|dlq| {
        dlq.enabled.then(|| DesiredDlq {
            queue_name: format!("{agent_name}-dlq"),
            retry_max_attempts: dlq.retry_max_attempts,
        })
    });

    DesiredEventingGraph {
        broker_name,
        triggers,
        forwards,
        dlq,
    }
}
