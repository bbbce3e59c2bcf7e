//! Owns the per-agent eventing graph: the `Broker`/`Trigger`/`Forward`
//! primitives an agent's subscriptions and forwards project onto.

mod crd;
mod manager;

pub use crd::{Broker, BrokerSpec, BrokerStatus, Forward, ForwardSpec, ForwardStatus, Trigger,
    TriggerSpec, TriggerStatus};
pub use manager::{EventingManager, KubernetesEventingManager};

#[cfg(test)]
mod tests {
    use lambda_agent_projector::{DesiredDlq, DesiredEventingGraph, DesiredForward, DesiredTrigger};

    #[test]
    fn disabled_graph_has_no_broker_name() {
        let graph = DesiredEventingGraph::default();
        assert!(graph.broker_name.is_none());
        assert!(graph.triggers.is_empty());
    }

    #[test]
    fn graph_carries_through_trigger_and_forward_shape() {
        let graph = DesiredEventingGraph {
            broker_name: Some("agent-broker".to_string()),
            triggers: vec![DesiredTrigger {
                name: "agent-message-received".to_string(),
                event_type: "message.received".to_string(),
            }],
            forwards: vec![DesiredForward {
                name: "agent-forward-0".to_string(),
                event_types: vec!["message.received".to_string()],
                target_agent: "other-agent".to_string(),
                target_namespace: "other-ns".to_string(),
            }],
            dlq: Some(DesiredDlq {
                queue_name: "agent-dlq".to_string(),
                retry_max_attempts: 5,
            }),
        };

        assert_eq!(graph.triggers.len(), 1);
        assert_eq!(graph.forwards[0].target_namespace, "other-ns");
        assert_eq!(graph.dlq.as_ref().unwrap().retry_max_attempts, 5);
    }
}
