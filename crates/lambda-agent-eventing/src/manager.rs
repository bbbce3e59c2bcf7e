//! Reconciles the broker/trigger/DLQ/forward graph for one agent,
//! following the same ensure/delete/list shape the reference
//! `CloudResourceController` uses for its `VpcEndpoint`.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use futures::future::join_all;
use kube::api::{Api, DeleteParams, ListParams, ObjectMeta, Patch, PatchParams};
use kube::ResourceExt;
use tracing::warn;

use lambda_agent_projector::DesiredEventingGraph;
use lambda_agent_types::EventingStatus;

use crate::crd::{Broker, BrokerSpec, Forward, ForwardSpec, Trigger, TriggerSpec};

const FIELD_MANAGER: &str = "lambda-agent-operator";
const MANAGED_BY_LABEL: &str = "eventing.lambda.babylonhealth.io/agent";

#[async_trait]
pub trait EventingManager: Send + Sync {
    /// Reconciles the full eventing graph for `agent_name`, returning the
    /// aggregate observed state. Failures are reported via `Err` and must
    /// be isolated by the caller onto the `Eventing` condition, never the
    /// main `Ready` condition.
    async fn reconcile(
        &self,
        namespace: &str,
        agent_name: &str,
        service_url: &str,
        graph: &DesiredEventingGraph,
    ) -> anyhow::Result<EventingStatus>;

    /// Tears down every eventing child for `agent_name` (Deleting phase).
    async fn teardown(&self, namespace: &str, agent_name: &str) -> anyhow::Result<()>;
}

pub struct KubernetesEventingManager {
    client: kube::Client,
}

impl KubernetesEventingManager {
    pub fn new(client: kube::Client) -> Self {
        KubernetesEventingManager { client }
    }

    fn broker_api(&self, namespace: &str) -> Api<Broker> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn trigger_api(&self, namespace: &str) -> Api<Trigger> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn forward_api(&self, namespace: &str) -> Api<Forward> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn managed_list_params(&self, agent_name: &str) -> ListParams {
        ListParams::default().labels(&format!("{MANAGED_BY_LABEL}={agent_name}"))
    }

    async fn ensure_broker(
        &self,
        namespace: &str,
        agent_name: &str,
        broker_name: &str,
        dead_letter_queue: Option<String>,
    ) -> anyhow::Result<bool> {
        let broker = Broker {
            metadata: ObjectMeta {
                name: Some(broker_name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(labels_for(agent_name)),
                ..Default::default()
            },
            spec: BrokerSpec { dead_letter_queue },
            status: None,
        };
        self.broker_api(namespace)
            .patch(
                broker_name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&broker),
            )
            .await?;
        let observed = self.broker_api(namespace).get(broker_name).await?;
        Ok(observed.status.map(|s| s.ready).unwrap_or(false))
    }

    async fn ensure_trigger(
        &self,
        namespace: &str,
        agent_name: &str,
        broker_name: &str,
        name: &str,
        event_type: &str,
        subscriber_url: &str,
        retry_max_attempts: Option<u32>,
    ) -> anyhow::Result<bool> {
        let trigger = Trigger {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(labels_for(agent_name)),
                ..Default::default()
            },
            spec: TriggerSpec {
                broker: broker_name.to_string(),
                event_type: event_type.to_string(),
                subscriber_url: subscriber_url.to_string(),
                retry_max_attempts,
                retry_backoff_seconds: retry_max_attempts.map(|_| 2),
            },
            status: None,
        };
        self.trigger_api(namespace)
            .patch(
                name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&trigger),
            )
            .await?;
        let observed = self.trigger_api(namespace).get(name).await?;
        Ok(observed.status.map(|s| s.ready).unwrap_or(false))
    }

    async fn prune_triggers(
        &self,
        namespace: &str,
        agent_name: &str,
        desired_names: &HashSet<String>,
    ) -> anyhow::Result<()> {
        let existing = self
            .trigger_api(namespace)
            .list(&self.managed_list_params(agent_name))
            .await?;
        for trigger in existing {
            let name = trigger.name_any();
            if !desired_names.contains(&name) {
                delete_if_present(&self.trigger_api(namespace), &name).await?;
            }
        }
        Ok(())
    }

    async fn ensure_forward(
        &self,
        namespace: &str,
        agent_name: &str,
        broker_name: &str,
        name: &str,
        event_types: &[String],
        target_agent: &str,
        target_namespace: &str,
    ) -> anyhow::Result<()> {
        let forward = Forward {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(labels_for(agent_name)),
                ..Default::default()
            },
            spec: ForwardSpec {
                source_broker: broker_name.to_string(),
                event_types: event_types.to_vec(),
                target_agent: target_agent.to_string(),
                target_namespace: target_namespace.to_string(),
            },
            status: None,
        };
        self.forward_api(namespace)
            .patch(
                name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&forward),
            )
            .await?;
        Ok(())
    }

    async fn prune_forwards(
        &self,
        namespace: &str,
        agent_name: &str,
        desired_names: &HashSet<String>,
    ) -> anyhow::Result<()> {
        let existing = self
            .forward_api(namespace)
            .list(&self.managed_list_params(agent_name))
            .await?;
        for forward in existing {
            let name = forward.name_any();
            if !desired_names.contains(&name) {
                delete_if_present(&self.forward_api(namespace), &name).await?;
            }
        }
        Ok(())
    }
}

fn labels_for(agent_name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(MANAGED_BY_LABEL.to_string(), agent_name.to_string());
    labels
}

async fn delete_if_present<K>(api: &Api<K>, name: &str) -> anyhow::Result<()>
where
    K: kube::Resource + Clone + std::fmt::Debug + for<'de> serde::Deserialize<'de>,
    K::DynamicType: Default,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl EventingManager for KubernetesEventingManager {
    async fn reconcile(
        &self,
        namespace: &str,
        agent_name: &str,
        service_url: &str,
        graph: &DesiredEventingGraph,
    ) -> anyhow::Result<EventingStatus> {
        let Some(broker_name) = &graph.broker_name else {
            self.teardown(namespace, agent_name).await?;
            return Ok(EventingStatus::default());
        };

        let dlq_queue_name = graph.dlq.as_ref().map(|d| d.queue_name.clone());
        let broker_ready = self
            .ensure_broker(namespace, agent_name, broker_name, dlq_queue_name)
            .await?;

        let retry_max_attempts = graph.dlq.as_ref().map(|d| d.retry_max_attempts);

        let trigger_results = join_all(graph.triggers.iter().map(|trigger| {
            self.ensure_trigger(
                namespace,
                agent_name,
                broker_name,
                &trigger.name,
                &trigger.event_type,
                service_url,
                retry_max_attempts,
            )
        }))
        .await;

        let mut triggers = BTreeMap::new();
        for (desired, result) in graph.triggers.iter().zip(trigger_results) {
            match result {
                Ok(ready) => {
                    triggers.insert(desired.event_type.clone(), ready);
                }
                Err(e) => {
                    warn!(%agent_name, trigger = %desired.name, error = %e, "failed to reconcile trigger");
                    triggers.insert(desired.event_type.clone(), false);
                }
            }
        }

        let desired_trigger_names: HashSet<String> =
            graph.triggers.iter().map(|t| t.name.clone()).collect();
        self.prune_triggers(namespace, agent_name, &desired_trigger_names).await?;

        for forward in &graph.forwards {
            self.ensure_forward(
                namespace,
                agent_name,
                broker_name,
                &forward.name,
                &forward.event_types,
                &forward.target_agent,
                &forward.target_namespace,
            )
            .await?;
        }
        let desired_forward_names: HashSet<String> =
            graph.forwards.iter().map(|f| f.name.clone()).collect();
        self.prune_forwards(namespace, agent_name, &desired_forward_names).await?;

        let all_ready = broker_ready && triggers.values().all(|ready| *ready);

        Ok(EventingStatus {
            ready: all_ready,
            broker_url: Some(format!(
                "http://{broker_name}-broker-ingress.{namespace}.svc.cluster.local"
            )),
            triggers,
        })
    }

    async fn teardown(&self, namespace: &str, agent_name: &str) -> anyhow::Result<()> {
        let empty = HashSet::new();
        self.prune_triggers(namespace, agent_name, &empty).await?;
        self.prune_forwards(namespace, agent_name, &empty).await?;

        let brokers = self
            .broker_api(namespace)
            .list(&self.managed_list_params(agent_name))
            .await?;
        for broker in brokers {
            delete_if_present(&self.broker_api(namespace), &broker.name_any()).await?;
        }
        Ok(())
    }
}
