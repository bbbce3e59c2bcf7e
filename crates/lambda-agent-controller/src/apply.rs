//! Idempotent child apply/delete, following the reference orchestrator's
//! `ensure_service`/`drop_service` discipline: `Patch::Apply(..).force()`
//! with a fixed field manager, `404` treated as success on delete.

use kube::api::{Api, DeleteParams, ObjectMeta, Patch, PatchParams};
use kube::{Resource, ResourceExt};

use lambda_agent_projector::{DesiredScrapeTarget, DesiredService};
use lambda_agent_types::LambdaAgent;

use crate::context::FIELD_MANAGER;
use crate::crd::{build_service_spec, KnativeService, ScrapeTarget, ScrapeTargetSpec};
use crate::error::{classify_apply_error, ReconcileError};

pub fn owner_labels(agent: &LambdaAgent) -> std::collections::BTreeMap<String, String> {
    let mut labels = std::collections::BTreeMap::new();
    labels.insert(
        "lambda.babylonhealth.io/agent".to_string(),
        agent.name_any(),
    );
    labels
}

pub async fn apply_service(
    client: &kube::Client,
    namespace: &str,
    agent: &LambdaAgent,
    desired: &DesiredService,
) -> Result<KnativeService, ReconcileError> {
    let api: Api<KnativeService> = Api::namespaced(client.clone(), namespace);

    let service = KnativeService {
        metadata: ObjectMeta {
            name: Some(desired.name.clone()),
            namespace: Some(namespace.to_string()),
            labels: Some(owner_labels(agent)),
            owner_references: agent.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: build_service_spec(desired),
        status: None,
    };

    api.patch(
        &desired.name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(&service),
    )
    .await
    .map_err(classify_apply_error)?;

    api.get(&desired.name).await.map_err(classify_apply_error)
}

pub async fn delete_service(
    client: &kube::Client,
    namespace: &str,
    name: &str,
) -> Result<(), ReconcileError> {
    let api: Api<KnativeService> = Api::namespaced(client.clone(), namespace);
    delete_if_present(&api, name).await
}

pub async fn apply_scrape_target(
    client: &kube::Client,
    namespace: &str,
    agent: &LambdaAgent,
    desired: &DesiredScrapeTarget,
) -> Result<(), ReconcileError> {
    let api: Api<ScrapeTarget> = Api::namespaced(client.clone(), namespace);

    let target = ScrapeTarget {
        metadata: ObjectMeta {
            name: Some(desired.name.clone()),
            namespace: Some(namespace.to_string()),
            labels: Some(owner_labels(agent)),
            owner_references: agent.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: ScrapeTargetSpec {
            selector_service: desired.selector_service.clone(),
            path: desired.path.clone(),
            interval: desired.interval.clone(),
            timeout: desired.timeout.clone(),
        },
        status: None,
    };

    api.patch(
        &desired.name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(&target),
    )
    .await
    .map_err(classify_apply_error)?;

    Ok(())
}

pub async fn delete_scrape_target(
    client: &kube::Client,
    namespace: &str,
    name: &str,
) -> Result<(), ReconcileError> {
    let api: Api<ScrapeTarget> = Api::namespaced(client.clone(), namespace);
    delete_if_present(&api, name).await
}

async fn delete_if_present<K>(api: &Api<K>, name: &str) -> Result<(), ReconcileError>
where
    K: kube::Resource + Clone + std::fmt::Debug + for<'de> serde::Deserialize<'de>,
    K::DynamicType: Default,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(classify_apply_error(e)),
    }
}
