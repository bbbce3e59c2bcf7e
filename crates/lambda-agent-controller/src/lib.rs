//! The reconciliation engine plus the host integration that watches the
//! source-of-truth and dispatches reconciles.

mod apply;
mod context;
mod crd;
mod error;
mod metrics;
mod reconcile;

pub use context::{Context, State, FIELD_MANAGER, FINALIZER_NAME};
pub use crd::{KnativeService, KnativeServiceSpec, KnativeServiceStatus, ScrapeTarget, ScrapeTargetSpec, ScrapeTargetStatus};
pub use error::ReconcileError;
pub use metrics::ReconcilerMetrics;
pub use reconcile::{error_policy, reconcile};

use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::{watcher, Controller};
use tracing::{error, info, warn};

use lambda_agent_types::LambdaAgent;

/// Watches `LambdaAgent` plus its owned children and dispatches reconciles
/// to a bounded worker pool. Runs until the watch stream ends.
pub async fn run(ctx: Arc<Context>) {
    let client = ctx.client.clone();
    let agents = kube::Api::<LambdaAgent>::all(client.clone());

    if let Err(e) = agents.list(&kube::api::ListParams::default().limit(1)).await {
        error!(error = %e, "LambdaAgent CRD is not queryable; is it installed?");
        return;
    }

    let shutdown = ctx.shutdown.clone();

    Controller::new(agents, watcher::Config::default())
        .with_config(kube::runtime::controller::Config::default().concurrency(ctx.worker_concurrency))
        .owns(
            kube::Api::<KnativeService>::all(client.clone()),
            watcher::Config::default(),
        )
        .owns(
            kube::Api::<ScrapeTarget>::all(client.clone()),
            watcher::Config::default(),
        )
        .graceful_shutdown_on(async move { shutdown.cancelled().await })
        .run(reconcile::reconcile, reconcile::error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object_ref, action)) => {
                    info!(?object_ref, ?action, "reconciled");
                }
                Err(e) => warn!(error = %e, "reconcile error surfaced to host loop"),
            }
        })
        .await;
}
