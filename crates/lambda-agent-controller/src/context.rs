//! Shared context threaded through every reconcile, grounded on the
//! reference `Context`/`State` split: a `State` living for the process
//! lifetime owns the metrics registry, and hands out a `Context` per
//! controller run.

use std::sync::Arc;

use prometheus::Registry;
use tokio_util::sync::CancellationToken;

use lambda_agent_emitter::EventEmitter;
use lambda_agent_eventing::EventingManager;
use lambda_agent_secrets::SecretPropagator;

use crate::metrics::ReconcilerMetrics;

pub const FIELD_MANAGER: &str = "lambda-agent-operator";

/// The fixed name of the finaliser this engine adds to every agent it
/// first sees.
pub const FINALIZER_NAME: &str = "lambda.babylonhealth.io/agent-cleanup";

pub struct Context {
    pub client: kube::Client,
    pub emitter: Arc<dyn EventEmitter>,
    pub eventing_manager: Arc<dyn EventingManager>,
    pub secret_propagator: Arc<dyn SecretPropagator>,
    pub metrics: ReconcilerMetrics,
    /// Source prefix the emitter builds `source` from.
    pub emitter_source_root: String,
    /// Namespace the cluster-wide credential source secret lives in.
    pub credential_source_namespace: String,
    /// Name of the cluster-wide credential source secret.
    pub credential_source_name: String,
    /// Cancelled once the process receives `SIGINT`/`SIGTERM`; the watch
    /// loop in [`crate::run`] drains in-flight reconciles and stops.
    pub shutdown: CancellationToken,
    /// Upper bound on reconciles the worker pool runs at once.
    pub worker_concurrency: usize,
}

#[derive(Clone)]
pub struct State {
    pub registry: Registry,
}

impl Default for State {
    fn default() -> Self {
        State {
            registry: Registry::new(),
        }
    }
}

impl State {
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }
}
