//! Process entrypoint: parses configuration, wires the reconciliation
//! context, and runs the controller loop alongside an HTTP server
//! exposing `/metrics` and `/healthz`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State as AxumState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use prometheus::{Encoder, Registry, TextEncoder};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use lambda_agent_controller::{Context, State};
use lambda_agent_emitter::{EmitterMetrics, HttpEventEmitter};
use lambda_agent_eventing::KubernetesEventingManager;
use lambda_agent_secrets::KubernetesSecretPropagator;

/// Environment-variable-driven configuration: every flag has a
/// `LAMBDA_AGENT_OPERATOR_*` env fallback so the process can run unattended
/// from a Deployment manifest with no command-line args at all.
#[derive(Parser, Debug)]
#[command(name = "lambda-agent-operator", about = "Reconciles LambdaAgent custom resources")]
struct Config {
    /// Address the CloudEvents broker HTTP endpoint listens on.
    #[arg(long, env = "LAMBDA_AGENT_OPERATOR_BROKER_URL")]
    broker_url: String,

    /// Prefix used to build each CloudEvent's `source` field.
    #[arg(long, env = "LAMBDA_AGENT_OPERATOR_SOURCE_ROOT", default_value = "lambda-agent-operator")]
    source_root: String,

    /// Namespace the cluster-wide image-pull credential source lives in.
    #[arg(long, env = "LAMBDA_AGENT_OPERATOR_CREDENTIAL_NAMESPACE", default_value = "lambda-system")]
    credential_source_namespace: String,

    /// Name of the cluster-wide image-pull credential source secret.
    #[arg(long, env = "LAMBDA_AGENT_OPERATOR_CREDENTIAL_NAME", default_value = "lambda-registry-credential")]
    credential_source_name: String,

    /// Address the `/metrics` and `/healthz` HTTP server binds to.
    #[arg(long, env = "LAMBDA_AGENT_OPERATOR_HTTP_ADDR", default_value = "0.0.0.0:8081")]
    http_addr: SocketAddr,

    /// `tracing_subscriber::EnvFilter` directive, e.g. "info" or "lambda_agent=debug".
    #[arg(long, env = "LAMBDA_AGENT_OPERATOR_LOG_FILTER", default_value = "info")]
    log_filter: String,

    /// Maximum number of agents reconciled concurrently.
    #[arg(long, env = "LAMBDA_AGENT_OPERATOR_WORKER_CONCURRENCY", default_value_t = 10)]
    worker_concurrency: usize,
}

#[derive(Clone)]
struct HttpState {
    registry: Registry,
}

#[tokio::main]
async fn main() {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.log_filter))
        .init();

    if let Err(e) = run(config).await {
        error!(error = %e, "operator exited with an error");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let client = kube::Client::try_default().await?;

    let state = State::default();

    let emitter_metrics = EmitterMetrics::register(&state.registry)?;
    let reconciler_metrics = lambda_agent_controller::ReconcilerMetrics::register(&state.registry)?;

    let emitter = HttpEventEmitter::new(reqwest::Url::parse(&config.broker_url)?, emitter_metrics)?;
    let eventing_manager = KubernetesEventingManager::new(client.clone());
    let secret_propagator = KubernetesSecretPropagator::new(client.clone());

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received shutdown signal, draining in-flight reconciles");
                shutdown.cancel();
            }
        }
    });

    let ctx = Arc::new(Context {
        client: client.clone(),
        emitter: Arc::new(emitter),
        eventing_manager: Arc::new(eventing_manager),
        secret_propagator: Arc::new(secret_propagator),
        metrics: reconciler_metrics,
        emitter_source_root: config.source_root,
        credential_source_namespace: config.credential_source_namespace,
        credential_source_name: config.credential_source_name,
        shutdown: shutdown.clone(),
        worker_concurrency: config.worker_concurrency,
    });

    let http_state = HttpState {
        registry: state.registry.clone(),
    };
    let app = Router::new()
        .route("/metrics", get(handle_metrics))
        .route("/healthz", get(handle_healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(http_state);

    info!(addr = %config.http_addr, "serving /metrics and /healthz");
    let server = axum::Server::bind(&config.http_addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move { shutdown.cancelled().await });

    tokio::select! {
        result = server => result.map_err(anyhow::Error::from),
        () = lambda_agent_controller::run(ctx) => Ok(()),
    }
}

async fn handle_healthz() -> impl IntoResponse {
    StatusCode::OK
}

async fn handle_metrics(AxumState(state): AxumState<HttpState>) -> impl IntoResponse {
    let metric_families = state.registry.gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        buffer,
    )
        .into_response()
}
