//! HTTP publisher for the broker endpoint. Built the way `ccsr::Client`
//! wraps a single long-lived `reqwest::Client`: one client configured
//! once, `Url` held alongside it, reused for every call.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tracing::warn;

use crate::envelope::{CloudEvent, CONTENT_TYPE};
use crate::error::EmitError;
use crate::event_type::EventType;
use crate::metrics::EmitterMetrics;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait EventEmitter: Send + Sync {
    /// Publishes one event. Never returns `Err` to the caller in a way
    /// that would abort a reconcile; failures are logged and counted, since
    /// emission is best-effort.
    async fn emit(&self, event: CloudEvent);
}

pub struct HttpEventEmitter {
    inner: reqwest::Client,
    broker_url: Url,
    metrics: EmitterMetrics,
}

impl HttpEventEmitter {
    pub fn new(broker_url: Url, metrics: EmitterMetrics) -> reqwest::Result<Self> {
        let inner = reqwest::Client::builder().timeout(CLIENT_TIMEOUT).build()?;
        Ok(HttpEventEmitter {
            inner,
            broker_url,
            metrics,
        })
    }

    async fn publish(&self, event: &CloudEvent) -> Result<(), EmitError> {
        let response = self
            .inner
            .post(self.broker_url.clone())
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .json(event)
            .send()
            .await?;
        if response.status().as_u16() >= 300 {
            return Err(EmitError::Rejected(response.status()));
        }
        Ok(())
    }
}

#[async_trait]
impl EventEmitter for HttpEventEmitter {
    async fn emit(&self, event: CloudEvent) {
        let event_type: EventType = event.event_type.clone();
        match self.publish(&event).await {
            Ok(()) => self.metrics.record(&event_type, true),
            Err(e) => {
                warn!(
                    event.id, %event_type, error = %e,
                    "failed to publish event to broker; continuing reconcile"
                );
                self.metrics.record(&event_type, false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    #[tokio::test]
    async fn emit_against_an_unroutable_broker_counts_as_failed_without_panicking() {
        let registry = Registry::new();
        let metrics = EmitterMetrics::register(&registry).unwrap();
        let emitter = HttpEventEmitter::new(
            Url::parse("http://127.0.0.1:1").unwrap(),
            metrics,
        )
        .unwrap();

        let event = CloudEvent::new(
            "root",
            "ns",
            "name",
            EventType::ServiceReady,
            "corr",
            serde_json::json!({}),
        );
        emitter.emit(event).await;
    }
}
