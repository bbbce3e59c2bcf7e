//! Reconciler-level counters, registered into the same registry the
//! emitter's counters live in, grounded on the reference
//! `cluster_controller`'s `Context::metrics` field.

use prometheus::{IntCounterVec, Opts, Registry};

pub struct ReconcilerMetrics {
    reconciles_total: IntCounterVec,
}

impl ReconcilerMetrics {
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let reconciles_total = IntCounterVec::new(
            Opts::new("lambda_agent_reconciles_total", "Reconciles processed, by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(reconciles_total.clone()))?;
        Ok(ReconcilerMetrics { reconciles_total })
    }

    pub fn record_success(&self) {
        self.reconciles_total.with_label_values(&["success"]).inc();
    }

    pub fn record_failure(&self) {
        self.reconciles_total.with_label_values(&["failure"]).inc();
    }
}
