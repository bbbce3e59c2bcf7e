//! Per-category emission counters (`build_events_total{status}`,
//! `service_events_total{status}`, `parser_events_total{status}`).

use prometheus::{IntCounterVec, Opts, Registry};

use crate::event_type::{EventCategory, EventType};

pub struct EmitterMetrics {
    build_events_total: IntCounterVec,
    service_events_total: IntCounterVec,
    parser_events_total: IntCounterVec,
    notification_events_total: IntCounterVec,
}

impl EmitterMetrics {
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let build_events_total = IntCounterVec::new(
            Opts::new("build_events_total", "CloudEvents emitted in the build category"),
            &["status"],
        )?;
        let service_events_total = IntCounterVec::new(
            Opts::new("service_events_total", "CloudEvents emitted in the service category"),
            &["status"],
        )?;
        // invoke/response are tracked under the legacy "parser" name.
        let parser_events_total = IntCounterVec::new(
            Opts::new("parser_events_total", "CloudEvents emitted in the invoke/response category"),
            &["status"],
        )?;
        let notification_events_total = IntCounterVec::new(
            Opts::new("notification_events_total", "CloudEvents emitted in the notification category"),
            &["status"],
        )?;

        registry.register(Box::new(build_events_total.clone()))?;
        registry.register(Box::new(service_events_total.clone()))?;
        registry.register(Box::new(parser_events_total.clone()))?;
        registry.register(Box::new(notification_events_total.clone()))?;

        Ok(EmitterMetrics {
            build_events_total,
            service_events_total,
            parser_events_total,
            notification_events_total,
        })
    }

    /// Increments the counter for `event_type`'s category, labelled by
    /// whether the HTTP publish succeeded.
    pub fn record(&self, event_type: &EventType, delivered: bool) {
        let status = if delivered { "delivered" } else { "failed" };
        let counter = match event_type.category() {
            EventCategory::Build => &self.build_events_total,
            EventCategory::Service => &self.service_events_total,
            EventCategory::Invoke | EventCategory::Response => &self.parser_events_total,
            EventCategory::Notification => &self.notification_events_total,
        };
        counter.with_label_values(&[status]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_routes_invoke_and_response_to_the_parser_counter() {
        let registry = Registry::new();
        let metrics = EmitterMetrics::register(&registry).unwrap();

        metrics.record(&EventType::InvokeSync, true);
        metrics.record(&EventType::ResponseError, false);

        assert_eq!(
            metrics
                .parser_events_total
                .with_label_values(&["delivered"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .parser_events_total
                .with_label_values(&["failed"])
                .get(),
            1
        );
    }

    #[test]
    fn record_routes_build_events_to_the_build_counter() {
        let registry = Registry::new();
        let metrics = EmitterMetrics::register(&registry).unwrap();

        metrics.record(&EventType::BuildCompleted, true);

        assert_eq!(
            metrics.build_events_total.with_label_values(&["delivered"]).get(),
            1
        );
    }
}
