//! Publishes the lifecycle/command/invoke/response/notification CloudEvents
//! an agent's reconciliation triggers, to the configured broker.

mod client;
mod envelope;
mod error;
mod event_type;
mod metrics;

pub use client::{EventEmitter, HttpEventEmitter};
pub use envelope::{CloudEvent, CONTENT_TYPE, SPEC_VERSION};
pub use error::EmitError;
pub use event_type::{EventCategory, EventType};
pub use metrics::EmitterMetrics;
