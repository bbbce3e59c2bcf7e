//! Typed description of a `LambdaAgent` and its observed state.
//!
//! This crate has no Kubernetes-client dependency beyond the wire types
//! (`k8s-openapi`, `kube::CustomResource`); it is safe to depend on from
//! pure code such as the validator and projector.

mod spec;
mod status;

pub use spec::{
    AiProvider, AiSpec, DlqSpec, EventingSpec, Forward, ImageSpec, LambdaAgent, LambdaAgentSpec,
    ObservabilitySpec, PermissionsSpec, ResourceQuantities, ResourcesSpec, ScalingSpec,
    SecretKeyRef, Subscription, PULL_SECRET_NAME, SUPPORTED_REGISTRY_PREFIX,
};
pub use status::{
    AgentRef, AiStatus, EventingStatus, LambdaAgentStatus, Phase, PermissionStatus, ServiceStatus,
};
