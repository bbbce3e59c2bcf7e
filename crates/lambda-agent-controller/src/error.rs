//! Stable error kinds. `reason()` is what gets written into a
//! `Condition.reason`; the `Display` impl is what gets logged.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("spec failed admission validation: {0}")]
    Validation(String),

    #[error("child apply returned a retriable error: {0}")]
    TransientApply(#[source] kube::Error),

    #[error("child mutation rejected for invariant violation: {0}")]
    PermanentApply(#[source] kube::Error),

    #[error("a child object reported failure: {0}")]
    Dependency(String),

    #[error("eventing reconcile failed: {0}")]
    Eventing(#[source] anyhow::Error),

    #[error("event emission failed: {0}")]
    Emission(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ReconcileError {
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcileError::Validation(_) => "ValidationFailed",
            ReconcileError::TransientApply(_) => "ApplyRetrying",
            ReconcileError::PermanentApply(_) => "ApplyRejected",
            ReconcileError::Dependency(_) => "RevisionFailed",
            ReconcileError::Eventing(_) => "EventingFailed",
            ReconcileError::Emission(_) => "EmissionFailed",
            ReconcileError::Internal(_) => "InternalError",
        }
    }
}

/// Classifies a raw `kube::Error` from a child apply as transient (worth
/// retrying without moving to `Failed`) or permanent, the way the
/// reconciliation engine's requeue policy expects.
pub fn classify_apply_error(err: kube::Error) -> ReconcileError {
    match &err {
        kube::Error::Api(resp) if resp.code == 409 || resp.code >= 500 => {
            ReconcileError::TransientApply(err)
        }
        _ => ReconcileError::PermanentApply(err),
    }
}

impl From<kube::runtime::finalizer::Error<ReconcileError>> for ReconcileError {
    fn from(err: kube::runtime::finalizer::Error<ReconcileError>) -> Self {
        match err {
            kube::runtime::finalizer::Error::ApplyFailed(e)
            | kube::runtime::finalizer::Error::CleanupFailed(e) => e,
            other => ReconcileError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_names_match_the_condition_reasons_documented_in_spec() {
        assert_eq!(ReconcileError::Validation("x".into()).reason(), "ValidationFailed");
        assert_eq!(
            ReconcileError::Dependency("revision failed".into()).reason(),
            "RevisionFailed"
        );
    }
}
