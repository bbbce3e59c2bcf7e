//! Desired `ScrapeTarget` child.

use lambda_agent_types::ObservabilitySpec;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesiredScrapeTarget {
    pub name: String,
    pub selector_service: String,
    pub path: String,
    pub interval: Option<String>,
    pub timeout: Option<String>,
}

pub(crate) fn project_scrape_target(
    agent_name: &str,
    observability: &ObservabilitySpec,
) -> Option<DesiredScrapeTarget> {
    if !observability.metrics_enabled {
        return None;
    }
    Some(DesiredScrapeTarget {
        name: format!("{agent_name}-scrape"),
        selector_service: agent_name.to_string(),
        path: observability.metrics_path.clone(),
        interval: observability.metrics_interval.clone(),
        timeout: observability.metrics_timeout.clone(),
    })
}
