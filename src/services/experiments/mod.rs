//! Experiment/override provider boundary.
//!
//! A/B bucket assignment is external; this seam only supplies per-user
//! hybrid weight overrides and accepts metric events keyed by
//! experiment id.

use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricEvent {
    ClickThrough,
    Conversion,
}

impl MetricEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricEvent::ClickThrough => "click_through",
            MetricEvent::Conversion => "conversion",
        }
    }
}

pub trait ExperimentProvider: Send + Sync {
    /// Per-user hybrid weight overrides (algorithm name → weight), if
    /// the user is in an experiment bucket.
    fn weight_overrides(&self, user_id: &str) -> Option<HashMap<String, f32>>;

    fn record_metric(&self, experiment_id: &str, user_id: &str, event: MetricEvent);
}

/// Default provider: no overrides, metrics only logged.
#[derive(Debug, Default)]
pub struct StaticExperimentProvider {
    overrides: HashMap<String, HashMap<String, f32>>,
}

impl StaticExperimentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed overrides for specific users, mainly for tests and canary
    /// rollouts.
    pub fn with_overrides(overrides: HashMap<String, HashMap<String, f32>>) -> Self {
        Self { overrides }
    }
}

impl ExperimentProvider for StaticExperimentProvider {
    fn weight_overrides(&self, user_id: &str) -> Option<HashMap<String, f32>> {
        self.overrides.get(user_id).cloned()
    }

    fn record_metric(&self, experiment_id: &str, user_id: &str, event: MetricEvent) {
        debug!(
            experiment_id,
            user_id,
            metric = event.as_str(),
            "experiment metric"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_provider_overrides() {
        let provider = StaticExperimentProvider::with_overrides(HashMap::from([(
            "u1".to_string(),
            HashMap::from([("popularity".to_string(), 1.0f32)]),
        )]));

        assert!(provider.weight_overrides("u1").is_some());
        assert!(provider.weight_overrides("u2").is_none());
        provider.record_metric("exp-1", "u1", MetricEvent::ClickThrough);
    }
}
