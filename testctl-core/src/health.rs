//! The `GET /health` response shape every service binary exposes
//! identically (§6): `{service_name, status, version, dependencies,
//! metrics}`. A Configuration error (§7) degrades a dependency's entry
//! to `unhealthy` rather than panicking; the orchestrator is expected to
//! refuse scheduling phases whose executor reports unhealthy.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub service_name: String,
    pub status: HealthState,
    pub version: String,
    #[serde(default)]
    pub dependencies: HashMap<String, HealthState>,
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
}

impl HealthStatus {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            status: HealthState::Healthy,
            version: env!("CARGO_PKG_VERSION").to_string(),
            dependencies: HashMap::new(),
            metrics: HashMap::new(),
        }
    }

    /// Overall status is the worst of its dependencies: any `Unhealthy`
    /// dependency makes the service `Unhealthy`; otherwise any
    /// `Degraded` makes it `Degraded`.
    pub fn with_dependency(mut self, name: impl Into<String>, status: HealthState) -> Self {
        self.dependencies.insert(name.into(), status);
        self.recompute();
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    fn recompute(&mut self) {
        self.status = self
            .dependencies
            .values()
            .copied()
            .max()
            .unwrap_or(HealthState::Healthy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_status_is_the_worst_dependency() {
        let status = HealthStatus::new("api_tester")
            .with_dependency("target_app", HealthState::Healthy)
            .with_dependency("cache", HealthState::Degraded);
        assert_eq!(status.status, HealthState::Degraded);
    }

    #[test]
    fn no_dependencies_is_healthy_by_default() {
        assert_eq!(HealthStatus::new("alerts").status, HealthState::Healthy);
    }
}
