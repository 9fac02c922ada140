//! Simulated service metrics derived from the Terraform workspace.
use serde::{Deserialize, Serialize};

use crate::analyzer::InfraFacts;
use crate::config::IacPolicy;

const BASE_COST: u32 = 220;
const BASE_LATENCY_MS: u32 = 250;
const BASE_AVAILABILITY: f64 = 99.2;
const OPTIMIZED_COST: u32 = 75;
const REGIONAL_LATENCY_MS: u32 = 110;
const SCALED_AVAILABILITY: f64 = 99.9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub monthly_cost: u32,
    pub latency_ms: u32,
    pub availability: f64,
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self {
            monthly_cost: BASE_COST,
            latency_ms: BASE_LATENCY_MS,
            availability: BASE_AVAILABILITY,
        }
    }
}

impl MetricsSnapshot {
    /// Each improvement applies independently of the others.
    #[must_use]
    pub fn from_facts(facts: &InfraFacts, policy: &IacPolicy) -> Self {
        let mut snapshot = Self::default();
        if !facts.regions.is_empty() && facts.regions.iter().all(|r| *r == policy.approved_region) {
            snapshot.latency_ms = REGIONAL_LATENCY_MS;
        }
        if !facts.instance_types.is_empty()
            && facts
                .instance_types
                .iter()
                .all(|t| policy.is_cost_optimized(t))
        {
            snapshot.monthly_cost = OPTIMIZED_COST;
        }
        if facts.has_autoscaling_group {
            snapshot.availability = SCALED_AVAILABILITY;
        }
        snapshot
    }

    #[must_use]
    pub fn summary_lines(&self) -> Vec<String> {
        vec![
            format!("💰 Estimated monthly cost: ${}", self.monthly_cost),
            format!("⏱️ Average latency: {} ms", self.latency_ms),
            format!("📈 Availability: {:.1}%", self.availability),
        ]
    }
}
