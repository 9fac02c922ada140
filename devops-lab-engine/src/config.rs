//! Engine tunables with serde defaults so partial JSON overrides stay valid.
use serde::{Deserialize, Serialize};

use crate::constants::{
    AUTOSAVE_DEBOUNCE_MS, EDITOR_CHANGE_THROTTLE_MS, HINT_ESCALATION_ATTEMPT, PIPELINE_BUILD_MS,
    PIPELINE_DEPLOY_MS, SOLUTION_REVEAL_THRESHOLD, TELEMETRY_MAX_EVENTS, TRANSITION_DELAY_MS,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabConfig {
    #[serde(default = "default_transition_delay")]
    pub transition_delay_ms: u64,
    #[serde(default = "default_escalation")]
    pub hint_escalation_attempt: u32,
    #[serde(default = "default_reveal_threshold")]
    pub solution_reveal_threshold: u32,
    #[serde(default = "default_max_events")]
    pub telemetry_max_events: usize,
    #[serde(default = "default_change_throttle")]
    pub editor_change_throttle_ms: u64,
    #[serde(default = "default_autosave")]
    pub autosave_debounce_ms: u64,
    #[serde(default)]
    pub pipeline: PipelineTiming,
    #[serde(default)]
    pub iac_policy: IacPolicy,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            transition_delay_ms: TRANSITION_DELAY_MS,
            hint_escalation_attempt: HINT_ESCALATION_ATTEMPT,
            solution_reveal_threshold: SOLUTION_REVEAL_THRESHOLD,
            telemetry_max_events: TELEMETRY_MAX_EVENTS,
            editor_change_throttle_ms: EDITOR_CHANGE_THROTTLE_MS,
            autosave_debounce_ms: AUTOSAVE_DEBOUNCE_MS,
            pipeline: PipelineTiming::default(),
            iac_policy: IacPolicy::default(),
        }
    }
}

impl LabConfig {
    /// Parse a config override, filling every omitted field with its default.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a field has the wrong type.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineTiming {
    #[serde(default = "default_build_ms")]
    pub build_ms: u64,
    #[serde(default = "default_deploy_ms")]
    pub deploy_ms: u64,
}

impl Default for PipelineTiming {
    fn default() -> Self {
        Self {
            build_ms: PIPELINE_BUILD_MS,
            deploy_ms: PIPELINE_DEPLOY_MS,
        }
    }
}

impl PipelineTiming {
    #[must_use]
    pub const fn total_ms(self) -> u64 {
        self.build_ms.saturating_add(self.deploy_ms)
    }
}

/// Organisation rules the infrastructure analyzer enforces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IacPolicy {
    #[serde(default = "default_region")]
    pub approved_region: String,
    /// Substrings that mark an instance type as cost optimised.
    #[serde(default = "default_cost_markers")]
    pub cost_tier_markers: Vec<String>,
    /// Instance families accepted regardless of size.
    #[serde(default = "default_families")]
    pub approved_families: Vec<String>,
}

impl Default for IacPolicy {
    fn default() -> Self {
        Self {
            approved_region: default_region(),
            cost_tier_markers: default_cost_markers(),
            approved_families: default_families(),
        }
    }
}

impl IacPolicy {
    #[must_use]
    pub fn is_cost_optimized(&self, instance_type: &str) -> bool {
        self.cost_tier_markers
            .iter()
            .any(|marker| instance_type.contains(marker.as_str()))
            || self
                .approved_families
                .iter()
                .any(|family| instance_type.starts_with(family.as_str()))
    }
}

const fn default_transition_delay() -> u64 {
    TRANSITION_DELAY_MS
}

const fn default_escalation() -> u32 {
    HINT_ESCALATION_ATTEMPT
}

const fn default_reveal_threshold() -> u32 {
    SOLUTION_REVEAL_THRESHOLD
}

const fn default_max_events() -> usize {
    TELEMETRY_MAX_EVENTS
}

const fn default_change_throttle() -> u64 {
    EDITOR_CHANGE_THROTTLE_MS
}

const fn default_autosave() -> u64 {
    AUTOSAVE_DEBOUNCE_MS
}

const fn default_build_ms() -> u64 {
    PIPELINE_BUILD_MS
}

const fn default_deploy_ms() -> u64 {
    PIPELINE_DEPLOY_MS
}

fn default_region() -> String {
    "eu-central-1".to_string()
}

fn default_cost_markers() -> Vec<String> {
    vec!["micro".to_string(), "small".to_string()]
}

fn default_families() -> Vec<String> {
    vec!["t3.".to_string()]
}
