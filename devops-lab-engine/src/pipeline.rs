//! Simulated CI/CD pipeline runs and their history.
use serde::{Deserialize, Serialize};

use crate::KeyValueStore;
use crate::config::PipelineTiming;
use crate::constants::KEY_PIPELINE_RUNS;
use crate::feedback::Analysis;
use crate::storage::{read_json, write_json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Build,
    Deploy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    #[serde(default)]
    pub module: String,
    pub duration: u64,
    pub errors: usize,
    pub success: bool,
    #[serde(default)]
    pub timestamp: u64,
}

impl PipelineRun {
    /// A run always builds; it only deploys when the analysis passed.
    #[must_use]
    pub fn from_analysis(
        module: &str,
        analysis: &Analysis,
        timing: PipelineTiming,
        now_ms: u64,
    ) -> Self {
        let duration = if analysis.success {
            timing.total_ms()
        } else {
            timing.build_ms
        };
        Self {
            module: module.to_string(),
            duration,
            errors: analysis.errors(),
            success: analysis.success,
            timestamp: now_ms,
        }
    }

    #[must_use]
    pub fn stages(&self) -> Vec<PipelineStage> {
        if self.success {
            vec![PipelineStage::Build, PipelineStage::Deploy]
        } else {
            vec![PipelineStage::Build]
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineHistory<S> {
    store: S,
}

impl<S> PipelineHistory<S>
where
    S: KeyValueStore,
{
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn runs(&self) -> Vec<PipelineRun> {
        read_json(&self.store, KEY_PIPELINE_RUNS).unwrap_or_default()
    }

    pub fn append(&self, run: PipelineRun) {
        let mut runs = self.runs();
        runs.push(run);
        write_json(&self.store, KEY_PIPELINE_RUNS, &runs);
    }

    #[must_use]
    pub fn success_rate(&self) -> Option<f64> {
        let runs = self.runs();
        if runs.is_empty() {
            return None;
        }
        let passed = runs.iter().filter(|run| run.success).count();
        #[allow(clippy::cast_precision_loss)]
        let rate = passed as f64 / runs.len() as f64;
        Some(rate)
    }
}
