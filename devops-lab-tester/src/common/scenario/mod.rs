use anyhow::Result;
use devops_lab_engine::Stage;

use crate::logic::{LearnerStrategy, WalkSummary};

pub mod catalog;

pub type Expectation = fn(&WalkSummary) -> Result<()>;

/// What the autopilot plays and what must hold afterwards.
#[derive(Debug, Clone)]
pub struct WalkPlan {
    pub strategy: LearnerStrategy,
    /// Modules in order; empty plays the whole catalog.
    pub modules: Vec<&'static str>,
    pub interrupt_at: Option<Stage>,
    pub expectations: Vec<Expectation>,
}

impl WalkPlan {
    #[must_use]
    pub const fn new(strategy: LearnerStrategy) -> Self {
        Self {
            strategy,
            modules: Vec::new(),
            interrupt_at: None,
            expectations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_module(mut self, module: &'static str) -> Self {
        self.modules.push(module);
        self
    }

    #[must_use]
    pub const fn with_interrupt(mut self, stage: Stage) -> Self {
        self.interrupt_at = Some(stage);
        self
    }

    #[must_use]
    pub fn with_expectation(mut self, expectation: Expectation) -> Self {
        self.expectations.push(expectation);
        self
    }
}

#[derive(Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub plan: WalkPlan,
}

impl TestScenario {
    #[must_use]
    pub fn new(name: impl Into<String>, plan: WalkPlan) -> Self {
        Self {
            name: name.into(),
            plan,
        }
    }
}

const SCENARIOS: &[(&str, &str)] = &[
    ("smoke", "Smoke Test - every module, direct learner"),
    ("module-1", "Git and Dockerfile module"),
    ("module-2", "Kubernetes manifest module"),
    ("module-3", "Terraform module"),
    ("struggling", "Struggling learner reveals solutions"),
    ("resume", "Interrupted sessions resume from storage"),
    ("remediation", "Kubernetes remediation card and pipeline rerouting"),
];

#[must_use]
pub fn get_scenario(name: &str) -> Option<TestScenario> {
    let key = name.to_lowercase();
    let (key, description) = SCENARIOS
        .iter()
        .copied()
        .find(|(candidate, _)| *candidate == key)?;
    let plan = match key {
        "smoke" => catalog::smoke_plan(),
        "module-1" => catalog::module_plan("module-1"),
        "module-2" => catalog::module_plan("module-2"),
        "module-3" => catalog::module_plan("module-3").with_expectation(catalog::metrics_reported),
        "struggling" => catalog::struggling_plan(),
        "resume" => catalog::resume_plan(),
        "remediation" => catalog::remediation_plan(),
        _ => return None,
    };
    Some(TestScenario::new(description, plan))
}

#[must_use]
pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    SCENARIOS.to_vec()
}

#[must_use]
pub fn all_scenario_keys() -> Vec<String> {
    SCENARIOS.iter().map(|(key, _)| (*key).to_string()).collect()
}
