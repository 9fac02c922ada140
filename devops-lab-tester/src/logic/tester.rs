use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::common::scenario::TestScenario;
use crate::logic::autopilot::{Autopilot, WalkSummary};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub strategy: String,
    pub seed: u64,
    pub passed: bool,
    pub iterations_run: usize,
    pub successful_iterations: usize,
    pub failures: Vec<String>,
    #[serde(with = "duration_serde")]
    pub average_duration: Duration,
    pub events_recorded: usize,
}

pub struct LabTester {
    verbose: bool,
}

impl LabTester {
    pub const fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn run_scenario(
        &self,
        scenario: &TestScenario,
        seeds: &[u64],
        iterations: usize,
    ) -> Vec<ScenarioResult> {
        seeds
            .iter()
            .map(|&seed| {
                if self.verbose {
                    println!(
                        "🧪 Testing scenario: {} (strategy: {} seed: {})",
                        scenario.name.bright_white(),
                        scenario.plan.strategy.label(),
                        seed
                    );
                }
                self.run_single_scenario(scenario, seed, iterations)
            })
            .collect()
    }

    fn run_single_scenario(
        &self,
        scenario: &TestScenario,
        seed: u64,
        iterations: usize,
    ) -> ScenarioResult {
        let mut successes = 0;
        let mut failures = Vec::new();
        let mut durations = Vec::new();
        let mut events_recorded = 0;

        for i in 0..iterations {
            let start_time = Instant::now();
            let iteration_seed = seed.wrapping_add(u64::try_from(i).unwrap_or(u64::MAX));
            let outcome = self
                .walk(scenario, iteration_seed)
                .and_then(|summary| evaluate_expectations(scenario, &summary).map(|()| summary));
            match outcome {
                Ok(summary) => {
                    successes += 1;
                    events_recorded += summary.events.len();
                    let duration = start_time.elapsed();
                    durations.push(duration);
                    if self.verbose {
                        println!(
                            "  ✅ Iteration {}/{} passed ({duration:?}) events:{}",
                            i + 1,
                            iterations,
                            summary.events.len()
                        );
                    }
                }
                Err(err) => {
                    let message = format!("Iteration {} (seed {iteration_seed}): {err:#}", i + 1);
                    if self.verbose {
                        println!("  ❌ {}", message.clone().red());
                    }
                    failures.push(message);
                }
            }
        }

        let average_duration = if durations.is_empty() {
            Duration::ZERO
        } else {
            durations.iter().sum::<Duration>() / u32::try_from(durations.len()).unwrap_or(1)
        };

        ScenarioResult {
            scenario_name: scenario.name.clone(),
            strategy: scenario.plan.strategy.label().to_string(),
            seed,
            passed: failures.is_empty(),
            iterations_run: iterations,
            successful_iterations: successes,
            failures,
            average_duration,
            events_recorded,
        }
    }

    fn walk(&self, scenario: &TestScenario, seed: u64) -> anyhow::Result<WalkSummary> {
        let plan = &scenario.plan;
        let pilot = Autopilot::new(plan.strategy, seed, self.verbose)?;
        let modules = if plan.modules.is_empty() {
            pilot.module_ids()
        } else {
            plan.modules.iter().map(|id| (*id).to_string()).collect()
        };
        let mut walks = Vec::with_capacity(modules.len());
        for module in &modules {
            if plan.modules.len() == 1 {
                pilot.unlock_prerequisites(module)?;
            }
            walks.push(pilot.play(module, plan.interrupt_at)?);
        }
        Ok(pilot.summarize(walks))
    }
}

fn evaluate_expectations(scenario: &TestScenario, summary: &WalkSummary) -> anyhow::Result<()> {
    for expectation in &scenario.plan.expectations {
        expectation(summary)?;
    }
    Ok(())
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::scenario::get_scenario;

    #[test]
    fn smoke_scenario_passes_for_several_seeds() {
        let scenario = get_scenario("smoke").unwrap();
        let results = LabTester::new(false).run_scenario(&scenario, &[1, 2], 2);
        assert_eq!(results.len(), 2);
        for result in &results {
            assert!(result.passed, "{:?}", result.failures);
            assert_eq!(result.successful_iterations, 2);
            assert!(result.events_recorded > 0);
        }
    }

    #[test]
    fn failed_expectations_are_reported() {
        let mut scenario = get_scenario("module-1").unwrap();
        scenario
            .plan
            .expectations
            .push(|_| anyhow::bail!("forced failure"));
        let results = LabTester::new(false).run_scenario(&scenario, &[3], 1);
        assert!(!results[0].passed);
        assert!(results[0].failures[0].contains("forced failure"));
    }

    #[test]
    fn durations_serialize_as_millis() {
        let result = ScenarioResult {
            scenario_name: "x".into(),
            strategy: "direct".into(),
            seed: 1,
            passed: true,
            iterations_run: 1,
            successful_iterations: 1,
            failures: Vec::new(),
            average_duration: Duration::from_millis(12),
            events_recorded: 0,
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["average_duration"], 12);
    }
}
