//! Expectations checked after an autopilot walk.
use anyhow::{Context, Result, ensure};
use devops_lab_engine::matcher::{matches_expected, resolve_pattern};
use devops_lab_engine::{BuiltinContent, Captures, ContentLoader, ModuleStatus, Stage};

use super::WalkPlan;
use crate::logic::{LearnerStrategy, WalkSummary};

pub fn smoke_plan() -> WalkPlan {
    WalkPlan::new(LearnerStrategy::Direct)
        .with_expectation(scripts_consistent)
        .with_expectation(all_completed)
        .with_expectation(telemetry_consistent)
}

pub fn module_plan(module: &'static str) -> WalkPlan {
    WalkPlan::new(LearnerStrategy::Direct)
        .with_module(module)
        .with_expectation(played_modules_completed)
        .with_expectation(telemetry_consistent)
}

pub fn struggling_plan() -> WalkPlan {
    WalkPlan::new(LearnerStrategy::Struggling)
        .with_expectation(all_completed)
        .with_expectation(solutions_revealed)
        .with_expectation(quiz_misses_recorded)
}

pub fn resume_plan() -> WalkPlan {
    WalkPlan::new(LearnerStrategy::Direct)
        .with_interrupt(Stage::Editor)
        .with_expectation(all_completed)
        .with_expectation(every_module_resumed)
}

pub fn remediation_plan() -> WalkPlan {
    WalkPlan::new(LearnerStrategy::Struggling)
        .with_module("module-2")
        .with_expectation(played_modules_completed)
        .with_expectation(remediation_acknowledged)
}

/// Every built-in script has one exit and every pattern accepts its own text.
fn scripts_consistent(_summary: &WalkSummary) -> Result<()> {
    let catalog = BuiltinContent.load_catalog()?;
    let mut captures = Captures::new();
    captures.insert("branch".to_string(), "qa/branch".to_string());
    for module in catalog.modules() {
        let script = module.script();
        let exits = script
            .steps()
            .iter()
            .filter(|step| script.is_exit(step.next))
            .count();
        ensure!(exits == 1, "{} has {exits} exit steps", module.id());
        for step in script.steps() {
            for pattern in &step.expected {
                let input = resolve_pattern(pattern, &captures);
                ensure!(
                    matches_expected(&input, &step.expected, &captures),
                    "{} step {}: {pattern:?} does not accept itself",
                    module.id(),
                    step.id
                );
            }
        }
    }
    Ok(())
}

fn all_completed(summary: &WalkSummary) -> Result<()> {
    for (id, status) in &summary.statuses {
        ensure!(
            *status == ModuleStatus::Completed,
            "module {id} ended {status}, expected completed"
        );
    }
    Ok(())
}

fn played_modules_completed(summary: &WalkSummary) -> Result<()> {
    ensure!(!summary.modules.is_empty(), "no modules were played");
    for walk in &summary.modules {
        ensure!(
            walk.final_stage == Stage::Complete,
            "module {} stopped at {:?}",
            walk.module,
            walk.final_stage
        );
        let status = summary.statuses.get(&walk.module).copied();
        ensure!(
            status == Some(ModuleStatus::Completed),
            "module {} is {status:?} after finishing",
            walk.module
        );
    }
    Ok(())
}

fn telemetry_consistent(summary: &WalkSummary) -> Result<()> {
    let played = summary.modules.len();
    ensure!(
        summary.count("module_launch") == played,
        "expected {played} module_launch events"
    );
    ensure!(
        summary.count("module_complete") == played,
        "expected {played} module_complete events"
    );
    ensure!(
        summary.analytics.sessions == 1,
        "QA walk spans {} sessions",
        summary.analytics.sessions
    );
    for walk in &summary.modules {
        let funnel = summary
            .analytics
            .funnel
            .get(&walk.module)
            .with_context(|| format!("no funnel for {}", walk.module))?;
        ensure!(
            funnel.completed == 1,
            "funnel for {} shows {} completions",
            walk.module,
            funnel.completed
        );
    }
    Ok(())
}

fn solutions_revealed(summary: &WalkSummary) -> Result<()> {
    let revealed: usize = summary.modules.iter().map(|w| w.revealed_solutions).sum();
    ensure!(revealed > 0, "struggling learner never revealed a solution");
    ensure!(
        summary.count("show_solution") == revealed,
        "show_solution events do not match reveals"
    );
    Ok(())
}

fn quiz_misses_recorded(summary: &WalkSummary) -> Result<()> {
    ensure!(
        summary.analytics.quiz_failures.top.is_some(),
        "wrong quiz answers were not recorded"
    );
    Ok(())
}

fn every_module_resumed(summary: &WalkSummary) -> Result<()> {
    for walk in &summary.modules {
        ensure!(walk.resumed, "module {} never resumed", walk.module);
    }
    Ok(())
}

fn remediation_acknowledged(summary: &WalkSummary) -> Result<()> {
    let walk = summary.module("module-2").context("module-2 was not played")?;
    ensure!(
        walk.failed_validations >= 2,
        "only {} failed validations before remediation",
        walk.failed_validations
    );
    ensure!(
        summary.count("kube_linting_attempt") > walk.failed_validations,
        "manifest attempts were not recorded"
    );
    Ok(())
}

pub fn metrics_reported(summary: &WalkSummary) -> Result<()> {
    ensure!(
        summary.count("validation_result") >= 2,
        "terraform validations missing from telemetry"
    );
    Ok(())
}
