use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::io::Write;
use std::time::Duration;

use devops_lab_engine::AnalyticsSummary;

use super::ScenarioResult;
use crate::common::timestamp;

#[allow(clippy::cast_precision_loss)]
fn success_rate(results: &[ScenarioResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let passed = results.iter().filter(|r| r.passed).count();
    (passed as f64 / results.len() as f64) * 100.0
}

pub fn generate_console_report(
    out: &mut dyn Write,
    results: &[ScenarioResult],
    total_duration: Duration,
) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "📊 Lab QA Results Summary".bright_cyan().bold())?;
    writeln!(out, "{}", "=========================".cyan())?;

    let total = results.len();
    let passed = results.iter().filter(|r| r.passed).count();
    writeln!(out, "Total scenarios: {total}")?;
    writeln!(out, "Passed: {}", passed.to_string().green())?;
    writeln!(out, "Failed: {}", (total - passed).to_string().red())?;
    writeln!(out, "Success rate: {:.1}%", success_rate(results))?;
    writeln!(out, "Total time: {total_duration:?}")?;
    writeln!(out)?;

    for result in results {
        let status = if result.passed {
            "✅ PASS".green()
        } else {
            "❌ FAIL".red()
        };
        writeln!(
            out,
            "{} {} ({} learner, seed {})",
            status,
            result.scenario_name.bold(),
            result.strategy,
            result.seed
        )?;
        writeln!(
            out,
            "   Iterations: {}/{} successful",
            result.successful_iterations, result.iterations_run
        )?;
        writeln!(out, "   Average time: {:?}", result.average_duration)?;
        writeln!(out, "   Telemetry events: {}", result.events_recorded)?;
        if !result.failures.is_empty() {
            writeln!(out, "   Failures:")?;
            for failure in &result.failures {
                writeln!(out, "     • {}", failure.red())?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: String,
    success_rate: f64,
    results: &'a [ScenarioResult],
}

pub fn generate_json_report(out: &mut dyn Write, results: &[ScenarioResult]) -> Result<()> {
    let report = JsonReport {
        generated_at: timestamp(),
        success_rate: success_rate(results),
        results,
    };
    writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
    Ok(())
}

pub fn generate_markdown_report(out: &mut dyn Write, results: &[ScenarioResult]) -> Result<()> {
    writeln!(out, "# DevOps Lab QA Results\n")?;
    writeln!(out, "_Generated {}_\n", timestamp())?;

    let total = results.len();
    let passed = results.iter().filter(|r| r.passed).count();
    writeln!(out, "## Summary\n")?;
    writeln!(out, "- **Total scenarios**: {total}")?;
    writeln!(out, "- **Passed**: {passed}")?;
    writeln!(out, "- **Failed**: {}", total - passed)?;
    writeln!(out, "- **Success rate**: {:.1}%\n", success_rate(results))?;

    writeln!(out, "## Detailed Results\n")?;
    for result in results {
        let status = if result.passed { "✅" } else { "❌" };
        writeln!(out, "### {} {}\n", status, result.scenario_name)?;
        writeln!(
            out,
            "- **Learner**: {} (seed {})",
            result.strategy, result.seed
        )?;
        writeln!(
            out,
            "- **Iterations**: {}/{} successful",
            result.successful_iterations, result.iterations_run
        )?;
        writeln!(out, "- **Average time**: {:?}", result.average_duration)?;
        if !result.failures.is_empty() {
            writeln!(out, "- **Failures**:")?;
            for failure in &result.failures {
                writeln!(out, "  - {failure}")?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Instructor view of an exported telemetry log.
pub fn generate_analytics_console(out: &mut dyn Write, summary: &AnalyticsSummary) -> Result<()> {
    writeln!(out, "{}", "📈 Telemetry Analytics".bright_cyan().bold())?;
    writeln!(out, "{}", "======================".cyan())?;
    writeln!(out, "Events: {}", summary.total_events)?;
    writeln!(out, "Sessions: {}", summary.sessions)?;
    writeln!(out)?;

    writeln!(out, "{}", "Module funnel".bold())?;
    for (module, funnel) in &summary.funnel {
        writeln!(
            out,
            "  {module:10} launched {:>3} → started {:>3} → terminal {:>3} → editor {:>3} → completed {:>3}",
            funnel.launched,
            funnel.started,
            funnel.reached_terminal,
            funnel.reached_editor,
            funnel.completed
        )?;
    }
    if !summary.average_durations_ms.is_empty() {
        writeln!(out, "{}", "Average time to complete".bold())?;
        for (module, ms) in &summary.average_durations_ms {
            writeln!(out, "  {module:10} {:?}", Duration::from_millis(*ms))?;
        }
    }
    writeln!(out, "{}", "Validation".bold())?;
    for (module, outcome) in &summary.validation {
        let first = outcome
            .attempts_to_first_success
            .map_or_else(|| "-".to_string(), |avg| format!("{avg:.1}"));
        writeln!(
            out,
            "  {module:10} {} ok / {} failed, attempts to first success {first}",
            outcome.successes.to_string().green(),
            outcome.failures.to_string().red()
        )?;
    }
    writeln!(out, "Help requests: {}", summary.help.total)?;
    for (source, count) in &summary.help.by_source {
        writeln!(out, "  {source:24} {count}")?;
    }
    if let Some((step, count)) = summary.help.top_step {
        writeln!(out, "  most help on step {step} ({count} requests)")?;
    }
    if let Some((question, count)) = &summary.quiz_failures.top {
        writeln!(out, "Most missed quiz question ({count}): {question}")?;
    }
    writeln!(out, "Solutions shown: {}", summary.solutions_shown)?;
    writeln!(out, "Editor changes: {}", summary.editor_changes)?;
    Ok(())
}

pub fn generate_analytics_json(out: &mut dyn Write, summary: &AnalyticsSummary) -> Result<()> {
    writeln!(out, "{}", serde_json::to_string_pretty(summary)?)?;
    Ok(())
}
