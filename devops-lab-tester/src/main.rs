mod common;
mod logic;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::{Path, PathBuf};
use std::time::Instant;

use common::scenario::{all_scenario_keys, get_scenario, list_scenarios};
use common::{parse_seeds, split_csv};
use devops_lab_engine::{AnalyticsSummary, TelemetryEvent};
use logic::{Autopilot, LabTester, LearnerStrategy, ScenarioResult};

#[derive(Parser, Debug)]
#[command(
    name = "devops-lab-tester",
    about = "Automated QA walkthroughs and telemetry analytics for the DevOps lab"
)]
struct Args {
    /// Scenarios to run (comma-separated, or "all")
    #[arg(long, default_value = "smoke")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Seeds to run (comma-separated); each seeds the telemetry session id
    #[arg(long, default_value = "1337")]
    seeds: String,

    /// Number of iterations per scenario and seed
    #[arg(long, default_value_t = 1)]
    iterations: usize,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console"])]
    report: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Analyze an exported telemetry log instead of running scenarios
    #[arg(long)]
    analyze: Option<PathBuf>,

    /// Play the whole catalog once with this learner and write its telemetry here
    #[arg(long)]
    export_telemetry: Option<PathBuf>,

    /// Learner used by --export-telemetry
    #[arg(long, value_enum, default_value_t = LearnerStrategy::Direct)]
    learner: LearnerStrategy,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }
    if let Some(path) = args.analyze.as_deref() {
        return analyze_telemetry(&args, path);
    }
    if let Some(path) = args.export_telemetry.as_deref() {
        return export_telemetry(&args, path);
    }

    announce_banner();

    let start_time = Instant::now();
    let scenarios = expand_scenarios(&args.scenarios);
    let seeds = parse_seeds(&args.seeds)?;
    let results = run_scenarios(&args, &scenarios, &seeds);

    write_reports(&args, &results, start_time)?;

    if results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }

    Ok(())
}

fn maybe_list_scenarios(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available scenarios:")?;
    for (key, description) in list_scenarios() {
        writeln!(output_target.writer(), "  {key:15} - {description}")?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "🧪 DevOps Lab Automated Tester".bright_cyan().bold());
    println!("{}", "==============================".cyan());
}

fn expand_scenarios(scenarios_arg: &str) -> Vec<String> {
    let mut scenarios = split_csv(scenarios_arg);
    if scenarios.iter().any(|s| s == "all") {
        scenarios.retain(|s| s != "all");
        for key in all_scenario_keys() {
            if !scenarios.contains(&key) {
                scenarios.push(key);
            }
        }
    }
    scenarios
}

fn run_scenarios(args: &Args, scenarios: &[String], seeds: &[u64]) -> Vec<ScenarioResult> {
    let tester = LabTester::new(args.verbose);
    let mut results = Vec::new();
    for name in scenarios {
        if let Some(scenario) = get_scenario(name) {
            results.extend(tester.run_scenario(&scenario, seeds, args.iterations));
        } else {
            eprintln!("⚠️  Unknown scenario: {}", name.yellow());
        }
    }
    results
}

fn analyze_telemetry(args: &Args, path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let events: Vec<TelemetryEvent> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a telemetry export", path.display()))?;
    log::info!("analyzing {} events from {}", events.len(), path.display());
    let summary = AnalyticsSummary::from_events(&events);

    let mut output_target = OutputTarget::new(args.output.clone())?;
    if args.report == "json" {
        logic::reports::generate_analytics_json(&mut output_target, &summary)?;
    } else {
        logic::reports::generate_analytics_console(&mut output_target, &summary)?;
    }
    output_target.flush_inner()?;
    Ok(())
}

fn export_telemetry(args: &Args, path: &Path) -> Result<()> {
    let seed = parse_seeds(&args.seeds)?.first().copied().unwrap_or_default();
    let pilot = Autopilot::new(args.learner, seed, args.verbose)?;
    let mut walks = Vec::new();
    for module in pilot.module_ids() {
        walks.push(pilot.play(&module, None)?);
    }
    let summary = pilot.summarize(walks);
    let json = serde_json::to_string_pretty(&summary.events)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    println!(
        "📝 Wrote {} telemetry events ({} learner) to {}",
        summary.events.len(),
        args.learner.label(),
        path.display()
    );
    Ok(())
}

fn write_reports(args: &Args, results: &[ScenarioResult], start_time: Instant) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report.as_str() {
        "json" => logic::reports::generate_json_report(&mut output_target, results)?,
        "markdown" => logic::reports::generate_markdown_report(&mut output_target, results)?,
        _ => {
            if results.is_empty() {
                writeln!(&mut output_target, "No scenarios executed.")?;
            } else {
                logic::reports::generate_console_report(
                    &mut output_target,
                    results,
                    start_time.elapsed(),
                )?;
            }
            writeln!(&mut output_target, "🏁 Total time: {:?}", start_time.elapsed())?;
        }
    }

    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}
