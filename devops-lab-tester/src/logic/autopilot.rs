//! Scripted learner that walks modules through the engine the way the page
//! would, reading the expected commands and reference solutions from the
//! module content itself.
use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use devops_lab_engine::matcher::resolve_pattern;
use devops_lab_engine::{
    AnalyticsSummary, BuiltinContent, CommandOutcome, LabEngine, ManualClock, MemoryStore,
    ModuleRun, ModuleStatus, PrelabActivity, ScenarioStep, Stage, StartMode, StatusBoard, StepId,
    StepKind, TelemetryEvent, TelemetryLog,
};

const MAX_COMMANDS_PER_MODULE: usize = 200;
const THINK_TIME_MS: u64 = 1_500;
const QA_EPOCH_MS: u64 = 1_700_000_000_000;

pub type QaTelemetry = TelemetryLog<MemoryStore, ManualClock>;
type QaRun = ModuleRun<MemoryStore, QaTelemetry, ManualClock>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LearnerStrategy {
    /// Applies the reference solution before every validation
    Direct,
    /// Fails validations until the solution unlocks, then reveals it
    Struggling,
}

impl LearnerStrategy {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Struggling => "struggling",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ModuleWalk {
    pub module: String,
    pub commands: usize,
    pub rejected: usize,
    pub failed_validations: usize,
    pub revealed_solutions: usize,
    pub resumed: bool,
    pub final_stage: Stage,
    pub unlocked: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalkSummary {
    pub seed: u64,
    pub strategy: LearnerStrategy,
    pub modules: Vec<ModuleWalk>,
    pub statuses: BTreeMap<String, ModuleStatus>,
    pub events: Vec<TelemetryEvent>,
    pub analytics: AnalyticsSummary,
}

impl WalkSummary {
    #[must_use]
    pub fn module(&self, id: &str) -> Option<&ModuleWalk> {
        self.modules.iter().find(|walk| walk.module == id)
    }

    #[must_use]
    pub fn count(&self, event: &str) -> usize {
        self.events.iter().filter(|e| e.event == event).count()
    }
}

pub struct Autopilot {
    engine: LabEngine<BuiltinContent, MemoryStore>,
    telemetry: QaTelemetry,
    clock: ManualClock,
    strategy: LearnerStrategy,
    seed: u64,
    verbose: bool,
}

impl Autopilot {
    /// # Errors
    ///
    /// Returns an error if the built-in content fails to load.
    pub fn new(strategy: LearnerStrategy, seed: u64, verbose: bool) -> Result<Self> {
        let store = MemoryStore::new();
        let clock = ManualClock::starting_at(QA_EPOCH_MS);
        let engine = LabEngine::new(BuiltinContent, store.clone())
            .context("loading built-in module content")?;
        let telemetry =
            TelemetryLog::from_config(store, clock.clone(), engine.config()).with_seed(seed);
        Ok(Self {
            engine,
            telemetry,
            clock,
            strategy,
            seed,
            verbose,
        })
    }

    #[must_use]
    pub fn module_ids(&self) -> Vec<String> {
        self.engine
            .catalog()
            .modules()
            .iter()
            .map(|module| module.id().to_string())
            .collect()
    }

    /// Mark every prerequisite of `module_id` as completed.
    ///
    /// # Errors
    ///
    /// Returns an error if the module is not in the catalog.
    pub fn unlock_prerequisites(&self, module_id: &str) -> Result<()> {
        let module = self
            .engine
            .catalog()
            .module(module_id)
            .with_context(|| format!("unknown module {module_id}"))?;
        let board = StatusBoard::new(self.engine.store().clone());
        for prerequisite in &module.definition().prerequisites {
            board.complete(self.engine.catalog(), prerequisite);
        }
        Ok(())
    }

    /// Play one module from a restart through reflection. With `interrupt_at`
    /// the run is abandoned once it reaches that stage and resumed from storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the module cannot be opened, stalls, or refuses
    /// the reflection.
    pub fn play(&self, module_id: &str, interrupt_at: Option<Stage>) -> Result<ModuleWalk> {
        let mut run = self.open(module_id, StartMode::Restart)?;
        let mut walk = ModuleWalk {
            module: module_id.to_string(),
            ..ModuleWalk::default()
        };
        self.finish_prelab(&mut run);

        let mut interrupt = interrupt_at;
        let mut revealed = BTreeSet::new();
        while run.stage() != Stage::Complete {
            if walk.commands >= MAX_COMMANDS_PER_MODULE {
                bail!(
                    "{module_id} stalled at step {} after {} commands",
                    run.progress().scenario_step,
                    walk.commands
                );
            }
            if interrupt.is_some_and(|stage| run.stage() >= stage) {
                interrupt = None;
                let before = run.progress();
                run.flush_drafts();
                run = self.open(module_id, StartMode::Resume)?;
                anyhow::ensure!(
                    run.progress() == before,
                    "{module_id} resumed at {:?}, expected {before:?}",
                    run.progress()
                );
                walk.resumed = true;
            }

            let step = run
                .current_step()
                .cloned()
                .with_context(|| format!("{module_id} has no current step"))?;
            let input = self.next_input(&mut run, &step, &mut revealed, &mut walk);
            let outcome = run.submit_command(&input);
            walk.commands += 1;
            match outcome {
                CommandOutcome::Rejected(reason) => {
                    walk.rejected += 1;
                    if self.verbose {
                        println!(
                            "  ↪️  {module_id} step {}: {input:?} rejected ({reason:?})",
                            step.id
                        );
                    }
                }
                CommandOutcome::Validated { success: false, .. } => walk.failed_validations += 1,
                _ => {}
            }
            self.clock.advance(THINK_TIME_MS);
            run.tick();
        }

        walk.final_stage = run.stage();
        let answers = reflection_answers(&run);
        walk.unlocked = self.engine.finish_module(&mut run, &answers)?;
        if self.verbose {
            println!(
                "  {} {module_id}: {} commands, {} failed validations, unlocked {:?}",
                "✔".green(),
                walk.commands,
                walk.failed_validations,
                walk.unlocked
            );
        }
        Ok(walk)
    }

    /// Collect everything recorded so far.
    #[must_use]
    pub fn summarize(&self, modules: Vec<ModuleWalk>) -> WalkSummary {
        let events = self.telemetry.events();
        WalkSummary {
            seed: self.seed,
            strategy: self.strategy,
            modules,
            statuses: self.engine.statuses(),
            analytics: AnalyticsSummary::from_events(&events),
            events,
        }
    }

    fn open(&self, module_id: &str, mode: StartMode) -> Result<QaRun> {
        self.engine
            .open_module(module_id, mode, self.telemetry.clone(), self.clock.clone())
            .with_context(|| format!("opening {module_id}"))
    }

    fn finish_prelab(&self, run: &mut QaRun) {
        while run.stage() == Stage::Prelab {
            let quiz = match run.current_prelab() {
                Some(PrelabActivity::Quiz {
                    correct, options, ..
                }) => Some((*correct, options.len())),
                _ => None,
            };
            if let Some((correct, options)) = quiz {
                if self.strategy == LearnerStrategy::Struggling && options > 1 {
                    run.answer_quiz((correct + 1) % options);
                }
                run.answer_quiz(correct);
            }
            run.advance_prelab();
        }
    }

    fn next_input(
        &self,
        run: &mut QaRun,
        step: &ScenarioStep,
        revealed: &mut BTreeSet<StepId>,
        walk: &mut ModuleWalk,
    ) -> String {
        let validating = step.validation.is_some()
            && matches!(
                step.kind,
                StepKind::GitWorkflow | StepKind::EditorValidation | StepKind::Pipeline { .. }
            );
        if validating {
            self.prepare_editor(run, step.id, revealed, walk);
        }
        if step.kind == StepKind::GitWorkflow {
            if !run.editor().is_staged() {
                return "git add .".to_string();
            }
            if !run.editor().is_committed() {
                return format!("git commit -m \"qa step {}\"", step.id);
            }
        }
        let pattern = step.expected.first().map_or("", String::as_str);
        let mut input = resolve_pattern(pattern, run.captures());
        if step.capture.is_some() {
            input.push_str(&format!(" qa/run-{}", self.seed));
        }
        input
    }

    fn prepare_editor(
        &self,
        run: &mut QaRun,
        step: StepId,
        revealed: &mut BTreeSet<StepId>,
        walk: &mut ModuleWalk,
    ) {
        let struggling = self.strategy == LearnerStrategy::Struggling;
        if !struggling || run.editor().contains_conflict_markers() {
            apply_solutions(run);
        } else if run.solution_available() && revealed.insert(step) && run.reveal_solution() {
            walk.revealed_solutions += 1;
        }
    }
}

/// Write every reference solution that differs from the editor content.
fn apply_solutions(run: &mut QaRun) {
    let files: Vec<(String, String)> = run
        .module()
        .definition()
        .files
        .iter()
        .filter(|(_, file)| !file.solution.is_empty())
        .map(|(name, file)| (name.clone(), file.solution.clone()))
        .collect();
    for (name, solution) in files {
        if run.editor().content(&name) != Some(solution.as_str()) {
            run.edit(&name, &solution);
        }
    }
}

fn reflection_answers(run: &QaRun) -> Vec<(String, String)> {
    run.module()
        .definition()
        .reflection_prompts
        .iter()
        .map(|prompt| (prompt.clone(), "Answered by the QA autopilot.".to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_learner_finishes_every_module() {
        let pilot = Autopilot::new(LearnerStrategy::Direct, 7, false).unwrap();
        let mut walks = Vec::new();
        for id in pilot.module_ids() {
            walks.push(pilot.play(&id, None).unwrap());
        }
        let summary = pilot.summarize(walks);
        assert!(
            summary
                .statuses
                .values()
                .all(|status| *status == ModuleStatus::Completed)
        );
        assert!(summary.modules.iter().all(|walk| walk.revealed_solutions == 0));
        assert_eq!(summary.count("module_complete"), 3);
        assert_eq!(summary.module("module-1").unwrap().unlocked, vec!["module-2"]);
    }

    #[test]
    fn struggling_learner_reveals_solutions() {
        let pilot = Autopilot::new(LearnerStrategy::Struggling, 7, false).unwrap();
        let walk = pilot.play("module-1", None).unwrap();
        assert_eq!(walk.final_stage, Stage::Complete);
        assert_eq!(walk.revealed_solutions, 1);
        assert_eq!(walk.failed_validations, 3);
        let summary = pilot.summarize(vec![walk]);
        assert_eq!(summary.count("show_solution"), 1);
        assert_eq!(summary.analytics.quiz_failures.by_question.len(), 2);
    }

    #[test]
    fn interrupted_run_resumes_where_it_left_off() {
        let pilot = Autopilot::new(LearnerStrategy::Direct, 7, false).unwrap();
        let walk = pilot.play("module-1", Some(Stage::Editor)).unwrap();
        assert!(walk.resumed);
        assert_eq!(walk.final_stage, Stage::Complete);
    }

    #[test]
    fn locked_modules_need_their_prerequisites() {
        let pilot = Autopilot::new(LearnerStrategy::Direct, 7, false).unwrap();
        assert!(pilot.play("module-3", None).is_err());
        pilot.unlock_prerequisites("module-3").unwrap();
        assert!(pilot.play("module-3", None).is_ok());
    }
}
