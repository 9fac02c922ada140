//! The module run: a step state machine over one module's script.
//!
//! A run owns the learner's progress, captured fragments, editor session and
//! activity log. Every operation either returns feedback as a value or moves
//! the run forward; nothing here fails on learner mistakes. Storage problems
//! are logged and swallowed by the persistence helpers.
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;

use crate::KeyValueStore;
use crate::analyzer::{InfraFacts, Validation};
use crate::catalog::{Module, PrelabActivity};
use crate::clock::Clock;
use crate::config::LabConfig;
use crate::constants::{
    ACKNOWLEDGE_WORDS, HELP_WORDS, KEY_VALIDATION_ATTEMPTS_PREFIX, MSG_COMMIT_BEFORE_STAGE,
    MSG_COMMITTED, MSG_CONFLICT_MARKERS, MSG_PUSH_BEFORE_COMMIT, MSG_SOLUTION_LOCKED,
    MSG_SOLUTION_REVEALED, MSG_STAGED, MSG_UNRECOGNIZED,
};
use crate::debounce::Throttle;
use crate::drafts::Drafts;
use crate::editor::{EditorKind, EditorSession};
use crate::feedback::{Analysis, FeedbackItem, FeedbackKind};
use crate::matcher::{
    Capture, Captures, MatchOutcome, match_input, matches_expected, render_template,
};
use crate::monitoring::MetricsSnapshot;
use crate::pipeline::{PipelineHistory, PipelineRun};
use crate::progress::{ModuleProgress, ProgressRepository, Stage};
use crate::reflection::{ReflectionEntry, ReflectionJournal};
use crate::scenario::{ScenarioStep, StepId, StepKind};
use crate::storage::{read_json, remove_key, write_json};
use crate::telemetry::{EventName, TelemetrySink, payload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    Resume,
    Restart,
}

/// Handle for a delayed transition; stale handles are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TransitionTicket {
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransitionTarget {
    Step(StepId),
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTransition {
    pub ticket: TransitionTicket,
    pub target: TransitionTarget,
    pub due_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Rejection {
    Unrecognized,
    NotStaged,
    NotCommitted,
    ConflictMarkersPresent,
    WrongStage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommandOutcome {
    /// Blank input; nothing logged.
    Ignored,
    /// The step matched and a transition is scheduled.
    Advanced { ticket: TransitionTicket },
    /// Accepted as part of a multi-command step without leaving it.
    Progressed,
    /// An analyzer ran; `ticket` is set when the result moves the run.
    Validated {
        success: bool,
        ticket: Option<TransitionTicket>,
    },
    HintShown,
    Rejected(Rejection),
}

/// A transient acknowledgement card shown over a struggling step.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SyntheticStep {
    anchor: StepId,
    step: ScenarioStep,
}

pub struct ModuleRun<S, T, C>
where
    S: KeyValueStore + Clone,
    T: TelemetrySink,
    C: Clock,
{
    module: Module,
    config: LabConfig,
    progress: ModuleProgress,
    captures: Captures,
    editor: EditorSession,
    overlay: Vec<SyntheticStep>,
    remediated: BTreeSet<StepId>,
    log: Vec<FeedbackItem>,
    generation: u64,
    pending: Option<PendingTransition>,
    store: S,
    repo: ProgressRepository<S>,
    drafts: Drafts<S>,
    change_throttle: Throttle,
    telemetry: T,
    clock: C,
}

impl<S, T, C> ModuleRun<S, T, C>
where
    S: KeyValueStore + Clone,
    T: TelemetrySink,
    C: Clock,
{
    /// Enter a module, resuming saved progress or starting over.
    pub fn open(
        module: Module,
        config: LabConfig,
        store: S,
        telemetry: T,
        clock: C,
        mode: StartMode,
    ) -> Self {
        let kind = module.definition().editor;
        let editor = EditorSession::new(kind, module.definition().files.clone());
        let mut run = Self {
            repo: ProgressRepository::new(store.clone()),
            drafts: Drafts::new(store.clone(), kind, config.autosave_debounce_ms),
            change_throttle: Throttle::new(config.editor_change_throttle_ms),
            module,
            config,
            progress: ModuleProgress::fresh(),
            captures: Captures::new(),
            editor,
            overlay: Vec::new(),
            remediated: BTreeSet::new(),
            log: Vec::new(),
            generation: 0,
            pending: None,
            store,
            telemetry,
            clock,
        };
        match mode {
            StartMode::Resume => run.resume(),
            StartMode::Restart => run.restart(),
        }
        run
    }

    fn resume(&mut self) {
        let stored = self.repo.load(self.module.id(), self.module.bounds());
        let resumed = stored.is_some();
        self.progress = stored.unwrap_or_else(|| self.fresh_progress());
        self.captures = self.repo.load_captures(self.module.id());
        let files: Vec<String> = self.editor.file_names().map(str::to_string).collect();
        for file in files {
            if let Some(draft) = self.drafts.load(&file) {
                self.editor.restore_draft(&file, draft);
            }
        }
        if self.progress.stage == Stage::Editor
            && let Some(file) = self.target_file()
        {
            self.editor.open(&file);
        }
        self.persist();
        self.track(EventName::ModuleStart, json!({"resume": resumed}));
        log::info!(
            "module {} {} at {} step {}",
            self.module.id(),
            if resumed { "resumed" } else { "started" },
            self.progress.stage,
            self.progress.scenario_step
        );
        self.announce_current_step();
    }

    /// Wipe this module's progress, captures, drafts and counters.
    pub fn restart(&mut self) {
        self.generation += 1;
        self.pending = None;
        self.repo.clear(self.module.id());
        let files: Vec<String> = self.editor.file_names().map(str::to_string).collect();
        self.drafts.clear(files.iter().map(String::as_str));
        remove_key(&self.store, &attempts_key(self.editor.kind()));
        self.editor = EditorSession::new(
            self.module.definition().editor,
            self.module.definition().files.clone(),
        );
        self.captures.clear();
        self.overlay.clear();
        self.remediated.clear();
        self.log.clear();
        self.change_throttle.reset();
        self.progress = self.fresh_progress();
        self.persist();
        self.track(EventName::ModuleStart, json!({"restart": true}));
        log::info!("module {} restarted", self.module.id());
        self.announce_current_step();
    }

    fn fresh_progress(&self) -> ModuleProgress {
        let mut progress = ModuleProgress::fresh();
        if self.module.definition().prelab.is_empty() {
            progress.stage = Stage::Terminal;
        }
        progress
    }

    // Accessors ----------------------------------------------------------

    #[must_use]
    pub const fn module(&self) -> &Module {
        &self.module
    }

    #[must_use]
    pub const fn progress(&self) -> ModuleProgress {
        self.progress
    }

    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.progress.stage
    }

    #[must_use]
    pub const fn editor(&self) -> &EditorSession {
        &self.editor
    }

    #[must_use]
    pub const fn captures(&self) -> &Captures {
        &self.captures
    }

    #[must_use]
    pub fn log(&self) -> &[FeedbackItem] {
        &self.log
    }

    /// Hand the accumulated log to the host and start a new one.
    pub fn take_log(&mut self) -> Vec<FeedbackItem> {
        std::mem::take(&mut self.log)
    }

    #[must_use]
    pub const fn pending_transition(&self) -> Option<PendingTransition> {
        self.pending
    }

    #[must_use]
    pub const fn solution_available(&self) -> bool {
        self.editor
            .solution_available(self.config.solution_reveal_threshold)
    }

    #[must_use]
    pub fn cumulative_attempts(&self) -> u64 {
        read_json(&self.store, &attempts_key(self.editor.kind())).unwrap_or(0)
    }

    /// The step the learner is on, with any remediation card layered on top.
    #[must_use]
    pub fn current_step(&self) -> Option<&ScenarioStep> {
        let id = self.progress.scenario_step;
        self.overlay
            .iter()
            .find(|card| card.anchor == id)
            .map(|card| &card.step)
            .or_else(|| self.module.script().step(id))
    }

    #[must_use]
    pub fn current_prelab(&self) -> Option<&PrelabActivity> {
        if self.progress.stage != Stage::Prelab {
            return None;
        }
        self.module.definition().prelab.get(self.progress.prelab_step)
    }

    // Prelab ---------------------------------------------------------------

    /// Move to the next prelab activity, or into the terminal after the last.
    pub fn advance_prelab(&mut self) -> bool {
        if self.progress.stage != Stage::Prelab {
            return false;
        }
        let count = self.module.definition().prelab.len();
        if self.progress.prelab_step + 1 < count {
            self.progress.prelab_step += 1;
            self.persist();
        } else {
            self.set_stage(Stage::Terminal);
            self.announce_current_step();
        }
        true
    }

    /// Record a quiz answer; `None` when the current activity is not a quiz.
    pub fn answer_quiz(&mut self, choice: usize) -> Option<bool> {
        let Some(PrelabActivity::Quiz {
            question,
            options,
            correct,
            ..
        }) = self.current_prelab().cloned()
        else {
            return None;
        };
        let is_correct = choice == correct;
        let answer = options.get(choice).cloned().unwrap_or_default();
        self.track(
            EventName::PrelabQuizAnswer,
            json!({"question": question, "answer": answer, "correct": is_correct}),
        );
        Some(is_correct)
    }

    // Terminal -------------------------------------------------------------

    /// Apply one line of learner input to the current step.
    pub fn submit_command(&mut self, raw: &str) -> CommandOutcome {
        let input = raw.trim();
        if input.is_empty() {
            return CommandOutcome::Ignored;
        }
        if !matches!(self.progress.stage, Stage::Terminal | Stage::Editor) {
            self.push(FeedbackKind::Error, "The terminal is not active in this stage.");
            return CommandOutcome::Rejected(Rejection::WrongStage);
        }
        self.push(FeedbackKind::Input, input);

        let Some(step) = self.current_step().cloned() else {
            log::warn!(
                "module {} has no step {}",
                self.module.id(),
                self.progress.scenario_step
            );
            return self.reject(Rejection::Unrecognized);
        };

        if self.card_active() {
            return self.acknowledge_card(&step, input);
        }
        if step.kind == StepKind::GitWorkflow {
            return self.git_workflow(&step, input);
        }

        let capture = self.module.script().capture_regex(step.id);
        match match_input(input, &step, capture, &self.captures) {
            MatchOutcome::Empty => CommandOutcome::Ignored,
            MatchOutcome::HelpRequested => self.help(&step),
            MatchOutcome::Unrecognized => self.reject(Rejection::Unrecognized),
            MatchOutcome::Matched { captured } => self.on_match(&step, captured),
        }
    }

    fn on_match(&mut self, step: &ScenarioStep, captured: Option<Capture>) -> CommandOutcome {
        if let Some(capture) = captured {
            self.remember(capture);
        }
        match &step.kind {
            StepKind::OpenFile { file } => {
                if !self.editor.open(file) {
                    log::warn!("step {} opens unknown file {file}", step.id);
                }
            }
            StepKind::MergeConflict { file, ours, theirs } => {
                self.editor.inject_conflict(file, ours, theirs);
                if let Some(content) = self.editor.content(file).map(str::to_string) {
                    self.drafts.queue(file, &content, self.clock.now_ms());
                }
            }
            StepKind::EditorValidation => {
                return self.validate_and_route(step, None);
            }
            StepKind::Pipeline { on_failure } => {
                return self.validate_and_route(step, *on_failure);
            }
            StepKind::Monitor => {
                let input = self.editor.analysis_input(None);
                let snapshot =
                    MetricsSnapshot::from_facts(&InfraFacts::scan(&input), &self.config.iac_policy);
                for line in snapshot.summary_lines() {
                    self.push(FeedbackKind::Output, line);
                }
            }
            StepKind::Command | StepKind::GitWorkflow => {}
        }
        CommandOutcome::Advanced {
            ticket: self.succeed(step),
        }
    }

    fn git_workflow(&mut self, step: &ScenarioStep, input: &str) -> CommandOutcome {
        if HELP_WORDS.contains(&input) {
            return self.help(step);
        }
        if input.starts_with("git add") {
            self.editor.stage();
            self.push(FeedbackKind::Success, MSG_STAGED);
            return CommandOutcome::Progressed;
        }
        if input.starts_with("git commit") {
            return self.commit(step);
        }
        let is_push = input.starts_with("git push");
        if is_push && !self.editor.is_committed() {
            self.push(FeedbackKind::Error, MSG_PUSH_BEFORE_COMMIT);
            return CommandOutcome::Rejected(Rejection::NotCommitted);
        }
        if matches_expected(input, &step.expected, &self.captures) {
            if !self.editor.is_committed() {
                self.push(FeedbackKind::Error, MSG_PUSH_BEFORE_COMMIT);
                return CommandOutcome::Rejected(Rejection::NotCommitted);
            }
            self.editor.mark_pushed();
            return CommandOutcome::Advanced {
                ticket: self.succeed(step),
            };
        }
        if is_push {
            let hint = render_template(&step.hint, &self.captures);
            self.push(FeedbackKind::Error, format!("❌ Wrong push target. {hint}"));
            return CommandOutcome::Rejected(Rejection::Unrecognized);
        }
        self.reject(Rejection::Unrecognized)
    }

    fn commit(&mut self, step: &ScenarioStep) -> CommandOutcome {
        if !self.editor.is_staged() {
            self.push(FeedbackKind::Error, MSG_COMMIT_BEFORE_STAGE);
            return CommandOutcome::Rejected(Rejection::NotStaged);
        }
        if self.editor.check_conflict_on_commit() {
            self.push(FeedbackKind::Error, MSG_CONFLICT_MARKERS);
            return CommandOutcome::Rejected(Rejection::ConflictMarkersPresent);
        }
        if let Some(validation) = &step.validation {
            let analysis = self.run_validation(step, validation);
            if !analysis.success {
                self.push(
                    FeedbackKind::Error,
                    "❌ Commit blocked: fix the issues above, then stage and commit again.",
                );
                return CommandOutcome::Validated {
                    success: false,
                    ticket: None,
                };
            }
        }
        self.editor.mark_committed();
        self.push(FeedbackKind::Success, MSG_COMMITTED);
        CommandOutcome::Progressed
    }

    fn validate_and_route(
        &mut self,
        step: &ScenarioStep,
        on_failure: Option<StepId>,
    ) -> CommandOutcome {
        let Some(validation) = step.validation.clone() else {
            return CommandOutcome::Advanced {
                ticket: self.succeed(step),
            };
        };
        let analysis = self.run_validation(step, &validation);
        self.route(step, &analysis, on_failure)
    }

    /// Move the run on an analyzer result: pass advances, a failed pipeline
    /// falls back to its `on_failure` step.
    fn route(
        &mut self,
        step: &ScenarioStep,
        analysis: &Analysis,
        on_failure: Option<StepId>,
    ) -> CommandOutcome {
        if matches!(step.kind, StepKind::Pipeline { .. }) {
            self.record_pipeline(analysis);
        }
        if analysis.success {
            return CommandOutcome::Validated {
                success: true,
                ticket: Some(self.succeed(step)),
            };
        }
        let ticket = on_failure
            .filter(|target| *target != step.id)
            .map(|target| {
                self.push(
                    FeedbackKind::System,
                    "🔁 Pipeline failed. Returning to the remediation step.",
                );
                self.schedule(TransitionTarget::Step(target))
            });
        CommandOutcome::Validated {
            success: false,
            ticket,
        }
    }

    fn help(&mut self, step: &ScenarioStep) -> CommandOutcome {
        self.push(FeedbackKind::Hint, render_template(&step.hint, &self.captures));
        let source = match self.progress.stage {
            Stage::Editor => self.editor.kind().telemetry_source(),
            _ => "git_terminal",
        };
        self.track(
            EventName::HelpRequest,
            json!({"step": step.id, "source": source}),
        );
        CommandOutcome::HintShown
    }

    fn reject(&mut self, rejection: Rejection) -> CommandOutcome {
        self.push(FeedbackKind::Error, MSG_UNRECOGNIZED);
        CommandOutcome::Rejected(rejection)
    }

    // Editor ---------------------------------------------------------------

    /// Replace a file's text, queueing an autosave and throttled telemetry.
    pub fn edit(&mut self, file: &str, content: &str) -> bool {
        if !self.editor.set_content(file, content) {
            return false;
        }
        let now = self.clock.now_ms();
        self.drafts.queue(file, content, now);
        self.drafts.poll(now);
        if self.change_throttle.ready(now) {
            self.track(
                EventName::EditorChange,
                json!({"file": file, "length": content.len(), "step": self.progress.scenario_step}),
            );
        }
        true
    }

    /// Run the current step's analyzer on demand from the editor.
    ///
    /// Validation and pipeline steps route exactly as if their command had
    /// been typed. Returns `None` outside the editor stage or while a
    /// remediation card is showing.
    pub fn validate(&mut self) -> Option<Analysis> {
        if self.progress.stage != Stage::Editor || self.card_active() {
            return None;
        }
        let step = self.current_step()?.clone();
        let validation = step.validation.clone()?;
        let analysis = self.run_validation(&step, &validation);
        match step.kind {
            StepKind::EditorValidation => {
                self.route(&step, &analysis, None);
            }
            StepKind::Pipeline { on_failure } => {
                self.route(&step, &analysis, on_failure);
            }
            _ => {}
        }
        Some(analysis)
    }

    /// Load the reference solution once enough attempts have failed.
    pub fn reveal_solution(&mut self) -> bool {
        if !self.solution_available() {
            self.push(FeedbackKind::System, MSG_SOLUTION_LOCKED);
            return false;
        }
        let Some(file) = self.target_file() else {
            return false;
        };
        if !self.editor.reveal_solution(&file) {
            return false;
        }
        if let Some(content) = self.editor.content(&file).map(str::to_string) {
            self.drafts.queue(&file, &content, self.clock.now_ms());
        }
        self.push(FeedbackKind::System, MSG_SOLUTION_REVEALED);
        self.track(
            EventName::ShowSolution,
            json!({"step": self.progress.scenario_step, "file": file}),
        );
        true
    }

    fn target_file(&self) -> Option<String> {
        self.current_step()
            .and_then(|step| step.validation.as_ref())
            .and_then(|validation| validation.file.clone())
            .or_else(|| self.editor.active_file().map(str::to_string))
            .or_else(|| self.editor.file_names().next().map(str::to_string))
    }

    fn run_validation(&mut self, step: &ScenarioStep, validation: &Validation) -> Analysis {
        let attempt = self.editor.attempt_count().saturating_add(1);
        let content = self.editor.analysis_input(validation.file.as_deref());
        let analysis = validation.profile.analyze(&content, attempt, &self.config);
        log::debug!(
            "step {} validation attempt {attempt}: success={} errors={}",
            step.id,
            analysis.success,
            analysis.errors()
        );
        self.log.extend(analysis.to_feedback());

        let cumulative = self.cumulative_attempts().saturating_add(1);
        write_json(&self.store, &attempts_key(self.editor.kind()), &cumulative);

        let event = if validation.profile.editor() == EditorKind::Manifest {
            EventName::KubeLintingAttempt
        } else {
            EventName::ValidationResult
        };
        let messages: Vec<&str> = analysis
            .findings
            .iter()
            .map(|finding| finding.message.as_str())
            .collect();
        self.track(
            event,
            json!({
                "step": step.id,
                "editor": self.editor.kind().as_str(),
                "attempt": attempt,
                "success": analysis.success,
                "errors": analysis.errors(),
                "findings": messages,
            }),
        );

        if analysis.success {
            self.editor.record_success();
        } else {
            let failures = self.editor.record_failure();
            if failures == self.config.solution_reveal_threshold {
                self.push(
                    FeedbackKind::System,
                    "📄 A reference solution is now available if you need it.",
                );
            }
            self.maybe_add_card(step, failures);
        }
        analysis
    }

    fn maybe_add_card(&mut self, step: &ScenarioStep, failures: u32) {
        let Some(card) = &step.remediation else {
            return;
        };
        if failures < card.after_attempts || !self.remediated.insert(step.id) {
            return;
        }
        self.overlay.push(SyntheticStep {
            anchor: step.id,
            step: ScenarioStep {
                id: step.id,
                narrative: card.narrative.clone(),
                expected: ACKNOWLEDGE_WORDS.iter().map(|w| (*w).to_string()).collect(),
                hint: card.hint.clone(),
                success: "Back to the task.".to_string(),
                next: Some(step.id),
                learning_focus: None,
                capture: None,
                kind: StepKind::Command,
                validation: None,
                remediation: None,
            },
        });
        self.push(FeedbackKind::System, format!("🧭 {}", card.narrative));
    }

    fn card_active(&self) -> bool {
        let id = self.progress.scenario_step;
        self.overlay.iter().any(|card| card.anchor == id)
    }

    fn acknowledge_card(&mut self, card: &ScenarioStep, input: &str) -> CommandOutcome {
        match match_input(input, card, None, &self.captures) {
            MatchOutcome::Matched { .. } => {
                self.overlay.retain(|synthetic| synthetic.anchor != card.id);
                self.push(FeedbackKind::Success, card.success.clone());
                self.announce_current_step();
                CommandOutcome::Progressed
            }
            MatchOutcome::HelpRequested => self.help(card),
            MatchOutcome::Empty => CommandOutcome::Ignored,
            MatchOutcome::Unrecognized => self.reject(Rejection::Unrecognized),
        }
    }

    fn record_pipeline(&mut self, analysis: &Analysis) {
        let run = PipelineRun::from_analysis(
            self.module.id(),
            analysis,
            self.config.pipeline,
            self.clock.now_ms(),
        );
        self.track(
            EventName::PipelineRun,
            json!({"success": run.success, "errors": run.errors, "duration": run.duration}),
        );
        PipelineHistory::new(self.store.clone()).append(run);
    }

    /// Write any pending drafts immediately, e.g. when the host tears down.
    pub fn flush_drafts(&mut self) -> usize {
        self.drafts.flush()
    }

    // Transitions ----------------------------------------------------------

    fn succeed(&mut self, step: &ScenarioStep) -> TransitionTicket {
        let message = render_template(&step.success, &self.captures);
        if !message.is_empty() {
            self.push(FeedbackKind::Success, message);
        }
        if let Some(focus) = &step.learning_focus {
            self.push(FeedbackKind::Focus, focus.clone());
        }
        let target = if self.module.script().is_exit(step.next) {
            TransitionTarget::Complete
        } else {
            TransitionTarget::Step(step.next.unwrap_or(step.id))
        };
        self.schedule(target)
    }

    fn schedule(&mut self, target: TransitionTarget) -> TransitionTicket {
        self.generation += 1;
        let ticket = TransitionTicket {
            generation: self.generation,
        };
        self.pending = Some(PendingTransition {
            ticket,
            target,
            due_ms: self
                .clock
                .now_ms()
                .saturating_add(self.config.transition_delay_ms),
        });
        ticket
    }

    /// Apply a scheduled transition if `ticket` is still the newest one.
    pub fn resolve(&mut self, ticket: TransitionTicket) -> bool {
        match self.pending {
            Some(pending) if pending.ticket == ticket => {
                self.pending = None;
                self.apply(pending.target);
                true
            }
            _ => {
                log::debug!("ignoring stale transition {}", ticket.generation);
                false
            }
        }
    }

    /// Apply the pending transition once its delay has elapsed and write due
    /// drafts. Returns whether a transition was applied.
    pub fn tick(&mut self) -> bool {
        let now = self.clock.now_ms();
        self.drafts.poll(now);
        match self.pending {
            Some(pending) if pending.due_ms <= now => self.resolve(pending.ticket),
            _ => false,
        }
    }

    /// Apply the pending transition immediately, skipping the display delay.
    pub fn settle(&mut self) -> bool {
        match self.pending {
            Some(pending) => self.resolve(pending.ticket),
            None => false,
        }
    }

    fn apply(&mut self, target: TransitionTarget) {
        self.overlay.clear();
        match target {
            TransitionTarget::Step(id) => {
                self.progress.scenario_step = id;
                if id >= self.module.script().editor_entry_step_id() {
                    self.set_stage(Stage::Editor);
                }
                self.persist();
                self.announce_current_step();
            }
            TransitionTarget::Complete => {
                self.progress.scenario_step = self.module.script().len();
                self.set_stage(Stage::Complete);
                self.push(
                    FeedbackKind::System,
                    "🏁 Scenario complete. Finish the reflection to wrap up this module.",
                );
            }
        }
    }

    /// Stages only move forward; anything else is ignored.
    fn set_stage(&mut self, stage: Stage) {
        let from = self.progress.stage;
        if stage <= from {
            return;
        }
        self.progress.stage = stage;
        if stage == Stage::Editor && self.editor.active_file().is_none()
            && let Some(file) = self.target_file()
        {
            self.editor.open(&file);
        }
        self.persist();
        log::info!("module {} stage {from} -> {stage}", self.module.id());
        self.track(
            EventName::ModuleStageChange,
            json!({"from": from.as_str(), "to": stage.as_str()}),
        );
    }

    fn announce_current_step(&mut self) {
        if !matches!(self.progress.stage, Stage::Terminal | Stage::Editor) {
            return;
        }
        if let Some(narrative) = self
            .current_step()
            .map(|step| render_template(&step.narrative, &self.captures))
        {
            self.push(FeedbackKind::Output, narrative);
        }
    }

    // Reflection -----------------------------------------------------------

    /// Save reflection answers and mark the module finished. Only valid once
    /// the scenario is complete.
    pub fn complete_reflection(&mut self, answers: &[(String, String)]) -> Vec<ReflectionEntry> {
        if self.progress.stage != Stage::Complete {
            log::warn!(
                "reflection submitted for {} before the scenario finished",
                self.module.id()
            );
            return Vec::new();
        }
        let journal = ReflectionJournal::new(self.store.clone());
        let now = self.clock.now_ms();
        let entries: Vec<ReflectionEntry> = answers
            .iter()
            .filter(|(_, answer)| !answer.trim().is_empty())
            .map(|(question, answer)| journal.add(self.module.id(), question, answer, now))
            .collect();
        self.track(
            EventName::ReflectionSubmit,
            json!({"answers": entries.len()}),
        );
        self.track(EventName::ModuleComplete, json!({}));
        entries
    }

    // Helpers ----------------------------------------------------------------

    fn remember(&mut self, capture: Capture) {
        self.captures.insert(capture.slot, capture.value);
        self.repo.save_captures(self.module.id(), &self.captures);
    }

    fn persist(&self) {
        self.repo.save(self.module.id(), &self.progress);
    }

    fn push(&mut self, kind: FeedbackKind, message: impl Into<String>) {
        self.log.push(FeedbackItem::typed(kind, message));
    }

    fn track(&self, event: EventName, value: serde_json::Value) {
        self.telemetry
            .track(event, Some(self.module.id()), payload(value));
    }
}

fn attempts_key(kind: EditorKind) -> String {
    format!("{KEY_VALIDATION_ATTEMPTS_PREFIX}{kind}")
}
