//! Serializable view of a module run for the page to render.
use devops_lab_engine::{
    Clock, CommandOutcome, EditorKind, FeedbackItem, KeyValueStore, ModuleRun, ModuleStatus,
    PrelabActivity, Stage, StepId, TelemetrySink,
};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorView {
    pub kind: EditorKind,
    pub files: Vec<String>,
    pub active_file: Option<String>,
    pub content: Option<String>,
    pub attempts: u32,
    pub staged: bool,
    pub committed: bool,
    pub in_conflict: bool,
    pub solution_available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub module: String,
    pub stage: Stage,
    pub prelab_step: usize,
    pub scenario_step: StepId,
    pub prelab: Option<PrelabActivity>,
    pub narrative: Option<String>,
    pub hint: Option<String>,
    /// Lines produced since the previous snapshot.
    pub log: Vec<FeedbackItem>,
    pub editor: EditorView,
    pub transition_due: Option<u64>,
    pub outcome: Option<CommandOutcome>,
}

impl Snapshot {
    /// Capture the run state and drain its pending log lines.
    pub fn capture<S, T, C>(run: &mut ModuleRun<S, T, C>, outcome: Option<CommandOutcome>) -> Self
    where
        S: KeyValueStore + Clone,
        T: TelemetrySink,
        C: Clock,
    {
        let progress = run.progress();
        let step = run.current_step();
        let narrative = step.map(|step| step.narrative.clone());
        let hint = step.map(|step| step.hint.clone()).filter(|hint| !hint.is_empty());
        let editor = run.editor();
        let active_file = editor.active_file().map(str::to_string);
        let editor = EditorView {
            kind: editor.kind(),
            files: editor.file_names().map(str::to_string).collect(),
            content: active_file
                .as_deref()
                .and_then(|file| editor.content(file))
                .map(str::to_string),
            active_file,
            attempts: editor.attempt_count(),
            staged: editor.is_staged(),
            committed: editor.is_committed(),
            in_conflict: editor.in_conflict(),
            solution_available: run.solution_available(),
        };
        Self {
            module: run.module().id().to_string(),
            stage: progress.stage,
            prelab_step: progress.prelab_step,
            scenario_step: progress.scenario_step,
            prelab: run.current_prelab().cloned(),
            narrative,
            hint,
            editor,
            transition_due: run.pending_transition().map(|pending| pending.due_ms),
            outcome,
            log: run.take_log(),
        }
    }
}

/// One entry of the module picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleCard {
    pub id: String,
    pub title: String,
    pub status: ModuleStatus,
}
