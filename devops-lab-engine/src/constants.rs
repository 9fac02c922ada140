//! Pacing, threshold, and storage-key constants for the lab engine.
//!
//! Tunables that instructors may want to override live in [`crate::config::LabConfig`];
//! the values here are its defaults plus the fixed key layout of persisted state.

// Pacing ------------------------------------------------------------------
pub const TRANSITION_DELAY_MS: u64 = 800;
pub const EDITOR_CHANGE_THROTTLE_MS: u64 = 1_500;
pub const AUTOSAVE_DEBOUNCE_MS: u64 = 500;
pub const PIPELINE_BUILD_MS: u64 = 1_500;
pub const PIPELINE_DEPLOY_MS: u64 = 1_500;

// Assistance thresholds ---------------------------------------------------
/// Attempt number from which analyzers append explicit remediation.
pub const HINT_ESCALATION_ATTEMPT: u32 = 3;
/// Failed validations after which the reference solution may be revealed.
pub const SOLUTION_REVEAL_THRESHOLD: u32 = 3;

// Telemetry ---------------------------------------------------------------
pub const TELEMETRY_MAX_EVENTS: usize = 1_000;
pub const SESSION_ID_PREFIX: &str = "session-";

// Storage keys ------------------------------------------------------------
pub(crate) const KEY_ACTIVE_MODULE: &str = "activeModule";
pub(crate) const KEY_MODULES: &str = "modules";
pub(crate) const KEY_PROGRESS_PREFIX: &str = "moduleProgress:";
pub(crate) const KEY_CAPTURES_PREFIX: &str = "moduleCaptures:";
pub(crate) const KEY_TELEMETRY_EVENTS: &str = "telemetry_events";
pub(crate) const KEY_TELEMETRY_SESSION: &str = "telemetry_session_id";
pub(crate) const KEY_REFLECTIONS: &str = "reflections";
pub(crate) const KEY_PIPELINE_RUNS: &str = "pipelineRuns";
pub(crate) const KEY_CHEATSHEET_PREFIX: &str = "cheatsheet:";
pub(crate) const KEY_CHEATSHEET_OPEN_PREFIX: &str = "cheatsheetOpen:";
pub(crate) const KEY_VALIDATION_ATTEMPTS_PREFIX: &str = "validationAttempts:";
pub(crate) const KEY_DRAFT_BUILD_FILE: &str = "gitopsEditorDraft";
pub(crate) const KEY_DRAFT_MANIFEST: &str = "kubeEditorDraft";
pub(crate) const KEY_DRAFT_IAC_PREFIX: &str = "iacEditor_";

// Merge conflict markers --------------------------------------------------
pub const CONFLICT_MARKER_OURS: &str = "<<<<<<<";
pub const CONFLICT_MARKER_SPLIT: &str = "=======";
pub const CONFLICT_MARKER_THEIRS: &str = ">>>>>>>";
pub const CONFLICT_MARKERS: [&str; 3] = [
    CONFLICT_MARKER_OURS,
    CONFLICT_MARKER_SPLIT,
    CONFLICT_MARKER_THEIRS,
];

// Escape words ------------------------------------------------------------
pub(crate) const HELP_WORDS: [&str; 2] = ["help", "hint"];
pub(crate) const ACKNOWLEDGE_WORDS: [&str; 2] = ["ok", "continue"];

// Learner-facing messages -------------------------------------------------
pub(crate) const MSG_UNRECOGNIZED: &str = "❌ Unknown command. Type 'help' if you're stuck.";
pub(crate) const MSG_COMMIT_BEFORE_STAGE: &str =
    "⚠️ Nothing staged. Run 'git add .' before committing.";
pub(crate) const MSG_PUSH_BEFORE_COMMIT: &str =
    "⚠️ Nothing to push. Commit your changes with 'git commit -m \"message\"' first.";
pub(crate) const MSG_CONFLICT_MARKERS: &str =
    "⚠️ Conflict markers are still present. Remove <<<<<<<, =======, and >>>>>>> before committing.";
pub(crate) const MSG_STAGED: &str = "✅ Changes staged for commit.";
pub(crate) const MSG_COMMITTED: &str = "✅ Commit recorded locally.";
pub(crate) const MSG_SOLUTION_LOCKED: &str =
    "The reference solution unlocks after three failed validation attempts.";
pub(crate) const MSG_SOLUTION_REVEALED: &str =
    "📄 Reference solution loaded into the editor. Validate it to finish this step.";
