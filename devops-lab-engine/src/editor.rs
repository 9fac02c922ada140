//! Simulated editor state: file contents plus the git gating flags.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::analyzer::has_conflict_markers;
use crate::constants::{
    CONFLICT_MARKER_OURS, CONFLICT_MARKER_SPLIT, CONFLICT_MARKER_THEIRS, KEY_DRAFT_BUILD_FILE,
    KEY_DRAFT_IAC_PREFIX, KEY_DRAFT_MANIFEST,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorKind {
    BuildFile,
    Manifest,
    Infrastructure,
}

impl EditorKind {
    pub const ALL: [Self; 3] = [Self::BuildFile, Self::Manifest, Self::Infrastructure];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BuildFile => "build_file",
            Self::Manifest => "manifest",
            Self::Infrastructure => "infrastructure",
        }
    }

    /// `source` tag attached to telemetry raised from this editor's terminal.
    #[must_use]
    pub const fn telemetry_source(self) -> &'static str {
        match self {
            Self::BuildFile => "gitops_editor_terminal",
            Self::Manifest => "kube_editor",
            Self::Infrastructure => "iac_editor",
        }
    }

    /// Storage key for an autosaved draft of `file`.
    #[must_use]
    pub fn draft_key(self, file: &str) -> String {
        match self {
            Self::BuildFile => KEY_DRAFT_BUILD_FILE.to_string(),
            Self::Manifest => KEY_DRAFT_MANIFEST.to_string(),
            Self::Infrastructure => format!("{KEY_DRAFT_IAC_PREFIX}{file}"),
        }
    }
}

impl fmt::Display for EditorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EditorKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "build_file" => Ok(Self::BuildFile),
            "manifest" => Ok(Self::Manifest),
            "infrastructure" => Ok(Self::Infrastructure),
            _ => Err(()),
        }
    }
}

/// Seed content and known-good reference for one editor file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorFile {
    pub initial: String,
    pub solution: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorSession {
    kind: EditorKind,
    files: BTreeMap<String, String>,
    seeds: BTreeMap<String, EditorFile>,
    active: Option<String>,
    attempt_count: u32,
    staged: bool,
    committed: bool,
    conflict: bool,
}

impl EditorSession {
    #[must_use]
    pub fn new(kind: EditorKind, seeds: BTreeMap<String, EditorFile>) -> Self {
        let files = seeds
            .iter()
            .map(|(name, file)| (name.clone(), file.initial.clone()))
            .collect();
        Self {
            kind,
            files,
            seeds,
            active: None,
            attempt_count: 0,
            staged: false,
            committed: false,
            conflict: false,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> EditorKind {
        self.kind
    }

    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    #[must_use]
    pub const fn is_staged(&self) -> bool {
        self.staged
    }

    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.committed
    }

    #[must_use]
    pub const fn in_conflict(&self) -> bool {
        self.conflict
    }

    #[must_use]
    pub fn active_file(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    #[must_use]
    pub fn content(&self, file: &str) -> Option<&str> {
        self.files.get(file).map(String::as_str)
    }

    /// Focus `file`; returns false when no such file exists.
    pub fn open(&mut self, file: &str) -> bool {
        if self.files.contains_key(file) {
            self.active = Some(file.to_string());
            true
        } else {
            false
        }
    }

    /// Replace a file's text. Any edit invalidates staged and committed work.
    pub fn set_content(&mut self, file: &str, text: impl Into<String>) -> bool {
        let Some(slot) = self.files.get_mut(file) else {
            return false;
        };
        *slot = text.into();
        self.staged = false;
        self.committed = false;
        true
    }

    /// Restore an autosaved draft without touching the git flags.
    pub fn restore_draft(&mut self, file: &str, text: String) {
        if let Some(slot) = self.files.get_mut(file) {
            *slot = text;
        }
    }

    /// Text handed to an analyzer: one file, or every file in name order.
    #[must_use]
    pub fn analysis_input(&self, file: Option<&str>) -> String {
        match file {
            Some(name) => self.content(name).unwrap_or_default().to_string(),
            None => self
                .files
                .values()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    #[must_use]
    pub fn contains_conflict_markers(&self) -> bool {
        self.files.values().any(|text| has_conflict_markers(text))
    }

    pub fn stage(&mut self) {
        self.staged = true;
        self.committed = false;
    }

    /// A commit attempt clears the conflict flag once every marker is gone.
    /// Returns whether markers remain.
    pub fn check_conflict_on_commit(&mut self) -> bool {
        if self.contains_conflict_markers() {
            self.conflict = true;
            return true;
        }
        self.conflict = false;
        false
    }

    pub fn mark_committed(&mut self) {
        self.committed = true;
    }

    /// A push publishes the commit and starts a fresh add/commit cycle.
    pub fn mark_pushed(&mut self) {
        self.staged = false;
        self.committed = false;
    }

    /// Wrap the line equal to `ours` (or append) in conflict markers.
    pub fn inject_conflict(&mut self, file: &str, ours: &str, theirs: &str) -> bool {
        let Some(text) = self.files.get_mut(file) else {
            return false;
        };
        let block = format!(
            "{CONFLICT_MARKER_OURS} HEAD\n{ours}\n{CONFLICT_MARKER_SPLIT}\n{theirs}\n{CONFLICT_MARKER_THEIRS} main"
        );
        let mut replaced = false;
        let mut lines: Vec<String> = text
            .lines()
            .map(|line| {
                if !replaced && line.trim() == ours.trim() {
                    replaced = true;
                    block.clone()
                } else {
                    line.to_string()
                }
            })
            .collect();
        if !replaced {
            lines.push(block);
        }
        *text = lines.join("\n");
        text.push('\n');
        self.conflict = true;
        self.staged = false;
        self.committed = false;
        self.active = Some(file.to_string());
        true
    }

    /// Returns the new attempt count.
    pub fn record_failure(&mut self) -> u32 {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.attempt_count
    }

    pub fn record_success(&mut self) {
        self.attempt_count = 0;
    }

    #[must_use]
    pub const fn solution_available(&self, threshold: u32) -> bool {
        self.attempt_count >= threshold
    }

    /// Overwrite `file` with its reference solution. Does not count as a pass.
    pub fn reveal_solution(&mut self, file: &str) -> bool {
        let Some(solution) = self.seeds.get(file).map(|seed| seed.solution.clone()) else {
            return false;
        };
        self.set_content(file, solution)
    }
}
