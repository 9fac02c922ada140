//! Scenario scripts: the immutable step graph a module run walks through.
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::analyzer::Validation;

pub type StepId = u32;

/// How the engine interprets a step beyond plain prefix matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    #[default]
    Command,
    /// Focuses an editor file when matched.
    OpenFile { file: String },
    /// `git add`, `git commit -m`, then a push matching `expected`.
    GitWorkflow,
    /// Wraps the line `ours` in `file` in conflict markers against `theirs`.
    MergeConflict {
        file: String,
        ours: String,
        theirs: String,
    },
    /// Validates editor content when the learner applies it.
    EditorValidation,
    /// Validates the whole workspace; failures route to `on_failure`.
    Pipeline {
        #[serde(default)]
        on_failure: Option<StepId>,
    },
    /// Reports a metrics snapshot derived from the editor files.
    Monitor,
}

impl StepKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::OpenFile { .. } => "open_file",
            Self::GitWorkflow => "git_workflow",
            Self::MergeConflict { .. } => "merge_conflict",
            Self::EditorValidation => "editor_validation",
            Self::Pipeline { .. } => "pipeline",
            Self::Monitor => "monitor",
        }
    }
}

/// Extracts a named fragment (e.g. a branch name) from matched input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSpec {
    pub slot: String,
    /// Regex whose first group is the captured value.
    pub pattern: String,
    #[serde(default)]
    pub fallback: Option<String>,
}

/// Acknowledgement card layered over a step after repeated failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationCard {
    pub after_attempts: u32,
    pub narrative: String,
    pub hint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioStep {
    pub id: StepId,
    pub narrative: String,
    #[serde(default)]
    pub expected: Vec<String>,
    #[serde(default)]
    pub hint: String,
    /// Success text; `{slot}` placeholders are filled from captures.
    #[serde(default)]
    pub success: String,
    #[serde(default)]
    pub next: Option<StepId>,
    #[serde(default)]
    pub learning_focus: Option<String>,
    #[serde(default)]
    pub capture: Option<CaptureSpec>,
    #[serde(default)]
    pub kind: StepKind,
    #[serde(default)]
    pub validation: Option<Validation>,
    #[serde(default)]
    pub remediation: Option<RemediationCard>,
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script has no steps")]
    Empty,
    #[error("step ids must run 1..=n without gaps: expected {expected}, found {found}")]
    NonContiguous { expected: StepId, found: StepId },
    #[error("step {step} points to unknown next step {next}")]
    UnknownNext { step: StepId, next: StepId },
    #[error("step {step} routes failures to unknown step {target}")]
    UnknownFailureRoute { step: StepId, target: StepId },
    #[error(
        "step {step} routes failures to step {target}, before the editor entry step {editor_entry}"
    )]
    FailureRouteBeforeEditor {
        step: StepId,
        target: StepId,
        editor_entry: StepId,
    },
    #[error("step {step} declares no expected input")]
    MissingExpected { step: StepId },
    #[error("step {step} needs a validation profile")]
    MissingValidation { step: StepId },
    #[error("editor entry step {id} is not part of the script")]
    EditorEntryOutOfRange { id: StepId },
    #[error("step {step} has an invalid capture pattern")]
    InvalidCapture {
        step: StepId,
        #[source]
        source: regex::Error,
    },
}

/// A checked script with capture patterns compiled once.
#[derive(Debug, Clone)]
pub struct Script {
    steps: Vec<ScenarioStep>,
    captures: BTreeMap<StepId, Regex>,
    editor_entry: StepId,
}

impl Script {
    /// Check the step graph and compile capture patterns.
    ///
    /// # Errors
    ///
    /// Returns a [`ScriptError`] describing the first integrity violation.
    pub fn new(steps: Vec<ScenarioStep>, editor_entry: StepId) -> Result<Self, ScriptError> {
        if steps.is_empty() {
            return Err(ScriptError::Empty);
        }
        for (expected, step) in (1..).zip(&steps) {
            if step.id != expected {
                return Err(ScriptError::NonContiguous {
                    expected,
                    found: step.id,
                });
            }
        }
        let last = steps.last().map_or(0, |step| step.id);
        if editor_entry == 0 || editor_entry > last {
            return Err(ScriptError::EditorEntryOutOfRange { id: editor_entry });
        }

        let mut captures = BTreeMap::new();
        for step in &steps {
            check_step(step, last, editor_entry)?;
            if let Some(spec) = &step.capture {
                let regex = Regex::new(&spec.pattern).map_err(|source| {
                    ScriptError::InvalidCapture {
                        step: step.id,
                        source,
                    }
                })?;
                captures.insert(step.id, regex);
            }
        }

        Ok(Self {
            steps,
            captures,
            editor_entry,
        })
    }

    #[must_use]
    pub fn step(&self, id: StepId) -> Option<&ScenarioStep> {
        let index = usize::try_from(id).ok()?.checked_sub(1)?;
        self.steps.get(index)
    }

    #[must_use]
    pub fn steps(&self) -> &[ScenarioStep] {
        &self.steps
    }

    #[must_use]
    pub fn len(&self) -> StepId {
        StepId::try_from(self.steps.len()).unwrap_or(StepId::MAX)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub const fn editor_entry_step_id(&self) -> StepId {
        self.editor_entry
    }

    #[must_use]
    pub fn capture_regex(&self, id: StepId) -> Option<&Regex> {
        self.captures.get(&id)
    }

    /// Whether `next` leaves the script, which completes the module.
    #[must_use]
    pub fn is_exit(&self, next: Option<StepId>) -> bool {
        next.is_none_or(|id| self.step(id).is_none())
    }
}

fn check_step(step: &ScenarioStep, last: StepId, editor_entry: StepId) -> Result<(), ScriptError> {
    if step.expected.iter().all(|pattern| pattern.trim().is_empty()) {
        return Err(ScriptError::MissingExpected { step: step.id });
    }
    if let Some(next) = step.next
        && (next == 0 || next > last)
    {
        return Err(ScriptError::UnknownNext {
            step: step.id,
            next,
        });
    }
    match &step.kind {
        StepKind::Pipeline { on_failure } => {
            if step.validation.is_none() {
                return Err(ScriptError::MissingValidation { step: step.id });
            }
            if let Some(target) = *on_failure {
                if target == 0 || target > last {
                    return Err(ScriptError::UnknownFailureRoute {
                        step: step.id,
                        target,
                    });
                }
                if target < editor_entry {
                    return Err(ScriptError::FailureRouteBeforeEditor {
                        step: step.id,
                        target,
                        editor_entry,
                    });
                }
            }
        }
        StepKind::EditorValidation if step.validation.is_none() => {
            return Err(ScriptError::MissingValidation { step: step.id });
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{InfraTarget, ValidationProfile};

    fn step(id: StepId, next: Option<StepId>) -> ScenarioStep {
        ScenarioStep {
            id,
            narrative: format!("step {id}"),
            expected: vec!["ok".into()],
            hint: String::new(),
            success: String::new(),
            next,
            learning_focus: None,
            capture: None,
            kind: StepKind::Command,
            validation: None,
            remediation: None,
        }
    }

    #[test]
    fn accepts_linear_script() {
        let script = Script::new(vec![step(1, Some(2)), step(2, None)], 1).unwrap();
        assert_eq!(script.len(), 2);
        assert_eq!(script.step(2).map(|s| s.id), Some(2));
        assert!(script.step(0).is_none());
        assert!(script.step(3).is_none());
        assert!(script.is_exit(None));
        assert!(!script.is_exit(Some(2)));
    }

    #[test]
    fn rejects_dangling_next() {
        let err = Script::new(vec![step(1, Some(5))], 1).unwrap_err();
        assert!(matches!(err, ScriptError::UnknownNext { step: 1, next: 5 }));
    }

    #[test]
    fn rejects_gaps_in_ids() {
        let err = Script::new(vec![step(1, Some(3)), step(3, None)], 1).unwrap_err();
        assert!(matches!(
            err,
            ScriptError::NonContiguous {
                expected: 2,
                found: 3
            }
        ));
    }

    #[test]
    fn failure_route_cannot_leave_editor_stage() {
        let mut pipeline = step(3, None);
        pipeline.kind = StepKind::Pipeline {
            on_failure: Some(1),
        };
        pipeline.validation = Some(Validation {
            file: None,
            profile: ValidationProfile::Infrastructure {
                target: InfraTarget::Policy,
            },
        });
        let err = Script::new(vec![step(1, Some(2)), step(2, Some(3)), pipeline], 2).unwrap_err();
        assert!(matches!(
            err,
            ScriptError::FailureRouteBeforeEditor {
                step: 3,
                target: 1,
                editor_entry: 2
            }
        ));
    }

    #[test]
    fn rejects_bad_capture_pattern() {
        let mut branch = step(1, None);
        branch.capture = Some(CaptureSpec {
            slot: "branch".into(),
            pattern: "git (checkout".into(),
            fallback: None,
        });
        assert!(matches!(
            Script::new(vec![branch], 1),
            Err(ScriptError::InvalidCapture { step: 1, .. })
        ));
    }

    #[test]
    fn step_kind_defaults_to_command() {
        let parsed: ScenarioStep = serde_json::from_str(
            r#"{"id": 1, "narrative": "start", "expected": ["git status"]}"#,
        )
        .unwrap();
        assert_eq!(parsed.kind, StepKind::Command);
        assert!(parsed.next.is_none());
    }
}
