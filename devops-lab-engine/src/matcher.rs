//! Command matching: exact, case-sensitive prefix checks with optional capture.
use regex::Regex;
use std::collections::BTreeMap;

use crate::constants::HELP_WORDS;
use crate::scenario::{CaptureSpec, ScenarioStep};

/// Named fragments captured from earlier input, keyed by slot.
pub type Captures = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub slot: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Blank input; callers ignore it without logging.
    Empty,
    Matched { captured: Option<Capture> },
    HelpRequested,
    Unrecognized,
}

impl MatchOutcome {
    #[must_use]
    pub const fn is_match(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }
}

/// Classify `raw` against a step's expected patterns.
///
/// `capture` is the step's compiled capture regex; it runs independently of
/// the prefix check and falls back to the step's declared default.
#[must_use]
pub fn match_input(
    raw: &str,
    step: &ScenarioStep,
    capture: Option<&Regex>,
    captures: &Captures,
) -> MatchOutcome {
    let input = raw.trim();
    if input.is_empty() {
        return MatchOutcome::Empty;
    }
    if matches_expected(input, &step.expected, captures) {
        let captured = step
            .capture
            .as_ref()
            .and_then(|spec| extract(input, spec, capture));
        log::debug!("step {} matched {input:?}", step.id);
        return MatchOutcome::Matched { captured };
    }
    if HELP_WORDS.contains(&input) {
        MatchOutcome::HelpRequested
    } else {
        MatchOutcome::Unrecognized
    }
}

/// Whether trimmed `input` starts with any resolved pattern.
#[must_use]
pub fn matches_expected(input: &str, patterns: &[String], captures: &Captures) -> bool {
    patterns
        .iter()
        .map(|pattern| resolve_pattern(pattern, captures))
        .any(|prefix| !prefix.is_empty() && input.starts_with(prefix.as_str()))
}

/// Substitute known `{slot}` placeholders. An unknown slot cuts the pattern
/// at the placeholder so any value is accepted in its place.
#[must_use]
pub fn resolve_pattern(pattern: &str, captures: &Captures) -> String {
    let mut resolved = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(open) = rest.find('{') {
        resolved.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('}') else {
            resolved.push_str(&rest[open..]);
            return resolved;
        };
        let slot = &rest[open + 1..open + close];
        match captures.get(slot) {
            Some(value) => resolved.push_str(value),
            None => return resolved,
        }
        rest = &rest[open + close + 1..];
    }
    resolved.push_str(rest);
    resolved
}

/// Fill `{slot}` placeholders in display text; unknown slots stay verbatim.
#[must_use]
pub fn render_template(template: &str, captures: &Captures) -> String {
    let mut rendered = template.to_string();
    for (slot, value) in captures {
        rendered = rendered.replace(&format!("{{{slot}}}"), value);
    }
    rendered
}

fn extract(input: &str, spec: &CaptureSpec, regex: Option<&Regex>) -> Option<Capture> {
    let value = regex
        .and_then(|regex| regex.captures(input))
        .and_then(|caps| caps.get(1))
        .map(|group| group.as_str().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| spec.fallback.clone())?;
    Some(Capture {
        slot: spec.slot.clone(),
        value,
    })
}
