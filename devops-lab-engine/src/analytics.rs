//! Instructor analytics over an exported telemetry log.
//!
//! Everything here is a pure function of an event slice, so the same numbers
//! come out whether the events were read from a store or a JSON export.
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::telemetry::{EventName, TelemetryEvent};

const UNKNOWN_MODULE: &str = "unknown";

fn module_of(event: &TelemetryEvent) -> &str {
    event.module.as_deref().unwrap_or(UNKNOWN_MODULE)
}

#[must_use]
pub fn group_by_module(events: &[TelemetryEvent]) -> BTreeMap<String, Vec<&TelemetryEvent>> {
    let mut groups: BTreeMap<String, Vec<&TelemetryEvent>> = BTreeMap::new();
    for event in events {
        groups
            .entry(module_of(event).to_string())
            .or_default()
            .push(event);
    }
    groups
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleDuration {
    pub module: String,
    pub session: String,
    pub duration_ms: u64,
}

/// Pair each session's first `module_start` with its next `module_complete`.
#[must_use]
pub fn module_durations(events: &[TelemetryEvent]) -> Vec<ModuleDuration> {
    let mut started: BTreeMap<(&str, &str), u64> = BTreeMap::new();
    let mut durations = Vec::new();
    for event in sorted(events) {
        let key = (event.session.as_str(), module_of(event));
        if event.is(EventName::ModuleStart) {
            started.entry(key).or_insert(event.ts);
        } else if event.is(EventName::ModuleComplete)
            && let Some(start) = started.remove(&key)
        {
            durations.push(ModuleDuration {
                module: key.1.to_string(),
                session: key.0.to_string(),
                duration_ms: event.ts.saturating_sub(start),
            });
        }
    }
    durations
}

/// Mean completion time per module, in milliseconds.
#[must_use]
pub fn average_durations(durations: &[ModuleDuration]) -> BTreeMap<String, u64> {
    let mut totals: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for entry in durations {
        let slot = totals.entry(entry.module.as_str()).or_default();
        slot.0 = slot.0.saturating_add(entry.duration_ms);
        slot.1 += 1;
    }
    totals
        .into_iter()
        .map(|(module, (total, count))| (module.to_string(), total / count.max(1)))
        .collect()
}

/// Distinct sessions reaching each phase of a module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Funnel {
    pub launched: usize,
    pub started: usize,
    pub reached_terminal: usize,
    pub reached_editor: usize,
    pub completed: usize,
}

#[must_use]
pub fn funnel(events: &[TelemetryEvent]) -> BTreeMap<String, Funnel> {
    #[derive(Default)]
    struct Sessions<'a> {
        launched: BTreeSet<&'a str>,
        started: BTreeSet<&'a str>,
        terminal: BTreeSet<&'a str>,
        editor: BTreeSet<&'a str>,
        completed: BTreeSet<&'a str>,
    }

    let mut per_module: BTreeMap<&str, Sessions<'_>> = BTreeMap::new();
    for event in events {
        let sessions = per_module.entry(module_of(event)).or_default();
        let session = event.session.as_str();
        if event.is(EventName::ModuleLaunch) {
            sessions.launched.insert(session);
        } else if event.is(EventName::ModuleStart) {
            sessions.started.insert(session);
        } else if event.is(EventName::ModuleStageChange) {
            match event.str_field("to") {
                Some("terminal") => {
                    sessions.terminal.insert(session);
                }
                Some("editor") => {
                    sessions.editor.insert(session);
                }
                _ => {}
            }
        } else if event.is(EventName::ModuleComplete) {
            sessions.completed.insert(session);
        }
    }
    per_module
        .into_iter()
        .map(|(module, sessions)| {
            (
                module.to_string(),
                Funnel {
                    launched: sessions.launched.len(),
                    started: sessions.started.len(),
                    reached_terminal: sessions.terminal.len(),
                    reached_editor: sessions.editor.len(),
                    completed: sessions.completed.len(),
                },
            )
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationOutcome {
    pub successes: usize,
    pub failures: usize,
    /// Mean submissions a session needed before its first pass.
    pub attempts_to_first_success: Option<f64>,
}

#[must_use]
pub fn validation_outcomes(events: &[TelemetryEvent]) -> BTreeMap<String, ValidationOutcome> {
    let mut outcomes: BTreeMap<String, ValidationOutcome> = BTreeMap::new();
    let mut running: BTreeMap<(&str, &str), u64> = BTreeMap::new();
    let mut firsts: BTreeMap<&str, Vec<u64>> = BTreeMap::new();
    let mut passed: BTreeSet<(&str, &str)> = BTreeSet::new();

    for event in sorted(events) {
        if !(event.is(EventName::ValidationResult) || event.is(EventName::KubeLintingAttempt)) {
            continue;
        }
        let module = module_of(event);
        let key = (event.session.as_str(), module);
        let outcome = outcomes.entry(module.to_string()).or_default();
        let success = event.bool_field("success").unwrap_or(false);
        if success {
            outcome.successes += 1;
        } else {
            outcome.failures += 1;
        }
        if passed.contains(&key) {
            continue;
        }
        let attempts = running.entry(key).or_insert(0);
        *attempts += 1;
        if success {
            firsts.entry(module).or_default().push(*attempts);
            passed.insert(key);
        }
    }

    for (module, attempts) in firsts {
        if let Some(outcome) = outcomes.get_mut(module) {
            outcome.attempts_to_first_success = mean(&attempts);
        }
    }
    outcomes
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HelpUsage {
    pub total: usize,
    pub by_source: BTreeMap<String, usize>,
    /// `(step, requests)` for the most requested step.
    pub top_step: Option<(u64, usize)>,
}

#[must_use]
pub fn help_usage(events: &[TelemetryEvent]) -> HelpUsage {
    let mut usage = HelpUsage::default();
    let mut by_step: BTreeMap<u64, usize> = BTreeMap::new();
    for event in events.iter().filter(|e| e.is(EventName::HelpRequest)) {
        usage.total += 1;
        let source = event.str_field("source").unwrap_or("unknown");
        *usage.by_source.entry(source.to_string()).or_default() += 1;
        if let Some(step) = event.field("step").and_then(serde_json::Value::as_u64) {
            *by_step.entry(step).or_default() += 1;
        }
    }
    usage.top_step = top(by_step);
    usage
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QuizFailures {
    pub by_question: BTreeMap<String, usize>,
    pub top: Option<(String, usize)>,
}

#[must_use]
pub fn quiz_failures(events: &[TelemetryEvent]) -> QuizFailures {
    let mut by_question: BTreeMap<String, usize> = BTreeMap::new();
    for event in events.iter().filter(|e| e.is(EventName::PrelabQuizAnswer)) {
        if event.bool_field("correct") == Some(false) {
            let question = event.str_field("question").unwrap_or("unknown");
            *by_question.entry(question.to_string()).or_default() += 1;
        }
    }
    let top = top(by_question.clone());
    QuizFailures { by_question, top }
}

#[must_use]
pub fn event_count(events: &[TelemetryEvent], name: EventName) -> usize {
    events.iter().filter(|event| event.is(name)).count()
}

/// Events per session in timestamp order.
#[must_use]
pub fn session_timelines(events: &[TelemetryEvent]) -> BTreeMap<String, Vec<&TelemetryEvent>> {
    let mut timelines: BTreeMap<String, Vec<&TelemetryEvent>> = BTreeMap::new();
    for event in sorted(events) {
        timelines
            .entry(event.session.clone())
            .or_default()
            .push(event);
    }
    timelines
}

/// Reflection submissions per module.
#[must_use]
pub fn reflection_submissions(events: &[TelemetryEvent]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for event in events.iter().filter(|e| e.is(EventName::ReflectionSubmit)) {
        *counts.entry(module_of(event).to_string()).or_default() += 1;
    }
    counts
}

/// The full instructor dashboard in one serializable value.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSummary {
    pub total_events: usize,
    pub sessions: usize,
    pub average_durations_ms: BTreeMap<String, u64>,
    pub funnel: BTreeMap<String, Funnel>,
    pub validation: BTreeMap<String, ValidationOutcome>,
    pub help: HelpUsage,
    pub quiz_failures: QuizFailures,
    pub solutions_shown: usize,
    pub editor_changes: usize,
    pub reflections: BTreeMap<String, usize>,
}

impl AnalyticsSummary {
    #[must_use]
    pub fn from_events(events: &[TelemetryEvent]) -> Self {
        Self {
            total_events: events.len(),
            sessions: session_timelines(events).len(),
            average_durations_ms: average_durations(&module_durations(events)),
            funnel: funnel(events),
            validation: validation_outcomes(events),
            help: help_usage(events),
            quiz_failures: quiz_failures(events),
            solutions_shown: event_count(events, EventName::ShowSolution),
            editor_changes: event_count(events, EventName::EditorChange),
            reflections: reflection_submissions(events),
        }
    }
}

fn sorted(events: &[TelemetryEvent]) -> Vec<&TelemetryEvent> {
    let mut ordered: Vec<&TelemetryEvent> = events.iter().collect();
    ordered.sort_by_key(|event| event.ts);
    ordered
}

fn top<K: Ord>(counts: BTreeMap<K, usize>) -> Option<(K, usize)> {
    // Ties go to the smallest key.
    counts
        .into_iter()
        .fold(None, |best, (key, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((key, count)),
        })
}

fn mean(values: &[u64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let total = values.iter().sum::<u64>() as f64;
    #[allow(clippy::cast_precision_loss)]
    let count = values.len() as f64;
    Some(total / count)
}
