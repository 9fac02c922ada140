//! Append-only telemetry with a FIFO cap.
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::KeyValueStore;
use crate::clock::Clock;
use crate::config::LabConfig;
use crate::constants::{
    KEY_TELEMETRY_EVENTS, KEY_TELEMETRY_SESSION, SESSION_ID_PREFIX, TELEMETRY_MAX_EVENTS,
};
use crate::storage::{read_json, remove_key, write_json};

pub type Payload = Map<String, Value>;

/// Turn a `json!({...})` literal into a payload; non-objects become empty.
#[must_use]
pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    ModuleLaunch,
    ModuleStart,
    ModuleStageChange,
    EditorChange,
    ValidationResult,
    KubeLintingAttempt,
    HelpRequest,
    ShowSolution,
    PipelineRun,
    ModuleComplete,
    ReflectionSubmit,
    PrelabQuizAnswer,
}

impl EventName {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ModuleLaunch => "module_launch",
            Self::ModuleStart => "module_start",
            Self::ModuleStageChange => "module_stage_change",
            Self::EditorChange => "editor_change",
            Self::ValidationResult => "validation_result",
            Self::KubeLintingAttempt => "kube_linting_attempt",
            Self::HelpRequest => "help_request",
            Self::ShowSolution => "show_solution",
            Self::PipelineRun => "pipeline_run",
            Self::ModuleComplete => "module_complete",
            Self::ReflectionSubmit => "reflection_submit",
            Self::PrelabQuizAnswer => "prelab_quiz_answer",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored shape: `{ts, session, event, module, ...payload}`.
///
/// `event` stays a string so logs written by other clients still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub ts: u64,
    pub session: String,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(flatten)]
    pub payload: Payload,
}

impl TelemetryEvent {
    #[must_use]
    pub fn is(&self, name: EventName) -> bool {
        self.event == name.as_str()
    }

    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(Value::as_str)
    }

    #[must_use]
    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.field(key).and_then(Value::as_bool)
    }
}

/// Where the engine sends telemetry. Implementations must not fail loudly.
pub trait TelemetrySink {
    fn track(&self, event: EventName, module: Option<&str>, payload: Payload);
}

/// Telemetry persisted through a [`KeyValueStore`].
#[derive(Debug, Clone)]
pub struct TelemetryLog<S, C> {
    store: S,
    clock: C,
    max_events: usize,
    seed: Option<u64>,
}

impl<S, C> TelemetryLog<S, C>
where
    S: KeyValueStore,
    C: Clock,
{
    pub const fn new(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            max_events: TELEMETRY_MAX_EVENTS,
            seed: None,
        }
    }

    /// Log capped by the configured `telemetry_max_events`.
    #[must_use]
    pub fn from_config(store: S, clock: C, config: &LabConfig) -> Self {
        Self::new(store, clock).with_max_events(config.telemetry_max_events)
    }

    /// Cap on stored events; at least one event is always kept.
    #[must_use]
    pub const fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = if max_events == 0 { 1 } else { max_events };
        self
    }

    /// Fix the session id generator, for reproducible QA runs.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Session id, created and persisted on first use.
    pub fn session_id(&self) -> String {
        if let Some(existing) = read_json::<_, String>(&self.store, KEY_TELEMETRY_SESSION) {
            return existing;
        }
        let seed = self.seed.unwrap_or_else(|| self.clock.now_ms());
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let id = format!("{SESSION_ID_PREFIX}{}", to_base36(rng.r#gen::<u64>()));
        write_json(&self.store, KEY_TELEMETRY_SESSION, &id);
        id
    }

    /// Stored entries that decode; unreadable ones are skipped, not dropped.
    #[must_use]
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.raw_entries()
            .into_iter()
            .filter_map(|entry| match serde_json::from_value(entry) {
                Ok(event) => Some(event),
                Err(err) => {
                    log::warn!("skipping unreadable telemetry entry: {err}");
                    None
                }
            })
            .collect()
    }

    pub fn record(&self, event: TelemetryEvent) {
        let entry = match serde_json::to_value(&event) {
            Ok(entry) => entry,
            Err(err) => {
                log::warn!("could not encode telemetry event {}: {err}", event.event);
                return;
            }
        };
        let mut entries = self.raw_entries();
        entries.push(entry);
        if entries.len() > self.max_events {
            let overflow = entries.len() - self.max_events;
            entries.drain(..overflow);
        }
        write_json(&self.store, KEY_TELEMETRY_EVENTS, &entries);
    }

    // The stored array as-is, so entries this build cannot decode survive appends.
    fn raw_entries(&self) -> Vec<Value> {
        read_json(&self.store, KEY_TELEMETRY_EVENTS).unwrap_or_default()
    }

    pub fn clear(&self) {
        remove_key(&self.store, KEY_TELEMETRY_EVENTS);
    }

    /// Pretty JSON export of the whole log.
    #[must_use]
    pub fn export_json(&self) -> String {
        serde_json::to_string_pretty(&self.events()).unwrap_or_else(|_| "[]".to_string())
    }
}

impl<S, C> TelemetrySink for TelemetryLog<S, C>
where
    S: KeyValueStore,
    C: Clock,
{
    fn track(&self, event: EventName, module: Option<&str>, payload: Payload) {
        log::debug!("telemetry {event} module={module:?}");
        self.record(TelemetryEvent {
            ts: self.clock.now_ms(),
            session: self.session_id(),
            event: event.as_str().to_string(),
            module: module.map(str::to_string),
            payload,
        });
    }
}

/// Collects events in memory; clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Rc<RefCell<Vec<TelemetryEvent>>>,
}

impl MemorySink {
    #[must_use]
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.borrow().clone()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.events.borrow().iter().map(|e| e.event.clone()).collect()
    }

    #[must_use]
    pub fn count(&self, name: EventName) -> usize {
        self.events.borrow().iter().filter(|e| e.is(name)).count()
    }
}

impl TelemetrySink for MemorySink {
    fn track(&self, event: EventName, module: Option<&str>, payload: Payload) {
        let mut events = self.events.borrow_mut();
        let ts = u64::try_from(events.len()).unwrap_or(u64::MAX);
        events.push(TelemetryEvent {
            ts,
            session: "memory".to_string(),
            event: event.as_str().to_string(),
            module: module.map(str::to_string),
            payload,
        });
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[usize::try_from(value % 36).unwrap_or(0)]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn log(max: usize) -> (TelemetryLog<MemoryStore, ManualClock>, ManualClock) {
        let clock = ManualClock::starting_at(1_000);
        let log = TelemetryLog::new(MemoryStore::new(), clock.clone())
            .with_max_events(max)
            .with_seed(7);
        (log, clock)
    }

    #[test]
    fn cap_drops_oldest_and_keeps_latest() {
        let (log, clock) = log(3);
        for step in 0..5 {
            clock.advance(1);
            log.track(
                EventName::HelpRequest,
                Some("module-1"),
                payload(json!({"step": step})),
            );
        }
        let events = log.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].field("step"), Some(&json!(2)));
        assert_eq!(events[2].field("step"), Some(&json!(4)));
    }

    #[test]
    fn session_id_is_stable_per_store() {
        let (log, _) = log(10);
        let first = log.session_id();
        assert!(first.starts_with("session-"));
        assert_eq!(log.session_id(), first);
        log.track(EventName::ModuleStart, Some("m"), Payload::new());
        assert_eq!(log.events()[0].session, first);
    }

    #[test]
    fn events_serialize_flat() {
        let (log, _) = log(10);
        log.track(
            EventName::ValidationResult,
            Some("module-2"),
            payload(json!({"success": false, "errors": 2})),
        );
        let exported: Value = serde_json::from_str(&log.export_json()).unwrap();
        let entry = &exported[0];
        assert_eq!(entry["event"], "validation_result");
        assert_eq!(entry["module"], "module-2");
        assert_eq!(entry["success"], false);
        assert_eq!(entry["ts"], 1_000);
        log.clear();
        assert!(log.events().is_empty());
    }

    #[test]
    fn unreadable_entries_survive_appends() {
        let store = MemoryStore::new();
        let clock = ManualClock::starting_at(50);
        let log = TelemetryLog::new(store.clone(), clock).with_seed(3);
        for step in 0..3 {
            log.track(EventName::HelpRequest, Some("module-1"), payload(json!({"step": step})));
        }
        let mut stored: Vec<Value> =
            serde_json::from_str(&store.get(KEY_TELEMETRY_EVENTS).unwrap().unwrap()).unwrap();
        stored.push(json!({"ts": 9, "event": "module_start", "module": "module-1"}));
        store
            .set(KEY_TELEMETRY_EVENTS, &serde_json::to_string(&stored).unwrap())
            .unwrap();

        log.track(EventName::ModuleComplete, Some("module-1"), Payload::new());

        let events = log.events();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].field("step"), Some(&json!(0)));
        assert!(events[3].is(EventName::ModuleComplete));
        let raw: Vec<Value> =
            serde_json::from_str(&store.get(KEY_TELEMETRY_EVENTS).unwrap().unwrap()).unwrap();
        assert_eq!(raw.len(), 5);
        assert_eq!(raw[3]["ts"], 9);
    }

    #[test]
    fn zero_cap_still_keeps_latest_event() {
        let (log, _) = log(0);
        log.track(EventName::ModuleStart, Some("module-1"), Payload::new());
        log.track(EventName::HelpRequest, Some("module-1"), Payload::new());
        let events = log.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].is(EventName::HelpRequest));
    }

    #[test]
    fn configured_cap_applies() {
        let config = LabConfig::from_json(r#"{"telemetry_max_events": 2}"#).unwrap();
        let log = TelemetryLog::from_config(MemoryStore::new(), ManualClock::default(), &config);
        for step in 0..4 {
            log.track(EventName::EditorChange, None, payload(json!({"step": step})));
        }
        let events = log.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].field("step"), Some(&json!(3)));
    }

    #[test]
    fn base36_encodes() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }
}
