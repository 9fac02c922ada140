//! The handle the page script drives: one engine plus the open module run.
use devops_lab_engine::{
    AnalyticsSummary, BuiltinContent, LabEngine, ModuleRun, StartMode, TelemetryLog,
};
use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::clock::BrowserClock;
use crate::snapshot::{ModuleCard, Snapshot};
use crate::storage::LocalStore;

type Telemetry = TelemetryLog<LocalStore, BrowserClock>;
type Run = ModuleRun<LocalStore, Telemetry, BrowserClock>;

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(|err| JsValue::from_str(&err.to_string()))
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

#[wasm_bindgen]
pub struct LabSession {
    engine: LabEngine<BuiltinContent, LocalStore>,
    telemetry: Telemetry,
    run: Option<Run>,
}

#[wasm_bindgen]
impl LabSession {
    /// # Errors
    /// Fails when `localStorage` is unavailable or the built-in content is invalid.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<Self, JsValue> {
        let store = LocalStore::open().map_err(js_error)?;
        let engine = LabEngine::new(BuiltinContent, store.clone()).map_err(js_error)?;
        let telemetry = TelemetryLog::from_config(store, BrowserClock, engine.config());
        Ok(Self {
            engine,
            telemetry,
            run: None,
        })
    }

    /// Module picker entries with their lock status.
    pub fn modules(&self) -> Result<JsValue, JsValue> {
        let statuses = self.engine.statuses();
        let cards: Vec<ModuleCard> = self
            .engine
            .catalog()
            .modules()
            .iter()
            .map(|module| ModuleCard {
                id: module.id().to_string(),
                title: module.definition().title.clone(),
                status: statuses.get(module.id()).copied().unwrap_or_default(),
            })
            .collect();
        to_js(&cards)
    }

    #[wasm_bindgen(js_name = activeModule)]
    pub fn active_module(&self) -> Option<String> {
        self.engine
            .active_module()
            .map(|module| module.id().to_string())
    }

    /// Enter a module, resuming saved progress unless `restart` is set.
    pub fn open(&mut self, module_id: &str, restart: bool) -> Result<JsValue, JsValue> {
        if let Some(previous) = self.run.as_mut() {
            previous.flush_drafts();
        }
        let mode = if restart {
            StartMode::Restart
        } else {
            StartMode::Resume
        };
        let run = self
            .engine
            .open_module(module_id, mode, self.telemetry.clone(), BrowserClock)
            .map_err(|err| js_error(format!("{err:#}")))?;
        let run = self.run.insert(run);
        to_js(&Snapshot::capture(run, None))
    }

    pub fn submit(&mut self, input: &str) -> Result<JsValue, JsValue> {
        let run = self.run_mut()?;
        let outcome = run.submit_command(input);
        to_js(&Snapshot::capture(run, Some(outcome)))
    }

    pub fn edit(&mut self, file: &str, content: &str) -> Result<JsValue, JsValue> {
        let run = self.run_mut()?;
        run.edit(file, content);
        to_js(&Snapshot::capture(run, None))
    }

    pub fn validate(&mut self) -> Result<JsValue, JsValue> {
        let run = self.run_mut()?;
        run.validate();
        to_js(&Snapshot::capture(run, None))
    }

    #[wasm_bindgen(js_name = revealSolution)]
    pub fn reveal_solution(&mut self) -> Result<JsValue, JsValue> {
        let run = self.run_mut()?;
        run.reveal_solution();
        to_js(&Snapshot::capture(run, None))
    }

    #[wasm_bindgen(js_name = advancePrelab)]
    pub fn advance_prelab(&mut self) -> Result<JsValue, JsValue> {
        let run = self.run_mut()?;
        run.advance_prelab();
        to_js(&Snapshot::capture(run, None))
    }

    /// Returns whether the choice was correct, or `undefined` off a quiz.
    #[wasm_bindgen(js_name = answerQuiz)]
    pub fn answer_quiz(&mut self, choice: usize) -> Result<Option<bool>, JsValue> {
        Ok(self.run_mut()?.answer_quiz(choice))
    }

    /// Called from a page timer: saves due drafts and applies due transitions.
    pub fn tick(&mut self) -> Result<JsValue, JsValue> {
        let run = self.run_mut()?;
        if run.tick() {
            to_js(&Snapshot::capture(run, None))
        } else {
            Ok(JsValue::NULL)
        }
    }

    /// Submit reflection answers (`[[question, answer], ...]`); returns newly unlocked ids.
    pub fn finish(&mut self, answers: JsValue) -> Result<JsValue, JsValue> {
        let answers: Vec<(String, String)> =
            serde_wasm_bindgen::from_value(answers).map_err(js_error)?;
        let Some(run) = self.run.as_mut() else {
            return Err(JsValue::from_str("no module is open"));
        };
        let unlocked = self.engine.finish_module(run, &answers).map_err(js_error)?;
        to_js(&unlocked)
    }

    /// Save pending drafts now, e.g. from `beforeunload`.
    pub fn flush(&mut self) -> usize {
        self.run.as_mut().map_or(0, Run::flush_drafts)
    }

    #[wasm_bindgen(js_name = exportTelemetry)]
    pub fn export_telemetry(&self) -> String {
        self.telemetry.export_json()
    }

    #[wasm_bindgen(js_name = clearTelemetry)]
    pub fn clear_telemetry(&self) {
        self.telemetry.clear();
    }

    pub fn analytics(&self) -> Result<JsValue, JsValue> {
        to_js(&AnalyticsSummary::from_events(&self.telemetry.events()))
    }

    pub fn reflections(&self) -> Result<JsValue, JsValue> {
        to_js(&self.engine.reflections().entries())
    }
}

impl LabSession {
    fn run_mut(&mut self) -> Result<&mut Run, JsValue> {
        self.run
            .as_mut()
            .ok_or_else(|| JsValue::from_str("no module is open"))
    }
}
