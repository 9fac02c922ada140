//! DevOps Lab Engine
//!
//! Platform-agnostic scenario engine for the DevOps lab: scripted terminal
//! steps, simulated editors with validation analyzers, progress persistence
//! and telemetry. This crate has no UI or browser dependencies; hosts supply
//! storage, time and telemetry through the ports defined here.

pub mod analytics;
pub mod analyzer;
pub mod catalog;
pub mod cheatsheet;
pub mod clock;
pub mod config;
pub mod constants;
pub mod debounce;
pub mod drafts;
pub mod editor;
pub mod engine;
pub mod feedback;
pub mod matcher;
pub mod monitoring;
pub mod pipeline;
pub mod progress;
pub mod reflection;
pub mod scenario;
pub mod storage;
pub mod telemetry;

use std::collections::BTreeMap;
use thiserror::Error;

// Re-export commonly used types
pub use analytics::AnalyticsSummary;
pub use analyzer::{
    Analyzer, DockerfileAnalyzer, InfraFacts, InfraTarget, InfrastructureAnalyzer,
    ManifestAnalyzer, ManifestScope, Validation, ValidationProfile,
};
pub use catalog::{
    Catalog, ContentError, Module, ModuleDefinition, ModuleStatus, PrelabActivity, StatusBoard,
};
pub use cheatsheet::{CheatSheet, CheatSheets};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{IacPolicy, LabConfig, PipelineTiming};
pub use editor::{EditorFile, EditorKind, EditorSession};
pub use engine::{
    CommandOutcome, ModuleRun, PendingTransition, Rejection, StartMode, TransitionTarget,
    TransitionTicket,
};
pub use feedback::{Analysis, FeedbackItem, FeedbackKind, Severity, ValidationFinding};
pub use matcher::{Capture, Captures, MatchOutcome, match_input};
pub use monitoring::MetricsSnapshot;
pub use pipeline::{PipelineHistory, PipelineRun, PipelineStage};
pub use progress::{ModuleProgress, ProgressBounds, ProgressRepository, Stage};
pub use reflection::{ReflectionEntry, ReflectionFilter, ReflectionJournal};
pub use scenario::{ScenarioStep, Script, ScriptError, StepId, StepKind};
pub use storage::MemoryStore;
pub use telemetry::{EventName, MemorySink, TelemetryEvent, TelemetryLog, TelemetrySink};

use constants::KEY_ACTIVE_MODULE;
use storage::{read_json, write_json};

/// Trait for abstracting string key/value persistence.
/// Browser hosts back this with local storage.
pub trait KeyValueStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read a raw value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// Write a raw value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store rejects the write (e.g. quota).
    fn set(&self, key: &str, value: &str) -> Result<(), Self::Error>;

    /// Delete a value; deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be modified.
    fn remove(&self, key: &str) -> Result<(), Self::Error>;
}

/// Trait for abstracting content loading.
/// Platform-specific implementations may fetch content instead of embedding it.
pub trait ContentLoader {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the module catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be loaded or fails validation.
    fn load_catalog(&self) -> Result<Catalog, Self::Error>;

    /// Load a named configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is unknown or cannot be parsed.
    fn load_config<T>(&self, config_name: &str) -> Result<T, Self::Error>
    where
        T: serde::de::DeserializeOwned;
}

const BUILTIN_MODULES: &str = include_str!("../assets/modules.json");
const BUILTIN_LAB_CONFIG: &str = include_str!("../assets/lab.json");

/// Content compiled into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinContent;

impl ContentLoader for BuiltinContent {
    type Error = ContentError;

    fn load_catalog(&self) -> Result<Catalog, Self::Error> {
        Catalog::from_json(BUILTIN_MODULES)
    }

    fn load_config<T>(&self, config_name: &str) -> Result<T, Self::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        let raw = match config_name {
            "lab" => BUILTIN_LAB_CONFIG,
            other => return Err(ContentError::UnknownConfig(other.to_string())),
        };
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown module {0}")]
    UnknownModule(String),
    #[error("module {0} is locked")]
    ModuleLocked(String),
    #[error("module {0} has not finished its scenario")]
    NotReadyForReflection(String),
    #[error("module {0} is already completed")]
    AlreadyCompleted(String),
}

/// Main lab engine: owns the catalog and hands out module runs.
pub struct LabEngine<L, S>
where
    L: ContentLoader,
    S: KeyValueStore + Clone,
{
    loader: L,
    store: S,
    catalog: Catalog,
    config: LabConfig,
}

impl<L, S> LabEngine<L, S>
where
    L: ContentLoader,
    S: KeyValueStore + Clone,
{
    /// Create an engine with the provided content loader and storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog or the `lab` configuration cannot be
    /// loaded.
    pub fn new(loader: L, store: S) -> Result<Self, L::Error> {
        let catalog = loader.load_catalog()?;
        let config = loader.load_config("lab")?;
        Ok(Self {
            loader,
            store,
            catalog,
            config,
        })
    }

    /// Replace the tunables, e.g. with an instructor override.
    #[must_use]
    pub fn with_config(mut self, config: LabConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub const fn loader(&self) -> &L {
        &self.loader
    }

    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub const fn config(&self) -> &LabConfig {
        &self.config
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn statuses(&self) -> BTreeMap<String, ModuleStatus> {
        StatusBoard::new(self.store.clone()).statuses(&self.catalog)
    }

    /// The stored active module, or `None` when unset or no longer in the catalog.
    #[must_use]
    pub fn active_module(&self) -> Option<&Module> {
        let id: String = read_json(&self.store, KEY_ACTIVE_MODULE)?;
        let module = self.catalog.module(&id);
        if module.is_none() {
            log::warn!("active module {id} is not in the catalog");
        }
        module
    }

    /// # Errors
    ///
    /// Returns an error if the module is unknown or still locked.
    pub fn set_active(&self, module_id: &str) -> Result<&Module, EngineError> {
        let module = self
            .catalog
            .module(module_id)
            .ok_or_else(|| EngineError::UnknownModule(module_id.to_string()))?;
        if self.statuses().get(module_id) == Some(&ModuleStatus::Locked) {
            return Err(EngineError::ModuleLocked(module_id.to_string()));
        }
        write_json(&self.store, KEY_ACTIVE_MODULE, module_id);
        Ok(module)
    }

    /// Activate a module and enter it.
    ///
    /// # Errors
    ///
    /// Returns an error if the module is unknown or still locked.
    pub fn open_module<T, C>(
        &self,
        module_id: &str,
        mode: StartMode,
        telemetry: T,
        clock: C,
    ) -> anyhow::Result<ModuleRun<S, T, C>>
    where
        T: TelemetrySink,
        C: Clock,
    {
        let module = self.set_active(module_id)?.clone();
        telemetry.track(
            EventName::ModuleLaunch,
            Some(module_id),
            telemetry::payload(serde_json::json!({"title": module.definition().title})),
        );
        Ok(ModuleRun::open(
            module,
            self.config.clone(),
            self.store.clone(),
            telemetry,
            clock,
            mode,
        ))
    }

    /// Submit the reflection for a finished run and unlock dependent modules.
    /// Returns the ids that became unlocked.
    ///
    /// # Errors
    ///
    /// Returns an error if the run has not reached the complete stage, or if
    /// the module was already completed.
    pub fn finish_module<T, C>(
        &self,
        run: &mut ModuleRun<S, T, C>,
        answers: &[(String, String)],
    ) -> Result<Vec<String>, EngineError>
    where
        T: TelemetrySink,
        C: Clock,
    {
        let module_id = run.module().id().to_string();
        if run.stage() != Stage::Complete {
            return Err(EngineError::NotReadyForReflection(module_id));
        }
        if self.statuses().get(&module_id) == Some(&ModuleStatus::Completed) {
            return Err(EngineError::AlreadyCompleted(module_id));
        }
        run.complete_reflection(answers);
        Ok(StatusBoard::new(self.store.clone()).complete(&self.catalog, &module_id))
    }

    #[must_use]
    pub fn reflections(&self) -> ReflectionJournal<S> {
        ReflectionJournal::new(self.store.clone())
    }

    #[must_use]
    pub fn cheat_sheets(&self) -> CheatSheets<S> {
        CheatSheets::new(self.store.clone())
    }

    #[must_use]
    pub fn pipeline_history(&self) -> PipelineHistory<S> {
        PipelineHistory::new(self.store.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> LabEngine<BuiltinContent, MemoryStore> {
        LabEngine::new(BuiltinContent, MemoryStore::new()).expect("builtin content loads")
    }

    #[test]
    fn builtin_content_loads_three_modules() {
        let engine = engine();
        let ids: Vec<&str> = engine.catalog().modules().iter().map(Module::id).collect();
        assert_eq!(ids, vec!["module-1", "module-2", "module-3"]);
        assert_eq!(engine.config(), &LabConfig::default());
    }

    #[test]
    fn unknown_config_name_is_an_error() {
        let err = BuiltinContent
            .load_config::<LabConfig>("nope")
            .expect_err("unknown config");
        assert!(matches!(err, ContentError::UnknownConfig(name) if name == "nope"));
    }

    #[test]
    fn active_module_falls_back_to_none() {
        let engine = engine();
        assert!(engine.active_module().is_none());
        write_json(engine.store(), KEY_ACTIVE_MODULE, "module-99");
        assert!(engine.active_module().is_none());
        engine.set_active("module-1").expect("unlocked");
        assert_eq!(engine.active_module().map(Module::id), Some("module-1"));
    }

    #[test]
    fn locked_modules_cannot_be_opened() {
        let engine = engine();
        let err = engine
            .open_module(
                "module-2",
                StartMode::Resume,
                MemorySink::default(),
                ManualClock::starting_at(0),
            )
            .err()
            .expect("locked");
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::ModuleLocked(id)) if id == "module-2"
        ));
    }

    #[test]
    fn finishing_early_is_rejected() {
        let engine = engine();
        let mut run = engine
            .open_module(
                "module-1",
                StartMode::Restart,
                MemorySink::default(),
                ManualClock::starting_at(0),
            )
            .expect("opens");
        let err = engine.finish_module(&mut run, &[]).expect_err("not complete");
        assert!(matches!(err, EngineError::NotReadyForReflection(_)));
        assert_eq!(engine.statuses()["module-2"], ModuleStatus::Locked);
    }

    #[test]
    fn completed_module_is_finished_only_once() {
        let engine = engine();
        StatusBoard::new(engine.store().clone()).complete(engine.catalog(), "module-1");
        ProgressRepository::new(engine.store().clone()).save(
            "module-1",
            &ModuleProgress {
                stage: Stage::Complete,
                prelab_step: 0,
                scenario_step: 9,
            },
        );
        let sink = MemorySink::default();
        let mut run = engine
            .open_module("module-1", StartMode::Resume, sink.clone(), ManualClock::starting_at(0))
            .expect("opens");
        assert_eq!(run.stage(), Stage::Complete);

        let answers = vec![("Q".to_string(), "A".to_string())];
        let err = engine.finish_module(&mut run, &answers).expect_err("already done");
        assert!(matches!(err, EngineError::AlreadyCompleted(id) if id == "module-1"));
        assert_eq!(sink.count(EventName::ModuleComplete), 0);
        assert_eq!(sink.count(EventName::ReflectionSubmit), 0);
        assert!(engine.reflections().entries().is_empty());
    }
}
