//! Module content: metadata, prelab activities, editor seeds, and scripts.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

use crate::KeyValueStore;
use crate::constants::KEY_MODULES;
use crate::editor::{EditorFile, EditorKind};
use crate::progress::ProgressBounds;
use crate::scenario::{ScenarioStep, Script, ScriptError, StepId, StepKind};
use crate::storage::{read_json, write_json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    #[default]
    Locked,
    Unlocked,
    Completed,
}

impl ModuleStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::Unlocked => "unlocked",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrelabActivity {
    ConceptCard {
        title: String,
        body: String,
    },
    ExampleTask {
        title: String,
        body: String,
        #[serde(default)]
        example: Option<String>,
    },
    Quiz {
        question: String,
        options: Vec<String>,
        correct: usize,
        #[serde(default)]
        explanation: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDefinition {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub status: ModuleStatus,
    pub editor: EditorKind,
    pub editor_entry_step_id: StepId,
    #[serde(default)]
    pub prelab: Vec<PrelabActivity>,
    pub files: BTreeMap<String, EditorFile>,
    pub script: Vec<ScenarioStep>,
    #[serde(default)]
    pub reflection_prompts: Vec<String>,
}

/// A module definition with its script checked and compiled.
#[derive(Debug, Clone)]
pub struct Module {
    definition: ModuleDefinition,
    script: Script,
}

impl Module {
    /// # Errors
    ///
    /// Returns an error if the script breaks an integrity rule or refers to
    /// an editor file the module does not ship.
    pub fn new(definition: ModuleDefinition) -> Result<Self, ContentError> {
        let script = Script::new(definition.script.clone(), definition.editor_entry_step_id)
            .map_err(|source| ContentError::Script {
                module: definition.id.clone(),
                source,
            })?;
        for step in script.steps() {
            let file = match &step.kind {
                StepKind::OpenFile { file } | StepKind::MergeConflict { file, .. } => Some(file),
                _ => step.validation.as_ref().and_then(|v| v.file.as_ref()),
            };
            if let Some(file) = file
                && !definition.files.contains_key(file)
            {
                return Err(ContentError::MissingFile {
                    module: definition.id.clone(),
                    step: step.id,
                    file: file.clone(),
                });
            }
        }
        Ok(Self { definition, script })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.definition.id
    }

    #[must_use]
    pub const fn definition(&self) -> &ModuleDefinition {
        &self.definition
    }

    #[must_use]
    pub const fn script(&self) -> &Script {
        &self.script
    }

    #[must_use]
    pub fn bounds(&self) -> ProgressBounds {
        ProgressBounds {
            prelab_count: self.definition.prelab.len(),
            script_len: self.script.len(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content is not valid JSON")]
    Parse(#[from] serde_json::Error),
    #[error("module {module} has an invalid script")]
    Script {
        module: String,
        #[source]
        source: ScriptError,
    },
    #[error("module id {0} is declared twice")]
    DuplicateModule(String),
    #[error("module {module} requires unknown module {prerequisite}")]
    UnknownPrerequisite {
        module: String,
        prerequisite: String,
    },
    #[error("module {module} step {step} refers to missing file {file}")]
    MissingFile {
        module: String,
        step: StepId,
        file: String,
    },
    #[error("no configuration named {0}")]
    UnknownConfig(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogFile {
    modules: Vec<ModuleDefinition>,
}

/// Every module the lab offers, in display order.
#[derive(Debug, Clone)]
pub struct Catalog {
    modules: Vec<Module>,
}

impl Catalog {
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or any module fails its
    /// integrity checks.
    pub fn from_json(json: &str) -> Result<Self, ContentError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::new(file.modules)
    }

    /// # Errors
    ///
    /// Returns an error on duplicate ids, unknown prerequisites, or an
    /// invalid module.
    pub fn new(definitions: Vec<ModuleDefinition>) -> Result<Self, ContentError> {
        let mut seen = BTreeSet::new();
        for definition in &definitions {
            if !seen.insert(definition.id.clone()) {
                return Err(ContentError::DuplicateModule(definition.id.clone()));
            }
        }
        for definition in &definitions {
            if let Some(missing) = definition
                .prerequisites
                .iter()
                .find(|prerequisite| !seen.contains(*prerequisite))
            {
                return Err(ContentError::UnknownPrerequisite {
                    module: definition.id.clone(),
                    prerequisite: missing.clone(),
                });
            }
        }
        let modules = definitions
            .into_iter()
            .map(Module::new)
            .collect::<Result<_, _>>()?;
        Ok(Self { modules })
    }

    #[must_use]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    #[must_use]
    pub fn module(&self, id: &str) -> Option<&Module> {
        self.modules.iter().find(|module| module.id() == id)
    }

    #[must_use]
    pub fn default_statuses(&self) -> BTreeMap<String, ModuleStatus> {
        self.modules
            .iter()
            .map(|module| (module.id().to_string(), module.definition.status))
            .collect()
    }

    /// Mark `completed` done and unlock every module that lists it as a
    /// prerequisite. Returns the ids that changed from locked to unlocked.
    pub fn apply_completion(
        &self,
        statuses: &mut BTreeMap<String, ModuleStatus>,
        completed: &str,
    ) -> Vec<String> {
        statuses.insert(completed.to_string(), ModuleStatus::Completed);
        let mut unlocked = Vec::new();
        for module in &self.modules {
            if !module.definition.prerequisites.iter().any(|p| p == completed) {
                continue;
            }
            let status = statuses
                .entry(module.id().to_string())
                .or_insert(ModuleStatus::Locked);
            if *status == ModuleStatus::Locked {
                *status = ModuleStatus::Unlocked;
                unlocked.push(module.id().to_string());
            }
        }
        unlocked
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StatusEntry {
    id: String,
    status: ModuleStatus,
}

/// Persisted locked/unlocked/completed board.
#[derive(Debug, Clone)]
pub struct StatusBoard<S> {
    store: S,
}

impl<S> StatusBoard<S>
where
    S: KeyValueStore,
{
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Stored statuses layered over catalog defaults; unknown ids are dropped.
    #[must_use]
    pub fn statuses(&self, catalog: &Catalog) -> BTreeMap<String, ModuleStatus> {
        let mut statuses = catalog.default_statuses();
        let stored: Vec<StatusEntry> = read_json(&self.store, KEY_MODULES).unwrap_or_default();
        for entry in stored {
            if let Some(status) = statuses.get_mut(&entry.id) {
                *status = entry.status;
            }
        }
        statuses
    }

    pub fn complete(&self, catalog: &Catalog, module_id: &str) -> Vec<String> {
        let mut statuses = self.statuses(catalog);
        let unlocked = catalog.apply_completion(&mut statuses, module_id);
        let entries: Vec<StatusEntry> = catalog
            .modules()
            .iter()
            .filter_map(|module| {
                statuses.get(module.id()).map(|status| StatusEntry {
                    id: module.id().to_string(),
                    status: *status,
                })
            })
            .collect();
        write_json(&self.store, KEY_MODULES, &entries);
        log::info!("module {module_id} completed; unlocked {unlocked:?}");
        unlocked
    }
}
