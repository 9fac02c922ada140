//! Persisted per-module progress and its defensive loader.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::KeyValueStore;
use crate::constants::{KEY_CAPTURES_PREFIX, KEY_PROGRESS_PREFIX};
use crate::matcher::Captures;
use crate::scenario::StepId;
use crate::storage::{read_json, remove_key, write_json};

/// Coarse phase of a module run. Ordering follows the only allowed direction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Prelab,
    Terminal,
    Editor,
    Complete,
}

impl Stage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Prelab => "prelab",
            Self::Terminal => "terminal",
            Self::Editor => "editor",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prelab" => Ok(Self::Prelab),
            "terminal" => Ok(Self::Terminal),
            "editor" => Ok(Self::Editor),
            "complete" => Ok(Self::Complete),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleProgress {
    pub stage: Stage,
    pub prelab_step: usize,
    pub scenario_step: StepId,
}

impl Default for ModuleProgress {
    fn default() -> Self {
        Self::fresh()
    }
}

/// Valid ranges for a module's progress fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressBounds {
    pub prelab_count: usize,
    pub script_len: StepId,
}

impl ModuleProgress {
    #[must_use]
    pub const fn fresh() -> Self {
        Self {
            stage: Stage::Prelab,
            prelab_step: 0,
            scenario_step: 1,
        }
    }

    /// Rebuild progress from an untrusted JSON blob, clamping every field.
    ///
    /// Unknown stages fall back to prelab. A known unfinished stage whose
    /// step lies past the script end is treated as complete.
    #[must_use]
    pub fn sanitize(raw: &Value, bounds: ProgressBounds) -> Self {
        let script_len = bounds.script_len.max(1);
        let stage = raw
            .get("stage")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<Stage>().ok());
        let prelab_last = bounds.prelab_count.saturating_sub(1);
        let prelab_step = raw
            .get("prelabStep")
            .and_then(as_index)
            .map_or(0, |step| usize::try_from(step).unwrap_or(usize::MAX))
            .min(prelab_last);
        let requested = raw.get("scenarioStep").and_then(as_index).unwrap_or(1);

        let stage = match stage {
            Some(stage) if stage != Stage::Complete && requested > u64::from(script_len) => {
                Stage::Complete
            }
            Some(stage) => stage,
            None => Stage::Prelab,
        };
        let scenario_step = if stage == Stage::Complete {
            script_len
        } else {
            StepId::try_from(requested.clamp(1, u64::from(script_len))).unwrap_or(1)
        };

        Self {
            stage,
            prelab_step,
            scenario_step,
        }
    }
}

/// Accepts non-negative integers and integral floats; anything else is absent.
fn as_index(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    value
        .as_f64()
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let whole = n.floor() as u64;
            whole
        })
}

/// Progress and captured fragments per module.
#[derive(Debug, Clone)]
pub struct ProgressRepository<S> {
    store: S,
}

impl<S> ProgressRepository<S>
where
    S: KeyValueStore,
{
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    fn progress_key(module_id: &str) -> String {
        format!("{KEY_PROGRESS_PREFIX}{module_id}")
    }

    fn captures_key(module_id: &str) -> String {
        format!("{KEY_CAPTURES_PREFIX}{module_id}")
    }

    pub fn save(&self, module_id: &str, progress: &ModuleProgress) -> bool {
        write_json(&self.store, &Self::progress_key(module_id), progress)
    }

    /// Load and clamp stored progress; `None` when nothing usable is stored.
    #[must_use]
    pub fn load(&self, module_id: &str, bounds: ProgressBounds) -> Option<ModuleProgress> {
        let raw: Value = read_json(&self.store, &Self::progress_key(module_id))?;
        if !raw.is_object() {
            log::warn!("progress for {module_id} is not an object; starting fresh");
            return None;
        }
        Some(ModuleProgress::sanitize(&raw, bounds))
    }

    pub fn clear(&self, module_id: &str) {
        remove_key(&self.store, &Self::progress_key(module_id));
        remove_key(&self.store, &Self::captures_key(module_id));
    }

    #[must_use]
    pub fn load_captures(&self, module_id: &str) -> Captures {
        read_json(&self.store, &Self::captures_key(module_id)).unwrap_or_default()
    }

    pub fn save_captures(&self, module_id: &str, captures: &Captures) -> bool {
        write_json(&self.store, &Self::captures_key(module_id), captures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    const BOUNDS: ProgressBounds = ProgressBounds {
        prelab_count: 3,
        script_len: 9,
    };

    #[test]
    fn roundtrip_returns_equal_progress() {
        let repo = ProgressRepository::new(MemoryStore::new());
        let progress = ModuleProgress {
            stage: Stage::Editor,
            prelab_step: 2,
            scenario_step: 5,
        };
        assert!(repo.save("module-1", &progress));
        assert_eq!(repo.load("module-1", BOUNDS), Some(progress));
        assert_eq!(repo.load("module-2", BOUNDS), None);
    }

    #[test]
    fn corrupted_snapshot_is_clamped() {
        let progress = ModuleProgress::sanitize(
            &json!({"stage": "bogus", "prelabStep": -4, "scenarioStep": 9999}),
            BOUNDS,
        );
        assert_eq!(progress.stage, Stage::Prelab);
        assert_eq!(progress.prelab_step, 0);
        assert_eq!(progress.scenario_step, 9);
    }

    #[test]
    fn unfinished_stage_past_script_end_completes() {
        let progress = ModuleProgress::sanitize(
            &json!({"stage": "terminal", "prelabStep": 12, "scenarioStep": 40}),
            BOUNDS,
        );
        assert_eq!(progress.stage, Stage::Complete);
        assert_eq!(progress.prelab_step, 2);
        assert_eq!(progress.scenario_step, 9);
    }

    #[test]
    fn type_mismatches_default() {
        let progress = ModuleProgress::sanitize(
            &json!({"stage": 3, "prelabStep": "two", "scenarioStep": 0}),
            BOUNDS,
        );
        assert_eq!(progress, ModuleProgress::fresh());
        let floats =
            ModuleProgress::sanitize(&json!({"stage": "editor", "scenarioStep": 4.0}), BOUNDS);
        assert_eq!(floats.scenario_step, 4);
    }

    #[test]
    fn non_object_blob_starts_fresh() {
        let store = MemoryStore::new();
        store.set("moduleProgress:module-1", "\"garbage\"").unwrap();
        store.set("moduleProgress:module-2", "{oops").unwrap();
        let repo = ProgressRepository::new(store);
        assert_eq!(repo.load("module-1", BOUNDS), None);
        assert_eq!(repo.load("module-2", BOUNDS), None);
    }

    #[test]
    fn clear_removes_progress_and_captures() {
        let store = MemoryStore::new();
        let repo = ProgressRepository::new(store.clone());
        let mut captures = Captures::new();
        captures.insert("branch".into(), "fix/bug".into());
        repo.save("module-1", &ModuleProgress::fresh());
        repo.save_captures("module-1", &captures);
        assert_eq!(repo.load_captures("module-1"), captures);
        repo.clear("module-1");
        assert!(store.is_empty());
    }
}
