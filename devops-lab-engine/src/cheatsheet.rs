//! Per-module learner notes.
use serde::{Deserialize, Serialize};

use crate::KeyValueStore;
use crate::constants::{KEY_CHEATSHEET_OPEN_PREFIX, KEY_CHEATSHEET_PREFIX};
use crate::storage::{read_json, remove_key, write_json};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheatSheet {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub updated_at: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CheatSheets<S> {
    store: S,
}

impl<S> CheatSheets<S>
where
    S: KeyValueStore,
{
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn load(&self, module_id: &str) -> CheatSheet {
        if module_id.is_empty() {
            return CheatSheet::default();
        }
        read_json(&self.store, &format!("{KEY_CHEATSHEET_PREFIX}{module_id}")).unwrap_or_default()
    }

    pub fn save(&self, module_id: &str, content: &str, now_ms: u64) -> CheatSheet {
        let sheet = CheatSheet {
            content: content.to_string(),
            updated_at: Some(now_ms),
        };
        if !module_id.is_empty() {
            write_json(&self.store, &format!("{KEY_CHEATSHEET_PREFIX}{module_id}"), &sheet);
        }
        sheet
    }

    pub fn clear(&self, module_id: &str) {
        remove_key(&self.store, &format!("{KEY_CHEATSHEET_PREFIX}{module_id}"));
    }

    /// File name and body for a plain-text download.
    #[must_use]
    pub fn export(&self, module_id: &str, module_title: Option<&str>) -> (String, String) {
        let name = module_title.filter(|t| !t.is_empty()).unwrap_or(module_id);
        (format!("{name}-cheatsheet.txt"), self.load(module_id).content)
    }

    pub fn set_open(&self, module_id: &str, open: bool) {
        write_json(&self.store, &format!("{KEY_CHEATSHEET_OPEN_PREFIX}{module_id}"), &open);
    }

    #[must_use]
    pub fn is_open(&self, module_id: &str) -> bool {
        read_json(&self.store, &format!("{KEY_CHEATSHEET_OPEN_PREFIX}{module_id}")).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn save_load_export_clear() {
        let sheets = CheatSheets::new(MemoryStore::new());
        assert_eq!(sheets.load("module-1"), CheatSheet::default());
        sheets.save("module-1", "git switch -c <branch>", 42);
        let loaded = sheets.load("module-1");
        assert_eq!(loaded.updated_at, Some(42));
        let (name, body) = sheets.export("module-1", Some("Git & Docker"));
        assert_eq!(name, "Git & Docker-cheatsheet.txt");
        assert_eq!(body, "git switch -c <branch>");
        sheets.clear("module-1");
        assert!(sheets.load("module-1").content.is_empty());
    }

    #[test]
    fn open_flag_defaults_closed() {
        let sheets = CheatSheets::new(MemoryStore::new());
        assert!(!sheets.is_open("module-2"));
        sheets.set_open("module-2", true);
        assert!(sheets.is_open("module-2"));
    }
}
