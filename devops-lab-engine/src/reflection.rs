//! Reflection journal with legacy-shape normalisation and exports.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;

use crate::KeyValueStore;
use crate::constants::KEY_REFLECTIONS;
use crate::storage::{read_json, write_json};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectionEntry {
    pub id: String,
    pub module: String,
    pub question: String,
    pub answer: String,
    pub tags: Vec<String>,
    pub needs_revision: bool,
    pub timestamp: u64,
}

/// Older clients wrote `prompt`/`text` and numeric ids.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    module: Option<String>,
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    needs_revision: bool,
    #[serde(default)]
    timestamp: Option<u64>,
}

impl RawEntry {
    fn normalize(self, index: usize) -> ReflectionEntry {
        let timestamp = self.timestamp.unwrap_or_default();
        let id = match self.id {
            Some(Value::String(id)) => id,
            Some(Value::Number(id)) => id.to_string(),
            _ => format!("{timestamp}-{index}"),
        };
        let mut tags = Vec::new();
        for tag in self.tags {
            push_tag(&mut tags, &tag);
        }
        ReflectionEntry {
            id,
            module: self.module.unwrap_or_default(),
            question: self.question.or(self.prompt).unwrap_or_default(),
            answer: self.answer.or(self.text).unwrap_or_default(),
            tags,
            needs_revision: self.needs_revision,
            timestamp,
        }
    }
}

fn push_tag(tags: &mut Vec<String>, tag: &str) -> bool {
    let tag = tag.trim();
    if tag.is_empty() || tags.iter().any(|existing| existing == tag) {
        return false;
    }
    tags.push(tag.to_string());
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReflectionFilter {
    pub module: Option<String>,
    pub tag: Option<String>,
    pub needs_revision: Option<bool>,
}

impl ReflectionFilter {
    #[must_use]
    pub fn matches(&self, entry: &ReflectionEntry) -> bool {
        self.module.as_ref().is_none_or(|m| *m == entry.module)
            && self.tag.as_ref().is_none_or(|t| entry.tags.contains(t))
            && self.needs_revision.is_none_or(|flag| flag == entry.needs_revision)
    }
}

#[derive(Debug, Clone)]
pub struct ReflectionJournal<S> {
    store: S,
}

impl<S> ReflectionJournal<S>
where
    S: KeyValueStore,
{
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn entries(&self) -> Vec<ReflectionEntry> {
        let raw: Vec<Value> = read_json(&self.store, KEY_REFLECTIONS).unwrap_or_default();
        raw.into_iter()
            .enumerate()
            .filter_map(|(index, value)| {
                serde_json::from_value::<RawEntry>(value)
                    .ok()
                    .map(|entry| entry.normalize(index))
            })
            .collect()
    }

    #[must_use]
    pub fn filter(&self, filter: &ReflectionFilter) -> Vec<ReflectionEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| filter.matches(entry))
            .collect()
    }

    pub fn add(&self, module: &str, question: &str, answer: &str, now_ms: u64) -> ReflectionEntry {
        let mut entries = self.entries();
        let entry = ReflectionEntry {
            id: format!("{now_ms}-{}", entries.len()),
            module: module.to_string(),
            question: question.to_string(),
            answer: answer.trim().to_string(),
            tags: Vec::new(),
            needs_revision: false,
            timestamp: now_ms,
        };
        entries.push(entry.clone());
        self.save(&entries);
        entry
    }

    /// Returns false when the tag is blank, already present, or the entry is unknown.
    pub fn add_tag(&self, id: &str, tag: &str) -> bool {
        self.update(id, |entry| push_tag(&mut entry.tags, tag))
    }

    pub fn remove_tag(&self, id: &str, tag: &str) -> bool {
        self.update(id, |entry| {
            let before = entry.tags.len();
            entry.tags.retain(|existing| existing != tag);
            entry.tags.len() != before
        })
    }

    pub fn set_needs_revision(&self, id: &str, needs_revision: bool) -> bool {
        self.update(id, |entry| {
            entry.needs_revision = needs_revision;
            true
        })
    }

    pub fn update_answer(&self, id: &str, answer: &str) -> bool {
        self.update(id, |entry| {
            entry.answer = answer.trim().to_string();
            true
        })
    }

    pub fn delete(&self, id: &str) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        if entries.len() == before {
            return false;
        }
        self.save(&entries);
        true
    }

    fn update(&self, id: &str, apply: impl FnOnce(&mut ReflectionEntry) -> bool) -> bool {
        let mut entries = self.entries();
        let Some(entry) = entries.iter_mut().find(|entry| entry.id == id) else {
            return false;
        };
        if !apply(entry) {
            return false;
        }
        self.save(&entries);
        true
    }

    fn save(&self, entries: &[ReflectionEntry]) {
        write_json(&self.store, KEY_REFLECTIONS, entries);
    }
}

#[must_use]
pub fn export_markdown(entries: &[ReflectionEntry]) -> String {
    let mut out = String::from("# Reflection Journal\n");
    for entry in entries {
        let _ = write!(
            out,
            "\n## {}\n\n**Module:** {}\n\n{}\n",
            entry.question, entry.module, entry.answer
        );
        if !entry.tags.is_empty() {
            let _ = write!(out, "\n**Tags:** {}\n", entry.tags.join(", "));
        }
        if entry.needs_revision {
            out.push_str("\n_Needs revision_\n");
        }
    }
    out
}

#[must_use]
pub fn export_text(entries: &[ReflectionEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            format!(
                "[{}] {}\nQ: {}\nA: {}\n",
                entry.module,
                entry.tags.join(", "),
                entry.question,
                entry.answer
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
