//! Autosaved editor drafts.
use crate::KeyValueStore;
use crate::debounce::Debouncer;
use crate::editor::EditorKind;
use crate::storage::remove_key;

#[derive(Debug, Clone)]
pub struct Drafts<S> {
    store: S,
    kind: EditorKind,
    pending: Debouncer<String, String>,
}

impl<S> Drafts<S>
where
    S: KeyValueStore,
{
    pub const fn new(store: S, kind: EditorKind, delay_ms: u64) -> Self {
        Self {
            store,
            kind,
            pending: Debouncer::new(delay_ms),
        }
    }

    pub fn queue(&mut self, file: &str, content: &str, now_ms: u64) {
        self.pending.push(file.to_string(), content.to_string(), now_ms);
    }

    /// Write drafts whose debounce delay has elapsed; returns how many.
    pub fn poll(&mut self, now_ms: u64) -> usize {
        let due = self.pending.poll(now_ms);
        self.write_all(due)
    }

    /// Write every pending draft now.
    pub fn flush(&mut self) -> usize {
        let due = self.pending.flush();
        self.write_all(due)
    }

    #[must_use]
    pub fn load(&self, file: &str) -> Option<String> {
        match self.store.get(&self.kind.draft_key(file)) {
            Ok(draft) => draft,
            Err(err) => {
                log::warn!("could not read draft for {file}: {err}");
                None
            }
        }
    }

    pub fn clear<'a>(&mut self, files: impl IntoIterator<Item = &'a str>) {
        self.pending.cancel();
        for file in files {
            remove_key(&self.store, &self.kind.draft_key(file));
        }
    }

    fn write_all(&self, drafts: Vec<(String, String)>) -> usize {
        let mut written = 0;
        for (file, content) in drafts {
            match self.store.set(&self.kind.draft_key(&file), &content) {
                Ok(()) => written += 1,
                Err(err) => log::warn!("could not autosave {file}: {err}"),
            }
        }
        written
    }
}
