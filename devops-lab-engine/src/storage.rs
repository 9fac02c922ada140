//! JSON helpers over the key/value port, plus an in-memory store.
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::rc::Rc;

use crate::KeyValueStore;

/// Read and decode `key`. Storage errors and undecodable payloads are logged
/// and read as absent.
pub fn read_json<S, T>(store: &S, key: &str) -> Option<T>
where
    S: KeyValueStore + ?Sized,
    T: DeserializeOwned,
{
    let raw = match store.get(key) {
        Ok(raw) => raw?,
        Err(err) => {
            log::warn!("could not read {key}: {err}");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            log::warn!("ignoring malformed {key}: {err}");
            None
        }
    }
}

/// Encode and write `value`; failures are logged and swallowed.
pub fn write_json<S, T>(store: &S, key: &str, value: &T) -> bool
where
    S: KeyValueStore + ?Sized,
    T: Serialize + ?Sized,
{
    let payload = match serde_json::to_string(value) {
        Ok(payload) => payload,
        Err(err) => {
            log::warn!("could not encode {key}: {err}");
            return false;
        }
    };
    match store.set(key, &payload) {
        Ok(()) => true,
        Err(err) => {
            log::warn!("could not write {key}: {err}");
            false
        }
    }
}

pub fn remove_key<S>(store: &S, key: &str)
where
    S: KeyValueStore + ?Sized,
{
    if let Err(err) = store.remove(key) {
        log::warn!("could not remove {key}: {err}");
    }
}

/// Shared in-memory store; clones see the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Rc<RefCell<BTreeMap<String, String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }

    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.borrow().clone()
    }
}

impl KeyValueStore for MemoryStore {
    type Error = Infallible;

    fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Self::Error> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}
