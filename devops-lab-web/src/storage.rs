//! `localStorage` adapter for the engine's key/value port.
use devops_lab_engine::KeyValueStore;
use web_sys::Storage;

use crate::dom;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("localStorage is unavailable: {0}")]
    Unavailable(String),
    #[error("storage error: {0}")]
    Js(String),
}

#[derive(Debug, Clone)]
pub struct LocalStore {
    storage: Storage,
}

impl LocalStore {
    /// # Errors
    /// Returns an error if the page has no usable `localStorage` (e.g. private mode).
    pub fn open() -> Result<Self, StoreError> {
        dom::local_storage()
            .map(|storage| Self { storage })
            .map_err(|err| StoreError::Unavailable(dom::js_message(&err)))
    }
}

impl KeyValueStore for LocalStore {
    type Error = StoreError;

    fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        self.storage
            .get_item(key)
            .map_err(|err| StoreError::Js(dom::js_message(&err)))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        self.storage
            .set_item(key, value)
            .map_err(|err| StoreError::Js(dom::js_message(&err)))
    }

    fn remove(&self, key: &str) -> Result<(), Self::Error> {
        self.storage
            .remove_item(key)
            .map_err(|err| StoreError::Js(dom::js_message(&err)))
    }
}
