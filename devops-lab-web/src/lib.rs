#![forbid(unsafe_code)]
//! Browser bindings for the DevOps lab engine.
//!
//! Local storage backs the engine's key/value port, `Date.now()` backs its
//! clock, and [`session::LabSession`] is the handle the page script drives.
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

pub mod clock;
pub mod dom;
pub mod session;
pub mod snapshot;
pub mod storage;

pub use clock::BrowserClock;
pub use session::LabSession;
pub use snapshot::{EditorView, ModuleCard, Snapshot};
pub use storage::{LocalStore, StoreError};

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
    log::debug!("devops lab bindings loaded");
}
