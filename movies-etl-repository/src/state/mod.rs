//! Persistent cursor state.
//!
//! Stores resume tokens in a single JSON object on local storage, replaced atomically
//! on every update.

mod json_file;

pub use json_file::JsonFileStateStore;
