//! # bastion-store
//!
//! Persisted state for the extension trust boundary. Every store is a single
//! JSON file mutated through load-modify-write transactions; writes go to a
//! temp file in the same directory which is then renamed over the original,
//! so a crash mid-write never leaves a half-written state file.

pub mod grants;
pub mod json_file;
pub mod records;

pub use grants::GrantStore;
pub use json_file::JsonFile;
pub use records::{ExtensionState, JsonRecordStore, RecordStore};
