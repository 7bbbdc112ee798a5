use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bastion_core::{InstalledExtensionRecord, Result};

use crate::json_file::JsonFile;

/// On-disk schema: `{ "installed": { "<id>": <record> } }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtensionState {
    #[serde(default)]
    pub installed: BTreeMap<String, InstalledExtensionRecord>,
}

/// Key-value access to installed extension records.
///
/// Callers only see whole-record operations; how mutations are serialised is
/// up to the implementation.
pub trait RecordStore: Send + Sync {
    fn get(&self, id: &str) -> Option<InstalledExtensionRecord>;

    fn list(&self) -> Vec<InstalledExtensionRecord>;

    fn ids(&self) -> Vec<String> {
        self.list().into_iter().map(|r| r.id).collect()
    }

    /// Insert or replace the record for `record.id`.
    fn put(&self, record: InstalledExtensionRecord) -> Result<()>;

    /// Returns the removed record, if there was one.
    fn remove(&self, id: &str) -> Result<Option<InstalledExtensionRecord>>;

    /// Apply `f` to an existing record and persist it. Returns the updated
    /// record, or `None` when `id` is not installed.
    fn update(
        &self,
        id: &str,
        f: &mut dyn FnMut(&mut InstalledExtensionRecord),
    ) -> Result<Option<InstalledExtensionRecord>>;
}

/// [`RecordStore`] backed by a single JSON state file.
pub struct JsonRecordStore {
    file: JsonFile<ExtensionState>,
}

impl JsonRecordStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn snapshot(&self) -> ExtensionState {
        self.file.read()
    }
}

impl RecordStore for JsonRecordStore {
    fn get(&self, id: &str) -> Option<InstalledExtensionRecord> {
        self.file.read().installed.remove(id)
    }

    fn list(&self) -> Vec<InstalledExtensionRecord> {
        self.file.read().installed.into_values().collect()
    }

    fn ids(&self) -> Vec<String> {
        self.file.read().installed.into_keys().collect()
    }

    fn put(&self, record: InstalledExtensionRecord) -> Result<()> {
        self.file.transact(|state| {
            state.installed.insert(record.id.clone(), record);
            Ok(())
        })
    }

    fn remove(&self, id: &str) -> Result<Option<InstalledExtensionRecord>> {
        self.file.transact(|state| Ok(state.installed.remove(id)))
    }

    fn update(
        &self,
        id: &str,
        f: &mut dyn FnMut(&mut InstalledExtensionRecord),
    ) -> Result<Option<InstalledExtensionRecord>> {
        self.file.transact(|state| {
            Ok(state.installed.get_mut(id).map(|record| {
                f(record);
                record.clone()
            }))
        })
    }
}
