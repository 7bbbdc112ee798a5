use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use bastion_core::{BastionError, Result};

/// A JSON document on disk used as a tiny transactional database.
///
/// Reads never fail on content: a missing, unreadable, or malformed file is
/// treated as `T::default()`. Transactions within one `JsonFile` are
/// serialised; separate processes writing the same path are last-writer-wins.
pub struct JsonFile<T> {
    path: PathBuf,
    write_lock: Mutex<()>,
    _doc: PhantomData<fn() -> T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            _doc: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the current document.
    pub fn read(&self) -> T {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
            Err(e) => {
                warn!(path = ?self.path, error = %e, "state file unreadable, treating as empty");
                return T::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "state file malformed, treating as empty");
                T::default()
            }
        }
    }

    /// Run `f` against the current document and atomically persist the result.
    /// If `f` returns an error nothing is written.
    pub fn transact<R>(&self, f: impl FnOnce(&mut T) -> Result<R>) -> Result<R> {
        let _guard = self.write_lock.lock();
        let mut doc = self.read();
        let out = f(&mut doc)?;
        self.write_atomic(&doc)?;
        Ok(out)
    }

    fn write_atomic(&self, doc: &T) -> Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        let encoded = serde_json::to_string_pretty(doc)?;
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(encoded.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| {
            BastionError::Storage(format!(
                "failed to replace {}: {}",
                self.path.display(),
                e.error
            ))
        })?;
        debug!(path = ?self.path, bytes = encoded.len(), "state file written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    type Doc = BTreeMap<String, u32>;

    #[test]
    fn missing_file_reads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFile::<Doc>::new(dir.path().join("state.json"));
        assert!(file.read().is_empty());
    }

    #[test]
    fn transact_persists_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let file = JsonFile::<Doc>::new(&path);

        file.transact(|doc| {
            doc.insert("a".into(), 1);
            Ok(())
        })
        .unwrap();

        let reopened = JsonFile::<Doc>::new(&path);
        assert_eq!(reopened.read().get("a"), Some(&1));
    }

    #[test]
    fn failed_transaction_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let file = JsonFile::<Doc>::new(&path);

        let result: Result<()> = file.transact(|doc| {
            doc.insert("a".into(), 1);
            Err(BastionError::Storage("abort".into()))
        });

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn malformed_file_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let file = JsonFile::<Doc>::new(&path);
        assert!(file.read().is_empty());

        // The next write replaces the garbage.
        file.transact(|doc| {
            doc.insert("b".into(), 2);
            Ok(())
        })
        .unwrap();
        assert_eq!(file.read().get("b"), Some(&2));
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFile::<Doc>::new(dir.path().join("state.json"));
        for i in 0..3 {
            file.transact(|doc| {
                doc.insert(format!("k{i}"), i);
                Ok(())
            })
            .unwrap();
        }
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
