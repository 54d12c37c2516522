//! Persistent key-value store shared by locking, correctness flags and the
//! rate limiter.
//!
//! Records live under a namespace (usually a test name) and a field name, and
//! the whole store is one JSON document on disk. Writes go through a temp file
//! that is synced and renamed over the original so a killed process never
//! leaves a half-written store behind. A missing, unreadable or corrupt file
//! opens as an empty store: grading proceeds without history.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::GradeError;

/// Default backing file name, relative to the assignment directory.
pub const DEFAULT_STORAGE_FILE: &str = ".ok_storage";

type Records = BTreeMap<String, BTreeMap<String, Value>>;

/// Single-process handle to the store. Components receive it at construction.
pub type SharedStore = Rc<RefCell<Storage>>;

#[derive(Debug, Default)]
pub struct Storage {
    path: Option<PathBuf>,
    records: Records,
}

impl Storage {
    /// Opens the store at `path`. Never fails; see the module docs.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Records>(&content) {
                Ok(records) => records,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "store is corrupt, starting empty");
                    Records::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no store yet, starting empty");
                Records::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "store is unreadable, starting empty");
                Records::new()
            }
        };
        Self {
            path: Some(path),
            records,
        }
    }

    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedStore {
        Rc::new(RefCell::new(self))
    }

    /// Durably associates `value` with `(namespace, field)`.
    ///
    /// The in-memory record is updated even when the disk write fails, so the
    /// rest of the current run still observes it.
    pub fn store<T: Serialize>(
        &mut self,
        namespace: &str,
        field: &str,
        value: T,
    ) -> Result<(), GradeError> {
        let value = serde_json::to_value(value)?;
        self.records
            .entry(namespace.to_string())
            .or_default()
            .insert(field.to_string(), value);
        self.flush()
    }

    /// Returns the stored value, or `default` when absent or of another type.
    pub fn get<T: DeserializeOwned>(&self, namespace: &str, field: &str, default: T) -> T {
        let Some(value) = self.records.get(namespace).and_then(|f| f.get(field)) else {
            return default;
        };
        match serde_json::from_value::<T>(value.clone()) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!(namespace, field, error = %e, "stored value has unexpected type");
                default
            }
        }
    }

    pub fn contains(&self, namespace: &str, field: &str) -> bool {
        self.records
            .get(namespace)
            .is_some_and(|fields| fields.contains_key(field))
    }

    /// Removes a record. Returns whether it existed.
    pub fn remove(&mut self, namespace: &str, field: &str) -> Result<bool, GradeError> {
        let Some(fields) = self.records.get_mut(namespace) else {
            return Ok(false);
        };
        let existed = fields.remove(field).is_some();
        if fields.is_empty() {
            self.records.remove(namespace);
        }
        if existed {
            self.flush()?;
        }
        Ok(existed)
    }

    /// Field names recorded under `namespace`, in sorted order.
    pub fn fields(&self, namespace: &str) -> Vec<String> {
        self.records
            .get(namespace)
            .map(|fields| fields.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn flush(&self) -> Result<(), GradeError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let payload = serde_json::to_vec_pretty(&self.records)?;
        write_atomic(path, &payload).map_err(|source| GradeError::Storage {
            path: path.clone(),
            source,
        })
    }
}

fn write_atomic(path: &Path, payload: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(payload)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)
}
