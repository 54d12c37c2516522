//! Assignment configuration (`*.ok` files).
//!
//! ```json
//! {
//!   "name": "Homework 2",
//!   "endpoint": "cal/cs61a/hw02",
//!   "src": ["hw02.py"],
//!   "tests": ["tests/"],
//!   "backoff": [0, 0, 0, 30, 60, 120, 300, 600]
//! }
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::errors::GradeError;
use crate::rate_limit::Backoff;
use crate::storage::DEFAULT_STORAGE_FILE;

pub const CONFIG_EXTENSION: &str = "ok";
pub const DEFAULT_SUBMISSIONS_DIR: &str = "submissions";

#[derive(Debug, Clone, Deserialize)]
pub struct AssignmentConfig {
    pub name: String,
    #[serde(default)]
    pub endpoint: String,
    /// Student source files.
    #[serde(default)]
    pub src: Vec<PathBuf>,
    /// Test files or directories searched for test files.
    #[serde(default)]
    pub tests: Vec<PathBuf>,
    /// Cooldown schedule in seconds.
    #[serde(default)]
    pub backoff: Option<Vec<u64>>,
    #[serde(default)]
    pub storage: Option<PathBuf>,
    #[serde(default)]
    pub submissions: Option<PathBuf>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl AssignmentConfig {
    /// Loads `path`, or the single `*.ok` file in `cwd` when no path is given.
    pub fn load(path: Option<&Path>, cwd: &Path) -> Result<Self, GradeError> {
        let resolved = match path {
            Some(path) => cwd.join(path),
            None => find_config(cwd)?,
        };
        debug!(path = %resolved.display(), "loading assignment config");
        let source = fs::read_to_string(&resolved).map_err(|e| GradeError::load(&resolved, e))?;
        let mut config = Self::parse(&source, &resolved)?;
        config.base_dir = resolved
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.to_path_buf());
        Ok(config)
    }

    /// Parses a config body. `origin` is only used in error messages.
    pub fn parse(source: &str, origin: &Path) -> Result<Self, GradeError> {
        let config: Self =
            serde_json::from_str(source).map_err(|e| GradeError::load(origin, e))?;
        config.backoff()?;
        Ok(config)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn backoff(&self) -> Result<Backoff, GradeError> {
        match &self.backoff {
            Some(secs) => Backoff::from_secs(secs),
            None => Ok(Backoff::default()),
        }
    }

    pub fn storage_path(&self) -> PathBuf {
        self.resolve(self.storage.as_deref().unwrap_or(Path::new(DEFAULT_STORAGE_FILE)))
    }

    pub fn submissions_dir(&self) -> PathBuf {
        self.resolve(
            self.submissions
                .as_deref()
                .unwrap_or(Path::new(DEFAULT_SUBMISSIONS_DIR)),
        )
    }

    /// First student source file, if any.
    pub fn source_file(&self) -> Option<PathBuf> {
        self.src.first().map(|p| self.resolve(p))
    }

    pub fn test_paths(&self) -> Vec<PathBuf> {
        self.tests.iter().map(|p| self.resolve(p)).collect()
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.base_dir.join(path)
    }
}

/// Finds the only `*.ok` file directly inside `dir`.
pub fn find_config(dir: &Path) -> Result<PathBuf, GradeError> {
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file() && path.extension().is_some_and(|ext| ext == CONFIG_EXTENSION)
        })
        .collect();
    candidates.sort();

    match candidates.len() {
        0 => Err(GradeError::MissingConfig {
            message: format!("no .ok configuration file found in {}", dir.display()),
        }),
        1 => Ok(candidates.remove(0)),
        n => Err(GradeError::MissingConfig {
            message: format!(
                "{n} .ok configuration files found in {}; choose one with --config",
                dir.display()
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "name": "Homework 2",
        "endpoint": "cal/cs61a/hw02",
        "src": ["hw02.py"],
        "tests": ["tests"],
        "backoff": [0, 5]
    }"#;

    #[test]
    fn finds_single_config_and_resolves_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hw02.ok"), CONFIG).unwrap();
        let config = AssignmentConfig::load(None, dir.path()).unwrap();
        assert_eq!(config.name, "Homework 2");
        assert_eq!(config.source_file(), Some(dir.path().join("hw02.py")));
        assert_eq!(config.test_paths(), vec![dir.path().join("tests")]);
        assert_eq!(config.storage_path(), dir.path().join(DEFAULT_STORAGE_FILE));
        assert_eq!(config.submissions_dir(), dir.path().join(DEFAULT_SUBMISSIONS_DIR));
        assert_eq!(config.backoff().unwrap(), Backoff::from_secs(&[0, 5]).unwrap());
    }

    #[test]
    fn missing_or_ambiguous_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AssignmentConfig::load(None, dir.path()),
            Err(GradeError::MissingConfig { .. })
        ));
        fs::write(dir.path().join("a.ok"), CONFIG).unwrap();
        fs::write(dir.path().join("b.ok"), CONFIG).unwrap();
        assert!(matches!(
            AssignmentConfig::load(None, dir.path()),
            Err(GradeError::MissingConfig { .. })
        ));
        assert!(AssignmentConfig::load(Some(Path::new("b.ok")), dir.path()).is_ok());
    }

    #[test]
    fn default_backoff_when_absent() {
        let config =
            AssignmentConfig::parse(r#"{"name": "hw"}"#, Path::new("hw.ok")).unwrap();
        assert_eq!(config.backoff().unwrap(), Backoff::default());
    }

    #[test]
    fn decreasing_backoff_is_rejected() {
        let err = AssignmentConfig::parse(r#"{"name": "hw", "backoff": [10, 1]}"#, Path::new("hw.ok"))
            .unwrap_err();
        assert!(matches!(err, GradeError::InvalidBackoff { .. }));
    }

    #[test]
    fn malformed_json_is_a_load_error() {
        let err = AssignmentConfig::parse("{", Path::new("hw.ok")).unwrap_err();
        assert!(matches!(err, GradeError::Load { .. }));
    }
}
