//! Test file discovery and loading.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::errors::GradeError;
use crate::model::{OkTest, Test};
use crate::protocols::unlock::apply_saved_unlocks;
use crate::storage::Storage;

/// Recursively collects YAML test files under `root`, sorted by path.
///
/// A file path is returned as is.
pub fn discover_yaml_files<P: AsRef<Path>>(root: P) -> Vec<PathBuf> {
    let root = root.as_ref();
    if root.is_file() {
        return vec![root.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file()
                && e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}

/// Loads one test file.
pub fn load_test(path: &Path) -> Result<OkTest, GradeError> {
    let source = fs::read_to_string(path).map_err(|e| GradeError::load(path, e))?;
    OkTest::from_yaml(&source, path)
}

/// Loads every test found under `paths`, in order, and re-applies answers
/// saved by earlier unlock sessions.
pub fn load_tests(paths: &[PathBuf], store: &Storage) -> Result<Vec<Box<dyn Test>>, GradeError> {
    let mut tests: Vec<Box<dyn Test>> = Vec::new();
    for root in paths {
        if !root.exists() {
            return Err(GradeError::load(root, "test path does not exist"));
        }
        for file in discover_yaml_files(root) {
            let mut test = load_test(&file)?;
            let restored = apply_saved_unlocks(&mut test, store);
            debug!(test = %test.name, file = %file.display(), restored, "loaded test");
            tests.push(Box::new(test));
        }
    }
    info!(count = tests.len(), "tests loaded");
    Ok(tests)
}

/// Keeps the named tests in the order given. An unknown name is an error.
pub fn select_questions(
    tests: Vec<Box<dyn Test>>,
    names: &[String],
) -> Result<Vec<Box<dyn Test>>, GradeError> {
    if names.is_empty() {
        return Ok(tests);
    }
    let mut pool: Vec<Option<Box<dyn Test>>> = tests.into_iter().map(Some).collect();
    let mut selected = Vec::with_capacity(names.len());
    for name in names {
        let slot = pool
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|t| t.name() == name))
            .and_then(Option::take);
        match slot {
            Some(test) => selected.push(test),
            None => {
                return Err(GradeError::InvalidArguments {
                    message: format!("unknown question '{name}'"),
                })
            }
        }
    }
    Ok(selected)
}
