//! Shared fixtures: throwaway assignment directories with a `.ok` config,
//! a student source file and YAML test files.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use okgrade::model::hash_answer;
use okgrade::storage::DEFAULT_STORAGE_FILE;
use okgrade::Storage;
use tempfile::TempDir;

/// One case of a fixture test: its answer and whether it starts locked.
#[derive(Debug, Clone, Copy)]
pub struct CaseSpec {
    pub answer: &'static str,
    pub locked: bool,
}

pub fn open(answer: &'static str) -> CaseSpec {
    CaseSpec {
        answer,
        locked: false,
    }
}

pub fn locked(answer: &'static str) -> CaseSpec {
    CaseSpec {
        answer,
        locked: true,
    }
}

pub struct Assignment {
    dir: TempDir,
}

impl Assignment {
    pub fn new(backoff: &[u64]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = serde_json::json!({
            "name": "Homework 2",
            "endpoint": "cal/cs61a/hw02",
            "src": ["hw02.py"],
            "tests": ["tests"],
            "backoff": backoff,
        });
        fs::write(dir.path().join("hw02.ok"), config.to_string()).unwrap();
        fs::write(dir.path().join("hw02.py"), "def square(x):\n    return x * x\n").unwrap();
        fs::create_dir(dir.path().join("tests")).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn tests_dir(&self) -> PathBuf {
        self.path().join("tests")
    }

    pub fn storage_path(&self) -> PathBuf {
        self.path().join(DEFAULT_STORAGE_FILE)
    }

    /// Reopens the on-disk store, as a new process would.
    pub fn storage(&self) -> Storage {
        Storage::open(self.storage_path())
    }

    /// Writes `tests/<name>.yaml` with one scored suite per entry.
    pub fn add_test(&self, name: &str, suites: &[&[CaseSpec]]) {
        let mut yaml = format!("name: {name}\npoints: 1\nsuites:\n");
        for cases in suites {
            yaml.push_str("  - scored: true\n    cases:\n");
            for (i, case) in cases.iter().enumerate() {
                let answer = if case.locked {
                    hash_answer(case.answer)
                } else {
                    case.answer.to_string()
                };
                yaml.push_str(&format!(
                    "      - question: \"{name} question {}\"\n        answer: \"{answer}\"\n        locked: {}\n",
                    i + 1,
                    case.locked
                ));
            }
        }
        fs::write(self.tests_dir().join(format!("{name}.yaml")), yaml).unwrap();
    }
}
