//! Submission snapshots for the external reporting collaborator.
//!
//! After each graded test the student's source file is copied into
//! `right_submissions/` or `wrong_submissions/` under the archive root. A
//! correct attempt also yields a [`ReportRecord`] pairing the new correct
//! code with the latest incorrect one. Sending the record anywhere is not
//! this crate's business.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::GradeError;

pub const RIGHT_DIR: &str = "right_submissions";
pub const WRONG_DIR: &str = "wrong_submissions";

/// What the reporting collaborator receives for a correct attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReportRecord {
    pub end_point: String,
    pub question: String,
    pub incorrect_code: String,
    pub correct_code: String,
}

#[derive(Debug, Clone)]
pub struct SubmissionArchive {
    root: PathBuf,
    source: PathBuf,
    endpoint: String,
}

impl SubmissionArchive {
    pub fn new(
        root: impl Into<PathBuf>,
        source: impl Into<PathBuf>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            source: source.into(),
            endpoint: endpoint.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Snapshots the source file after grading `question`.
    ///
    /// Returns a report only for correct attempts.
    pub fn record(
        &self,
        question: &str,
        correct: bool,
    ) -> Result<Option<ReportRecord>, GradeError> {
        let right_dir = self.root.join(RIGHT_DIR);
        let wrong_dir = self.root.join(WRONG_DIR);
        fs::create_dir_all(&right_dir)?;
        fs::create_dir_all(&wrong_dir)?;

        if !correct {
            let saved = self.snapshot(&wrong_dir, "wrong_sub")?;
            debug!(path = %saved.display(), "saved incorrect submission");
            return Ok(None);
        }

        let wrong_count = count_entries(&wrong_dir)?;
        let saved = self.snapshot(&right_dir, "right_sub")?;
        debug!(path = %saved.display(), "saved correct submission");
        let correct_code = fs::read_to_string(&saved)?;

        let latest_wrong = wrong_dir.join(self.file_name("wrong_sub", wrong_count));
        let incorrect_code = match fs::read_to_string(&latest_wrong) {
            Ok(code) => code,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(ReportRecord {
            end_point: self.endpoint.clone(),
            question: question.to_string(),
            incorrect_code,
            correct_code,
        }))
    }

    fn snapshot(&self, dir: &Path, prefix: &str) -> Result<PathBuf, GradeError> {
        let next = count_entries(dir)? + 1;
        let target = dir.join(self.file_name(prefix, next));
        fs::copy(&self.source, &target).map_err(|e| GradeError::load(&self.source, e))?;
        Ok(target)
    }

    fn file_name(&self, prefix: &str, number: usize) -> String {
        match self.source.extension() {
            Some(ext) => format!("{prefix}{number}.{}", ext.to_string_lossy()),
            None => format!("{prefix}{number}"),
        }
    }
}

fn count_entries(dir: &Path) -> Result<usize, GradeError> {
    Ok(fs::read_dir(dir)?.filter_map(Result::ok).count())
}
