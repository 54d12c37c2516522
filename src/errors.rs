//! okgrade error handling.
//!
//! Every failure the grading pipeline can report is a [`GradeError`]. Errors
//! are classified by [`ErrorCategory`]: configuration and load errors are
//! fatal and end the process from the CLI layer, a rate-limit rejection is a
//! recoverable typed failure, and storage problems are logged and absorbed by
//! the components that hit them.

use std::path::PathBuf;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Coarse classification used by the CLI to choose how to surface an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Invalid selectors, schedules or flags. Never retried.
    Config,
    /// The caller must wait before the test may be graded again.
    RateLimit,
    /// The persisted store could not be read or written.
    Storage,
    /// Assignment or test files could not be loaded.
    Load,
}

/// Unified error type for the grading pipeline.
#[derive(Debug, Error, Diagnostic)]
pub enum GradeError {
    #[error("suite number must be valid ({available}), got {requested} for test '{test}'")]
    #[diagnostic(
        code(ok::config::invalid_suite),
        help("suites are numbered from 1; this test has {available}")
    )]
    InvalidSuite {
        test: String,
        requested: usize,
        available: usize,
    },

    #[error("case number must be valid ({available}), got {requested} for suite {suite} of test '{test}'")]
    #[diagnostic(
        code(ok::config::invalid_case),
        help("cases are numbered from 1; this suite has {available}")
    )]
    InvalidCase {
        test: String,
        suite: usize,
        requested: usize,
        available: usize,
    },

    #[error("invalid backoff schedule: {reason}")]
    #[diagnostic(code(ok::config::invalid_backoff))]
    InvalidBackoff { reason: String },

    #[error("invalid arguments: {message}")]
    #[diagnostic(code(ok::config::invalid_arguments))]
    InvalidArguments { message: String },

    #[error("no assignment configuration found: {message}")]
    #[diagnostic(
        code(ok::config::missing),
        help("pass --config <FILE> or run from a directory with exactly one .ok file")
    )]
    MissingConfig { message: String },

    #[error("please wait {} seconds before grading '{test}' again (attempt {attempts})", .remaining.as_secs_f64().ceil())]
    #[diagnostic(
        code(ok::rate_limit::cooldown),
        help("graded attempts are rate limited; rejected attempts do not count")
    )]
    RateLimited {
        test: String,
        remaining: Duration,
        attempts: u64,
    },

    #[error("storage error at {}: {source}", .path.display())]
    #[diagnostic(code(ok::storage::io))]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not encode stored value: {0}")]
    #[diagnostic(code(ok::storage::encode))]
    Encode(#[from] serde_json::Error),

    #[error("failed to load {}: {message}", .path.display())]
    #[diagnostic(code(ok::load::invalid_file))]
    Load { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    #[diagnostic(code(ok::io))]
    Io(#[from] std::io::Error),
}

impl GradeError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidSuite { .. }
            | Self::InvalidCase { .. }
            | Self::InvalidBackoff { .. }
            | Self::InvalidArguments { .. }
            | Self::MissingConfig { .. } => ErrorCategory::Config,

            Self::RateLimited { .. } => ErrorCategory::RateLimit,

            Self::Storage { .. } | Self::Encode(_) => ErrorCategory::Storage,

            Self::Load { .. } | Self::Io(_) => ErrorCategory::Load,
        }
    }

    /// Fatal errors terminate the process; the rest are reported and absorbed.
    pub fn is_fatal(&self) -> bool {
        matches!(self.category(), ErrorCategory::Config | ErrorCategory::Load)
    }

    pub(crate) fn load(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Load {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Prints a GradeError with full miette diagnostics.
pub fn print_error(error: GradeError) {
    let report = miette::Report::new(error);
    eprintln!("{report:?}");
}
