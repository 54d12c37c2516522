//! The `ok` command-line interface.
//!
//! Loads the assignment, builds the protocol pipeline from the flags and runs
//! it. This is the only layer that turns a [`GradeError`] into a printed
//! diagnostic and an exit status.

use std::path::Path;
use std::process;

use clap::Parser;
use tracing::debug;

use crate::cli::args::OkArgs;
use crate::cli::output::{print_line, OutputSink, StdoutSink, Style};
use crate::config::AssignmentConfig;
use crate::errors::{print_error, GradeError};
use crate::loader;
use crate::logging;
use crate::protocols::{
    ConsoleInteract, GradingProtocol, Messages, Pipeline, ScoringProtocol, SubmissionArchive,
    UnlockProtocol,
};
use crate::rate_limit::RateLimiter;
use crate::storage::Storage;

pub mod args;
pub mod output;

/// Exit status for configuration and load errors.
pub const EXIT_FATAL: i32 = 1;
/// Exit status for a rejected attempt or another recoverable error.
pub const EXIT_REJECTED: i32 = 2;

/// The main entry point for the CLI.
pub fn run() {
    let args = OkArgs::parse();
    logging::init(args.verbose);

    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            print_error(e.into());
            process::exit(EXIT_FATAL);
        }
    };

    let mut output = StdoutSink::new();
    if let Err(e) = execute(&args, &cwd, &mut output) {
        let code = if e.is_fatal() { EXIT_FATAL } else { EXIT_REJECTED };
        print_error(e);
        process::exit(code);
    }
}

/// Runs one invocation of the client from `cwd`.
pub fn execute(
    args: &OkArgs,
    cwd: &Path,
    output: &mut dyn OutputSink,
) -> Result<Messages, GradeError> {
    let config = args.grading_config();
    config.validate()?;

    let assignment = AssignmentConfig::load(args.config.as_deref(), cwd)?;
    let backoff = assignment.backoff()?;
    let storage_path = match &args.storage {
        Some(path) => cwd.join(path),
        None => assignment.storage_path(),
    };
    let store = Storage::open(storage_path).shared();

    let tests = loader::load_tests(&assignment.test_paths(), &store.borrow())?;
    let mut tests = loader::select_questions(tests, &args.questions)?;

    print_line(output, '=');
    output.emit_styled(&format!("Assignment: {}", assignment.name), Style::Header);
    output.emit(&format!("OK, version v{}", env!("CARGO_PKG_VERSION")));
    print_line(output, '=');
    output.emit("");

    let mut grading = GradingProtocol::new(config.clone(), store.clone())
        .with_rate_limiter(RateLimiter::new(backoff, store.clone()));
    if !args.no_archive {
        if let Some(source) = assignment.source_file() {
            grading = grading.with_archive(SubmissionArchive::new(
                assignment.submissions_dir(),
                source,
                assignment.endpoint.clone(),
            ));
        }
    }

    let mut pipeline = Pipeline::new()
        .with(UnlockProtocol::new(
            config.clone(),
            store.clone(),
            Box::new(ConsoleInteract::stdio()),
        ))
        .with(grading)
        .with(ScoringProtocol::new(config));

    let mut messages = Messages::new();
    let result = pipeline.run_with(&mut tests, &mut messages, output);
    debug!(keys = ?messages.keys().collect::<Vec<_>>(), "pipeline finished");
    result.map(|()| messages)
}
