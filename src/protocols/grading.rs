//! The grading orchestrator.
//!
//! Runs the specified tests in order, each through the rate limiter when one
//! is configured, aggregates their results and records a sticky `correct`
//! flag for every test that passes cleanly. Outside verbose mode grading
//! stops at the first test with failed or locked cases.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::cli::output::{print_line, print_progress_bar, OutputSink, Style};
use crate::errors::GradeError;
use crate::model::test::validate_suite;
use crate::model::{Env, Results, Test};
use crate::protocols::report::{ReportRecord, SubmissionArchive};
use crate::protocols::{keys, GradingConfig, Messages, Protocol};
use crate::rate_limit::{Clock, RateLimiter, SystemClock};
use crate::storage::{SharedStore, Storage};

/// Store field holding the sticky "solved once" flag.
pub const CORRECT_FIELD: &str = "correct";

/// Outcome of one grading run.
#[derive(Debug, Default)]
pub struct GradingReport {
    pub totals: Results,
    /// Results of every test that ran, keyed by test name.
    pub analytics: BTreeMap<String, Results>,
    /// Names of the tests that ran, in order.
    pub graded: Vec<String>,
    /// True when tests were left unrun because of a failure or a rejection.
    pub stopped_early: bool,
    /// The rate-limit rejection that ended the run, if any.
    pub rejection: Option<GradeError>,
    pub reports: Vec<ReportRecord>,
}

pub struct GradingProtocol {
    config: GradingConfig,
    store: SharedStore,
    limiter: Option<RateLimiter>,
    clock: Rc<dyn Clock>,
    archive: Option<SubmissionArchive>,
    last_report: Option<GradingReport>,
}

impl GradingProtocol {
    pub fn new(config: GradingConfig, store: SharedStore) -> Self {
        Self {
            config,
            store,
            limiter: None,
            clock: Rc::new(SystemClock),
            archive: None,
            last_report: None,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_archive(mut self, archive: SubmissionArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Report of the last completed run; `None` if grading was skipped.
    pub fn last_report(&self) -> Option<&GradingReport> {
        self.last_report.as_ref()
    }

    /// Runs the tests and writes analytics into `messages`.
    ///
    /// Selection flags are not applied here; see [`apply_selection`].
    pub fn grade(
        &self,
        tests: &mut [Box<dyn Test>],
        messages: &mut Messages,
        output: &mut dyn OutputSink,
    ) -> Result<GradingReport, GradeError> {
        let verbose = self.config.verbose;
        print_line(output, '~');
        output.emit("Running tests");
        output.emit("");

        let mut report = GradingReport::default();
        let mut rate_limit = Map::new();
        let total_tests = tests.len();

        for (index, test) in tests.iter_mut().enumerate() {
            let name = test.name().to_string();
            let is_last = index + 1 == total_tests;

            if let Some(limiter) = &self.limiter {
                match limiter.guard(&name, self.clock.now()) {
                    Ok(record) => {
                        rate_limit.insert(name.clone(), json!({ "attempts": record.attempts }));
                    }
                    Err(GradeError::RateLimited {
                        test,
                        remaining,
                        attempts,
                    }) => {
                        rate_limit.insert(
                            name.clone(),
                            json!({
                                "attempts": attempts,
                                "rejected_for_secs": remaining.as_secs_f64(),
                            }),
                        );
                        let rejection = GradeError::RateLimited {
                            test,
                            remaining,
                            attempts,
                        };
                        output.emit_styled(&rejection.to_string(), Style::Locked);
                        report.rejection = Some(rejection);
                        report.stopped_early = !is_last;
                        break;
                    }
                    Err(other) => return Err(other),
                }
            }

            info!("Running tests for {}", name);
            let results = {
                let mut env = Env::new(output, verbose);
                test.run(&mut env)?
            };

            if results.is_correct() {
                self.mark_correct(&name);
            }

            report.totals += results;
            report.analytics.insert(name.clone(), results);
            report.graded.push(name.clone());

            if let Some(archive) = &self.archive {
                match archive.record(&name, report.totals.is_correct()) {
                    Ok(Some(record)) => report.reports.push(record),
                    Ok(None) => {}
                    Err(e) => warn!(test = %name, error = %e, "could not archive submission"),
                }
            }

            if !verbose && !results.is_correct() {
                debug!(test = %name, "stopping at first failed test");
                report.stopped_early = !is_last;
                break;
            }
        }

        print_progress_bar(output, "Test summary", report.totals, verbose);
        output.emit("");

        messages.insert(keys::GRADING.into(), serde_json::to_value(&report.analytics)?);
        if self.limiter.is_some() {
            messages.insert(keys::RATE_LIMIT.into(), Value::Object(rate_limit));
        }
        if self.archive.is_some() {
            messages.insert(keys::REPORTS.into(), serde_json::to_value(&report.reports)?);
        }
        Ok(report)
    }

    fn mark_correct(&self, name: &str) {
        let mut store = self.store.borrow_mut();
        if store.get(name, CORRECT_FIELD, false) {
            return;
        }
        if let Err(e) = store.store(name, CORRECT_FIELD, true) {
            warn!(test = name, error = %e, "could not persist correctness flag");
        }
    }
}

impl Protocol for GradingProtocol {
    fn name(&self) -> &'static str {
        "grading"
    }

    fn run(
        &mut self,
        tests: &mut [Box<dyn Test>],
        messages: &mut Messages,
        output: &mut dyn OutputSink,
    ) -> Result<(), GradeError> {
        if self.config.score || self.config.unlock {
            debug!("score or unlock requested, skipping grading");
            return Ok(());
        }
        self.config.validate()?;
        apply_selection(tests, &self.config)?;

        let mut report = self.grade(tests, messages, output)?;
        let rejection = report.rejection.take();
        self.last_report = Some(report);
        match rejection {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Applies the suite and case selectors to every test that has suites.
///
/// Every selector is checked before anything runs; an out-of-range one is a
/// configuration error.
pub fn apply_selection(
    tests: &mut [Box<dyn Test>],
    config: &GradingConfig,
) -> Result<(), GradeError> {
    let Some(suite) = config.suite else {
        return Ok(());
    };
    for test in tests.iter_mut() {
        let name = test.name().to_string();
        let Some(collection) = test.suites() else {
            continue;
        };
        let suites = collection.suites_mut();
        validate_suite(&name, suite, suites.len())?;
        if let Some(case) = config.case {
            let selected = &mut suites[suite - 1];
            selected.validate_case(&name, suite, case)?;
            selected.run_only = Some(case);
        }
        collection.set_run_only(Some(suite));
    }
    Ok(())
}

/// Grades `tests` without rate limiting or archiving.
pub fn grade(
    tests: &mut [Box<dyn Test>],
    messages: &mut Messages,
    output: &mut dyn OutputSink,
    store: SharedStore,
    verbose: bool,
) -> Result<GradingReport, GradeError> {
    let config = GradingConfig {
        verbose,
        ..GradingConfig::default()
    };
    GradingProtocol::new(config, store).grade(tests, messages, output)
}

/// Grades against a throwaway in-memory store.
pub fn grade_in_memory(
    tests: &mut [Box<dyn Test>],
    output: &mut dyn OutputSink,
    verbose: bool,
) -> Result<(GradingReport, Messages), GradeError> {
    let mut messages = Messages::new();
    let report = grade(
        tests,
        &mut messages,
        output,
        Storage::in_memory().shared(),
        verbose,
    )?;
    Ok((report, messages))
}
