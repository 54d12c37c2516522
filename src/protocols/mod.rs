//! Grading stages composed over a shared context.
//!
//! A [`Pipeline`] runs [`Protocol`]s in order over the same tests and the same
//! [`Messages`] map. Each protocol reads the flags it cares about from its
//! [`GradingConfig`] and leaves its analytics in the map under its own key.

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::cli::output::OutputSink;
use crate::errors::GradeError;
use crate::model::Test;

pub mod grading;
pub mod report;
pub mod scoring;
pub mod unlock;

pub use grading::{grade, GradingProtocol, GradingReport};
pub use report::{ReportRecord, SubmissionArchive};
pub use scoring::ScoringProtocol;
pub use unlock::{ConsoleInteract, UnlockProtocol};

/// Shared context passed through the pipeline, keyed by protocol.
pub type Messages = BTreeMap<String, Value>;

/// Well-known keys protocols write under.
pub mod keys {
    pub const GRADING: &str = "grading";
    pub const RATE_LIMIT: &str = "rate_limit";
    pub const REPORTS: &str = "reports";
    pub const SCORING: &str = "scoring";
    pub const UNLOCK: &str = "unlock";
}

/// Flags that select what a run does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GradingConfig {
    /// Score-only request; grading is skipped.
    pub score: bool,
    /// Unlock-only request; grading is skipped.
    pub unlock: bool,
    /// 1-based suite selector applied to every test with suites.
    pub suite: Option<usize>,
    /// 1-based case selector within the selected suite.
    pub case: Option<usize>,
    pub verbose: bool,
}

impl GradingConfig {
    pub fn validate(&self) -> Result<(), GradeError> {
        if self.case.is_some() && self.suite.is_none() {
            return Err(GradeError::InvalidArguments {
                message: "a case number requires a suite number".into(),
            });
        }
        Ok(())
    }
}

/// One stage of the grading pipeline.
pub trait Protocol {
    fn name(&self) -> &'static str;

    fn run(
        &mut self,
        tests: &mut [Box<dyn Test>],
        messages: &mut Messages,
        output: &mut dyn OutputSink,
    ) -> Result<(), GradeError>;
}

/// Runs protocols in order, stopping at the first error.
#[derive(Default)]
pub struct Pipeline {
    protocols: Vec<Box<dyn Protocol>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, protocol: impl Protocol + 'static) -> Self {
        self.protocols.push(Box::new(protocol));
        self
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }

    pub fn run(
        &mut self,
        tests: &mut [Box<dyn Test>],
        output: &mut dyn OutputSink,
    ) -> Result<Messages, GradeError> {
        let mut messages = Messages::new();
        self.run_with(tests, &mut messages, output)?;
        Ok(messages)
    }

    /// Like [`Pipeline::run`], but keeps whatever earlier protocols wrote
    /// when a later one fails.
    pub fn run_with(
        &mut self,
        tests: &mut [Box<dyn Test>],
        messages: &mut Messages,
        output: &mut dyn OutputSink,
    ) -> Result<(), GradeError> {
        for protocol in &mut self.protocols {
            debug!(protocol = protocol.name(), "running protocol");
            protocol.run(tests, messages, output)?;
        }
        Ok(())
    }
}
