//! The grading model: tests own suites, suites own cases.
//!
//! - [`case`]: the [`Case`] trait, the lock state machine and [`ConceptCase`]
//! - [`suite`]: ordered cases with sticky locking and a `run_only` selector
//! - [`test`]: the [`Test`] trait, its suite capability and [`OkTest`]

use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::cli::output::OutputSink;

pub mod case;
pub mod suite;

pub use case::{Case, ConceptCase, Interact};
pub use suite::Suite;
pub use test::{OkTest, SuiteCollection, Test};

/// Pass/fail/lock counts for one run at any level of the hierarchy.
///
/// `passed + failed + locked` always equals the number of cases the run
/// attempted or skipped as locked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Results {
    pub passed: usize,
    pub failed: usize,
    pub locked: usize,
}

impl Results {
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.locked
    }

    /// True when nothing failed and nothing was locked.
    pub fn is_correct(&self) -> bool {
        self.failed == 0 && self.locked == 0
    }
}

impl Add for Results {
    type Output = Results;

    fn add(self, rhs: Results) -> Results {
        Results {
            passed: self.passed + rhs.passed,
            failed: self.failed + rhs.failed,
            locked: self.locked + rhs.locked,
        }
    }
}

impl AddAssign for Results {
    fn add_assign(&mut self, rhs: Results) {
        *self = *self + rhs;
    }
}

/// Lock state of a case. `Unknown` runs like `Unlocked`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum LockState {
    #[default]
    Unknown,
    Locked,
    Unlocked,
}

impl LockState {
    pub fn is_locked(self) -> bool {
        self == LockState::Locked
    }
}

impl From<Option<bool>> for LockState {
    fn from(locked: Option<bool>) -> Self {
        match locked {
            None => LockState::Unknown,
            Some(true) => LockState::Locked,
            Some(false) => LockState::Unlocked,
        }
    }
}

impl From<LockState> for Option<bool> {
    fn from(state: LockState) -> Self {
        match state {
            LockState::Unknown => None,
            LockState::Locked => Some(true),
            LockState::Unlocked => Some(false),
        }
    }
}

/// The environment a test runs in.
pub struct Env<'a> {
    pub verbose: bool,
    pub output: &'a mut dyn OutputSink,
}

impl<'a> Env<'a> {
    pub fn new(output: &'a mut dyn OutputSink, verbose: bool) -> Self {
        Self { verbose, output }
    }
}

/// Default one-way digest used to lock answers: lowercase hex SHA-256.
pub fn hash_answer(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}
