//! Ordered groups of cases.

use tracing::info;

use crate::cli::output::OutputBuffer;
use crate::errors::GradeError;
use crate::model::{Case, Env, Results};

/// An ordered sequence of cases inside a test.
pub struct Suite {
    /// Whether the suite counts towards the test's score.
    pub scored: bool,
    /// 1-based case selector; `None` runs every case.
    pub run_only: Option<usize>,
    pub cases: Vec<Box<dyn Case>>,
}

impl Suite {
    pub fn new(cases: Vec<Box<dyn Case>>) -> Self {
        Self {
            scored: false,
            run_only: None,
            cases,
        }
    }

    pub fn scored(mut self, scored: bool) -> Self {
        self.scored = scored;
        self
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Checks a 1-based case selector against this suite.
    pub fn validate_case(
        &self,
        test_name: &str,
        suite_number: usize,
        case: usize,
    ) -> Result<(), GradeError> {
        if case == 0 || case > self.cases.len() {
            return Err(GradeError::InvalidCase {
                test: test_name.to_string(),
                suite: suite_number,
                requested: case,
                available: self.cases.len(),
            });
        }
        Ok(())
    }

    /// Runs the cases in order.
    ///
    /// Once a locked case is seen, it and every later case count as locked
    /// without running. An out-of-range `run_only` is a configuration error.
    pub fn run(
        &mut self,
        test_name: &str,
        suite_number: usize,
        env: &mut Env<'_>,
    ) -> Result<Results, GradeError> {
        if let Some(only) = self.run_only {
            self.validate_case(test_name, suite_number, only)?;
        }

        let mut results = Results::default();
        for (i, case) in self.cases.iter_mut().enumerate() {
            if self.run_only.is_some_and(|only| only != i + 1) {
                continue;
            }
            if case.lock_state().is_locked() || results.locked > 0 {
                info!(test = test_name, suite = suite_number, case = i + 1, "case is locked");
                results.locked += 1;
                continue;
            }

            let mut log = OutputBuffer::new();
            if case.run(&mut log) {
                results.passed += 1;
            } else {
                results.failed += 1;
            }
            if env.verbose {
                log.drain_into(env.output);
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::output::{NullSink, OutputBuffer};
    use crate::model::{hash_answer, ConceptCase, LockState};

    fn concept(answer: &str, locked: bool) -> Box<dyn Case> {
        let mut case = ConceptCase::new(format!("question {answer}"), answer);
        if locked {
            case.lock(&hash_answer);
        }
        Box::new(case)
    }

    struct Failing;

    impl Case for Failing {
        fn run(&mut self, _out: &mut dyn crate::cli::output::OutputSink) -> bool {
            false
        }
        fn lock_state(&self) -> LockState {
            LockState::Unknown
        }
        fn lock(&mut self, _hash_fn: &dyn Fn(&str) -> String) {}
        fn unlock(&mut self, _interact: &mut dyn crate::model::Interact) {}
    }

    #[test]
    fn unlocked_cases_pass() {
        let mut suite = Suite::new(vec![concept("a", false), concept("b", false)]);
        let mut sink = NullSink;
        let results = suite.run("q1", 1, &mut Env::new(&mut sink, false)).unwrap();
        assert_eq!(
            results,
            Results {
                passed: 2,
                failed: 0,
                locked: 0
            }
        );
    }

    #[test]
    fn locking_is_sticky() {
        let mut suite = Suite::new(vec![
            concept("a", false),
            concept("b", true),
            concept("c", false),
            concept("d", false),
        ]);
        let mut sink = NullSink;
        let results = suite.run("q1", 1, &mut Env::new(&mut sink, false)).unwrap();
        assert_eq!(results.passed, 1);
        assert_eq!(results.locked, 3);
        assert_eq!(results.total(), 4);
    }

    #[test]
    fn failures_do_not_stop_the_suite() {
        let mut suite = Suite::new(vec![Box::new(Failing) as Box<dyn Case>, concept("b", false)]);
        let mut sink = NullSink;
        let results = suite.run("q1", 1, &mut Env::new(&mut sink, false)).unwrap();
        assert_eq!(results.failed, 1);
        assert_eq!(results.passed, 1);
    }

    #[test]
    fn run_only_selects_one_case() {
        let mut suite = Suite::new(vec![
            concept("a", true),
            concept("b", false),
            concept("c", false),
        ]);
        suite.run_only = Some(2);
        let mut sink = NullSink;
        let results = suite.run("q1", 1, &mut Env::new(&mut sink, false)).unwrap();
        assert_eq!(
            results,
            Results {
                passed: 1,
                failed: 0,
                locked: 0
            }
        );
    }

    #[test]
    fn run_only_out_of_range_is_config_error() {
        let mut suite = Suite::new(vec![concept("a", false)]);
        suite.run_only = Some(2);
        let mut sink = NullSink;
        let err = suite
            .run("q1", 1, &mut Env::new(&mut sink, false))
            .unwrap_err();
        assert!(matches!(
            err,
            GradeError::InvalidCase {
                requested: 2,
                available: 1,
                ..
            }
        ));
    }

    #[test]
    fn verbose_runs_show_case_output() {
        let mut suite = Suite::new(vec![concept("a", false)]);
        let mut out = OutputBuffer::new();
        suite.run("q1", 1, &mut Env::new(&mut out, true)).unwrap();
        assert_eq!(out.as_str(), "Q: question a\nA: a");

        let mut quiet = OutputBuffer::new();
        suite.run("q1", 1, &mut Env::new(&mut quiet, false)).unwrap();
        assert!(quiet.is_empty());
    }
}
