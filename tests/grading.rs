// End-to-end runs of the protocol pipeline against on-disk assignments.

mod common;

use std::rc::Rc;
use std::time::Duration;

use common::{locked, open, Assignment};
use okgrade::cli::output::{NullSink, OutputBuffer};
use okgrade::config::AssignmentConfig;
use okgrade::loader;
use okgrade::protocols::keys;
use okgrade::protocols::unlock::UnlockProtocol;
use okgrade::protocols::SubmissionArchive;
use okgrade::{
    Backoff, GradeError, GradingConfig, GradingProtocol, ManualClock, Messages, Pipeline,
    Protocol, RateLimiter, SharedStore, Test,
};

fn load(assignment: &Assignment, store: &SharedStore) -> Vec<Box<dyn Test>> {
    loader::load_tests(&[assignment.tests_dir()], &store.borrow()).unwrap()
}

fn grading(store: &SharedStore, config: GradingConfig) -> GradingProtocol {
    GradingProtocol::new(config, store.clone())
}

#[test]
fn correct_flag_survives_later_failures() {
    let assignment = Assignment::new(&[0]);
    assignment.add_test("q1", &[&[open("1"), open("2")]]);

    let store = assignment.storage().shared();
    let mut tests = load(&assignment, &store);
    grading(&store, GradingConfig::default())
        .run(&mut tests, &mut Messages::new(), &mut NullSink)
        .unwrap();
    assert!(assignment.storage().get("q1", "correct", false));

    assignment.add_test("q1", &[&[open("1"), locked("2")]]);
    let store = assignment.storage().shared();
    let mut tests = load(&assignment, &store);
    let mut protocol = grading(&store, GradingConfig::default());
    protocol
        .run(&mut tests, &mut Messages::new(), &mut NullSink)
        .unwrap();
    assert_eq!(protocol.last_report().unwrap().totals.locked, 1);
    assert!(assignment.storage().get("q1", "correct", false));
}

#[test]
fn out_of_range_suite_runs_nothing() {
    let assignment = Assignment::new(&[0]);
    assignment.add_test("q1", &[&[open("1")]]);
    assignment.add_test("q2", &[&[open("1")], &[open("2")]]);

    let store = assignment.storage().shared();
    let mut tests = load(&assignment, &store);
    let config = GradingConfig {
        suite: Some(2),
        ..GradingConfig::default()
    };
    let mut messages = Messages::new();
    let mut out = OutputBuffer::new();
    let err = grading(&store, config)
        .run(&mut tests, &mut messages, &mut out)
        .unwrap_err();

    assert!(matches!(
        err,
        GradeError::InvalidSuite {
            requested: 2,
            available: 1,
            ..
        }
    ));
    assert!(err.is_fatal());
    assert!(messages.is_empty());
    assert!(out.is_empty());
    assert!(!assignment.storage_path().exists());
}

#[test]
fn rate_limit_carries_across_invocations() {
    let assignment = Assignment::new(&[0, 0, 2, 4]);
    assignment.add_test("q1", &[&[open("1")]]);
    let backoff = AssignmentConfig::load(None, assignment.path())
        .unwrap()
        .backoff()
        .unwrap();
    assert_eq!(backoff, Backoff::from_secs(&[0, 0, 2, 4]).unwrap());
    let clock = Rc::new(ManualClock::default());

    let attempt = || {
        let store = assignment.storage().shared();
        let mut tests = load(&assignment, &store);
        let mut protocol = grading(&store, GradingConfig::default())
            .with_rate_limiter(RateLimiter::new(backoff.clone(), store.clone()))
            .with_clock(clock.clone());
        let mut messages = Messages::new();
        let result = protocol.run(&mut tests, &mut messages, &mut NullSink);
        (result, messages)
    };

    assert!(attempt().0.is_ok());
    let (result, messages) = attempt();
    assert!(result.is_ok());
    assert_eq!(messages[keys::RATE_LIMIT]["q1"]["attempts"], 2);

    let (result, messages) = attempt();
    assert!(matches!(result, Err(GradeError::RateLimited { attempts: 2, .. })));
    assert_eq!(messages[keys::RATE_LIMIT]["q1"]["rejected_for_secs"], 2.0);
    assert!(messages[keys::GRADING].as_object().unwrap().is_empty());

    clock.advance(Duration::from_secs(2));
    assert!(attempt().0.is_ok());
    assert!(attempt().0.is_err());
    clock.advance(Duration::from_secs(4));
    let (result, messages) = attempt();
    assert!(result.is_ok());
    assert_eq!(messages[keys::RATE_LIMIT]["q1"]["attempts"], 4);
}

#[test]
fn rejection_stops_remaining_tests() {
    let assignment = Assignment::new(&[0, 60]);
    assignment.add_test("q1", &[&[open("1")]]);
    assignment.add_test("q2", &[&[open("1")]]);
    let clock = Rc::new(ManualClock::default());
    let store = assignment.storage().shared();
    let limiter = || RateLimiter::new(Backoff::from_secs(&[0, 60]).unwrap(), store.clone());

    // Use up q2's free attempt first so the next full run is rejected there.
    let mut only_q2 = loader::select_questions(load(&assignment, &store), &["q2".to_string()])
        .unwrap();
    grading(&store, GradingConfig::default())
        .with_rate_limiter(limiter())
        .with_clock(clock.clone())
        .run(&mut only_q2, &mut Messages::new(), &mut NullSink)
        .unwrap();

    let mut tests = load(&assignment, &store);
    let mut protocol = grading(&store, GradingConfig::default())
        .with_rate_limiter(limiter())
        .with_clock(clock.clone());
    let mut messages = Messages::new();
    let err = protocol
        .run(&mut tests, &mut messages, &mut NullSink)
        .unwrap_err();
    assert!(matches!(err, GradeError::RateLimited { ref test, .. } if test == "q2"));
    assert!(!err.is_fatal());

    let report = protocol.last_report().unwrap();
    assert_eq!(report.graded, vec!["q1"]);
    assert_eq!(messages[keys::GRADING]["q1"]["passed"], 1);
}

#[test]
fn unlocked_answers_persist_between_runs() {
    let assignment = Assignment::new(&[0]);
    assignment.add_test("q1", &[&[open("1"), locked("42")]]);

    let store = assignment.storage().shared();
    let mut tests = load(&assignment, &store);
    let config = GradingConfig {
        unlock: true,
        ..GradingConfig::default()
    };
    let interact = Box::new(|_: &str, _: Option<&[String]>| "42".to_string());
    let messages = Pipeline::new()
        .with(UnlockProtocol::new(config.clone(), store.clone(), interact))
        .with(grading(&store, config))
        .run(&mut tests, &mut NullSink)
        .unwrap();
    assert_eq!(messages[keys::UNLOCK]["q1"], 1);
    assert!(!messages.contains_key(keys::GRADING));

    let store = assignment.storage().shared();
    let mut tests = load(&assignment, &store);
    let mut protocol = grading(&store, GradingConfig::default());
    protocol
        .run(&mut tests, &mut Messages::new(), &mut NullSink)
        .unwrap();
    let totals = protocol.last_report().unwrap().totals;
    assert_eq!(totals.passed, 2);
    assert_eq!(totals.locked, 0);
}

#[test]
fn archive_reports_correct_attempts() {
    let assignment = Assignment::new(&[0]);
    assignment.add_test("q1", &[&[open("1")]]);
    let config = AssignmentConfig::load(None, assignment.path()).unwrap();

    let store = assignment.storage().shared();
    let mut tests = load(&assignment, &store);
    let archive = SubmissionArchive::new(
        config.submissions_dir(),
        config.source_file().unwrap(),
        config.endpoint.clone(),
    );
    let mut messages = Messages::new();
    grading(&store, GradingConfig::default())
        .with_archive(archive)
        .run(&mut tests, &mut messages, &mut NullSink)
        .unwrap();

    let reports = messages[keys::REPORTS].as_array().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["Question"], "q1");
    assert_eq!(reports[0]["EndPoint"], "cal/cs61a/hw02");
    assert!(config
        .submissions_dir()
        .join("right_submissions/right_sub1.py")
        .exists());
}
