//! Interactive unlocking of locked cases.
//!
//! The student is asked for the answer of each locked case in order. A
//! correct answer unlocks the case and is saved in the store under
//! `unlocked:<suite>:<case>`, so later runs start with the case unlocked.
//! Unlocking stops at the first case the student gives up on.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};

use tracing::{debug, info, warn};

use crate::cli::output::{print_line, OutputSink, Style};
use crate::errors::GradeError;
use crate::model::{hash_answer, Interact, Test};
use crate::protocols::{keys, GradingConfig, Messages, Protocol};
use crate::storage::{SharedStore, Storage};

const EXIT_COMMAND: &str = "exit";

/// Store field recording the answer that unlocked a case.
pub fn unlocked_field(suite: usize, case: usize) -> String {
    format!("unlocked:{suite}:{case}")
}

// ============================================================================
// CONSOLE INTERACTION
// ============================================================================

/// Reads answers line by line until one hashes to the expected digest.
///
/// For multiple-choice cases a choice number selects that choice. End of
/// input or `exit` gives up and returns the digest, which keeps the case
/// locked.
pub struct ConsoleInteract<R, W> {
    input: R,
    output: W,
    hash_fn: fn(&str) -> String,
}

impl<R: BufRead, W: Write> ConsoleInteract<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            hash_fn: hash_answer,
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn read_answer(&mut self) -> Option<String> {
        let _ = write!(self.output, "? ");
        let _ = self.output.flush();
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim().to_string()),
            Err(e) => {
                warn!(error = %e, "could not read answer");
                None
            }
        }
    }
}

impl ConsoleInteract<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Interact for ConsoleInteract<R, W> {
    fn interact(&mut self, expected_hash: &str, choices: Option<&[String]>) -> String {
        loop {
            if let Some(choices) = choices {
                for (i, choice) in choices.iter().enumerate() {
                    let _ = writeln!(self.output, "{}) {}", i + 1, choice);
                }
            }
            let Some(line) = self.read_answer() else {
                return expected_hash.to_string();
            };
            if line == EXIT_COMMAND {
                return expected_hash.to_string();
            }

            let candidate = choices
                .and_then(|choices| {
                    let index = line.parse::<usize>().ok()?.checked_sub(1)?;
                    choices.get(index).cloned()
                })
                .unwrap_or(line);

            if (self.hash_fn)(&candidate) == expected_hash {
                let _ = writeln!(self.output, "-- OK! --");
                return candidate;
            }
            let _ = writeln!(self.output, "-- Not quite. Try again! --");
        }
    }
}

/// Remembers the last candidate handed to a case.
struct Capture<'a> {
    inner: &'a mut dyn Interact,
    last: Option<String>,
}

impl Interact for Capture<'_> {
    fn interact(&mut self, expected_hash: &str, choices: Option<&[String]>) -> String {
        let candidate = self.inner.interact(expected_hash, choices);
        self.last = Some(candidate.clone());
        candidate
    }
}

// ============================================================================
// UNLOCK PROTOCOL
// ============================================================================

pub struct UnlockProtocol {
    config: GradingConfig,
    store: SharedStore,
    interact: Box<dyn Interact>,
}

impl UnlockProtocol {
    pub fn new(config: GradingConfig, store: SharedStore, interact: Box<dyn Interact>) -> Self {
        Self {
            config,
            store,
            interact,
        }
    }
}

impl Protocol for UnlockProtocol {
    fn name(&self) -> &'static str {
        "unlock"
    }

    fn run(
        &mut self,
        tests: &mut [Box<dyn Test>],
        messages: &mut Messages,
        output: &mut dyn OutputSink,
    ) -> Result<(), GradeError> {
        if !self.config.unlock {
            return Ok(());
        }

        print_line(output, '~');
        output.emit_styled("Unlocking tests", Style::Header);
        output.emit("");

        let mut unlocked: BTreeMap<String, usize> = BTreeMap::new();
        'tests: for test in tests.iter_mut() {
            let name = test.name().to_string();
            let count = unlocked.entry(name.clone()).or_default();
            let Some(collection) = test.suites() else {
                continue;
            };
            for (si, suite) in collection.suites_mut().iter_mut().enumerate() {
                for (ci, case) in suite.cases.iter_mut().enumerate() {
                    if !case.lock_state().is_locked() {
                        continue;
                    }
                    output.emit_styled(
                        &format!("{} > Suite {} > Case {}", name, si + 1, ci + 1),
                        Style::Header,
                    );
                    if let Some(prompt) = case.prompt() {
                        output.emit(prompt);
                    }

                    let mut capture = Capture {
                        inner: self.interact.as_mut(),
                        last: None,
                    };
                    case.unlock(&mut capture);
                    if case.lock_state().is_locked() {
                        debug!(test = %name, suite = si + 1, case = ci + 1, "student gave up");
                        break 'tests;
                    }

                    *count += 1;
                    if let Some(answer) = capture.last {
                        let field = unlocked_field(si + 1, ci + 1);
                        if let Err(e) = self.store.borrow_mut().store(&name, &field, answer) {
                            warn!(test = %name, error = %e, "could not persist unlocked answer");
                        }
                    }
                    output.emit_styled("Case unlocked.", Style::Pass);
                    output.emit("");
                }
            }
        }

        let total: usize = unlocked.values().sum();
        info!(unlocked = total, "unlocking complete");
        output.emit(&format!("{total} case(s) unlocked."));
        messages.insert(keys::UNLOCK.into(), serde_json::to_value(&unlocked)?);
        Ok(())
    }
}

/// Unlocks every case whose answer was saved by an earlier unlock session.
///
/// A saved answer that no longer matches the case's digest is ignored.
pub fn apply_saved_unlocks(test: &mut dyn Test, store: &Storage) -> usize {
    let name = test.name().to_string();
    let Some(collection) = test.suites() else {
        return 0;
    };
    let mut applied = 0;
    for (si, suite) in collection.suites_mut().iter_mut().enumerate() {
        for (ci, case) in suite.cases.iter_mut().enumerate() {
            if !case.lock_state().is_locked() {
                continue;
            }
            let field = unlocked_field(si + 1, ci + 1);
            let Some(saved) = store.get::<Option<String>>(&name, &field, None) else {
                continue;
            };
            let mut replay = |expected: &str, _: Option<&[String]>| {
                if hash_answer(&saved) == expected {
                    saved.clone()
                } else {
                    expected.to_string()
                }
            };
            case.unlock(&mut replay);
            if !case.lock_state().is_locked() {
                applied += 1;
            }
        }
    }
    if applied > 0 {
        debug!(test = %name, applied, "restored unlocked cases");
    }
    applied
}
