//! Gradable cases and the lock/unlock state machine.

use serde::{Deserialize, Serialize};

use crate::cli::output::OutputSink;
use crate::model::LockState;

/// Supplies a candidate plaintext for a locked case.
///
/// Receives the stored digest and the case's choices, if any.
pub trait Interact {
    fn interact(&mut self, expected_hash: &str, choices: Option<&[String]>) -> String;
}

impl<F> Interact for F
where
    F: FnMut(&str, Option<&[String]>) -> String,
{
    fn interact(&mut self, expected_hash: &str, choices: Option<&[String]>) -> String {
        self(expected_hash, choices)
    }
}

/// The atomic gradable unit.
pub trait Case {
    /// Runs the check, writing anything worth showing into `out`.
    fn run(&mut self, out: &mut dyn OutputSink) -> bool;

    fn lock_state(&self) -> LockState;

    /// Replaces the answer with its digest and marks the case locked.
    fn lock(&mut self, hash_fn: &dyn Fn(&str) -> String);

    /// Asks `interact` for the answer of a locked case.
    fn unlock(&mut self, interact: &mut dyn Interact);

    /// Text shown to the student while unlocking.
    fn prompt(&self) -> Option<&str> {
        None
    }
}

/// A natural-language question whose answer is revealed through unlocking.
///
/// Running one always succeeds; it only displays the question and answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptCase {
    pub question: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    #[serde(default)]
    pub locked: LockState,
}

impl ConceptCase {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            choices: None,
            locked: LockState::Unknown,
        }
    }

    pub fn with_choices(mut self, choices: Vec<String>) -> Self {
        self.choices = Some(choices);
        self
    }

    /// Dedents and trims the text fields, as authored test files indent them.
    pub fn normalize(&mut self) {
        self.question = dedent(&self.question);
        self.answer = dedent(&self.answer);
        if let Some(choices) = self.choices.as_mut() {
            for choice in choices.iter_mut() {
                *choice = dedent(choice);
            }
        }
    }
}

impl Case for ConceptCase {
    fn run(&mut self, out: &mut dyn OutputSink) -> bool {
        out.emit(&format!("Q: {}", self.question));
        out.emit(&format!("A: {}", self.answer));
        true
    }

    fn lock_state(&self) -> LockState {
        self.locked
    }

    fn lock(&mut self, hash_fn: &dyn Fn(&str) -> String) {
        // Multiple-choice answers hash the joined answer text, never the choice list.
        self.answer = match &self.choices {
            Some(_) => hash_fn(&self.answer.chars().collect::<String>()),
            None => hash_fn(&self.answer),
        };
        self.locked = LockState::Locked;
    }

    fn unlock(&mut self, interact: &mut dyn Interact) {
        if self.locked == LockState::Unknown {
            self.locked = LockState::Unlocked;
        }
        if !self.locked.is_locked() {
            return;
        }
        let candidate = interact.interact(&self.answer, self.choices.as_deref());
        // A candidate equal to the stored digest leaves the case locked.
        if candidate != self.answer {
            self.locked = LockState::Unlocked;
            self.answer = candidate;
        }
    }

    fn prompt(&self) -> Option<&str> {
        Some(&self.question)
    }
}

/// Removes the common leading whitespace of all non-blank lines, then trims.
pub fn dedent(text: &str) -> String {
    let indent = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    text.lines()
        .map(|line| line.get(indent..).unwrap_or_else(|| line.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
