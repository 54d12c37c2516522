//! Point totals for score-only runs.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::cli::output::{print_line, NullSink, OutputSink, Style};
use crate::errors::GradeError;
use crate::model::{Env, Results, Test};
use crate::protocols::{keys, GradingConfig, Messages, Protocol};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Score {
    pub score: f64,
    pub possible: f64,
}

pub struct ScoringProtocol {
    config: GradingConfig,
}

impl ScoringProtocol {
    pub fn new(config: GradingConfig) -> Self {
        Self { config }
    }

    /// Runs the scored suites of `test` quietly and awards its points when
    /// they produce no failed or locked case. Tests without suites are run
    /// whole.
    pub fn score(test: &mut dyn Test) -> Result<Score, GradeError> {
        let possible = test.points();
        let name = test.name().to_string();
        let mut sink = NullSink;
        let mut env = Env::new(&mut sink, false);

        let results = match test.suites() {
            Some(collection) => {
                let mut results = Results::default();
                for (i, suite) in collection.suites_mut().iter_mut().enumerate() {
                    if !suite.scored {
                        continue;
                    }
                    results += suite.run(&name, i + 1, &mut env)?;
                }
                results
            }
            None => test.run(&mut env)?,
        };

        let score = if results.is_correct() { possible } else { 0.0 };
        debug!(test = %name, score, possible, "scored");
        Ok(Score { score, possible })
    }
}

impl Protocol for ScoringProtocol {
    fn name(&self) -> &'static str {
        "scoring"
    }

    fn run(
        &mut self,
        tests: &mut [Box<dyn Test>],
        messages: &mut Messages,
        output: &mut dyn OutputSink,
    ) -> Result<(), GradeError> {
        if !self.config.score {
            return Ok(());
        }

        print_line(output, '~');
        output.emit_styled("Scoring tests", Style::Header);
        output.emit("");

        let mut scores = BTreeMap::new();
        let mut total = 0.0;
        for test in tests.iter_mut() {
            let score = Self::score(test.as_mut())?;
            output.emit(&format!(
                "    {}: {:.1}/{}",
                test.name(),
                score.score,
                score.possible
            ));
            total += score.score;
            scores.insert(test.name().to_string(), score);
        }

        output.emit("");
        output.emit_styled("Score:", Style::Header);
        output.emit(&format!("    Total: {total:.1}"));
        output.emit("");
        info!(total, "scoring complete");

        let mut entry = serde_json::to_value(&scores)?;
        if let Value::Object(map) = &mut entry {
            map.insert("total".into(), Value::from(total));
        }
        messages.insert(keys::SCORING.into(), entry);
        Ok(())
    }
}
