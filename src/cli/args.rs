//! Command-line arguments of the `ok` client.

use clap::Parser;
use std::path::PathBuf;

use crate::protocols::GradingConfig;

#[derive(Debug, Parser)]
#[command(
    name = "ok",
    version,
    about = "Grade an assignment locally against its test suites."
)]
pub struct OkArgs {
    /// Assignment configuration file; defaults to the only *.ok file here.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Grade only these questions, in this order.
    #[arg(short = 'q', long = "question", value_name = "NAME", num_args = 1..)]
    pub questions: Vec<String>,

    /// Run only this suite (1-based) of each question.
    #[arg(long, value_name = "N")]
    pub suite: Option<usize>,

    /// Run only this case (1-based) of the selected suite.
    #[arg(long, value_name = "N", requires = "suite")]
    pub case: Option<usize>,

    /// Show case output and keep going after failures.
    #[arg(short, long)]
    pub verbose: bool,

    /// Score the assignment instead of grading it.
    #[arg(long, conflicts_with = "unlock")]
    pub score: bool,

    /// Unlock locked test cases interactively.
    #[arg(long)]
    pub unlock: bool,

    /// Store file; overrides the assignment's setting.
    #[arg(long, value_name = "PATH")]
    pub storage: Option<PathBuf>,

    /// Do not snapshot the source file after grading.
    #[arg(long)]
    pub no_archive: bool,
}

impl OkArgs {
    pub fn grading_config(&self) -> GradingConfig {
        GradingConfig {
            score: self.score,
            unlock: self.unlock,
            suite: self.suite,
            case: self.case,
            verbose: self.verbose,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowers_flags_into_grading_config() {
        let args =
            OkArgs::try_parse_from(["ok", "-q", "q1", "q2", "--suite", "2", "--case", "1", "-v"])
                .unwrap();
        assert_eq!(args.questions, vec!["q1", "q2"]);
        let config = args.grading_config();
        assert_eq!(config.suite, Some(2));
        assert_eq!(config.case, Some(1));
        assert!(config.verbose);
        assert!(!config.score);
    }

    #[test]
    fn case_without_suite_is_rejected() {
        assert!(OkArgs::try_parse_from(["ok", "--case", "1"]).is_err());
    }

    #[test]
    fn score_and_unlock_conflict() {
        assert!(OkArgs::try_parse_from(["ok", "--score", "--unlock"]).is_err());
    }
}
