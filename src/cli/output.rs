//! Handles all user-facing output for the grading client.
//!
//! Protocols never print directly; they emit lines into an [`OutputSink`].
//! The CLI uses [`StdoutSink`], which colors styled lines with `termcolor`,
//! while tests capture everything in an [`OutputBuffer`].

use std::io::Write;

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::model::Results;

/// Width of the separator lines printed between sections.
const LINE_WIDTH: usize = 69;

/// Visual intent of an emitted line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Plain,
    Header,
    Pass,
    Fail,
    Locked,
}

/// Destination for everything a protocol wants the user to see.
pub trait OutputSink {
    fn emit(&mut self, text: &str);

    fn emit_styled(&mut self, text: &str, _style: Style) {
        self.emit(text);
    }
}

// A null output sink for running without output.
pub struct NullSink;

impl OutputSink for NullSink {
    fn emit(&mut self, _text: &str) {}
}

// ============================================================================
// OUTPUT SINKS: OutputBuffer and StdoutSink implementations
// ============================================================================

/// OutputBuffer: collects output into a String for testing or programmatic capture.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    pub buffer: String,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Moves the buffered lines into another sink, leaving this buffer empty.
    pub fn drain_into(&mut self, sink: &mut dyn OutputSink) {
        for line in std::mem::take(&mut self.buffer).lines() {
            sink.emit(line);
        }
    }
}

impl OutputSink for OutputBuffer {
    fn emit(&mut self, text: &str) {
        if !self.buffer.is_empty() {
            self.buffer.push('\n');
        }
        self.buffer.push_str(text);
    }
}

/// StdoutSink: writes output to stdout, coloring styled lines when attached to a terminal.
pub struct StdoutSink {
    stream: StandardStream,
}

impl StdoutSink {
    pub fn new() -> Self {
        let choice = if atty::is(atty::Stream::Stdout) {
            ColorChoice::Auto
        } else {
            ColorChoice::Never
        };
        Self {
            stream: StandardStream::stdout(choice),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for StdoutSink {
    fn emit(&mut self, text: &str) {
        let _ = writeln!(self.stream, "{}", text);
    }

    fn emit_styled(&mut self, text: &str, style: Style) {
        let mut spec = ColorSpec::new();
        match style {
            Style::Plain => return self.emit(text),
            Style::Header => spec.set_bold(true),
            Style::Pass => spec.set_fg(Some(Color::Green)),
            Style::Fail => spec.set_fg(Some(Color::Red)),
            Style::Locked => spec.set_fg(Some(Color::Yellow)),
        };
        let _ = self.stream.set_color(&spec);
        let _ = writeln!(self.stream, "{}", text);
        let _ = self.stream.reset();
    }
}

// ============================================================================
// CORE OUTPUT FUNCTIONS: User-facing summary utilities
// ============================================================================

/// Emits a separator line made of `ch`.
pub fn print_line(sink: &mut dyn OutputSink, ch: char) {
    sink.emit(&ch.to_string().repeat(LINE_WIDTH));
}

/// Emits the summary block printed after a grading run.
pub fn print_progress_bar(sink: &mut dyn OutputSink, header: &str, totals: Results, verbose: bool) {
    print_line(sink, '-');
    sink.emit_styled(header, Style::Header);

    if !verbose && (totals.failed > 0 || totals.locked > 0) {
        sink.emit_styled(
            &format!(
                "    {} test cases passed before encountering first failed test case",
                totals.passed
            ),
            Style::Pass,
        );
    } else if totals.passed > 0 {
        sink.emit_styled(
            &format!("    {} test cases passed!", totals.passed),
            Style::Pass,
        );
    }
    if verbose && totals.failed > 0 {
        sink.emit_styled(
            &format!("    {} test cases failed", totals.failed),
            Style::Fail,
        );
    }
    if totals.locked > 0 {
        sink.emit_styled(
            &format!("    {} test cases locked", totals.locked),
            Style::Locked,
        );
    }

    sink.emit(&progress_bar(totals));
}

fn progress_bar(totals: Results) -> String {
    const WIDTH: usize = 40;
    let total = totals.total();
    let percent = if total == 0 {
        0.0
    } else {
        totals.passed as f64 / total as f64 * 100.0
    };
    let filled = (percent / 100.0 * WIDTH as f64).round() as usize;
    format!(
        "[{}{}] {:.1}% passed",
        "o".repeat(filled),
        ".".repeat(WIDTH - filled),
        percent
    )
}
