//! The Lambda-style log stream written to stderr.
//!
//! Three kinds of lines are produced:
//!
//! - **Console** lines forwarded from the function, with their
//!   `<timestamp>\t<request id>\t` prefix highlighted in blue
//! - **System** lines (`START`, `END`, `REPORT`) in green
//! - **Error** lines (handler faults) in red
//!
//! The stream sits behind [`LogSink`] so tests can capture it in memory with
//! [`CaptureSink`] instead of scraping stderr.

use console::Style;
use parking_lot::Mutex;
use regex::Regex;
use std::io::Write;
use std::sync::LazyLock;

static CONSOLE_PREFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[0-9TZ:.\-]+\t[0-9a-f\-]+\t").ok());

/// The kind of a log stream line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// Output forwarded from the function.
    Console,
    /// Lifecycle lines emitted by the gateway.
    System,
    /// Fault lines.
    Error,
}

/// A single captured line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Which stream the line was written to.
    pub kind: LogKind,
    /// The unstyled text.
    pub text: String,
}

/// Destination for the log stream.
pub trait LogSink: Send + Sync + 'static {
    /// Writes a line of the given kind.
    fn write(&self, kind: LogKind, text: &str);
}

/// Writes colorized lines to the process's stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl LogSink for StderrSink {
    fn write(&self, kind: LogKind, text: &str) {
        let line = format_line(kind, text);
        let mut stderr = std::io::stderr().lock();
        // Nothing useful can be done if stderr is gone.
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct CaptureSink {
    lines: Mutex<Vec<LogLine>>,
}

impl CaptureSink {
    /// Creates an empty capture sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured lines in write order.
    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.lock().clone()
    }

    /// The text of captured lines of one kind.
    pub fn lines_of(&self, kind: LogKind) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|line| line.kind == kind)
            .map(|line| line.text.clone())
            .collect()
    }

    /// Whether any line of `kind` contains `needle`.
    pub fn contains(&self, kind: LogKind, needle: &str) -> bool {
        self.lines
            .lock()
            .iter()
            .any(|line| line.kind == kind && line.text.contains(needle))
    }

    /// Discards all captured lines.
    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl LogSink for CaptureSink {
    fn write(&self, kind: LogKind, text: &str) {
        self.lines.lock().push(LogLine {
            kind,
            text: text.to_string(),
        });
    }
}

/// Renders a line with its ANSI styling.
///
/// System and error lines get a trailing newline; console text is passed
/// through as-is because the function supplies its own line endings.
pub fn format_line(kind: LogKind, text: &str) -> String {
    match kind {
        LogKind::Console => format_console(text),
        LogKind::System => format!("{}\n", styled(Style::new().green(), text)),
        LogKind::Error => format!("{}\n", styled(Style::new().red(), text)),
    }
}

fn format_console(text: &str) -> String {
    let prefix_len = CONSOLE_PREFIX
        .as_ref()
        .and_then(|re| re.find(text))
        .map(|m| m.end());

    match prefix_len {
        Some(end) => format!(
            "{}{}",
            styled(Style::new().blue(), &text[..end]),
            &text[end..]
        ),
        None => text.to_string(),
    }
}

fn styled(style: Style, text: &str) -> String {
    style.force_styling(true).apply_to(text).to_string()
}
