//! Diagnostics
//!
//! Every user-facing failure is reported as a [`Diagnostic`]: the template
//! filename, the 1-indexed template line, a message with evaluator
//! bookkeeping stripped, and a small quoted window of the original source
//! around the failing line. Because the generated chunk is kept
//! line-aligned with the template, evaluator line numbers map straight back
//! onto template lines.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Lines of surrounding source quoted on each side of the failing line.
const CONTEXT_LINES: u32 = 2;

static CHUNK_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\]:(\d+):").expect("chunk line pattern"));

static CHUNK_LOCATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\[string "[^"]*"\]:\d+:\s*"#).expect("chunk location pattern")
});

/// A template failure pinned to a source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub filename: String,
    pub line: u32,
    pub message: String,
    pub context: String,
}

impl Diagnostic {
    /// Build a diagnostic with a quoted source window around `line`.
    pub fn new(
        message: impl Into<String>,
        line: u32,
        source_lines: &[String],
        filename: impl Into<String>,
    ) -> Self {
        Diagnostic {
            filename: filename.into(),
            line,
            message: message.into(),
            context: format_source_context(source_lines, line),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.filename, self.line, self.message)?;
        if !self.context.is_empty() {
            write!(f, "\n{}", self.context)?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Quote the source lines around `line`, marking the failing one.
fn format_source_context(source_lines: &[String], line: u32) -> String {
    if line == 0 || source_lines.is_empty() {
        return String::new();
    }
    let first = line.saturating_sub(CONTEXT_LINES).max(1);
    let last = (line + CONTEXT_LINES).min(source_lines.len() as u32);
    let mut out = String::new();
    for number in first..=last {
        let text = match source_lines.get(number as usize - 1) {
            Some(text) => text,
            None => continue,
        };
        let marker = if number == line { ">> " } else { "   " };
        out.push_str(&format!("{}{:3} | {}\n", marker, number, text));
    }
    out
}

/// Extract the line number from an evaluator message such as
/// `[string "page.weft"]:4: attempt to ...`.
pub(crate) fn evaluator_line(message: &str) -> Option<u32> {
    CHUNK_LINE
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Drop the leading chunk location from an evaluator message, leaving only
/// the human-readable part.
pub(crate) fn strip_location(message: &str) -> String {
    CHUNK_LOCATION.replace(message, "").into_owned()
}

/// Walk an evaluator error chain to its most specific cause and return its
/// message, stripped of chunk locations.
pub(crate) fn root_message(err: &mlua::Error) -> String {
    match err {
        mlua::Error::CallbackError { cause, .. } => root_message(cause),
        mlua::Error::WithContext { cause, .. } => root_message(cause),
        mlua::Error::ExternalError(cause) => cause.to_string(),
        mlua::Error::RuntimeError(message) => strip_location(message),
        other => strip_location(&other.to_string()),
    }
}

/// Find a sink-closed error anywhere in an evaluator error chain.
pub(crate) fn find_sink_error(err: &mlua::Error) -> Option<crate::sink::SinkError> {
    match err {
        mlua::Error::CallbackError { cause, .. } => find_sink_error(cause),
        mlua::Error::WithContext { cause, .. } => find_sink_error(cause),
        mlua::Error::ExternalError(cause) => {
            (**cause).downcast_ref::<crate::sink::SinkError>().cloned()
        }
        _ => None,
    }
}
