//! Template source loading
//!
//! Loads raw template bytes from a file or an in-memory string and normalizes
//! them before lexing: a leading UTF-8 byte-order mark is stripped and all
//! carriage returns are removed so the lexer only ever sees `\n` line endings.
//! The normalized text is kept together with its line table; the line table is
//! retained inside compiled artifacts so diagnostics can quote the original
//! source long after the `TemplateSource` itself is gone.

use std::fmt;
use std::io;
use std::path::Path;

/// Error that can occur while reading a template file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The template file does not exist.
    NotFound { filename: String },
    /// Any other I/O failure while reading the file.
    Io { filename: String, message: String },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::NotFound { filename } => {
                write!(f, "template not found: {}", filename)
            }
            LoadError::Io { filename, message } => {
                write!(f, "failed to read template {}: {}", filename, message)
            }
        }
    }
}

impl std::error::Error for LoadError {}

/// A normalized template source ready for lexing.
///
/// Immutable once constructed. `lines` is the 1-indexed view used by the
/// diagnostics layer (`lines[0]` is line 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSource {
    pub filename: String,
    pub text: String,
    pub lines: Vec<String>,
}

impl TemplateSource {
    /// Read a template from disk and normalize it.
    pub async fn from_file(path: &Path) -> Result<Self, LoadError> {
        let filename = path.display().to_string();
        let bytes = tokio::fs::read(path).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                LoadError::NotFound {
                    filename: filename.clone(),
                }
            } else {
                LoadError::Io {
                    filename: filename.clone(),
                    message: err.to_string(),
                }
            }
        })?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        Ok(Self::from_text(filename, text))
    }

    /// Normalize an in-memory template string.
    pub fn from_text(filename: impl Into<String>, text: impl Into<String>) -> Self {
        let text: String = text.into();
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text).replace('\r', "");
        let lines = text.split('\n').map(str::to_string).collect();
        TemplateSource {
            filename: filename.into(),
            text,
            lines,
        }
    }

    /// Fetch a line by its 1-indexed number.
    pub fn line(&self, number: u32) -> Option<&str> {
        if number == 0 {
            return None;
        }
        self.lines.get(number as usize - 1).map(String::as_str)
    }
}
