//! Error taxonomy

use crate::diagnostics::Diagnostic;
use crate::source::LoadError;
use std::fmt;

/// Any failure on the compile-or-render path.
#[derive(Debug)]
pub enum TemplateError {
    /// The template could not be read at all.
    Load(LoadError),
    /// The lexer hit end of input inside an unterminated construct.
    Lex(Diagnostic),
    /// The generated chunk was rejected by the evaluator (template syntax
    /// error).
    Validation(Diagnostic),
    /// The template failed while executing.
    Runtime(Diagnostic),
    /// An evaluator failure that is not attributable to the template.
    Internal(mlua::Error),
}

impl TemplateError {
    /// The source-pinned diagnostic, when this error carries one.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            TemplateError::Lex(diag)
            | TemplateError::Validation(diag)
            | TemplateError::Runtime(diag) => Some(diag),
            TemplateError::Load(_) | TemplateError::Internal(_) => None,
        }
    }
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::Load(err) => write!(f, "{}", err),
            TemplateError::Lex(diag) => write!(f, "lex error: {}", diag),
            TemplateError::Validation(diag) => write!(f, "syntax error: {}", diag),
            TemplateError::Runtime(diag) => write!(f, "runtime error: {}", diag),
            TemplateError::Internal(err) => write!(f, "evaluator error: {}", err),
        }
    }
}

impl std::error::Error for TemplateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TemplateError::Load(err) => Some(err),
            TemplateError::Internal(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LoadError> for TemplateError {
    fn from(err: LoadError) -> Self {
        TemplateError::Load(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_by_stage() {
        let diag = Diagnostic::new("boom", 1, &[], "page.weft");
        assert_eq!(
            TemplateError::Runtime(diag.clone()).to_string(),
            "runtime error: page.weft:1: boom"
        );
        assert_eq!(
            TemplateError::Validation(diag).to_string(),
            "syntax error: page.weft:1: boom"
        );
    }

    #[test]
    fn diagnostic_accessor() {
        let diag = Diagnostic::new("boom", 1, &[], "page.weft");
        assert!(TemplateError::Lex(diag).diagnostic().is_some());
        let load = TemplateError::Load(LoadError::NotFound {
            filename: "x".into(),
        });
        assert!(load.diagnostic().is_none());
    }
}
