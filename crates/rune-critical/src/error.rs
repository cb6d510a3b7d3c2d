//! Error types for critical CSS extraction.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for critical CSS operations.
pub type Result<T> = std::result::Result<T, CriticalError>;

/// Malformed stylesheet text, with the location the tokenizer stopped at.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} at {line}:{column}")]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl ParseError {
    pub fn new(message: impl Into<String>, location: cssparser::SourceLocation) -> Self {
        Self {
            message: message.into(),
            // cssparser lines are 0-based, columns 1-based.
            line: location.line + 1,
            column: location.column,
        }
    }
}

/// Errors that can occur while processing a document.
///
/// Only document-level failures surface from `process()`; everything else is
/// logged and confined to the style unit that raised it.
#[derive(Error, Debug)]
pub enum CriticalError {
    /// A stylesheet could not be tokenized.
    #[error("failed to parse stylesheet: {0}")]
    Parse(#[from] ParseError),

    /// The selector oracle rejected a selector.
    #[error("{selector} -> {message}")]
    Selector { selector: String, message: String },

    /// A stylesheet file or asset is missing.
    #[error("unable to locate stylesheet: {}", path.display())]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A resolved stylesheet path fell outside the permitted base directory.
    #[error("stylesheet path escapes the base directory: {}", path.display())]
    PathEscape { path: PathBuf },

    /// The href points at a remote origin and is never fetched.
    #[error("remote stylesheet ignored: {0}")]
    RemoteStylesheet(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CriticalError {
    /// Errors that skip a stylesheet without any log output.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            CriticalError::PathEscape { .. } | CriticalError::RemoteStylesheet(_)
        )
    }
}
