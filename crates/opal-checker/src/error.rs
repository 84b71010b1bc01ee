//! Static error type

use opal_parser::Span;
use std::error::Error;
use std::fmt;

/// A static semantic error, with the source position of the offending
/// construct when one is available.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticError {
    /// What went wrong
    pub message: String,
    /// Where, if known (program-level errors such as a missing `main` have
    /// no position)
    pub span: Option<Span>,
}

impl StaticError {
    /// An error at a source position.
    pub fn at(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span: Some(span),
        }
    }

    /// A program-level error with no position.
    pub fn global(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span: None,
        }
    }
}

impl fmt::Display for StaticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(span) => write!(f, "{} near {}", self.message, span),
            None => f.write_str(&self.message),
        }
    }
}

impl Error for StaticError {}
