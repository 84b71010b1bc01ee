//! Lexical and parse error types

use crate::token::Span;
use thiserror::Error;

/// A lexical error with its source position.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    /// A character that starts no token
    #[error("unrecognized symbol at {span}")]
    UnrecognizedSymbol {
        /// Where the symbol was found
        span: Span,
    },

    /// Integer literal with a leading zero, e.g. `07`
    #[error("leading zero in integer literal at {span}")]
    LeadingZero {
        /// Where the literal starts
        span: Span,
    },

    /// Double literal with no digit after the decimal point, e.g. `3.`
    #[error("missing digit after decimal point at {span}")]
    MissingFractionDigits {
        /// Where the literal starts
        span: Span,
    },

    /// String literal not closed before a newline or end of input
    #[error("unterminated string at {span}")]
    UnterminatedString {
        /// Where the string starts
        span: Span,
    },
}

/// A parse error: what was expected, what was found, and where.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} found '{found}' at {span}")]
pub struct ParseError {
    /// The expectation that failed, e.g. "expecting ';'"
    pub message: String,
    /// Lexeme of the offending token
    pub found: String,
    /// Position of the offending token
    pub span: Span,
}

impl ParseError {
    /// Create a parse error at the given token position.
    pub fn new(message: impl Into<String>, found: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            found: found.into(),
            span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lex_error_display() {
        let err = LexError::LeadingZero {
            span: Span::new(2, 5),
        };
        assert_eq!(
            err.to_string(),
            "leading zero in integer literal at line 2, column 5"
        );
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new("expecting ';'", "}", Span::new(4, 1));
        assert_eq!(err.to_string(), "expecting ';' found '}' at line 4, column 1");
    }
}
