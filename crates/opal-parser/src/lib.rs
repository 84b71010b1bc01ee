//! Front end for the Opal language
//!
//! This crate turns Opal source text into an abstract syntax tree:
//! - [`Lexer`]: source text to tokens (with line/column spans)
//! - [`Parser`]: tokens to the AST in [`ast`]
//! - [`Printer`]: AST back to source text (pretty printing)

pub mod ast;
mod error;
mod lexer;
mod parser;
mod printer;
mod token;

pub use error::{LexError, ParseError};
pub use lexer::Lexer;
pub use parser::Parser;
pub use printer::Printer;
pub use token::{Span, Token, TokenKind};
