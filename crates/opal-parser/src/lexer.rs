//! Lexer for the Opal language
//!
//! Tokenization is driven by a logos-derived raw token enum; the [`Lexer`]
//! wrapper attaches line/column positions and converts the raw stream into
//! [`Token`]s, surfacing lexical errors (unrecognized symbols, leading-zero
//! integers, malformed doubles, unterminated strings) with their position.

use crate::error::LexError;
use crate::token::{Span, Token, TokenKind};
use logos::Logos;

/// Raw token enum used internally by logos.
///
/// Malformed literals are matched by dedicated error patterns so they are
/// rejected during lexing rather than mis-tokenized: `007` would otherwise
/// lex as two integers, and `3.` as an integer followed by a dot.
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
enum RawToken {
    // Punctuation
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semicolon,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Times,
    #[token("/")]
    Divide,
    #[token("=")]
    Assign,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,

    // Relational comparators
    #[token("==")]
    Equal,
    #[token("!=")]
    NotEqual,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEq,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEq,

    // Primitive data types
    #[token("int")]
    IntType,
    #[token("double")]
    DoubleType,
    #[token("string")]
    StringType,
    #[token("bool")]
    BoolType,
    #[token("void")]
    VoidType,

    // Reserved words
    #[token("struct")]
    Struct,
    #[token("array")]
    Array,
    #[token("for")]
    For,
    #[token("while")]
    While,
    #[token("if")]
    If,
    #[token("elseif")]
    ElseIf,
    #[token("else")]
    Else,
    #[token("new")]
    New,
    #[token("return")]
    Return,

    // Value literals
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    #[regex(r"[A-Za-z][A-Za-z0-9_]*")]
    Ident,

    #[regex(r"0|[1-9][0-9]*")]
    Int,

    #[regex(r"(0|[1-9][0-9]*)\.[0-9]+")]
    Double,

    #[regex(r#""[^"\n]*""#)]
    Str,

    // Error patterns (longest-match keeps them from shadowing valid forms)
    #[regex(r"0[0-9]+")]
    LeadingZeroInt,

    #[regex(r"(0|[1-9][0-9]*)\.")]
    MissingFraction,

    #[regex(r#""[^"\n]*"#)]
    UnterminatedStr,
}

/// Tokenizer for Opal source text.
pub struct Lexer<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> Lexer<'a> {
    /// Create a lexer over the given source text.
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            source,
            line_starts,
        }
    }

    /// Tokenize the entire input, ending with an `EOS` token.
    pub fn tokenize(&self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        let mut raw = RawToken::lexer(self.source);
        while let Some(result) = raw.next() {
            let span = self.span_at(raw.span().start);
            let slice = raw.slice();
            let kind = match result {
                Err(()) => return Err(LexError::UnrecognizedSymbol { span }),
                Ok(RawToken::LeadingZeroInt) => return Err(LexError::LeadingZero { span }),
                Ok(RawToken::MissingFraction) => {
                    return Err(LexError::MissingFractionDigits { span })
                }
                Ok(RawToken::UnterminatedStr) => {
                    return Err(LexError::UnterminatedString { span })
                }
                Ok(raw_token) => token_kind(raw_token),
            };
            let lexeme = if kind == TokenKind::StringVal {
                &slice[1..slice.len() - 1]
            } else {
                slice
            };
            tokens.push(Token::new(kind, lexeme, span));
        }
        tokens.push(Token::new(
            TokenKind::Eos,
            "",
            self.span_at(self.source.len()),
        ));
        Ok(tokens)
    }

    /// Line/column of a byte offset into the source.
    fn span_at(&self, offset: usize) -> Span {
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let column = offset - self.line_starts[line - 1] + 1;
        Span::new(line as u32, column as u32)
    }
}

fn token_kind(raw: RawToken) -> TokenKind {
    match raw {
        RawToken::Dot => TokenKind::Dot,
        RawToken::Comma => TokenKind::Comma,
        RawToken::LParen => TokenKind::LParen,
        RawToken::RParen => TokenKind::RParen,
        RawToken::LBracket => TokenKind::LBracket,
        RawToken::RBracket => TokenKind::RBracket,
        RawToken::Semicolon => TokenKind::Semicolon,
        RawToken::LBrace => TokenKind::LBrace,
        RawToken::RBrace => TokenKind::RBrace,
        RawToken::Plus => TokenKind::Plus,
        RawToken::Minus => TokenKind::Minus,
        RawToken::Times => TokenKind::Times,
        RawToken::Divide => TokenKind::Divide,
        RawToken::Assign => TokenKind::Assign,
        RawToken::And => TokenKind::And,
        RawToken::Or => TokenKind::Or,
        RawToken::Not => TokenKind::Not,
        RawToken::Equal => TokenKind::Equal,
        RawToken::NotEqual => TokenKind::NotEqual,
        RawToken::Less => TokenKind::Less,
        RawToken::LessEq => TokenKind::LessEq,
        RawToken::Greater => TokenKind::Greater,
        RawToken::GreaterEq => TokenKind::GreaterEq,
        RawToken::IntType => TokenKind::IntType,
        RawToken::DoubleType => TokenKind::DoubleType,
        RawToken::StringType => TokenKind::StringType,
        RawToken::BoolType => TokenKind::BoolType,
        RawToken::VoidType => TokenKind::VoidType,
        RawToken::Struct => TokenKind::Struct,
        RawToken::Array => TokenKind::Array,
        RawToken::For => TokenKind::For,
        RawToken::While => TokenKind::While,
        RawToken::If => TokenKind::If,
        RawToken::ElseIf => TokenKind::ElseIf,
        RawToken::Else => TokenKind::Else,
        RawToken::New => TokenKind::New,
        RawToken::Return => TokenKind::Return,
        RawToken::True | RawToken::False => TokenKind::BoolVal,
        RawToken::Null => TokenKind::NullVal,
        RawToken::Ident => TokenKind::Id,
        RawToken::Int => TokenKind::IntVal,
        RawToken::Double => TokenKind::DoubleVal,
        RawToken::Str => TokenKind::StringVal,
        RawToken::LeadingZeroInt | RawToken::MissingFraction | RawToken::UnterminatedStr => {
            unreachable!("error patterns are handled before kind mapping")
        }
    }
}
