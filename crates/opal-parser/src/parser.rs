//! Recursive-descent parser for the Opal language
//!
//! The parser works over a pre-tokenized input with one token of lookahead.
//! Statement dispatch memoizes the first token of a statement to decide
//! between a variable declaration, an assignment, and a call statement.
//! Expressions are parsed as right-leaning operator chains with no
//! precedence, matching the language grammar.

use crate::ast::*;
use crate::error::{LexError, ParseError};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

/// Parser state for the Opal language.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type ParseResult<T> = Result<T, ParseError>;

impl Parser {
    /// Create a parser over the given source, tokenizing it first.
    pub fn new(source: &str) -> Result<Self, LexError> {
        let tokens = Lexer::new(source).tokenize()?;
        Ok(Self::from_tokens(tokens))
    }

    /// Create a parser over an existing token stream.
    pub fn from_tokens(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Parse a complete program.
    pub fn parse(mut self) -> ParseResult<Program> {
        let mut program = Program::default();
        while !self.check(TokenKind::Eos) {
            if self.check(TokenKind::Struct) {
                program.structs.push(self.struct_def()?);
            } else {
                program.functions.push(self.fun_def()?);
            }
        }
        Ok(program)
    }

    // ===== Helpers =====

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(message))
        }
    }

    fn error(&self, message: &str) -> ParseError {
        let token = self.peek();
        ParseError::new(message, token.lexeme.clone(), token.span)
    }

    fn is_base_type(kind: TokenKind) -> bool {
        matches!(
            kind,
            TokenKind::IntType | TokenKind::DoubleType | TokenKind::BoolType | TokenKind::StringType
        )
    }

    fn type_name_of(token: &Token) -> TypeName {
        match token.kind {
            TokenKind::IntType => TypeName::Int,
            TokenKind::DoubleType => TypeName::Double,
            TokenKind::BoolType => TypeName::Bool,
            TokenKind::StringType => TypeName::Str,
            TokenKind::VoidType => TypeName::Void,
            _ => TypeName::Id(token.lexeme.clone()),
        }
    }

    fn ident(token: Token) -> Ident {
        Ident::new(token.lexeme, token.span)
    }

    // ===== Definitions =====

    fn struct_def(&mut self) -> ParseResult<StructDef> {
        self.expect(TokenKind::Struct, "expecting 'struct'")?;
        let name = Self::ident(self.expect(TokenKind::Id, "expecting identifier")?);
        self.expect(TokenKind::LBrace, "expecting '{'")?;
        let mut fields = Vec::new();
        while !self.check(TokenKind::RBrace) {
            let data_type = self.data_type()?;
            let field_name = Self::ident(self.expect(TokenKind::Id, "expecting identifier")?);
            self.expect(TokenKind::Semicolon, "expecting ';'")?;
            fields.push(VarDef {
                data_type,
                name: field_name,
            });
        }
        self.expect(TokenKind::RBrace, "expecting '}'")?;
        Ok(StructDef { name, fields })
    }

    fn fun_def(&mut self) -> ParseResult<FunDef> {
        let return_type = if self.check(TokenKind::VoidType) {
            let token = self.advance();
            DataType {
                is_array: false,
                name: TypeName::Void,
                span: token.span,
            }
        } else {
            self.data_type()?
        };
        let name = Self::ident(self.expect(TokenKind::Id, "expecting identifier")?);
        self.expect(TokenKind::LParen, "expecting '('")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let data_type = self.data_type()?;
                let param_name = Self::ident(self.expect(TokenKind::Id, "expecting identifier")?);
                params.push(VarDef {
                    data_type,
                    name: param_name,
                });
                if !self.check(TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.expect(TokenKind::RParen, "expecting ')'")?;
        self.expect(TokenKind::LBrace, "expecting '{'")?;
        let body = self.block()?;
        self.expect(TokenKind::RBrace, "expecting '}'")?;
        Ok(FunDef {
            return_type,
            name,
            params,
            body,
        })
    }

    fn data_type(&mut self) -> ParseResult<DataType> {
        let token = self.peek().clone();
        match token.kind {
            kind if Self::is_base_type(kind) => {
                self.advance();
                Ok(DataType {
                    is_array: false,
                    name: Self::type_name_of(&token),
                    span: token.span,
                })
            }
            TokenKind::Id => {
                self.advance();
                Ok(DataType {
                    is_array: false,
                    name: TypeName::Id(token.lexeme),
                    span: token.span,
                })
            }
            TokenKind::Array => {
                self.advance();
                let base = self.peek().clone();
                if Self::is_base_type(base.kind) || base.kind == TokenKind::Id {
                    self.advance();
                    Ok(DataType {
                        is_array: true,
                        name: Self::type_name_of(&base),
                        span: token.span,
                    })
                } else {
                    Err(self.error("expecting identifier or primitive type"))
                }
            }
            _ => Err(self.error("expecting data type")),
        }
    }

    // ===== Statements =====

    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eos) {
            stmts.push(self.stmt()?);
        }
        Ok(stmts)
    }

    fn stmt(&mut self) -> ParseResult<Stmt> {
        match self.peek().kind {
            TokenKind::While => Ok(Stmt::While(self.while_stmt()?)),
            TokenKind::If => Ok(Stmt::If(self.if_stmt()?)),
            TokenKind::For => Ok(Stmt::For(self.for_stmt()?)),
            TokenKind::Return => {
                self.advance();
                let value = self.expr()?;
                self.expect(TokenKind::Semicolon, "expecting ';'")?;
                Ok(Stmt::Return(ReturnStmt { value }))
            }
            kind if Self::is_base_type(kind)
                || kind == TokenKind::Id
                || kind == TokenKind::Array =>
            {
                let first = self.advance();
                if self.check(TokenKind::Id) || Self::is_base_type(self.peek().kind) {
                    let stmt = self.var_decl_stmt(first)?;
                    self.expect(TokenKind::Semicolon, "expecting ';'")?;
                    Ok(Stmt::VarDecl(stmt))
                } else if self.check(TokenKind::LParen) {
                    let call = self.call_expr(Self::ident(first))?;
                    self.expect(TokenKind::Semicolon, "expecting ';'")?;
                    Ok(Stmt::Call(call))
                } else {
                    if first.kind != TokenKind::Id {
                        return Err(self.error("expecting identifier"));
                    }
                    let stmt = self.assign_stmt(Self::ident(first))?;
                    self.expect(TokenKind::Semicolon, "expecting ';'")?;
                    Ok(Stmt::Assign(stmt))
                }
            }
            _ => Err(self.error("expecting statement")),
        }
    }

    /// Variable declaration after its leading type token has been consumed.
    fn var_decl_stmt(&mut self, first: Token) -> ParseResult<VarDecl> {
        let data_type = if first.kind == TokenKind::Array {
            let mut data_type = self.data_type()?;
            data_type.is_array = true;
            data_type.span = first.span;
            data_type
        } else {
            DataType {
                is_array: false,
                name: Self::type_name_of(&first),
                span: first.span,
            }
        };
        let name = Self::ident(self.expect(TokenKind::Id, "expecting identifier")?);
        let init = if self.check(TokenKind::Assign) {
            self.advance();
            Some(self.expr()?)
        } else {
            None
        };
        Ok(VarDecl {
            var_def: VarDef { data_type, name },
            init,
        })
    }

    /// Assignment after its leading identifier has been consumed.
    fn assign_stmt(&mut self, first: Ident) -> ParseResult<AssignStmt> {
        let lvalue = self.path_tail(first)?;
        self.expect(TokenKind::Assign, "expecting '='")?;
        let value = self.expr()?;
        Ok(AssignStmt { lvalue, value })
    }

    /// Path continuation after its first identifier: an optional index on
    /// the first segment, then any number of `.name[index]` steps.
    fn path_tail(&mut self, first: Ident) -> ParseResult<Vec<VarRef>> {
        let mut path = vec![VarRef {
            name: first,
            index: self.opt_index()?,
        }];
        while self.check(TokenKind::Dot) {
            self.advance();
            let name = Self::ident(self.expect(TokenKind::Id, "expecting identifier")?);
            path.push(VarRef {
                name,
                index: self.opt_index()?,
            });
        }
        Ok(path)
    }

    fn opt_index(&mut self) -> ParseResult<Option<Box<Expr>>> {
        if self.check(TokenKind::LBracket) {
            self.advance();
            let index = self.expr()?;
            self.expect(TokenKind::RBracket, "expecting ']'")?;
            Ok(Some(Box::new(index)))
        } else {
            Ok(None)
        }
    }

    fn while_stmt(&mut self) -> ParseResult<WhileStmt> {
        self.advance();
        self.expect(TokenKind::LParen, "expecting '('")?;
        if self.check(TokenKind::RParen) {
            return Err(self.error("expecting expression"));
        }
        let condition = self.expr()?;
        self.expect(TokenKind::RParen, "expecting ')'")?;
        self.expect(TokenKind::LBrace, "expecting '{'")?;
        let body = self.block()?;
        self.expect(TokenKind::RBrace, "expecting '}'")?;
        Ok(WhileStmt { condition, body })
    }

    fn for_stmt(&mut self) -> ParseResult<ForStmt> {
        self.advance();
        self.expect(TokenKind::LParen, "expecting '('")?;
        // The loop variable's type is a single token; `array` types are not
        // permitted here.
        let type_token = self.peek().clone();
        if !(Self::is_base_type(type_token.kind)
            || type_token.kind == TokenKind::Id
            || type_token.kind == TokenKind::Array)
        {
            return Err(self.error("expecting variable declaration"));
        }
        self.advance();
        let name = Self::ident(self.expect(TokenKind::Id, "expecting identifier")?);
        let init = if self.check(TokenKind::Assign) {
            self.advance();
            Some(self.expr()?)
        } else {
            None
        };
        let var_decl = VarDecl {
            var_def: VarDef {
                data_type: DataType {
                    is_array: false,
                    name: Self::type_name_of(&type_token),
                    span: type_token.span,
                },
                name,
            },
            init,
        };
        self.expect(TokenKind::Semicolon, "expecting ';'")?;
        let condition = self.expr()?;
        self.expect(TokenKind::Semicolon, "expecting ';'")?;
        let update_first = Self::ident(self.expect(TokenKind::Id, "expecting identifier")?);
        let update = self.assign_stmt(update_first)?;
        self.expect(TokenKind::RParen, "expecting ')'")?;
        self.expect(TokenKind::LBrace, "expecting '{'")?;
        let body = self.block()?;
        self.expect(TokenKind::RBrace, "expecting '}'")?;
        Ok(ForStmt {
            var_decl,
            condition,
            update,
            body,
        })
    }

    fn if_stmt(&mut self) -> ParseResult<IfStmt> {
        self.advance();
        let if_part = self.basic_if()?;
        let mut else_ifs = Vec::new();
        let mut else_body = Vec::new();
        loop {
            if self.check(TokenKind::ElseIf) {
                self.advance();
                else_ifs.push(self.basic_if()?);
            } else if self.check(TokenKind::Else) {
                self.advance();
                self.expect(TokenKind::LBrace, "expecting '{'")?;
                else_body = self.block()?;
                self.expect(TokenKind::RBrace, "expecting '}'")?;
                break;
            } else {
                break;
            }
        }
        Ok(IfStmt {
            if_part,
            else_ifs,
            else_body,
        })
    }

    fn basic_if(&mut self) -> ParseResult<BasicIf> {
        self.expect(TokenKind::LParen, "expecting '('")?;
        if self.check(TokenKind::RParen) {
            return Err(self.error("expecting expression"));
        }
        let condition = self.expr()?;
        self.expect(TokenKind::RParen, "expecting ')'")?;
        self.expect(TokenKind::LBrace, "expecting '{'")?;
        let body = self.block()?;
        self.expect(TokenKind::RBrace, "expecting '}'")?;
        Ok(BasicIf { condition, body })
    }

    // ===== Expressions =====

    fn expr(&mut self) -> ParseResult<Expr> {
        // Repeated `not` toggles the flag, so `not not e` normalizes to `e`.
        let mut negated = false;
        while self.check(TokenKind::Not) {
            negated = !negated;
            self.advance();
        }
        let first = if self.check(TokenKind::LParen) {
            self.advance();
            let inner = self.expr()?;
            self.expect(TokenKind::RParen, "expecting ')'")?;
            Term::Paren(Box::new(inner))
        } else {
            Term::Simple(self.rvalue()?)
        };
        let (op, rest) = if let Some(op) = self.peek_bin_op() {
            self.advance();
            if self.peek_bin_op().is_some() {
                return Err(self.error("too many operators"));
            }
            (Some(op), Some(Box::new(self.expr()?)))
        } else {
            (None, None)
        };
        Ok(Expr {
            negated,
            first,
            op,
            rest,
        })
    }

    fn peek_bin_op(&self) -> Option<BinOp> {
        match self.peek().kind {
            TokenKind::Plus => Some(BinOp::Plus),
            TokenKind::Minus => Some(BinOp::Minus),
            TokenKind::Times => Some(BinOp::Times),
            TokenKind::Divide => Some(BinOp::Divide),
            TokenKind::And => Some(BinOp::And),
            TokenKind::Or => Some(BinOp::Or),
            TokenKind::Equal => Some(BinOp::Equal),
            TokenKind::NotEqual => Some(BinOp::NotEqual),
            TokenKind::Less => Some(BinOp::Less),
            TokenKind::LessEq => Some(BinOp::LessEq),
            TokenKind::Greater => Some(BinOp::Greater),
            TokenKind::GreaterEq => Some(BinOp::GreaterEq),
            _ => None,
        }
    }

    fn rvalue(&mut self) -> ParseResult<RValue> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::IntVal => {
                self.advance();
                let value: i64 = token
                    .lexeme
                    .parse()
                    .map_err(|_| ParseError::new("integer literal out of range", token.lexeme.clone(), token.span))?;
                Ok(RValue::Literal(Literal {
                    kind: LiteralKind::Int(value),
                    span: token.span,
                }))
            }
            TokenKind::DoubleVal => {
                self.advance();
                let value: f64 = token
                    .lexeme
                    .parse()
                    .map_err(|_| ParseError::new("malformed double literal", token.lexeme.clone(), token.span))?;
                Ok(RValue::Literal(Literal {
                    kind: LiteralKind::Double(value),
                    span: token.span,
                }))
            }
            TokenKind::BoolVal => {
                self.advance();
                Ok(RValue::Literal(Literal {
                    kind: LiteralKind::Bool(token.lexeme == "true"),
                    span: token.span,
                }))
            }
            TokenKind::StringVal => {
                self.advance();
                Ok(RValue::Literal(Literal {
                    kind: LiteralKind::Str(token.lexeme),
                    span: token.span,
                }))
            }
            TokenKind::NullVal => {
                self.advance();
                Ok(RValue::Literal(Literal {
                    kind: LiteralKind::Null,
                    span: token.span,
                }))
            }
            TokenKind::New => self.new_rvalue(),
            TokenKind::Id => {
                let name = Self::ident(self.advance());
                if self.check(TokenKind::LParen) {
                    Ok(RValue::Call(self.call_expr(name)?))
                } else {
                    Ok(RValue::Path(self.path_tail(name)?))
                }
            }
            TokenKind::Semicolon => Err(self.error("unexpected ';'")),
            _ => Err(self.error("expecting expression")),
        }
    }

    fn new_rvalue(&mut self) -> ParseResult<RValue> {
        self.advance();
        let type_token = self.peek().clone();
        if !(Self::is_base_type(type_token.kind) || type_token.kind == TokenKind::Id) {
            return Err(self.error("expecting identifier or base type"));
        }
        self.advance();
        let type_name = Self::type_name_of(&type_token);
        if self.check(TokenKind::LParen) {
            self.advance();
            let mut args = Vec::new();
            if !self.check(TokenKind::RParen) {
                args.push(self.expr()?);
                while !self.check(TokenKind::RParen) {
                    self.expect(TokenKind::Comma, "expecting ','")?;
                    args.push(self.expr()?);
                }
            }
            self.advance();
            Ok(RValue::New(NewExpr {
                type_name,
                span: type_token.span,
                kind: NewKind::Struct(args),
            }))
        } else if self.check(TokenKind::LBracket) {
            self.advance();
            let len = self.expr()?;
            self.expect(TokenKind::RBracket, "expecting ']'")?;
            Ok(RValue::New(NewExpr {
                type_name,
                span: type_token.span,
                kind: NewKind::Array(Box::new(len)),
            }))
        } else {
            Err(self.error("expecting '(' or '['"))
        }
    }

    /// Call expression after its name has been consumed.
    fn call_expr(&mut self, name: Ident) -> ParseResult<CallExpr> {
        self.expect(TokenKind::LParen, "expecting '('")?;
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            args.push(self.expr()?);
            while self.check(TokenKind::Comma) {
                self.advance();
                args.push(self.expr()?);
            }
        }
        self.expect(TokenKind::RParen, "expecting ')'")?;
        Ok(CallExpr { name, args })
    }
}
