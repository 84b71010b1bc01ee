//! Static semantic analysis for the Opal language
//!
//! The [`Checker`] validates a parsed program before code generation:
//! name resolution, duplicate definitions, the `main` signature, type
//! compatibility of declarations, assignments, expressions, calls, and
//! struct construction. `null` is typed as `void` and is assignable to any
//! declared type; everything else must match exactly.

mod error;
mod symbol_table;
mod types;

pub use error::StaticError;
pub use symbol_table::SymbolTable;
pub use types::{BaseType, ValueType};

use opal_parser::ast::*;
use opal_parser::Span;
use rustc_hash::FxHashMap;

/// Function names reserved for the language's built-ins.
pub const BUILT_INS: &[&str] = &[
    "print", "input", "itos", "itod", "dtos", "dtoi", "stoi", "stod", "length", "get",
];

type CheckResult<T> = Result<T, StaticError>;

/// A user-defined function's signature.
struct FunSig {
    params: Vec<ValueType>,
    return_type: ValueType,
}

/// Static semantic checker.
pub struct Checker {
    /// Struct name -> fields in declaration order
    structs: FxHashMap<String, Vec<(String, ValueType)>>,
    /// Function name -> signature
    functions: FxHashMap<String, FunSig>,
    table: SymbolTable,
    current_return: ValueType,
}

impl Checker {
    /// Check a complete program.
    pub fn check(program: &Program) -> CheckResult<()> {
        let mut checker = Checker {
            structs: FxHashMap::default(),
            functions: FxHashMap::default(),
            table: SymbolTable::new(),
            current_return: ValueType::null(),
        };
        checker.run(program)
    }

    fn run(&mut self, program: &Program) -> CheckResult<()> {
        // Collect struct names first so fields may refer to any struct,
        // including mutually recursive ones.
        for struct_def in &program.structs {
            let name = &struct_def.name.name;
            if self.structs.contains_key(name) {
                return Err(StaticError::at(
                    format!("duplicate definition of '{}'", name),
                    struct_def.name.span,
                ));
            }
            self.structs.insert(name.clone(), Vec::new());
        }
        for struct_def in &program.structs {
            let mut fields = Vec::new();
            for field in &struct_def.fields {
                let field_type = self.resolve_type(&field.data_type)?;
                if fields.iter().any(|(n, _)| n == &field.name.name) {
                    return Err(StaticError::at(
                        format!("duplicate field '{}'", field.name.name),
                        field.name.span,
                    ));
                }
                fields.push((field.name.name.clone(), field_type));
            }
            self.structs.insert(struct_def.name.name.clone(), fields);
        }

        // Collect function signatures.
        for fun_def in &program.functions {
            let name = &fun_def.name.name;
            if self.functions.contains_key(name) {
                return Err(StaticError::at(
                    format!("duplicate definition of '{}'", name),
                    fun_def.name.span,
                ));
            }
            if BUILT_INS.contains(&name.as_str()) {
                return Err(StaticError::at(
                    format!("redefining built-in function '{}'", name),
                    fun_def.name.span,
                ));
            }
            let return_type = self.resolve_type(&fun_def.return_type)?;
            if name == "main" {
                if return_type != ValueType::null() {
                    return Err(StaticError::at(
                        "main must have void return type",
                        fun_def.name.span,
                    ));
                }
                if !fun_def.params.is_empty() {
                    return Err(StaticError::at(
                        "main must not take parameters",
                        fun_def.name.span,
                    ));
                }
            }
            let params = fun_def
                .params
                .iter()
                .map(|p| self.resolve_type(&p.data_type))
                .collect::<CheckResult<Vec<_>>>()?;
            self.functions.insert(name.clone(), FunSig { params, return_type });
        }
        if !self.functions.contains_key("main") {
            return Err(StaticError::global("missing main function"));
        }

        for fun_def in &program.functions {
            self.check_fun(fun_def)?;
        }
        Ok(())
    }

    fn check_fun(&mut self, fun_def: &FunDef) -> CheckResult<()> {
        self.current_return = self.resolve_type(&fun_def.return_type)?;
        self.table.push_scope();
        for param in &fun_def.params {
            if self.table.declared_in_current(&param.name.name) {
                self.table.pop_scope();
                return Err(StaticError::at(
                    format!("duplicate parameter '{}'", param.name.name),
                    param.name.span,
                ));
            }
            let param_type = self.resolve_type(&param.data_type)?;
            self.table.declare(&param.name.name, param_type);
        }
        let result = self.check_block(&fun_def.body);
        self.table.pop_scope();
        result
    }

    /// Resolve a syntactic type, rejecting unknown struct names.
    fn resolve_type(&self, data_type: &DataType) -> CheckResult<ValueType> {
        if let TypeName::Id(name) = &data_type.name {
            if !self.structs.contains_key(name) {
                return Err(StaticError::at(
                    format!("invalid type '{}'", name),
                    data_type.span,
                ));
            }
        }
        Ok(ValueType::from(data_type))
    }

    // ===== Statements =====

    fn check_block(&mut self, body: &[Stmt]) -> CheckResult<()> {
        for stmt in body {
            self.check_stmt(stmt)?;
        }
        Ok(())
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> CheckResult<()> {
        match stmt {
            Stmt::VarDecl(decl) => self.check_var_decl(decl),
            Stmt::Assign(assign) => self.check_assign(assign),
            Stmt::While(while_stmt) => {
                self.table.push_scope();
                let result = self
                    .require_bool(&while_stmt.condition)
                    .and_then(|_| self.check_block(&while_stmt.body));
                self.table.pop_scope();
                result
            }
            Stmt::For(for_stmt) => {
                self.table.push_scope();
                let result = self
                    .check_var_decl(&for_stmt.var_decl)
                    .and_then(|_| self.require_bool(&for_stmt.condition))
                    .and_then(|_| self.check_assign(&for_stmt.update))
                    .and_then(|_| self.check_block(&for_stmt.body));
                self.table.pop_scope();
                result
            }
            Stmt::If(if_stmt) => {
                for arm in std::iter::once(&if_stmt.if_part).chain(&if_stmt.else_ifs) {
                    self.table.push_scope();
                    let result = self
                        .require_bool(&arm.condition)
                        .and_then(|_| self.check_block(&arm.body));
                    self.table.pop_scope();
                    result?;
                }
                self.table.push_scope();
                let result = self.check_block(&if_stmt.else_body);
                self.table.pop_scope();
                result
            }
            Stmt::Return(ret) => {
                let value_type = self.check_expr(&ret.value)?;
                if !self.current_return.accepts(&value_type) {
                    return Err(StaticError::at(
                        format!(
                            "mismatched return type: expected {}, found {}",
                            self.current_return, value_type
                        ),
                        expr_span(&ret.value),
                    ));
                }
                Ok(())
            }
            Stmt::Call(call) => self.check_call(call).map(|_| ()),
        }
    }

    fn check_var_decl(&mut self, decl: &VarDecl) -> CheckResult<()> {
        let name = &decl.var_def.name;
        let declared = self.resolve_type(&decl.var_def.data_type)?;
        if self.table.declared_in_current(&name.name) {
            return Err(StaticError::at(
                format!("duplicate variable '{}'", name.name),
                name.span,
            ));
        }
        if let Some(init) = &decl.init {
            let init_type = self.check_expr(init)?;
            if !declared.accepts(&init_type) {
                return Err(StaticError::at(
                    format!(
                        "mismatched types in declaration of '{}': expected {}, found {}",
                        name.name, declared, init_type
                    ),
                    name.span,
                ));
            }
        }
        self.table.declare(&name.name, declared);
        Ok(())
    }

    fn check_assign(&mut self, assign: &AssignStmt) -> CheckResult<()> {
        let target = self.resolve_path(&assign.lvalue)?;
        let value_type = self.check_expr(&assign.value)?;
        if !target.accepts(&value_type) {
            return Err(StaticError::at(
                format!(
                    "mismatched types in assignment: expected {}, found {}",
                    target, value_type
                ),
                assign.lvalue[0].name.span,
            ));
        }
        Ok(())
    }

    fn require_bool(&mut self, condition: &Expr) -> CheckResult<()> {
        let condition_type = self.check_expr(condition)?;
        if condition_type != ValueType::base(BaseType::Bool) {
            return Err(StaticError::at(
                "expecting boolean expression",
                expr_span(condition),
            ));
        }
        Ok(())
    }

    // ===== Expressions =====

    fn check_expr(&mut self, expr: &Expr) -> CheckResult<ValueType> {
        let lhs = self.check_term(&expr.first)?;
        let result = match (expr.op, &expr.rest) {
            (Some(op), Some(rest)) => {
                let rhs = self.check_expr(rest)?;
                self.check_binary(op, &lhs, &rhs, expr_span(expr))?
            }
            _ => lhs,
        };
        if expr.negated && result != ValueType::base(BaseType::Bool) {
            return Err(StaticError::at(
                "expecting boolean expression",
                expr_span(expr),
            ));
        }
        Ok(result)
    }

    fn check_term(&mut self, term: &Term) -> CheckResult<ValueType> {
        match term {
            Term::Simple(rvalue) => self.check_rvalue(rvalue),
            Term::Paren(inner) => self.check_expr(inner),
        }
    }

    fn check_binary(
        &self,
        op: BinOp,
        lhs: &ValueType,
        rhs: &ValueType,
        span: Span,
    ) -> CheckResult<ValueType> {
        use BaseType::*;
        let scalar_match = lhs == rhs && !lhs.is_array;
        let result = match op {
            BinOp::Plus if scalar_match && lhs.base == Str => Some(ValueType::base(Str)),
            BinOp::Plus | BinOp::Minus | BinOp::Times | BinOp::Divide
                if scalar_match && matches!(lhs.base, Int | Double) =>
            {
                Some(ValueType::base(lhs.base.clone()))
            }
            BinOp::And | BinOp::Or if scalar_match && lhs.base == Bool => {
                Some(ValueType::base(Bool))
            }
            BinOp::Equal | BinOp::NotEqual
                if lhs.is_null() || rhs.is_null() || lhs == rhs =>
            {
                Some(ValueType::base(Bool))
            }
            BinOp::Less | BinOp::LessEq | BinOp::Greater | BinOp::GreaterEq
                if scalar_match && matches!(lhs.base, Int | Double | Str) =>
            {
                Some(ValueType::base(Bool))
            }
            _ => None,
        };
        result.ok_or_else(|| {
            StaticError::at(
                format!("operator '{}' cannot be applied to {} and {}", op, lhs, rhs),
                span,
            )
        })
    }

    fn check_rvalue(&mut self, rvalue: &RValue) -> CheckResult<ValueType> {
        match rvalue {
            RValue::Literal(literal) => Ok(match literal.kind {
                LiteralKind::Int(_) => ValueType::base(BaseType::Int),
                LiteralKind::Double(_) => ValueType::base(BaseType::Double),
                LiteralKind::Bool(_) => ValueType::base(BaseType::Bool),
                LiteralKind::Str(_) => ValueType::base(BaseType::Str),
                LiteralKind::Null => ValueType::null(),
            }),
            RValue::New(new_expr) => self.check_new(new_expr),
            RValue::Path(path) => self.resolve_path(path),
            RValue::Call(call) => self.check_call(call),
        }
    }

    fn check_new(&mut self, new_expr: &NewExpr) -> CheckResult<ValueType> {
        match &new_expr.kind {
            NewKind::Struct(args) => {
                let name = match &new_expr.type_name {
                    TypeName::Id(name) => name.clone(),
                    other => {
                        return Err(StaticError::at(
                            format!("'{}' is not a struct type", other),
                            new_expr.span,
                        ))
                    }
                };
                let fields = self.structs.get(&name).cloned().ok_or_else(|| {
                    StaticError::at(format!("invalid type '{}'", name), new_expr.span)
                })?;
                if args.len() != fields.len() {
                    return Err(StaticError::at(
                        format!(
                            "'{}' expects {} field initializers, found {}",
                            name,
                            fields.len(),
                            args.len()
                        ),
                        new_expr.span,
                    ));
                }
                for (arg, (field_name, field_type)) in args.iter().zip(&fields) {
                    let arg_type = self.check_expr(arg)?;
                    if !field_type.accepts(&arg_type) {
                        return Err(StaticError::at(
                            format!(
                                "field '{}' expects {}, found {}",
                                field_name, field_type, arg_type
                            ),
                            expr_span(arg),
                        ));
                    }
                }
                Ok(ValueType::base(BaseType::Struct(name)))
            }
            NewKind::Array(len) => {
                let len_type = self.check_expr(len)?;
                if len_type != ValueType::base(BaseType::Int) {
                    return Err(StaticError::at(
                        "array length must be an int",
                        expr_span(len),
                    ));
                }
                let element = DataType {
                    is_array: false,
                    name: new_expr.type_name.clone(),
                    span: new_expr.span,
                };
                let element_type = self.resolve_type(&element)?;
                Ok(ValueType {
                    is_array: true,
                    base: element_type.base,
                })
            }
        }
    }

    fn check_call(&mut self, call: &CallExpr) -> CheckResult<ValueType> {
        let name = call.name.name.as_str();
        if BUILT_INS.contains(&name) {
            return self.check_built_in(call);
        }
        let (params, return_type) = match self.functions.get(name) {
            Some(sig) => (sig.params.clone(), sig.return_type.clone()),
            None => {
                return Err(StaticError::at(
                    format!("unrecognized function '{}'", name),
                    call.name.span,
                ))
            }
        };
        if call.args.len() != params.len() {
            return Err(StaticError::at(
                format!(
                    "'{}' expects {} arguments, found {}",
                    name,
                    params.len(),
                    call.args.len()
                ),
                call.name.span,
            ));
        }
        for (arg, param) in call.args.iter().zip(&params) {
            let arg_type = self.check_expr(arg)?;
            if !param.accepts(&arg_type) {
                return Err(StaticError::at(
                    format!("argument expects {}, found {}", param, arg_type),
                    expr_span(arg),
                ));
            }
        }
        Ok(return_type)
    }

    fn check_built_in(&mut self, call: &CallExpr) -> CheckResult<ValueType> {
        use BaseType::*;
        let name = call.name.name.as_str();
        let arity = if name == "get" {
            2
        } else if name == "input" {
            0
        } else {
            1
        };
        if call.args.len() != arity {
            return Err(StaticError::at(
                format!("'{}' expects {} argument(s)", name, arity),
                call.name.span,
            ));
        }
        let arg_types = call
            .args
            .iter()
            .map(|arg| self.check_expr(arg))
            .collect::<CheckResult<Vec<_>>>()?;
        let expect = |ok: bool, index: usize, wanted: &str| -> CheckResult<()> {
            if ok {
                Ok(())
            } else {
                Err(StaticError::at(
                    format!("'{}' expects a {} argument", name, wanted),
                    call.args
                        .get(index)
                        .map(expr_span)
                        .unwrap_or(call.name.span),
                ))
            }
        };
        match name {
            "print" => {
                let t = &arg_types[0];
                expect(
                    !t.is_array && matches!(t.base, Int | Double | Bool | Str),
                    0,
                    "base-type",
                )?;
                Ok(ValueType::null())
            }
            "input" => Ok(ValueType::base(Str)),
            "itos" => {
                expect(arg_types[0] == ValueType::base(Int), 0, "int")?;
                Ok(ValueType::base(Str))
            }
            "itod" => {
                expect(arg_types[0] == ValueType::base(Int), 0, "int")?;
                Ok(ValueType::base(Double))
            }
            "dtos" => {
                expect(arg_types[0] == ValueType::base(Double), 0, "double")?;
                Ok(ValueType::base(Str))
            }
            "dtoi" => {
                expect(arg_types[0] == ValueType::base(Double), 0, "double")?;
                Ok(ValueType::base(Int))
            }
            "stoi" => {
                expect(arg_types[0] == ValueType::base(Str), 0, "string")?;
                Ok(ValueType::base(Int))
            }
            "stod" => {
                expect(arg_types[0] == ValueType::base(Str), 0, "string")?;
                Ok(ValueType::base(Double))
            }
            "length" => {
                let t = &arg_types[0];
                expect(t.is_array || *t == ValueType::base(Str), 0, "string or array")?;
                Ok(ValueType::base(Int))
            }
            "get" => {
                expect(arg_types[0] == ValueType::base(Int), 0, "int")?;
                expect(arg_types[1] == ValueType::base(Str), 1, "string")?;
                Ok(ValueType::base(Str))
            }
            _ => unreachable!("not a built-in: {name}"),
        }
    }

    /// Resolve a variable path (lvalue or rvalue) to its type.
    fn resolve_path(&mut self, path: &[VarRef]) -> CheckResult<ValueType> {
        let first = &path[0];
        let mut current = match self.table.lookup(&first.name.name) {
            Some(value_type) => value_type.clone(),
            None => {
                return Err(StaticError::at(
                    format!("undefined variable '{}'", first.name.name),
                    first.name.span,
                ))
            }
        };
        current = self.apply_index(current, first)?;
        for segment in &path[1..] {
            if current.is_array {
                return Err(StaticError::at(
                    "expecting array index before field access",
                    segment.name.span,
                ));
            }
            let struct_name = match &current.base {
                BaseType::Struct(name) => name.clone(),
                other => {
                    return Err(StaticError::at(
                        format!("field access on non-struct type '{}'", ValueType::base(other.clone())),
                        segment.name.span,
                    ))
                }
            };
            let fields = self.structs.get(&struct_name).cloned().unwrap_or_default();
            let field_type = match fields.iter().find(|(n, _)| n == &segment.name.name) {
                Some((_, field_type)) => field_type.clone(),
                None => {
                    return Err(StaticError::at(
                        format!(
                            "field '{}' does not exist in struct '{}'",
                            segment.name.name, struct_name
                        ),
                        segment.name.span,
                    ))
                }
            };
            current = self.apply_index(field_type, segment)?;
        }
        Ok(current)
    }

    /// Apply a path segment's optional array index to its type.
    fn apply_index(&mut self, value_type: ValueType, segment: &VarRef) -> CheckResult<ValueType> {
        match &segment.index {
            None => Ok(value_type),
            Some(index) => {
                let index_type = self.check_expr(index)?;
                if index_type != ValueType::base(BaseType::Int) {
                    return Err(StaticError::at(
                        "array index must be an int",
                        expr_span(index),
                    ));
                }
                if !value_type.is_array {
                    return Err(StaticError::at(
                        format!("indexing non-array '{}'", segment.name.name),
                        segment.name.span,
                    ));
                }
                Ok(ValueType {
                    is_array: false,
                    base: value_type.base,
                })
            }
        }
    }
}

/// Best-effort source position for an expression (its leftmost leaf).
fn expr_span(expr: &Expr) -> Span {
    match &expr.first {
        Term::Paren(inner) => expr_span(inner),
        Term::Simple(rvalue) => match rvalue {
            RValue::Literal(literal) => literal.span,
            RValue::New(new_expr) => new_expr.span,
            RValue::Path(path) => path[0].name.span,
            RValue::Call(call) => call.name.span,
        },
    }
}
