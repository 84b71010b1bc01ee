//! Pretty printer for Opal programs
//!
//! Unparses an AST back to source text: two-space indentation, semicolons
//! after simple statements, operators space-separated. Printing and then
//! re-parsing yields the same tree.

use crate::ast::*;

/// Pretty printer state.
pub struct Printer {
    out: String,
    indent: usize,
}

impl Printer {
    /// Pretty-print a program to source text.
    pub fn print(program: &Program) -> String {
        let mut printer = Printer {
            out: String::new(),
            indent: 0,
        };
        printer.program(program);
        printer.out
    }

    fn push(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn push_indent(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
    }

    fn program(&mut self, program: &Program) {
        for struct_def in &program.structs {
            self.struct_def(struct_def);
            self.push("\n");
        }
        for fun_def in &program.functions {
            self.fun_def(fun_def);
            self.push("\n");
        }
    }

    fn struct_def(&mut self, struct_def: &StructDef) {
        self.push("struct ");
        self.push(&struct_def.name.name);
        self.push(" {\n");
        self.indent += 1;
        for field in &struct_def.fields {
            self.push_indent();
            self.var_def(field);
            self.push(";\n");
        }
        self.indent -= 1;
        self.push("}\n");
    }

    fn fun_def(&mut self, fun_def: &FunDef) {
        self.data_type(&fun_def.return_type);
        self.push(" ");
        self.push(&fun_def.name.name);
        self.push("(");
        for (i, param) in fun_def.params.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.var_def(param);
        }
        self.push(") {\n");
        self.indent += 1;
        for stmt in &fun_def.body {
            self.stmt_line(stmt);
        }
        self.indent -= 1;
        self.push("}\n");
    }

    fn data_type(&mut self, data_type: &DataType) {
        if data_type.is_array {
            self.push("array ");
        }
        self.push(data_type.name.lexeme());
    }

    fn var_def(&mut self, var_def: &VarDef) {
        self.data_type(&var_def.data_type);
        self.push(" ");
        self.push(&var_def.name.name);
    }

    /// One statement on its own line, with a trailing semicolon for the
    /// simple statement forms.
    fn stmt_line(&mut self, stmt: &Stmt) {
        self.push_indent();
        self.stmt(stmt);
        if matches!(
            stmt,
            Stmt::VarDecl(_) | Stmt::Assign(_) | Stmt::Return(_) | Stmt::Call(_)
        ) {
            self.push(";");
        }
        self.push("\n");
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::VarDecl(decl) => self.var_decl(decl),
            Stmt::Assign(assign) => self.assign(assign),
            Stmt::While(while_stmt) => self.while_stmt(while_stmt),
            Stmt::For(for_stmt) => self.for_stmt(for_stmt),
            Stmt::If(if_stmt) => self.if_stmt(if_stmt),
            Stmt::Return(ret) => {
                self.push("return ");
                self.expr(&ret.value);
            }
            Stmt::Call(call) => self.call(call),
        }
    }

    fn var_decl(&mut self, decl: &VarDecl) {
        self.var_def(&decl.var_def);
        if let Some(init) = &decl.init {
            self.push(" = ");
            self.expr(init);
        }
    }

    fn assign(&mut self, assign: &AssignStmt) {
        self.path(&assign.lvalue);
        self.push(" = ");
        self.expr(&assign.value);
    }

    fn while_stmt(&mut self, while_stmt: &WhileStmt) {
        self.push("while (");
        self.expr(&while_stmt.condition);
        self.push(") {\n");
        self.indent += 1;
        for stmt in &while_stmt.body {
            self.stmt_line(stmt);
        }
        self.indent -= 1;
        self.push_indent();
        self.push("}");
    }

    fn for_stmt(&mut self, for_stmt: &ForStmt) {
        self.push("for (");
        self.var_decl(&for_stmt.var_decl);
        self.push("; ");
        self.expr(&for_stmt.condition);
        self.push("; ");
        self.assign(&for_stmt.update);
        self.push(") {\n");
        self.indent += 1;
        for stmt in &for_stmt.body {
            self.stmt_line(stmt);
        }
        self.indent -= 1;
        self.push_indent();
        self.push("}");
    }

    fn if_stmt(&mut self, if_stmt: &IfStmt) {
        self.push("if (");
        self.expr(&if_stmt.if_part.condition);
        self.push(") {\n");
        self.block_body(&if_stmt.if_part.body);
        for else_if in &if_stmt.else_ifs {
            self.push("\n");
            self.push_indent();
            self.push("elseif (");
            self.expr(&else_if.condition);
            self.push(") {\n");
            self.block_body(&else_if.body);
        }
        if !if_stmt.else_body.is_empty() {
            self.push("\n");
            self.push_indent();
            self.push("else {\n");
            self.block_body(&if_stmt.else_body);
        }
    }

    fn block_body(&mut self, body: &[Stmt]) {
        self.indent += 1;
        for stmt in body {
            self.stmt_line(stmt);
        }
        self.indent -= 1;
        self.push_indent();
        self.push("}");
    }

    fn call(&mut self, call: &CallExpr) {
        self.push(&call.name.name);
        self.push("(");
        for (i, arg) in call.args.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(arg);
        }
        self.push(")");
    }

    fn expr(&mut self, expr: &Expr) {
        if expr.negated {
            self.push("not ");
        }
        self.term(&expr.first);
        if let Some(op) = expr.op {
            self.push(" ");
            self.push(op.lexeme());
            self.push(" ");
        }
        if let Some(rest) = &expr.rest {
            self.expr(rest);
        }
    }

    fn term(&mut self, term: &Term) {
        match term {
            Term::Simple(rvalue) => self.rvalue(rvalue),
            Term::Paren(inner) => {
                self.push("(");
                self.expr(inner);
                self.push(")");
            }
        }
    }

    fn rvalue(&mut self, rvalue: &RValue) {
        match rvalue {
            RValue::Literal(literal) => self.literal(literal),
            RValue::New(new_expr) => self.new_expr(new_expr),
            RValue::Path(path) => self.path(path),
            RValue::Call(call) => self.call(call),
        }
    }

    fn literal(&mut self, literal: &Literal) {
        match &literal.kind {
            LiteralKind::Int(i) => self.push(&i.to_string()),
            LiteralKind::Double(d) => {
                // Keep a decimal point so the literal re-parses as a double.
                if d.fract() == 0.0 && d.is_finite() {
                    self.push(&format!("{:.1}", d));
                } else {
                    self.push(&d.to_string());
                }
            }
            LiteralKind::Bool(b) => self.push(if *b { "true" } else { "false" }),
            LiteralKind::Str(s) => {
                self.push("\"");
                self.push(s);
                self.push("\"");
            }
            LiteralKind::Null => self.push("null"),
        }
    }

    fn new_expr(&mut self, new_expr: &NewExpr) {
        self.push("new ");
        self.push(new_expr.type_name.lexeme());
        match &new_expr.kind {
            NewKind::Struct(args) => {
                self.push("(");
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.expr(arg);
                }
                self.push(")");
            }
            NewKind::Array(len) => {
                self.push("[");
                self.expr(len);
                self.push("]");
            }
        }
    }

    fn path(&mut self, path: &[VarRef]) {
        for (i, var_ref) in path.iter().enumerate() {
            if i > 0 {
                self.push(".");
            }
            self.push(&var_ref.name.name);
            if let Some(index) = &var_ref.index {
                self.push("[");
                self.expr(index);
                self.push("]");
            }
        }
    }
}
