//! AST-to-bytecode lowering

use crate::error::CompileError;
use crate::var_table::VarTable;
use opal_bytecode::{FrameTemplate, Instruction, Literal, Program, UNPATCHED};
use opal_parser::ast::*;
use rustc_hash::FxHashMap;

type CompileResult<T> = Result<T, CompileError>;

/// Single-pass code generator.
pub struct CodeGenerator {
    program: Program,
    current: FrameTemplate,
    var_table: VarTable,
    /// Struct name -> field names in declaration order, for positional
    /// `new` initializers.
    struct_fields: FxHashMap<String, Vec<String>>,
}

impl CodeGenerator {
    /// Compile a checked program into frame templates.
    pub fn compile(program: &opal_parser::ast::Program) -> CompileResult<Program> {
        let mut generator = CodeGenerator {
            program: Program::new(),
            current: FrameTemplate::new("", 0),
            var_table: VarTable::new(),
            struct_fields: FxHashMap::default(),
        };
        for struct_def in &program.structs {
            let fields = struct_def
                .fields
                .iter()
                .map(|field| field.name.name.clone())
                .collect();
            generator
                .struct_fields
                .insert(struct_def.name.name.clone(), fields);
        }
        for fun_def in &program.functions {
            generator.compile_fun(fun_def)?;
        }
        Ok(generator.program)
    }

    fn emit(&mut self, instruction: Instruction) -> usize {
        self.current.emit(instruction)
    }

    fn compile_fun(&mut self, fun_def: &FunDef) -> CompileResult<()> {
        self.current = FrameTemplate::new(&fun_def.name.name, fun_def.params.len());
        self.var_table.push_scope();
        for (i, param) in fun_def.params.iter().enumerate() {
            self.var_table.declare(&param.name.name);
            self.emit(Instruction::Store(i));
        }
        for stmt in &fun_def.body {
            self.compile_stmt(stmt)?;
        }
        if fun_def.return_type.name == TypeName::Void {
            self.emit(Instruction::Push(Literal::Null));
            self.emit(Instruction::Ret);
        }
        self.var_table.pop_scope();
        let template = std::mem::replace(&mut self.current, FrameTemplate::new("", 0));
        self.program.add_template(template);
        Ok(())
    }

    // ===== Statements =====

    fn compile_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::VarDecl(decl) => self.compile_var_decl(decl),
            Stmt::Assign(assign) => self.compile_assign(assign),
            Stmt::While(while_stmt) => self.compile_while(while_stmt),
            Stmt::For(for_stmt) => self.compile_for(for_stmt),
            Stmt::If(if_stmt) => self.compile_if(if_stmt),
            Stmt::Return(ret) => {
                self.compile_expr(&ret.value)?;
                self.emit(Instruction::Ret);
                Ok(())
            }
            Stmt::Call(call) => self.compile_call(call),
        }
    }

    fn compile_var_decl(&mut self, decl: &VarDecl) -> CompileResult<()> {
        match &decl.init {
            Some(init) => self.compile_expr(init)?,
            None => {
                self.emit(Instruction::Push(Literal::Null));
            }
        }
        let slot = self.var_table.declare(&decl.var_def.name.name);
        self.emit(Instruction::Store(slot));
        Ok(())
    }

    fn compile_assign(&mut self, assign: &AssignStmt) -> CompileResult<()> {
        let first = &assign.lvalue[0];
        let slot = self.lookup(&first.name.name)?;
        if assign.lvalue.len() == 1 {
            if let Some(index) = &first.index {
                self.emit(Instruction::Load(slot));
                self.compile_expr(index)?;
                self.compile_expr(&assign.value)?;
                self.emit(Instruction::SetIndex);
            } else {
                self.compile_expr(&assign.value)?;
                self.emit(Instruction::Store(slot));
            }
            return Ok(());
        }

        // Path assignment: load the base, walk to the owner of the final
        // step, then bind with SETF or SETI.
        self.emit(Instruction::Load(slot));
        if let Some(index) = &first.index {
            self.compile_expr(index)?;
            self.emit(Instruction::GetIndex);
        }
        let last = assign.lvalue.len() - 1;
        for (i, segment) in assign.lvalue.iter().enumerate().skip(1) {
            let field = segment.name.name.clone();
            if i == last {
                if let Some(index) = &segment.index {
                    self.emit(Instruction::GetField(field));
                    self.compile_expr(index)?;
                    self.compile_expr(&assign.value)?;
                    self.emit(Instruction::SetIndex);
                } else {
                    self.compile_expr(&assign.value)?;
                    self.emit(Instruction::SetField(field));
                }
            } else {
                self.emit(Instruction::GetField(field));
                if let Some(index) = &segment.index {
                    self.compile_expr(index)?;
                    self.emit(Instruction::GetIndex);
                }
            }
        }
        Ok(())
    }

    fn compile_while(&mut self, while_stmt: &WhileStmt) -> CompileResult<()> {
        let start = self.current.next_index();
        self.compile_expr(&while_stmt.condition)?;
        let exit_jump = self.emit(Instruction::JmpF(UNPATCHED));
        self.var_table.push_scope();
        for stmt in &while_stmt.body {
            self.compile_stmt(stmt)?;
        }
        self.var_table.pop_scope();
        self.emit(Instruction::Jmp(start));
        let landing = self.emit(Instruction::Nop);
        self.current.patch_jump(exit_jump, landing);
        Ok(())
    }

    fn compile_for(&mut self, for_stmt: &ForStmt) -> CompileResult<()> {
        self.var_table.push_scope();
        self.compile_var_decl(&for_stmt.var_decl)?;
        let start = self.current.next_index();
        self.compile_expr(&for_stmt.condition)?;
        let exit_jump = self.emit(Instruction::JmpF(UNPATCHED));
        for stmt in &for_stmt.body {
            self.compile_stmt(stmt)?;
        }
        self.compile_assign(&for_stmt.update)?;
        self.var_table.pop_scope();
        self.emit(Instruction::Jmp(start));
        let landing = self.emit(Instruction::Nop);
        self.current.patch_jump(exit_jump, landing);
        Ok(())
    }

    fn compile_if(&mut self, if_stmt: &IfStmt) -> CompileResult<()> {
        let mut end_jumps = Vec::new();

        self.compile_expr(&if_stmt.if_part.condition)?;
        let mut arm_jump = self.emit(Instruction::JmpF(UNPATCHED));
        self.compile_scoped_block(&if_stmt.if_part.body)?;
        end_jumps.push(self.emit(Instruction::Jmp(UNPATCHED)));
        let mut landing = self.emit(Instruction::Nop);
        self.current.patch_jump(arm_jump, landing);

        for arm in &if_stmt.else_ifs {
            self.compile_expr(&arm.condition)?;
            arm_jump = self.emit(Instruction::JmpF(UNPATCHED));
            self.compile_scoped_block(&arm.body)?;
            end_jumps.push(self.emit(Instruction::Jmp(UNPATCHED)));
            landing = self.emit(Instruction::Nop);
            self.current.patch_jump(arm_jump, landing);
        }

        self.compile_scoped_block(&if_stmt.else_body)?;
        let end = self.emit(Instruction::Nop);
        for jump in end_jumps {
            self.current.patch_jump(jump, end);
        }
        Ok(())
    }

    fn compile_scoped_block(&mut self, body: &[Stmt]) -> CompileResult<()> {
        self.var_table.push_scope();
        for stmt in body {
            self.compile_stmt(stmt)?;
        }
        self.var_table.pop_scope();
        Ok(())
    }

    // ===== Expressions =====

    fn compile_expr(&mut self, expr: &Expr) -> CompileResult<()> {
        match (&expr.op, &expr.rest) {
            (Some(op), Some(rest)) => {
                // `>` and `>=` have no opcodes: swap the operand emission
                // order and compare with CMPLT/CMPLE.
                if matches!(op, BinOp::Greater | BinOp::GreaterEq) {
                    self.compile_expr(rest)?;
                    self.compile_term(&expr.first)?;
                } else {
                    self.compile_term(&expr.first)?;
                    self.compile_expr(rest)?;
                }
                let instruction = match op {
                    BinOp::Plus => Instruction::Add,
                    BinOp::Minus => Instruction::Sub,
                    BinOp::Times => Instruction::Mul,
                    BinOp::Divide => Instruction::Div,
                    BinOp::And => Instruction::And,
                    BinOp::Or => Instruction::Or,
                    BinOp::Equal => Instruction::CmpEq,
                    BinOp::NotEqual => Instruction::CmpNe,
                    BinOp::Less | BinOp::Greater => Instruction::CmpLt,
                    BinOp::LessEq | BinOp::GreaterEq => Instruction::CmpLe,
                };
                self.emit(instruction);
            }
            _ => self.compile_term(&expr.first)?,
        }
        if expr.negated {
            self.emit(Instruction::Not);
        }
        Ok(())
    }

    fn compile_term(&mut self, term: &Term) -> CompileResult<()> {
        match term {
            Term::Simple(rvalue) => self.compile_rvalue(rvalue),
            Term::Paren(inner) => self.compile_expr(inner),
        }
    }

    fn compile_rvalue(&mut self, rvalue: &RValue) -> CompileResult<()> {
        match rvalue {
            RValue::Literal(literal) => {
                let literal = match &literal.kind {
                    LiteralKind::Int(i) => Literal::Int(*i),
                    LiteralKind::Double(d) => Literal::Double(*d),
                    LiteralKind::Bool(b) => Literal::Bool(*b),
                    // Escape sequences are resolved at emission time.
                    LiteralKind::Str(s) => Literal::Str(s.replace("\\n", "\n").replace("\\t", "\t")),
                    LiteralKind::Null => Literal::Null,
                };
                self.emit(Instruction::Push(literal));
                Ok(())
            }
            RValue::New(new_expr) => self.compile_new(new_expr),
            RValue::Path(path) => self.compile_path(path),
            RValue::Call(call) => self.compile_call(call),
        }
    }

    fn compile_new(&mut self, new_expr: &NewExpr) -> CompileResult<()> {
        match &new_expr.kind {
            NewKind::Struct(args) => {
                let name = new_expr.type_name.lexeme().to_string();
                let fields = self
                    .struct_fields
                    .get(&name)
                    .cloned()
                    .ok_or(CompileError::UnknownStruct { name })?;
                self.emit(Instruction::AllocStruct);
                for (arg, field) in args.iter().zip(fields) {
                    self.emit(Instruction::Dup);
                    self.compile_expr(arg)?;
                    self.emit(Instruction::SetField(field));
                }
                Ok(())
            }
            NewKind::Array(len) => {
                self.compile_expr(len)?;
                self.emit(Instruction::AllocArray);
                Ok(())
            }
        }
    }

    fn compile_path(&mut self, path: &[VarRef]) -> CompileResult<()> {
        let first = &path[0];
        let slot = self.lookup(&first.name.name)?;
        self.emit(Instruction::Load(slot));
        if let Some(index) = &first.index {
            self.compile_expr(index)?;
            self.emit(Instruction::GetIndex);
        }
        for segment in &path[1..] {
            self.emit(Instruction::GetField(segment.name.name.clone()));
            if let Some(index) = &segment.index {
                self.compile_expr(index)?;
                self.emit(Instruction::GetIndex);
            }
        }
        Ok(())
    }

    fn compile_call(&mut self, call: &CallExpr) -> CompileResult<()> {
        let arg = |args: &[Expr], i: usize| -> CompileResult<Expr> {
            args.get(i).cloned().ok_or(CompileError::BuiltInArity {
                name: call.name.name.clone(),
            })
        };
        match call.name.name.as_str() {
            "print" => {
                self.compile_expr(&arg(&call.args, 0)?)?;
                self.emit(Instruction::Write);
            }
            "input" => {
                self.emit(Instruction::Read);
            }
            "itos" | "dtos" => {
                self.compile_expr(&arg(&call.args, 0)?)?;
                self.emit(Instruction::ToStr);
            }
            "stoi" | "dtoi" => {
                self.compile_expr(&arg(&call.args, 0)?)?;
                self.emit(Instruction::ToInt);
            }
            "itod" | "stod" => {
                self.compile_expr(&arg(&call.args, 0)?)?;
                self.emit(Instruction::ToDbl);
            }
            "length" => {
                self.compile_expr(&arg(&call.args, 0)?)?;
                self.emit(Instruction::Len);
            }
            "get" => {
                self.compile_expr(&arg(&call.args, 0)?)?;
                self.compile_expr(&arg(&call.args, 1)?)?;
                self.emit(Instruction::GetChar);
            }
            _ => {
                for call_arg in &call.args {
                    self.compile_expr(call_arg)?;
                }
                self.emit(Instruction::Call(call.name.name.clone()));
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> CompileResult<usize> {
        self.var_table
            .get(name)
            .ok_or_else(|| CompileError::UnknownVariable {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_parser::Parser;

    fn compile(source: &str) -> Program {
        let ast = Parser::new(source).unwrap().parse().unwrap();
        CodeGenerator::compile(&ast).unwrap()
    }

    fn main_instructions(source: &str) -> Vec<Instruction> {
        compile(source).get("main").unwrap().instructions.clone()
    }

    #[test]
    fn test_void_main_epilogue() {
        assert_eq!(
            main_instructions("void main() { }"),
            vec![Instruction::Push(Literal::Null), Instruction::Ret]
        );
    }

    #[test]
    fn test_var_decl_and_load() {
        assert_eq!(
            main_instructions("void main() { int x = 5; int y = x; }"),
            vec![
                Instruction::Push(Literal::Int(5)),
                Instruction::Store(0),
                Instruction::Load(0),
                Instruction::Store(1),
                Instruction::Push(Literal::Null),
                Instruction::Ret,
            ]
        );
    }

    #[test]
    fn test_uninitialized_decl_pushes_null() {
        assert_eq!(
            main_instructions("void main() { int x; }")[0],
            Instruction::Push(Literal::Null)
        );
    }

    #[test]
    fn test_parameters_store_in_declaration_order() {
        let program = compile("int sub(int a, int b) { return a - b; } void main() {}");
        let sub = program.get("sub").unwrap();
        assert_eq!(sub.arg_count, 2);
        assert_eq!(
            sub.instructions,
            vec![
                Instruction::Store(0),
                Instruction::Store(1),
                Instruction::Load(0),
                Instruction::Load(1),
                Instruction::Sub,
                Instruction::Ret,
            ]
        );
    }

    #[test]
    fn test_greater_than_swaps_operands() {
        assert_eq!(
            main_instructions("void main() { bool b = 1 > 2; }"),
            vec![
                Instruction::Push(Literal::Int(2)),
                Instruction::Push(Literal::Int(1)),
                Instruction::CmpLt,
                Instruction::Store(0),
                Instruction::Push(Literal::Null),
                Instruction::Ret,
            ]
        );
        let ge = main_instructions("void main() { bool b = 1 >= 2; }");
        assert_eq!(ge[2], Instruction::CmpLe);
    }

    #[test]
    fn test_not_appended_after_expression() {
        let instructions = main_instructions("void main() { bool b = not (1 < 2); }");
        assert_eq!(
            &instructions[..4],
            &[
                Instruction::Push(Literal::Int(1)),
                Instruction::Push(Literal::Int(2)),
                Instruction::CmpLt,
                Instruction::Not,
            ]
        );
    }

    #[test]
    fn test_while_loop_shape() {
        let instructions =
            main_instructions("void main() { int x = 0; while (x < 3) { x = x + 1; } }");
        assert_eq!(
            instructions,
            vec![
                Instruction::Push(Literal::Int(0)),
                Instruction::Store(0),
                // condition
                Instruction::Load(0),
                Instruction::Push(Literal::Int(3)),
                Instruction::CmpLt,
                Instruction::JmpF(11),
                // body
                Instruction::Load(0),
                Instruction::Push(Literal::Int(1)),
                Instruction::Add,
                Instruction::Store(0),
                Instruction::Jmp(2),
                Instruction::Nop,
                Instruction::Push(Literal::Null),
                Instruction::Ret,
            ]
        );
    }

    #[test]
    fn test_if_elseif_else_patching() {
        let instructions = main_instructions(
            "void main() { int x = 0; if (x == 0) { x = 1; } elseif (x == 1) { x = 2; } else { x = 3; } }",
        );
        // Every forward jump is resolved.
        assert!(instructions
            .iter()
            .all(|i| !matches!(i, Instruction::Jmp(UNPATCHED) | Instruction::JmpF(UNPATCHED))));
        // Each JMPF lands on a NOP; each arm-end JMP lands on the final NOP.
        let final_nop = instructions.len() - 3;
        assert_eq!(instructions[final_nop], Instruction::Nop);
        for (i, instruction) in instructions.iter().enumerate() {
            match instruction {
                Instruction::JmpF(target) => {
                    assert!(*target > i);
                    assert_eq!(instructions[*target], Instruction::Nop);
                }
                Instruction::Jmp(target) => assert_eq!(*target, final_nop),
                _ => {}
            }
        }
    }

    #[test]
    fn test_struct_construction() {
        let instructions = main_instructions(
            "struct Node { int val; Node next; } void main() { Node n = new Node(5, null); }",
        );
        assert_eq!(
            &instructions[..7],
            &[
                Instruction::AllocStruct,
                Instruction::Dup,
                Instruction::Push(Literal::Int(5)),
                Instruction::SetField("val".into()),
                Instruction::Dup,
                Instruction::Push(Literal::Null),
                Instruction::SetField("next".into()),
            ]
        );
    }

    #[test]
    fn test_array_construction_and_indexing() {
        let instructions = main_instructions(
            "void main() { array int xs = new int[4]; xs[0] = 9; int y = xs[0]; }",
        );
        assert_eq!(
            &instructions[..3],
            &[
                Instruction::Push(Literal::Int(4)),
                Instruction::AllocArray,
                Instruction::Store(0),
            ]
        );
        assert_eq!(
            &instructions[3..7],
            &[
                Instruction::Load(0),
                Instruction::Push(Literal::Int(0)),
                Instruction::Push(Literal::Int(9)),
                Instruction::SetIndex,
            ]
        );
        assert_eq!(
            &instructions[7..10],
            &[
                Instruction::Load(0),
                Instruction::Push(Literal::Int(0)),
                Instruction::GetIndex,
            ]
        );
    }

    #[test]
    fn test_path_assignment_lowering() {
        let instructions = main_instructions(
            "struct Node { int val; Node next; } void main() { Node n = new Node(1, null); n.next.val = 7; }",
        );
        let tail = &instructions[instructions.len() - 6..];
        assert_eq!(
            tail,
            &[
                Instruction::Load(0),
                Instruction::GetField("next".into()),
                Instruction::Push(Literal::Int(7)),
                Instruction::SetField("val".into()),
                Instruction::Push(Literal::Null),
                Instruction::Ret,
            ]
        );
    }

    #[test]
    fn test_built_ins_compile_to_opcodes() {
        let instructions = main_instructions(
            "void main() { print(itos(stoi(input()))); int n = length(\"abc\"); string c = get(0, \"abc\"); }",
        );
        assert_eq!(
            &instructions[..5],
            &[
                Instruction::Read,
                Instruction::ToInt,
                Instruction::ToStr,
                Instruction::Write,
                Instruction::Push(Literal::Str("abc".into())),
            ]
        );
        assert!(instructions.contains(&Instruction::Len));
        assert!(instructions.contains(&Instruction::GetChar));
        assert!(!instructions
            .iter()
            .any(|i| matches!(i, Instruction::Call(_))));
    }

    #[test]
    fn test_string_escapes_resolved_at_emission() {
        let instructions = main_instructions("void main() { print(\"a\\nb\\tc\"); }");
        assert_eq!(
            instructions[0],
            Instruction::Push(Literal::Str("a\nb\tc".into()))
        );
    }

    #[test]
    fn test_user_call_pushes_args_left_to_right() {
        let instructions = main_instructions(
            "int f(int a, int b) { return a; } void main() { int x = f(1, 2); }",
        );
        assert_eq!(
            &instructions[..3],
            &[
                Instruction::Push(Literal::Int(1)),
                Instruction::Push(Literal::Int(2)),
                Instruction::Call("f".into()),
            ]
        );
    }

    #[test]
    fn test_loop_scope_slot_reuse() {
        let instructions = main_instructions(
            "void main() { while (true) { int t = 1; } while (true) { int u = 2; } }",
        );
        let stores: Vec<&Instruction> = instructions
            .iter()
            .filter(|i| matches!(i, Instruction::Store(_)))
            .collect();
        // Both loop-local variables land in slot 0 after scope reuse.
        assert_eq!(stores, vec![&Instruction::Store(0), &Instruction::Store(0)]);
    }
}
