//! Language-level interpreter tests
//!
//! Full-pipeline execution of Opal programs: control flow, calls and
//! recursion, strings and conversions, heap access, I/O, and runtime
//! error surfacing.

use opal_checker::Checker;
use opal_compiler::CodeGenerator;
use opal_engine::{Vm, VmError, VmErrorKind};
use opal_parser::Parser;
use std::cell::RefCell;
use std::io::{self, Cursor, Write};
use std::rc::Rc;

#[derive(Clone, Default)]
struct SharedOutput(Rc<RefCell<Vec<u8>>>);

impl SharedOutput {
    fn contents(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).unwrap()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn execute(source: &str, input: &str) -> Result<String, VmError> {
    let ast = Parser::new(source).unwrap().parse().unwrap();
    Checker::check(&ast).unwrap();
    let program = CodeGenerator::compile(&ast).unwrap();
    let output = SharedOutput::default();
    let mut vm = Vm::with_io(
        Box::new(output.clone()),
        Box::new(Cursor::new(input.as_bytes().to_vec())),
    );
    vm.load_program(program);
    vm.run()?;
    Ok(output.contents())
}

/// Program output with the trailing heap listing stripped.
fn stdout_of(source: &str) -> String {
    let full = execute(source, "").unwrap();
    match full.rfind("struct: ") {
        Some(at) => full[..at].to_string(),
        None => full,
    }
}

fn error_of(source: &str) -> VmError {
    execute(source, "").unwrap_err()
}

#[test]
fn test_print_forms() {
    let out = stdout_of(
        "void main() {\n\
         \x20 print(42);\n\
         \x20 print(\" \");\n\
         \x20 print(3.5);\n\
         \x20 print(\" \");\n\
         \x20 print(true);\n\
         \x20 print(false);\n\
         \x20 string s;\n\
         \x20 print(s);\n\
         }",
    );
    assert_eq!(out, "42 3.5 truefalsenull");
}

#[test]
fn test_doubles_print_with_decimal_point() {
    let out = stdout_of("void main() { print(2.0 * 3.0); print(\" \"); print(1.0 / 4.0); }");
    assert_eq!(out, "6.0 0.25");
}

#[test]
fn test_while_loop_countdown() {
    let out = stdout_of(
        "void main() {\n\
         \x20 int x = 3;\n\
         \x20 while (x > 0) {\n\
         \x20   print(x);\n\
         \x20   x = x - 1;\n\
         \x20 }\n\
         }",
    );
    assert_eq!(out, "321");
}

#[test]
fn test_for_loop_sum() {
    let out = stdout_of(
        "void main() {\n\
         \x20 int sum = 0;\n\
         \x20 for (int i = 1; i <= 5; i = i + 1) {\n\
         \x20   sum = sum + i;\n\
         \x20 }\n\
         \x20 print(sum);\n\
         }",
    );
    assert_eq!(out, "15");
}

#[test]
fn test_if_elseif_else_branches() {
    let source = |x: &str| {
        format!(
            "void main() {{\n\
             \x20 int x = {x};\n\
             \x20 if (x < 0) {{ print(\"neg\"); }}\n\
             \x20 elseif (x == 0) {{ print(\"zero\"); }}\n\
             \x20 else {{ print(\"pos\"); }}\n\
             }}"
        )
    };
    assert_eq!(stdout_of(&source("0 - 5")), "neg");
    assert_eq!(stdout_of(&source("0")), "zero");
    assert_eq!(stdout_of(&source("9")), "pos");
}

#[test]
fn test_recursive_fibonacci() {
    let out = stdout_of(
        "int fib(int n) {\n\
         \x20 if (n < 2) { return n; }\n\
         \x20 return fib(n - 1) + fib(n - 2);\n\
         }\n\
         void main() {\n\
         \x20 print(fib(10));\n\
         }",
    );
    assert_eq!(out, "55");
}

#[test]
fn test_string_builtins() {
    let out = stdout_of(
        "void main() {\n\
         \x20 string s = \"opal\" + \" vm\";\n\
         \x20 print(length(s));\n\
         \x20 print(get(0, s));\n\
         \x20 print(get(6, s));\n\
         }",
    );
    assert_eq!(out, "7om");
}

#[test]
fn test_conversions_roundtrip() {
    let out = stdout_of(
        "void main() {\n\
         \x20 print(stoi(\"41\") + 1);\n\
         \x20 print(\" \");\n\
         \x20 print(dtoi(3.9));\n\
         \x20 print(\" \");\n\
         \x20 print(itod(2) + 0.5);\n\
         \x20 print(\" \");\n\
         \x20 print(itos(7) + dtos(1.5));\n\
         }",
    );
    assert_eq!(out, "42 3 2.5 71.5");
}

#[test]
fn test_string_ordering() {
    let out = stdout_of(
        "void main() {\n\
         \x20 print(\"abc\" < \"abd\");\n\
         \x20 print(\"b\" >= \"a\");\n\
         }",
    );
    assert_eq!(out, "truetrue");
}

#[test]
fn test_escapes_in_strings() {
    let out = stdout_of("void main() { print(\"a\\nb\\tc\"); }");
    assert_eq!(out, "a\nb\tc");
}

#[test]
fn test_linked_list_traversal() {
    let out = stdout_of(
        "struct Node { int val; Node next; }\n\
         void main() {\n\
         \x20 Node head = new Node(1, null);\n\
         \x20 head.next = new Node(2, null);\n\
         \x20 head.next.next = new Node(3, null);\n\
         \x20 Node cur = head;\n\
         \x20 int sum = 0;\n\
         \x20 while (not (cur == null)) {\n\
         \x20   sum = sum + cur.val;\n\
         \x20   cur = cur.next;\n\
         \x20 }\n\
         \x20 print(sum);\n\
         }",
    );
    assert_eq!(out, "6");
}

#[test]
fn test_array_fill_and_sum() {
    let out = stdout_of(
        "void main() {\n\
         \x20 array int xs = new int[5];\n\
         \x20 for (int i = 0; i < 5; i = i + 1) {\n\
         \x20   xs[i] = i * i;\n\
         \x20 }\n\
         \x20 int sum = 0;\n\
         \x20 for (int i = 0; i < length(xs); i = i + 1) {\n\
         \x20   sum = sum + xs[i];\n\
         \x20 }\n\
         \x20 print(sum);\n\
         }",
    );
    assert_eq!(out, "30");
}

#[test]
fn test_fresh_array_cells_are_null() {
    let out = stdout_of(
        "void main() {\n\
         \x20 array int xs = new int[2];\n\
         \x20 print(xs[0] == null);\n\
         }",
    );
    assert_eq!(out, "true");
}

#[test]
fn test_input_echo() {
    let out = execute(
        "void main() {\n\
         \x20 string name = input();\n\
         \x20 print(\"hi \" + name);\n\
         }",
        "world\n",
    )
    .unwrap();
    assert!(out.starts_with("hi world"));
}

#[test]
fn test_arguments_are_passed_by_position() {
    let out = stdout_of(
        "int sub(int a, int b) { return a - b; }\n\
         void main() { print(sub(10, 4)); }",
    );
    assert_eq!(out, "6");
}

#[test]
fn test_struct_handles_are_shared_references() {
    let out = stdout_of(
        "struct Box { int v; }\n\
         void bump(Box b) { b.v = b.v + 1; }\n\
         void main() {\n\
         \x20 Box b = new Box(1);\n\
         \x20 bump(b);\n\
         \x20 bump(b);\n\
         \x20 print(b.v);\n\
         }",
    );
    assert_eq!(out, "3");
}

#[test]
fn test_and_or_are_strict() {
    // No short-circuit: the division is evaluated even though the left
    // operand already decides the result.
    let err = error_of("void main() { bool b = false and ((1 / 0) == 1); }");
    assert_eq!(err.kind, VmErrorKind::DivisionByZero);
}

#[test]
fn test_division_by_zero_diagnostic_names_function() {
    let err = error_of(
        "int half(int n) { return n / 0; }\n\
         void main() { print(half(4)); }",
    );
    assert_eq!(err.kind, VmErrorKind::DivisionByZero);
    assert_eq!(err.function.as_deref(), Some("half"));
    let rendered = err.to_string();
    assert!(rendered.contains("division by zero"));
    assert!(rendered.contains("half"));
    assert!(rendered.contains("DIV"));
}

#[test]
fn test_array_index_out_of_bounds_at_runtime() {
    let err = error_of(
        "void main() {\n\
         \x20 array int xs = new int[2];\n\
         \x20 int i = 5;\n\
         \x20 xs[i] = 1;\n\
         }",
    );
    assert!(matches!(err.kind, VmErrorKind::IndexOutOfBounds { index: 5, len: 2 }));
}

#[test]
fn test_null_field_access_at_runtime() {
    let err = error_of(
        "struct Node { int val; Node next; }\n\
         void main() {\n\
         \x20 Node n = new Node(1, null);\n\
         \x20 print(n.next.val);\n\
         }",
    );
    assert_eq!(err.kind, VmErrorKind::NullObject);
}

#[test]
fn test_invalid_stoi_argument() {
    let err = error_of("void main() { print(stoi(\"forty-two\")); }");
    assert_eq!(err.kind, VmErrorKind::InvalidConversion);
}

#[test]
fn test_null_arithmetic_at_runtime() {
    let err = error_of(
        "void main() {\n\
         \x20 int x;\n\
         \x20 int y = x + 1;\n\
         }",
    );
    assert_eq!(err.kind, VmErrorKind::NullArithmetic);
}

#[test]
fn test_void_function_returns_null() {
    let out = stdout_of(
        "void noop() { int x = 0; }\n\
         void main() {\n\
         \x20 noop();\n\
         \x20 print(\"done\");\n\
         }",
    );
    assert_eq!(out, "done");
}
