//! End-to-end garbage collection scenarios
//!
//! Each test runs a complete Opal program through the full pipeline
//! (parse, check, compile, execute) and asserts the program's stdout plus
//! the final contents of the record and array heaps, which the VM prints
//! in allocation order at program end.

use opal_checker::Checker;
use opal_compiler::CodeGenerator;
use opal_engine::{ObjectId, Vm};
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

fn run_program(source: &str) -> (Vm, String) {
    let ast = Parser::new(source).unwrap().parse().unwrap();
    Checker::check(&ast).unwrap();
    let program = CodeGenerator::compile(&ast).unwrap();
    let output = SharedOutput::default();
    let mut vm = Vm::with_io(Box::new(output.clone()), Box::new(Cursor::new(Vec::new())));
    vm.load_program(program);
    vm.run().unwrap();
    (vm, output.contents())
}

fn ids(oids: Vec<ObjectId>) -> Vec<u64> {
    oids.into_iter().map(|oid| oid.0).collect()
}

#[test]
fn test_no_allocations() {
    let (_, out) = run_program("void main() { int x = 0; }");
    assert_eq!(out, "struct: [] , array: []\n");
}

#[test]
fn test_struct_def_without_allocation() {
    let (_, out) = run_program(
        "struct Node { int val; Node next; }\n\
         void main() { int x = 0; }",
    );
    assert_eq!(out, "struct: [] , array: []\n");
}

#[test]
fn test_main_allocations_survive() {
    let (_, out) = run_program(
        "void main() {\n\
         \x20 array int xs = new int[5];\n\
         \x20 array int ys = new int[5];\n\
         }",
    );
    assert_eq!(out, "struct: [] , array: [2024, 2025]\n");
}

#[test]
fn test_unused_array_in_callee_is_reclaimed() {
    let (vm, out) = run_program(
        "void f() {\n\
         \x20 array int ys = new int[5];\n\
         }\n\
         void main() {\n\
         \x20 array int xs = new int[5];\n\
         \x20 f();\n\
         }",
    );
    assert_eq!(out, "struct: [] , array: [2024]\n");
    assert_eq!(vm.gc_stats().objects_freed, 1);
}

#[test]
fn test_returned_array_is_preserved_across_gc() {
    let (vm, out) = run_program(
        "array int f() {\n\
         \x20 array int a = new int[5];\n\
         \x20 array int b = new int[5];\n\
         \x20 return a;\n\
         }\n\
         void main() {\n\
         \x20 array int xs = new int[5];\n\
         \x20 array int ys = f();\n\
         }",
    );
    // The return value (2025) is bound by the caller's very next opcode;
    // the deferred collection must find it rooted. Only 2026 is garbage.
    assert_eq!(out, "struct: [] , array: [2024, 2025]\n");
    assert_eq!(ids(vm.heap().array_ids()), vec![2024, 2025]);
}

#[test]
fn test_struct_field_assignment_retains_target() {
    let (vm, out) = run_program(
        "struct Node { int val; Node next; }\n\
         void f(Node n) {\n\
         \x20 n.next = new Node(2, null);\n\
         }\n\
         void main() {\n\
         \x20 Node root = new Node(1, null);\n\
         \x20 f(root);\n\
         }",
    );
    // The assignment inside f records the 2024 -> 2025 edge; after f
    // returns, 2024 is still rooted in main and 2025 is reached through it.
    assert_eq!(out, "struct: [2024, 2025] , array: []\n");
    assert!(vm.heap().node(ObjectId(2025)).is_some());
}

#[test]
fn test_loop_local_allocations_are_reclaimed() {
    let (vm, out) = run_program(
        "void f() {\n\
         \x20 for (int i = 0; i < 5; i = i + 1) {\n\
         \x20   array int t = new int[2];\n\
         \x20 }\n\
         }\n\
         void main() {\n\
         \x20 array int xs = new int[3];\n\
         \x20 f();\n\
         \x20 array int ys = new int[3];\n\
         }",
    );
    // f allocates 2025..2029; none are rooted after it returns.
    assert_eq!(out, "struct: [] , array: [2024, 2030]\n");
    assert_eq!(vm.gc_stats().objects_freed, 5);
}

#[test]
fn test_path_expression_return_keeps_referenced_child() {
    let (vm, out) = run_program(
        "struct Node { int val; Node next; }\n\
         Node f() {\n\
         \x20 array int scratch = new int[2];\n\
         \x20 array int more = new int[2];\n\
         \x20 Node n0 = new Node(0, null);\n\
         \x20 n0.next = new Node(1, null);\n\
         \x20 n0.next.next = new Node(2, null);\n\
         \x20 n0.next.next.next = new Node(3, null);\n\
         \x20 return n0.next;\n\
         }\n\
         void main() {\n\
         \x20 array int xs = new int[4];\n\
         \x20 array int ys = new int[4];\n\
         \x20 Node kept = f();\n\
         }",
    );
    // The chain is 2028..2031 and the returned node is 2029. Its parent
    // 2028 is unreachable, so 2029 survives as a referenced child while
    // the rest of the chain and the scratch arrays are reclaimed.
    assert_eq!(out, "struct: [2029] , array: [2024, 2025]\n");
    assert_eq!(ids(vm.heap().record_ids()), vec![2029]);
    assert_eq!(ids(vm.heap().array_ids()), vec![2024, 2025]);
}

// ===== Invariants =====

#[test]
fn test_object_ids_are_monotone_in_allocation_order() {
    let (_, out) = run_program(
        "struct P { int x; }\n\
         void main() {\n\
         \x20 array int a = new int[1];\n\
         \x20 P p = new P(1);\n\
         \x20 array int b = new int[1];\n\
         }",
    );
    // First allocation is 2024 and every later allocation gets a larger id,
    // regardless of which heap it lands in.
    assert_eq!(out, "struct: [2025] , array: [2024, 2026]\n");
}

#[test]
fn test_heaps_are_disjoint_and_graph_consistent() {
    let (vm, _) = run_program(
        "struct Node { int val; Node next; }\n\
         void main() {\n\
         \x20 Node n = new Node(1, null);\n\
         \x20 array int xs = new int[2];\n\
         }",
    );
    let records = vm.heap().record_ids();
    let arrays = vm.heap().array_ids();
    for oid in &records {
        assert!(!arrays.contains(oid));
    }
    // Every live heap object has a graph node.
    assert_eq!(records.len() + arrays.len(), vm.heap().len());
    for oid in records.iter().chain(arrays.iter()) {
        assert!(vm.heap().node(*oid).is_some());
    }
}

#[test]
fn test_cyclic_garbage_is_reclaimed() {
    let (vm, out) = run_program(
        "struct Node { int val; Node next; }\n\
         void f() {\n\
         \x20 Node a = new Node(1, null);\n\
         \x20 Node b = new Node(2, null);\n\
         \x20 a.next = b;\n\
         \x20 b.next = a;\n\
         }\n\
         void main() {\n\
         \x20 array int keep = new int[1];\n\
         \x20 f();\n\
         }",
    );
    // The two-node cycle is unreachable after f returns; mark-sweep
    // reclaims it even though the reference counts never drop.
    assert_eq!(out, "struct: [] , array: [2024]\n");
    assert!(vm.heap().node(ObjectId(2025)).is_none());
    assert!(vm.heap().node(ObjectId(2026)).is_none());
}

#[test]
fn test_running_twice_yields_identical_output() {
    let source = "struct Node { int val; Node next; }\n\
                  Node build(int n) {\n\
                  \x20 Node head = new Node(n, null);\n\
                  \x20 head.next = new Node(n + 1, null);\n\
                  \x20 return head;\n\
                  }\n\
                  void main() {\n\
                  \x20 Node a = build(1);\n\
                  \x20 print(a.next.val);\n\
                  }";
    let (_, first) = run_program(source);
    let (_, second) = run_program(source);
    assert_eq!(first, second);
}

#[test]
fn test_return_value_bound_by_setf_survives() {
    let (_, out) = run_program(
        "struct Holder { Node item; }\n\
         struct Node { int val; Node next; }\n\
         Node make() {\n\
         \x20 return new Node(9, null);\n\
         }\n\
         void main() {\n\
         \x20 Holder h = new Holder(null);\n\
         \x20 h.item = make();\n\
         }",
    );
    // The returned 2025 is bound by SETF, the other yellow-light opcode.
    assert_eq!(out, "struct: [2024, 2025] , array: []\n");
}

#[test]
fn test_return_value_bound_by_seti_survives() {
    let (_, out) = run_program(
        "struct Node { int val; Node next; }\n\
         Node make() {\n\
         \x20 return new Node(3, null);\n\
         }\n\
         void main() {\n\
         \x20 array Node ns = new Node[2];\n\
         \x20 ns[0] = make();\n\
         }",
    );
    assert_eq!(out, "struct: [2025] , array: [2024]\n");
}
