//! Code generation for the Opal language
//!
//! The [`CodeGenerator`] lowers a checked AST into a [`Program`] of frame
//! templates in a single bottom-up pass. Forward jumps are emitted with a
//! sentinel operand and patched to their `NOP` landing pads; `>` and `>=`
//! compile to `CMPLT`/`CMPLE` with the operand expressions emitted in
//! swapped order; built-ins compile to dedicated opcodes rather than calls.

mod codegen;
mod error;
mod var_table;

pub use codegen::CodeGenerator;
pub use error::CompileError;
pub use var_table::VarTable;
