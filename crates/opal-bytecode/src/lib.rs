//! Bytecode definitions for the Opal VM
//!
//! This crate defines the instruction set shared by the code generator and
//! the virtual machine:
//! - [`Opcode`]: the operation enumeration (used in diagnostics and for
//!   instruction classification)
//! - [`Instruction`]: an opcode together with its operand
//! - [`Literal`]: compile-time constants carried by `PUSH`
//! - [`FrameTemplate`] and [`Program`]: the compiled form of functions

mod instruction;
mod opcode;
mod program;

pub use instruction::{Instruction, Literal};
pub use opcode::Opcode;
pub use program::{FrameTemplate, Program, UNPATCHED};
