//! VM error types
//!
//! Runtime errors are fatal. [`VmErrorKind`] names what went wrong;
//! [`VmError`] locates it with the function, program counter, and opcode of
//! the failing instruction, rendered as one diagnostic line.

use opal_bytecode::Opcode;
use std::fmt;
use thiserror::Error;

/// What went wrong during execution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmErrorKind {
    /// Null operand to an arithmetic opcode
    #[error("null cannot be used in arithmetic operations")]
    NullArithmetic,

    /// Null operand to a logical opcode
    #[error("null cannot be used in logical operations")]
    NullLogical,

    /// Null operand to an ordering comparison
    #[error("null cannot be used in comparison operations")]
    NullComparison,

    /// Division by zero (integer or double)
    #[error("division by zero")]
    DivisionByZero,

    /// Array or string index outside `[0, len)`
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds {
        /// The offending index
        index: i64,
        /// Length of the indexed string or array
        len: usize,
    },

    /// Null array or string index
    #[error("index cannot be null")]
    NullIndex,

    /// Null argument to a built-in
    #[error("argument cannot be null")]
    NullArgument,

    /// Null length operand to `ALLOCA`
    #[error("array length cannot be null")]
    NullArrayLength,

    /// Negative length operand to `ALLOCA`
    #[error("array length cannot be negative")]
    NegativeArrayLength,

    /// Null handle where an object was required
    #[error("null object")]
    NullObject,

    /// Field read of a name never assigned on the record
    #[error("unknown field '{name}'")]
    UnknownField {
        /// The missing field
        name: String,
    },

    /// Conversion built-in could not parse its argument
    #[error("invalid argument")]
    InvalidConversion,

    /// Handle does not name a live array
    #[error("object is not an array")]
    NotAnArray,

    /// Handle does not name a live record
    #[error("object is not a record")]
    NotARecord,

    /// No `main` frame template registered
    #[error("no 'main' function")]
    MissingMain,

    /// `CALL` to a name with no registered template
    #[error("unknown function '{name}'")]
    UnknownFunction {
        /// The missing callee
        name: String,
    },

    /// Pop from an empty operand stack
    #[error("operand stack underflow")]
    StackUnderflow,

    /// `LOAD` from a slot never stored
    #[error("unknown local slot {slot}")]
    UnknownSlot {
        /// The unassigned slot
        slot: usize,
    },

    /// Operand types not supported by the opcode
    #[error("unsupported operand types for {op}")]
    UnsupportedOperands {
        /// The failing opcode
        op: Opcode,
    },

    /// `READ` with no input left
    #[error("end of input")]
    EndOfInput,

    /// Underlying I/O failure
    #[error("i/o error: {0}")]
    Io(String),
}

/// A fatal VM error located at the failing instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct VmError {
    /// What went wrong
    pub kind: VmErrorKind,
    /// Function whose frame was executing, if any
    pub function: Option<String>,
    /// Program counter of the failing instruction
    pub pc: usize,
    /// Opcode of the failing instruction, if known
    pub opcode: Option<Opcode>,
}

impl VmError {
    /// An error with no frame context (e.g. missing `main`).
    pub fn bare(kind: VmErrorKind) -> Self {
        Self {
            kind,
            function: None,
            pc: 0,
            opcode: None,
        }
    }

    /// An error located in a frame.
    pub fn located(kind: VmErrorKind, function: String, pc: usize, opcode: Option<Opcode>) -> Self {
        Self {
            kind,
            function: Some(function),
            pc,
            opcode,
        }
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(function) = &self.function {
            write!(f, " (in {} at {}", function, self.pc)?;
            if let Some(opcode) = self.opcode {
                write!(f, ": {}", opcode)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl std::error::Error for VmError {}
