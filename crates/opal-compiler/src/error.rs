//! Code-generation error type
//!
//! These only fire on programs that were not (or incorrectly) checked; a
//! checked program always compiles.

use thiserror::Error;

/// An internal code-generation failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// Variable name with no slot in the variable table
    #[error("unknown variable '{name}'")]
    UnknownVariable {
        /// The unresolved name
        name: String,
    },

    /// `new` of a type with no recorded struct definition
    #[error("unknown struct '{name}'")]
    UnknownStruct {
        /// The unresolved type name
        name: String,
    },

    /// Built-in called with the wrong number of arguments
    #[error("built-in '{name}' called with wrong arity")]
    BuiltInArity {
        /// The built-in's name
        name: String,
    },
}
