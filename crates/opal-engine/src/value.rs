//! Runtime value representation
//!
//! Values are a tagged union; heap handles carry an [`ObjectId`] and are
//! distinguished from integers by the type system rather than a runtime
//! marker.

use opal_bytecode::Literal;
use std::fmt;

/// Identifier of a heap object.
///
/// Ids are handed out by the heap's monotonic allocator and are never
/// reused within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Integer
    Int(i64),
    /// Double
    Double(f64),
    /// Boolean
    Bool(bool),
    /// String
    Str(String),
    /// The null value
    Null,
    /// Handle to a heap object (record or array)
    Handle(ObjectId),
}

impl Value {
    /// True for the null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The handle's object id, if this is a handle.
    pub fn as_handle(&self) -> Option<ObjectId> {
        match self {
            Value::Handle(oid) => Some(*oid),
            _ => None,
        }
    }

    /// Name of the value's runtime type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Null => "null",
            Value::Handle(_) => "object",
        }
    }

    /// Equality as observed by `CMPEQ`/`CMPNE`: same-type comparison with
    /// numeric cross-comparison, null equal only to null, handles equal on
    /// object id.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Int(a), Value::Double(b)) | (Value::Double(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Handle(a), Value::Handle(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Literal> for Value {
    fn from(literal: Literal) -> Self {
        match literal {
            Literal::Int(i) => Value::Int(i),
            Literal::Double(d) => Value::Double(d),
            Literal::Bool(b) => Value::Bool(b),
            Literal::Str(s) => Value::Str(s),
            Literal::Null => Value::Null,
        }
    }
}

impl fmt::Display for Value {
    /// Textual form used by `WRITE` and `TOSTR`: booleans as `true`/`false`,
    /// null as `null`, doubles always with a decimal point.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Double(d) => {
                if d.is_finite() && d.fract() == 0.0 && d.abs() < 1e16 {
                    write!(f, "{:.1}", d)
                } else {
                    write!(f, "{}", d)
                }
            }
            Value::Bool(b) => f.write_str(if *b { "true" } else { "false" }),
            Value::Str(s) => f.write_str(s),
            Value::Null => f.write_str("null"),
            Value::Handle(oid) => write!(f, "<object {}>", oid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_forms() {
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Double(3.5).to_string(), "3.5");
        assert_eq!(Value::Double(3.0).to_string(), "3.0");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Bool(false).to_string(), "false");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Str("hi".into()).to_string(), "hi");
    }

    #[test]
    fn test_equals() {
        assert!(Value::Int(5).equals(&Value::Int(5)));
        assert!(Value::Int(5).equals(&Value::Double(5.0)));
        assert!(!Value::Int(5).equals(&Value::Str("5".into())));
        assert!(Value::Null.equals(&Value::Null));
        assert!(!Value::Null.equals(&Value::Int(0)));
        assert!(Value::Handle(ObjectId(2024)).equals(&Value::Handle(ObjectId(2024))));
        assert!(!Value::Handle(ObjectId(2024)).equals(&Value::Handle(ObjectId(2025))));
    }

    #[test]
    fn test_from_literal() {
        assert_eq!(Value::from(Literal::Int(7)), Value::Int(7));
        assert_eq!(Value::from(Literal::Null), Value::Null);
        assert_eq!(Value::from(Literal::Str("s".into())), Value::Str("s".into()));
    }
}
