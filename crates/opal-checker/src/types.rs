//! Checker-level type representation

use opal_parser::ast::{DataType, TypeName};
use std::fmt;

/// The base of a checked type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseType {
    /// `int`
    Int,
    /// `double`
    Double,
    /// `bool`
    Bool,
    /// `string`
    Str,
    /// `void`: function "no result" and the type of `null`
    Void,
    /// A struct type
    Struct(String),
}

/// A checked type: a base with an array flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueType {
    /// True for `array T`
    pub is_array: bool,
    /// The base type
    pub base: BaseType,
}

impl ValueType {
    /// A non-array type.
    pub fn base(base: BaseType) -> Self {
        Self {
            is_array: false,
            base,
        }
    }

    /// The type of `null` (and of `void` results).
    pub fn null() -> Self {
        Self::base(BaseType::Void)
    }

    /// True for `null`/`void`, which is assignable to anything.
    pub fn is_null(&self) -> bool {
        self.base == BaseType::Void && !self.is_array
    }

    /// True if a value of type `other` can flow into this type: exact match
    /// or a null source.
    pub fn accepts(&self, other: &ValueType) -> bool {
        other.is_null() || self == other
    }
}

impl From<&DataType> for ValueType {
    fn from(data_type: &DataType) -> Self {
        let base = match &data_type.name {
            TypeName::Int => BaseType::Int,
            TypeName::Double => BaseType::Double,
            TypeName::Bool => BaseType::Bool,
            TypeName::Str => BaseType::Str,
            TypeName::Void => BaseType::Void,
            TypeName::Id(name) => BaseType::Struct(name.clone()),
        };
        Self {
            is_array: data_type.is_array,
            base,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_array {
            f.write_str("array ")?;
        }
        match &self.base {
            BaseType::Int => f.write_str("int"),
            BaseType::Double => f.write_str("double"),
            BaseType::Bool => f.write_str("bool"),
            BaseType::Str => f.write_str("string"),
            BaseType::Void => f.write_str("void"),
            BaseType::Struct(name) => f.write_str(name),
        }
    }
}
