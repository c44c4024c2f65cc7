#![forbid(unsafe_code)]

use crate::reflect::TypeRep;

/// Dynamic value model: what codecs encode and decode.
///
/// Message fields are `(field number, value)` pairs; decode normalizes them
/// to declared order. A union value carries exactly its active variant.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int32(i32),
    Int64(i64),
    Bool(bool),
    Unit,
    Str(String),
    Bytes(Vec<u8>),
    Message(Vec<(u32, Value)>),
    Union { number: u32, value: Box<Value> },
    Reflected { rep: TypeRep, value: Box<Value> },
}

impl Value {
    pub fn message(fields: Vec<(u32, Value)>) -> Self {
        Value::Message(fields)
    }

    pub fn union(number: u32, value: Value) -> Self {
        Value::Union {
            number,
            value: Box::new(value),
        }
    }

    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn reflected(rep: TypeRep, value: Value) -> Self {
        Value::Reflected {
            rep,
            value: Box::new(value),
        }
    }

    /// Field lookup by number, for message values.
    pub fn field(&self, number: u32) -> Option<&Value> {
        match self {
            Value::Message(fields) => fields.iter().find(|(n, _)| *n == number).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Bool(_) => "bool",
            Value::Unit => "unit",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Message(_) => "message",
            Value::Union { .. } => "union",
            Value::Reflected { .. } => "reflected",
        }
    }
}
