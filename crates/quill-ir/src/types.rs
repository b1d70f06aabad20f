//! Literal values and comparison operands

use chrono::NaiveDateTime;

use crate::{FieldRef, QueryExpression};

/// A literal that ends up in SQL only through the escaper
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Right-hand side of a comparison, an insert/update value or a function argument
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    /// Column reference, rendered as an identifier and never escaped
    Field(FieldRef),
    List(Vec<Operand>),
    /// Sub-query
    Query(Box<QueryExpression>),
}

impl Operand {
    pub fn null() -> Self {
        Operand::Value(Value::Null)
    }

    pub fn field(name: impl Into<String>) -> Self {
        Operand::Field(FieldRef::select(name))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Operand::Value(Value::Null))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Operand::Value(value) => Some(value),
            _ => None,
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v.into())
            }
        }

        impl From<$ty> for Operand {
            fn from(v: $ty) -> Self {
                Operand::Value(Value::from(v))
            }
        }
    )*};
}

value_from! {
    bool => Bool,
    i32 => Int,
    i64 => Int,
    u32 => Int,
    f32 => Float,
    f64 => Float,
    String => String,
    &str => String,
    NaiveDateTime => DateTime,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        Operand::Value(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Operand {
    fn from(v: Option<T>) -> Self {
        Operand::Value(v.into())
    }
}

impl From<FieldRef> for Operand {
    fn from(field: FieldRef) -> Self {
        Operand::Field(field)
    }
}

impl From<QueryExpression> for Operand {
    fn from(query: QueryExpression) -> Self {
        Operand::Query(Box::new(query))
    }
}

impl From<&QueryExpression> for Operand {
    fn from(query: &QueryExpression) -> Self {
        Operand::Query(Box::new(query.clone()))
    }
}

impl<T: Into<Operand>> From<Vec<T>> for Operand {
    fn from(items: Vec<T>) -> Self {
        Operand::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Operand>, const N: usize> From<[T; N]> for Operand {
    fn from(items: [T; N]) -> Self {
        Operand::List(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_converts_to_null() {
        let missing: Option<i64> = None;
        assert!(Operand::from(missing).is_null());
        assert_eq!(Operand::from(Some(4)), Operand::Value(Value::Int(4)));
    }

    #[test]
    fn test_list_conversion_keeps_order() {
        let operand = Operand::from(vec![6, 9]);
        assert_eq!(
            operand,
            Operand::List(vec![Value::Int(6).into(), Value::Int(9).into()])
        );
    }
}
