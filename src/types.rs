use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Static type of an expression, variable, or routine.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Integer,
    Real,
    Boolean,
    String,
    Array {
        low: i64,
        high: i64,
        item: Box<Type>,
    },
    Function {
        params: Vec<Param>,
        returns: Box<Type>,
    },
    Procedure {
        params: Vec<Param>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

impl Type {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Integer | Type::Real)
    }

    /// Scalars compare by tag; arrays by item type only, since bounds are
    /// a storage detail.
    pub fn same_as(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Array { item: a, .. }, Type::Array { item: b, .. }) => a.same_as(b),
            (Type::Function { .. }, _) | (Type::Procedure { .. }, _) => false,
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }

    /// Whether a value of type `source` may be stored where `self` is expected.
    pub fn accepts(&self, source: &Type) -> bool {
        match (self, source) {
            (Type::Real, Type::Integer) => true,
            (Type::Array { item: a, .. }, Type::Array { item: b, .. }) => a.accepts(b),
            (a, b) => a.same_as(b),
        }
    }

    pub fn default_value(&self) -> Value {
        match self {
            Type::Integer => Value::Integer(0),
            Type::Real => Value::Real(0.0),
            Type::Boolean => Value::Boolean(false),
            Type::String => Value::String(String::new()),
            Type::Array { .. } => Value::Array(BTreeMap::new()),
            // Routines never occupy a storage slot.
            Type::Function { .. } | Type::Procedure { .. } => Value::Integer(0),
        }
    }
}

fn write_params(f: &mut fmt::Formatter, params: &[Param]) -> fmt::Result {
    write!(f, "(")?;
    for (i, param) in params.iter().enumerate() {
        if i > 0 {
            write!(f, "; ")?;
        }
        write!(f, "{}: {}", param.name, param.ty)?;
    }
    write!(f, ")")
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Integer => write!(f, "Integer"),
            Type::Real => write!(f, "Real"),
            Type::Boolean => write!(f, "Boolean"),
            Type::String => write!(f, "String"),
            Type::Array { low, high, item } => write!(f, "Array[{}..{}] of {}", low, high, item),
            Type::Function { params, returns } => {
                write!(f, "Function")?;
                write_params(f, params)?;
                write!(f, ": {}", returns)
            }
            Type::Procedure { params } => {
                write!(f, "Procedure")?;
                write_params(f, params)
            }
        }
    }
}
