//! Host-side value model and conversion traits
//!
//! [`Value`] is what crosses the boundary through the boxing collaborator.
//! Typed host values get there via [`ToForeign`] and come back via
//! [`FromForeign`]; the proxy layer only ever calls these two traits.

use std::fmt;
use thiserror::Error;

/// Dynamic mirror of a foreign value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nothing,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Mutable, resizable sequence.
    Array(Vec<Value>),
    /// Immutable sequence.
    Tuple(Vec<Value>),
    Record(Record),
    /// A value with no host representation (modules, functions, ...).
    Opaque(String),
}

impl Value {
    /// Foreign-facing kind name, used in conversion errors.
    pub fn kind(&self) -> &str {
        match self {
            Value::Nothing => "Nothing",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int64",
            Value::Float(_) => "Float64",
            Value::Str(_) => "String",
            Value::Array(_) => "Vector",
            Value::Tuple(_) => "Tuple",
            Value::Record(record) => &record.type_name,
            Value::Opaque(type_name) => type_name,
        }
    }
}

/// A struct instance: named type, mutability class and ordered fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub type_name: String,
    pub mutable: bool,
    pub fields: Vec<(String, Value)>,
}

impl Record {
    pub fn mutable(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            mutable: true,
            fields: Vec::new(),
        }
    }

    pub fn immutable(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            mutable: false,
            fields: Vec::new(),
        }
    }

    /// Append a field (builder style).
    pub fn field(mut self, name: impl Into<String>, value: impl ToForeign) -> Self {
        self.fields.push((name.into(), value.to_value()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}

/// A foreign value could not be converted to the requested host type.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot convert {found} to {expected}")]
pub struct ConversionError {
    pub expected: String,
    pub found: String,
}

impl ConversionError {
    pub fn new(expected: impl Into<String>, found: &Value) -> Self {
        Self {
            expected: expected.into(),
            found: found.kind().to_string(),
        }
    }
}

/// Host type that can be boxed into a foreign value.
pub trait ToForeign {
    fn to_value(&self) -> Value;
}

/// Host type that can be unboxed from a foreign value.
pub trait FromForeign: Sized {
    fn from_value(value: Value) -> Result<Self, ConversionError>;
}

impl<T: ToForeign + ?Sized> ToForeign for &T {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

impl ToForeign for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromForeign for Value {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        Ok(value)
    }
}

impl ToForeign for Record {
    fn to_value(&self) -> Value {
        Value::Record(self.clone())
    }
}

impl FromForeign for Record {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Record(record) => Ok(record),
            other => Err(ConversionError::new("Record", &other)),
        }
    }
}

impl ToForeign for () {
    fn to_value(&self) -> Value {
        Value::Nothing
    }
}

impl FromForeign for () {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Nothing => Ok(()),
            other => Err(ConversionError::new("Nothing", &other)),
        }
    }
}

impl ToForeign for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FromForeign for bool {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(ConversionError::new("Bool", &other)),
        }
    }
}

macro_rules! impl_integer {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl FromForeign for $ty {
                fn from_value(value: Value) -> Result<Self, ConversionError> {
                    match value {
                        Value::Int(i) => <$ty>::try_from(i)
                            .map_err(|_| ConversionError::new(stringify!($ty), &Value::Int(i))),
                        other => Err(ConversionError::new(stringify!($ty), &other)),
                    }
                }
            }
        )+
    };
}

// Boxing is infallible, so only types that widen into i64 without loss box.
macro_rules! impl_widening_integer {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl ToForeign for $ty {
                fn to_value(&self) -> Value {
                    Value::Int(i64::from(*self))
                }
            }
        )+
        impl_integer!($($ty),+);
    };
}

impl_widening_integer!(i64, i32, u32);
impl_integer!(usize);

impl ToForeign for f64 {
    fn to_value(&self) -> Value {
        Value::Float(*self)
    }
}

impl FromForeign for f64 {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Float(x) => Ok(x),
            Value::Int(i) => Ok(i as f64),
            other => Err(ConversionError::new("Float64", &other)),
        }
    }
}

impl ToForeign for f32 {
    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }
}

impl FromForeign for f32 {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        f64::from_value(value).map(|x| x as f32)
    }
}

impl ToForeign for str {
    fn to_value(&self) -> Value {
        Value::Str(self.to_string())
    }
}

impl ToForeign for String {
    fn to_value(&self) -> Value {
        Value::Str(self.clone())
    }
}

impl FromForeign for String {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(ConversionError::new("String", &other)),
        }
    }
}

impl<T: ToForeign> ToForeign for [T] {
    fn to_value(&self) -> Value {
        Value::Array(self.iter().map(ToForeign::to_value).collect())
    }
}

impl<T: ToForeign> ToForeign for Vec<T> {
    fn to_value(&self) -> Value {
        self.as_slice().to_value()
    }
}

impl<T: ToForeign, const N: usize> ToForeign for [T; N] {
    fn to_value(&self) -> Value {
        self.as_slice().to_value()
    }
}

impl<T: FromForeign> FromForeign for Vec<T> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Array(items) | Value::Tuple(items) => {
                items.into_iter().map(T::from_value).collect()
            }
            other => Err(ConversionError::new("Vector", &other)),
        }
    }
}

impl<T: ToForeign> ToForeign for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(value) => value.to_value(),
            None => Value::Nothing,
        }
    }
}

impl<T: FromForeign> FromForeign for Option<T> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Nothing => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{item}")?;
            }
            Ok(())
        }

        match self {
            Value::Nothing => f.write_str("nothing"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Array(items) => {
                f.write_str("[")?;
                list(f, items)?;
                f.write_str("]")
            }
            Value::Tuple(items) => {
                f.write_str("(")?;
                list(f, items)?;
                f.write_str(")")
            }
            Value::Record(record) => {
                write!(f, "{}(", record.type_name)?;
                for (i, (name, value)) in record.fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}={value}")?;
                }
                f.write_str(")")
            }
            Value::Opaque(type_name) => write!(f, "<{type_name}>"),
        }
    }
}
