//! # Wire Value Model
//!
//! Purpose: Define the small recursive value model that every command argument
//! and every server reply passes through.
//!
//! ## Design Principles
//! 1. **Closed Set**: Decoding only ever yields one of the `WireValue` variants.
//! 2. **Explicit Admission**: Application values enter through `ToWire`; types
//!    without an impl are rejected by the compiler, out-of-range values at runtime.
//! 3. **No Silent Coercion**: Unsigned values that do not fit `i64` fail instead
//!    of wrapping.

use std::collections::{BTreeMap, HashMap};

use crate::error::EncodeError;

/// Recursive value understood by the codec.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    /// `$<len>\r\n<bytes>\r\n` (or `+<line>\r\n` when decoding).
    String(String),
    /// `:<decimal>\r\n`
    Integer(i64),
    /// `,<decimal>\r\n`
    Float(f64),
    /// `#t\r\n` / `#f\r\n`
    Boolean(bool),
    /// `_\r\n`, also produced by `$-1` and `*-1`.
    Null,
    /// `-<message>\r\n`
    Error(String),
    /// `*<n>\r\n` followed by `n` values.
    Array(Vec<WireValue>),
    /// `%<2n>\r\n` followed by `n` key/value pairs. Order is not significant.
    Map(HashMap<String, WireValue>),
}

impl WireValue {
    /// Builds an error value from any displayable message.
    pub fn error(message: impl Into<String>) -> Self {
        WireValue::Error(message.into())
    }

    /// Short variant name, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            WireValue::String(_) => "string",
            WireValue::Integer(_) => "integer",
            WireValue::Float(_) => "float",
            WireValue::Boolean(_) => "boolean",
            WireValue::Null => "null",
            WireValue::Error(_) => "error",
            WireValue::Array(_) => "array",
            WireValue::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, WireValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            WireValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            WireValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            WireValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[WireValue]> {
        match self {
            WireValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, WireValue>> {
        match self {
            WireValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Consumes the value and returns the map, if it is one.
    pub fn into_map(self) -> Option<HashMap<String, WireValue>> {
        match self {
            WireValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Converts into a JSON value. Errors become `{"error": message}`.
    pub fn into_json(self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            WireValue::String(value) => Value::String(value),
            WireValue::Integer(value) => Value::from(value),
            // Non-finite floats have no JSON form.
            WireValue::Float(value) => serde_json::Number::from_f64(value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            WireValue::Boolean(value) => Value::Bool(value),
            WireValue::Null => Value::Null,
            WireValue::Error(message) => {
                let mut object = serde_json::Map::new();
                object.insert("error".to_string(), Value::String(message));
                Value::Object(object)
            }
            WireValue::Array(items) => {
                Value::Array(items.into_iter().map(WireValue::into_json).collect())
            }
            WireValue::Map(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, value.into_json()))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        WireValue::String(value.to_string())
    }
}

impl From<String> for WireValue {
    fn from(value: String) -> Self {
        WireValue::String(value)
    }
}

impl From<i64> for WireValue {
    fn from(value: i64) -> Self {
        WireValue::Integer(value)
    }
}

impl From<f64> for WireValue {
    fn from(value: f64) -> Self {
        WireValue::Float(value)
    }
}

impl From<bool> for WireValue {
    fn from(value: bool) -> Self {
        WireValue::Boolean(value)
    }
}

impl From<Vec<WireValue>> for WireValue {
    fn from(items: Vec<WireValue>) -> Self {
        WireValue::Array(items)
    }
}

impl From<HashMap<String, WireValue>> for WireValue {
    fn from(map: HashMap<String, WireValue>) -> Self {
        WireValue::Map(map)
    }
}

/// Conversion of an application value into a [`WireValue`].
///
/// This is the allow-list of encodable types. Conversions never coerce: a
/// value that cannot be represented fails with [`EncodeError`].
pub trait ToWire {
    fn to_wire(&self) -> Result<WireValue, EncodeError>;
}

impl<T: ToWire + ?Sized> ToWire for &T {
    fn to_wire(&self) -> Result<WireValue, EncodeError> {
        (**self).to_wire()
    }
}

impl ToWire for WireValue {
    fn to_wire(&self) -> Result<WireValue, EncodeError> {
        Ok(self.clone())
    }
}

impl ToWire for str {
    fn to_wire(&self) -> Result<WireValue, EncodeError> {
        Ok(WireValue::String(self.to_string()))
    }
}

impl ToWire for String {
    fn to_wire(&self) -> Result<WireValue, EncodeError> {
        Ok(WireValue::String(self.clone()))
    }
}

impl ToWire for bool {
    fn to_wire(&self) -> Result<WireValue, EncodeError> {
        Ok(WireValue::Boolean(*self))
    }
}

macro_rules! lossless_integer {
    ($($ty:ty),*) => {
        $(
            impl ToWire for $ty {
                fn to_wire(&self) -> Result<WireValue, EncodeError> {
                    Ok(WireValue::Integer(i64::from(*self)))
                }
            }
        )*
    };
}

macro_rules! checked_integer {
    ($($ty:ty),*) => {
        $(
            impl ToWire for $ty {
                fn to_wire(&self) -> Result<WireValue, EncodeError> {
                    i64::try_from(*self)
                        .map(WireValue::Integer)
                        .map_err(|_| EncodeError::IntegerOutOfRange {
                            ty: stringify!($ty),
                            value: self.to_string(),
                        })
                }
            }
        )*
    };
}

lossless_integer!(i8, i16, i32, i64, u8, u16, u32);
checked_integer!(isize, usize, u64, i128, u128);

impl ToWire for f32 {
    fn to_wire(&self) -> Result<WireValue, EncodeError> {
        Ok(WireValue::Float(f64::from(*self)))
    }
}

impl ToWire for f64 {
    fn to_wire(&self) -> Result<WireValue, EncodeError> {
        Ok(WireValue::Float(*self))
    }
}

impl<T: ToWire> ToWire for Option<T> {
    fn to_wire(&self) -> Result<WireValue, EncodeError> {
        match self {
            Some(value) => value.to_wire(),
            None => Ok(WireValue::Null),
        }
    }
}

impl<T: ToWire> ToWire for [T] {
    fn to_wire(&self) -> Result<WireValue, EncodeError> {
        self.iter()
            .map(ToWire::to_wire)
            .collect::<Result<Vec<_>, _>>()
            .map(WireValue::Array)
    }
}

impl<T: ToWire> ToWire for Vec<T> {
    fn to_wire(&self) -> Result<WireValue, EncodeError> {
        self.as_slice().to_wire()
    }
}

impl<T: ToWire, S> ToWire for HashMap<String, T, S> {
    fn to_wire(&self) -> Result<WireValue, EncodeError> {
        self.iter()
            .map(|(key, value)| Ok((key.clone(), value.to_wire()?)))
            .collect::<Result<HashMap<_, _>, _>>()
            .map(WireValue::Map)
    }
}

impl<T: ToWire> ToWire for BTreeMap<String, T> {
    fn to_wire(&self) -> Result<WireValue, EncodeError> {
        self.iter()
            .map(|(key, value)| Ok((key.clone(), value.to_wire()?)))
            .collect::<Result<HashMap<_, _>, _>>()
            .map(WireValue::Map)
    }
}

impl ToWire for serde_json::Value {
    fn to_wire(&self) -> Result<WireValue, EncodeError> {
        use serde_json::Value;

        match self {
            Value::Null => Ok(WireValue::Null),
            Value::Bool(value) => Ok(WireValue::Boolean(*value)),
            Value::Number(number) => {
                if let Some(value) = number.as_i64() {
                    Ok(WireValue::Integer(value))
                } else if number.is_f64() {
                    number
                        .as_f64()
                        .map(WireValue::Float)
                        .ok_or_else(|| EncodeError::IntegerOutOfRange {
                            ty: "serde_json::Number",
                            value: number.to_string(),
                        })
                } else {
                    Err(EncodeError::IntegerOutOfRange {
                        ty: "serde_json::Number",
                        value: number.to_string(),
                    })
                }
            }
            Value::String(value) => Ok(WireValue::String(value.clone())),
            Value::Array(items) => items.to_wire(),
            Value::Object(object) => object
                .iter()
                .map(|(key, value)| Ok((key.clone(), value.to_wire()?)))
                .collect::<Result<HashMap<_, _>, _>>()
                .map(WireValue::Map),
        }
    }
}
