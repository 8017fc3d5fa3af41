use crate::codec;
use crate::error::GeminiError;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Conversion from a loosely-typed JSON argument into a parameter type.
///
/// Primitives convert directly (numbers given as strings, whole floats into
/// integers, and so on). Structs go through the JSON codec, fieldless enums
/// match on variant names. Anything else is an `ArgumentConversion` error.
pub trait Argument: Sized {
    /// Nullable parameters may be omitted by the model.
    const NULLABLE: bool = false;

    fn from_argument(name: &str, value: &Value) -> Result<Self, GeminiError>;
}

pub(crate) fn value_kind(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean {}", b),
        Value::Number(n) => format!("number {}", n),
        Value::String(s) => format!("string {:?}", s),
        Value::Array(items) => format!("array of {} items", items.len()),
        Value::Object(_) => "object".to_string(),
    }
}

pub fn conversion_error(name: &str, expected: &str, value: &Value) -> GeminiError {
    GeminiError::ArgumentConversion {
        argument: name.to_string(),
        expected: expected.to_string(),
        found: value_kind(value),
    }
}

/// Decodes a structured argument by round-tripping it through the codec.
pub fn decode_structured<T: DeserializeOwned>(
    name: &str,
    expected: &str,
    value: &Value,
) -> Result<T, GeminiError> {
    codec::from_value(value.clone()).map_err(|_| conversion_error(name, expected, value))
}

impl Argument for String {
    fn from_argument(name: &str, value: &Value) -> Result<Self, GeminiError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(conversion_error(name, "string", other)),
        }
    }
}

impl Argument for bool {
    fn from_argument(name: &str, value: &Value) -> Result<Self, GeminiError> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
            other => Err(conversion_error(name, "boolean", other)),
        }
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl Argument for f64 {
    fn from_argument(name: &str, value: &Value) -> Result<Self, GeminiError> {
        as_f64(value).ok_or_else(|| conversion_error(name, "f64", value))
    }
}

impl Argument for f32 {
    fn from_argument(name: &str, value: &Value) -> Result<Self, GeminiError> {
        as_f64(value)
            .map(|v| v as f32)
            .ok_or_else(|| conversion_error(name, "f32", value))
    }
}

fn as_i128(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .or_else(|| {
                // Models often send `3.0` for an integer.
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.is_finite())
                    .map(|f| f as i128)
            }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

macro_rules! integer_argument {
    ($($ty:ty),+) => {
        $(
            impl Argument for $ty {
                fn from_argument(name: &str, value: &Value) -> Result<Self, GeminiError> {
                    as_i128(value)
                        .and_then(|v| <$ty>::try_from(v).ok())
                        .ok_or_else(|| conversion_error(name, stringify!($ty), value))
                }
            }
        )+
    };
}

integer_argument!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl<T: Argument> Argument for Option<T> {
    const NULLABLE: bool = true;

    fn from_argument(name: &str, value: &Value) -> Result<Self, GeminiError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_argument(name, other).map(Some),
        }
    }
}

impl<T: Argument> Argument for Box<T> {
    const NULLABLE: bool = T::NULLABLE;

    fn from_argument(name: &str, value: &Value) -> Result<Self, GeminiError> {
        T::from_argument(name, value).map(Box::new)
    }
}

impl<T: Argument> Argument for Vec<T> {
    fn from_argument(name: &str, value: &Value) -> Result<Self, GeminiError> {
        match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| T::from_argument(&format!("{}[{}]", name, i), item))
                .collect(),
            other => Err(conversion_error(name, "array", other)),
        }
    }
}

impl Argument for Value {
    fn from_argument(_name: &str, value: &Value) -> Result<Self, GeminiError> {
        Ok(value.clone())
    }
}

/// Arguments of one function call, bound by parameter name.
///
/// Binding is strict: an absent parameter takes its declared default, a
/// nullable parameter becomes `None`, and anything else is a
/// `MissingArgument` error. An explicit JSON `null` counts as absent.
#[derive(Debug, Clone, Copy)]
pub struct CallArguments<'a> {
    function: &'a str,
    args: Option<&'a Map<String, Value>>,
}

impl<'a> CallArguments<'a> {
    pub fn new(function: &'a str, args: Option<&'a Map<String, Value>>) -> Self {
        Self { function, args }
    }

    pub fn function(&self) -> &str {
        self.function
    }

    /// The raw JSON value for `name`, if the model sent a non-null one.
    pub fn raw(&self, name: &str) -> Option<&'a Value> {
        self.args?.get(name).filter(|v| !v.is_null())
    }

    pub fn get<T: Argument>(&self, name: &str) -> Result<T, GeminiError> {
        match self.raw(name) {
            Some(value) => T::from_argument(name, value),
            None if T::NULLABLE => T::from_argument(name, &Value::Null),
            None => Err(GeminiError::MissingArgument {
                function: self.function.to_string(),
                argument: name.to_string(),
            }),
        }
    }

    pub fn get_or<T: Argument>(&self, name: &str, default: T) -> Result<T, GeminiError> {
        self.get_or_else(name, || default)
    }

    pub fn get_or_else<T, F>(&self, name: &str, default: F) -> Result<T, GeminiError>
    where
        T: Argument,
        F: FnOnce() -> T,
    {
        match self.raw(name) {
            Some(value) => T::from_argument(name, value),
            None => Ok(default()),
        }
    }
}
