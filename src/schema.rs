//! Schema descriptions advertised to the model for callable functions.
//!
//! Types describe themselves through [`ToolSchema`]. Nested types are pulled
//! in with [`SchemaGenerator::subschema`], which counts nesting levels and
//! fails with `SchemaDepthExceeded` once [`MAX_SCHEMA_DEPTH`] is passed, so a
//! self-referential type errors out instead of recursing forever.

use crate::error::GeminiError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MAX_SCHEMA_DEPTH: usize = 10;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

/// Recursive schema tree. `properties` is only set for objects and `items`
/// only for arrays.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    // BTreeMap keeps property order stable between builds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, Schema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl Schema {
    pub fn new(schema_type: SchemaType) -> Self {
        Self {
            schema_type,
            format: None,
            description: None,
            nullable: None,
            enum_values: None,
            properties: None,
            items: None,
            required: None,
        }
    }

    pub fn string() -> Self {
        Self::new(SchemaType::String)
    }

    pub fn boolean() -> Self {
        Self::new(SchemaType::Boolean)
    }

    pub fn number(format: &str) -> Self {
        Self::new(SchemaType::Number).with_format(format)
    }

    pub fn integer(format: &str) -> Self {
        Self::new(SchemaType::Integer).with_format(format)
    }

    pub fn array(items: Schema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::new(SchemaType::Array)
        }
    }

    pub fn object(properties: BTreeMap<String, Schema>, required: Vec<String>) -> Self {
        Self {
            properties: Some(properties),
            required: if required.is_empty() {
                None
            } else {
                Some(required)
            },
            ..Self::new(SchemaType::Object)
        }
    }

    /// String schema restricted to the given names.
    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            enum_values: Some(values.into_iter().map(Into::into).collect()),
            ..Self::string()
        }
    }

    pub fn with_format(mut self, format: &str) -> Self {
        self.format = Some(format.to_string());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn into_nullable(mut self) -> Self {
        self.nullable = Some(true);
        self
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable == Some(true)
    }
}

/// Tracks nesting while schemas are generated.
#[derive(Debug, Clone)]
pub struct SchemaGenerator {
    depth: usize,
    max_depth: usize,
}

impl Default for SchemaGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaGenerator {
    pub fn new() -> Self {
        Self::with_max_depth(MAX_SCHEMA_DEPTH)
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            depth: 0,
            max_depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Generates the schema of `T` one level below the current one.
    pub fn subschema<T: ToolSchema + ?Sized>(&mut self) -> Result<Schema, GeminiError> {
        if self.depth > self.max_depth {
            return Err(GeminiError::SchemaDepthExceeded {
                max_depth: self.max_depth,
            });
        }
        self.depth += 1;
        let schema = T::tool_schema(self);
        self.depth -= 1;
        schema
    }
}

/// Schema of `T` generated from a fresh generator.
pub fn schema_of<T: ToolSchema + ?Sized>() -> Result<Schema, GeminiError> {
    SchemaGenerator::new().subschema::<T>()
}

/// A type that can describe itself as a [`Schema`].
///
/// Implemented for strings, booleans, numeric primitives, `Option`, `Vec`,
/// slices, arrays and `Box`; `#[derive(ToolSchema)]` covers structs with
/// named fields and fieldless enums.
pub trait ToolSchema {
    fn tool_schema(generator: &mut SchemaGenerator) -> Result<Schema, GeminiError>;
}

impl ToolSchema for String {
    fn tool_schema(_: &mut SchemaGenerator) -> Result<Schema, GeminiError> {
        Ok(Schema::string())
    }
}

impl ToolSchema for str {
    fn tool_schema(_: &mut SchemaGenerator) -> Result<Schema, GeminiError> {
        Ok(Schema::string())
    }
}

impl ToolSchema for bool {
    fn tool_schema(_: &mut SchemaGenerator) -> Result<Schema, GeminiError> {
        Ok(Schema::boolean())
    }
}

impl ToolSchema for f32 {
    fn tool_schema(_: &mut SchemaGenerator) -> Result<Schema, GeminiError> {
        Ok(Schema::number("float"))
    }
}

impl ToolSchema for f64 {
    fn tool_schema(_: &mut SchemaGenerator) -> Result<Schema, GeminiError> {
        Ok(Schema::number("double"))
    }
}

macro_rules! integer_schema {
    ($format:literal => $($ty:ty),+) => {
        $(
            impl ToolSchema for $ty {
                fn tool_schema(_: &mut SchemaGenerator) -> Result<Schema, GeminiError> {
                    Ok(Schema::integer($format))
                }
            }
        )+
    };
}

// Anything that fits in 32 signed bits is int32, the rest int64.
integer_schema!("int32" => i8, i16, i32, u8, u16);
integer_schema!("int64" => i64, u32, u64, isize, usize);

impl<T: ToolSchema> ToolSchema for Option<T> {
    fn tool_schema(generator: &mut SchemaGenerator) -> Result<Schema, GeminiError> {
        Ok(T::tool_schema(generator)?.into_nullable())
    }
}

impl<T: ToolSchema + ?Sized> ToolSchema for Box<T> {
    fn tool_schema(generator: &mut SchemaGenerator) -> Result<Schema, GeminiError> {
        T::tool_schema(generator)
    }
}

impl<T: ToolSchema> ToolSchema for Vec<T> {
    fn tool_schema(generator: &mut SchemaGenerator) -> Result<Schema, GeminiError> {
        Ok(Schema::array(generator.subschema::<T>()?))
    }
}

impl<T: ToolSchema> ToolSchema for [T] {
    fn tool_schema(generator: &mut SchemaGenerator) -> Result<Schema, GeminiError> {
        Ok(Schema::array(generator.subschema::<T>()?))
    }
}

impl<T: ToolSchema, const N: usize> ToolSchema for [T; N] {
    fn tool_schema(generator: &mut SchemaGenerator) -> Result<Schema, GeminiError> {
        Ok(Schema::array(generator.subschema::<T>()?))
    }
}
