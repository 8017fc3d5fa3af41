use super::argument::{Argument, CallArguments};
use crate::error::GeminiError;
use crate::schema::{Schema, SchemaGenerator, ToolSchema};
use crate::types::{FunctionCall, FunctionDeclaration, FunctionResponse, Tool};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const MAX_FUNCTION_NAME_LEN: usize = 63;

/// Type-erased callable invoked with the target and the bound call arguments.
pub type FunctionHandler<S> =
    Arc<dyn Fn(&S, &CallArguments<'_>) -> Result<Value, GeminiError> + Send + Sync>;

type SchemaFn = fn(&mut SchemaGenerator) -> Result<Schema, GeminiError>;

struct ParamSpec {
    name: String,
    description: Option<String>,
    required: bool,
    schema: SchemaFn,
}

/// Names must match `[A-Za-z0-9_-]{1,63}`.
pub fn is_valid_function_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_FUNCTION_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Declares one callable function: name, description, parameters and handler.
pub struct FunctionBuilder<S> {
    name: String,
    description: String,
    params: Vec<ParamSpec>,
    handler: Option<FunctionHandler<S>>,
}

impl<S> FunctionBuilder<S> {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            handler: None,
        }
    }

    /// Adds a parameter. It is required unless `T` is nullable (`Option<_>`).
    pub fn param<T>(mut self, name: impl Into<String>, description: Option<&str>) -> Self
    where
        T: ToolSchema + Argument,
    {
        self.params.push(ParamSpec {
            name: name.into(),
            description: description.map(str::to_string),
            required: !T::NULLABLE,
            schema: SchemaGenerator::subschema::<T>,
        });
        self
    }

    /// Adds a parameter the model may leave out, typically one with a default.
    pub fn optional_param<T>(mut self, name: impl Into<String>, description: Option<&str>) -> Self
    where
        T: ToolSchema + Argument,
    {
        self.params.push(ParamSpec {
            name: name.into(),
            description: description.map(str::to_string),
            required: false,
            schema: SchemaGenerator::subschema::<T>,
        });
        self
    }

    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&S, &CallArguments<'_>) -> Result<Value, GeminiError> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    fn build(self, generator: &mut SchemaGenerator) -> Result<RegisteredFunction<S>, GeminiError> {
        if !is_valid_function_name(&self.name) {
            return Err(GeminiError::InvalidFunctionName(self.name));
        }
        if self.description.trim().is_empty() {
            return Err(GeminiError::MissingDescription(self.name));
        }
        let handler = self.handler.ok_or_else(|| {
            GeminiError::ConfigurationError(format!("Function '{}' has no handler", self.name))
        })?;

        let parameters = if self.params.is_empty() {
            None
        } else {
            let mut properties = BTreeMap::new();
            let mut required = Vec::new();
            for param in self.params {
                let mut schema = (param.schema)(generator)?;
                if let Some(description) = param.description {
                    schema.description = Some(description);
                }
                if param.required {
                    required.push(param.name.clone());
                } else {
                    schema.nullable = Some(true);
                }
                properties.insert(param.name, schema);
            }
            Some(Schema::object(properties, required))
        };

        Ok(RegisteredFunction {
            declaration: FunctionDeclaration {
                name: self.name,
                description: self.description,
                parameters,
            },
            handler,
        })
    }
}

struct RegisteredFunction<S> {
    declaration: FunctionDeclaration,
    handler: FunctionHandler<S>,
}

/// Registration table mapping function names to handlers on a target type.
///
/// Schemas are generated once at registration, so every declaration built
/// from the same registry is identical.
pub struct FunctionRegistry<S> {
    target: String,
    functions: Vec<RegisteredFunction<S>>,
}

impl<S> fmt::Debug for FunctionRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("target", &self.target)
            .field("functions", &self.names())
            .finish()
    }
}

impl<S> FunctionRegistry<S> {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            functions: Vec::new(),
        }
    }

    pub fn register(mut self, function: FunctionBuilder<S>) -> Result<Self, GeminiError> {
        let registered = function.build(&mut SchemaGenerator::new())?;
        let name = &registered.declaration.name;
        if self.get(name).is_some() {
            return Err(GeminiError::DuplicateFunction(name.clone()));
        }
        debug!("Registered function '{}' on '{}'", name, self.target);
        self.functions.push(registered);
        Ok(self)
    }

    pub fn target_name(&self) -> &str {
        &self.target
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.functions
            .iter()
            .map(|f| f.declaration.name.as_str())
            .collect()
    }

    fn get(&self, name: &str) -> Option<&RegisteredFunction<S>> {
        self.functions.iter().find(|f| f.declaration.name == name)
    }

    pub fn declaration(&self, name: &str) -> Option<&FunctionDeclaration> {
        self.get(name).map(|f| &f.declaration)
    }

    /// Declarations in registration order. An empty registry is an error.
    pub fn function_declarations(&self) -> Result<Vec<FunctionDeclaration>, GeminiError> {
        if self.functions.is_empty() {
            return Err(GeminiError::NoCallableOperations(self.target.clone()));
        }
        Ok(self
            .functions
            .iter()
            .map(|f| f.declaration.clone())
            .collect())
    }

    pub fn tool(&self) -> Result<Tool, GeminiError> {
        self.function_declarations().map(Tool::new)
    }

    /// Resolves `call` and runs it against `target`.
    ///
    /// Errors from argument binding and from the function itself are returned
    /// unchanged; turning them into a reply for the model is up to the caller
    /// (see [`FunctionRegistry::respond`]).
    pub fn invoke(&self, target: &S, call: &FunctionCall) -> Result<Value, GeminiError> {
        let function = self
            .get(&call.name)
            .ok_or_else(|| GeminiError::UnknownFunction {
                target: self.target.clone(),
                function: call.name.clone(),
            })?;
        info!("Invoking function '{}' on '{}'", call.name, self.target);
        let args = CallArguments::new(&call.name, call.args.as_ref());
        (function.handler)(target, &args)
    }

    /// Invokes `call` and packages the outcome for the next turn. Failures
    /// become an `{"error": ...}` payload the model can react to.
    pub fn respond(&self, target: &S, call: &FunctionCall) -> FunctionResponse {
        let response = match self.invoke(target, call) {
            Ok(value) => FunctionResponse::new(&call.name, value),
            Err(e) => {
                warn!("Function call '{}' failed: {}", call.name, e);
                FunctionResponse::error(&call.name, e.to_string())
            }
        };
        response.with_id(call.id.clone())
    }
}
