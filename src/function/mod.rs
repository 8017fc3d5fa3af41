//! Client-side functions the model can call.
//!
//! A target type exposes its callable operations through a
//! [`FunctionRegistry`], usually generated by `#[function_target]`. The
//! registry yields the declarations sent to the model and dispatches the
//! model's [`FunctionCall`]s back onto the target.

mod argument;
mod registry;

pub use argument::{Argument, CallArguments, conversion_error, decode_structured};
pub use registry::{
    FunctionBuilder, FunctionHandler, FunctionRegistry, MAX_FUNCTION_NAME_LEN,
    is_valid_function_name,
};

use crate::error::GeminiError;
use crate::types::{Content, FunctionCall, FunctionDeclaration, FunctionResponse, Part};
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use tracing::debug;

/// A type whose operations can be called by the model.
pub trait FunctionTarget: Sized + 'static {
    fn function_registry() -> Result<FunctionRegistry<Self>, GeminiError>;
}

type RegistryCache = RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>;

/// The registry of `T`, built on first use and shared afterwards.
///
/// A failed build is not cached.
pub fn shared_registry<T: FunctionTarget>() -> Result<Arc<FunctionRegistry<T>>, GeminiError> {
    static CACHE: OnceLock<RegistryCache> = OnceLock::new();
    let cache = CACHE.get_or_init(Default::default);

    let cached = cache
        .read()
        .ok()
        .and_then(|entries| entries.get(&TypeId::of::<T>()).cloned());
    if let Some(registry) = cached.and_then(|entry| entry.downcast::<FunctionRegistry<T>>().ok()) {
        return Ok(registry);
    }

    let registry = Arc::new(T::function_registry()?);
    debug!("Cached function registry for '{}'", registry.target_name());
    if let Ok(mut entries) = cache.write() {
        entries.insert(TypeId::of::<T>(), registry.clone());
    }
    Ok(registry)
}

/// Declarations for every callable operation on `T`.
pub fn build_function_declarations<T: FunctionTarget>()
-> Result<Vec<FunctionDeclaration>, GeminiError> {
    shared_registry::<T>()?.function_declarations()
}

/// Dispatches `call` onto `target`. Errors propagate to the caller.
pub fn invoke_function_call<T: FunctionTarget>(
    target: &T,
    call: &FunctionCall,
) -> Result<Value, GeminiError> {
    shared_registry::<T>()?.invoke(target, call)
}

/// Like [`invoke_function_call`] but always produces a response for the model.
pub fn respond_to_function_call<T: FunctionTarget>(
    target: &T,
    call: &FunctionCall,
) -> FunctionResponse {
    match shared_registry::<T>() {
        Ok(registry) => registry.respond(target, call),
        Err(e) => FunctionResponse::error(&call.name, e.to_string()).with_id(call.id.clone()),
    }
}

/// The function call carried by the first part of `content`, if any.
///
/// Later parts are not inspected.
pub fn find_function_call(content: &Content) -> Option<&FunctionCall> {
    content.parts.first().and_then(Part::as_function_call)
}
