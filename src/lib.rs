//! REST client for the Gemini generative-language API.
//!
//! - [`client`]: model handle, transport and chat session.
//! - [`stream`]: incremental decoding of streamed responses.
//! - [`schema`] and [`function`]: declaring client-side functions and
//!   dispatching the model's calls onto them.

// Lets the derive and attribute macros refer to `::gemini_rest_api` from inside this crate.
extern crate self as gemini_rest_api;

pub mod client;
pub mod codec;
pub mod error;
pub mod function;
pub mod schema;
pub mod stream;
pub mod types;

// Re-export key components
pub use client::{ChatSession, GenerativeModel, GenerativeModelBuilder, ReqwestTransport, Transport};
pub use error::GeminiError;
pub use function::{
    FunctionBuilder, FunctionRegistry, FunctionTarget, build_function_declarations,
    find_function_call, invoke_function_call, shared_registry,
};
pub use schema::{Schema, SchemaGenerator, SchemaType, ToolSchema};
pub use tokio_util::sync::CancellationToken;
pub use types::{
    Blob, Candidate, Content, FunctionCall, FunctionDeclaration, FunctionResponse,
    GenerateContentRequest, GenerateContentResponse, GenerateImageRequest, GenerateImageResponse,
    GenerationConfig, ModelInfo, Part, ResponseModality, Role, SpeechConfig, Tool, UsageMetadata,
};

// Macro export
pub use gemini_rest_macros::{ToolSchema, function_target};

#[doc(hidden)]
pub mod __private {
    pub use serde::de::DeserializeOwned;
    pub use serde_json::Value;
}
