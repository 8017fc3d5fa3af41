use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeminiError {
    #[error("Request failed with status {status}: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("HTTP transport error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request was canceled")]
    Canceled,

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Failed to deserialize response: {0}")]
    DeserializationFailed(String),

    #[error("Schema nesting exceeds the maximum depth of {max_depth}")]
    SchemaDepthExceeded { max_depth: usize },

    #[error("Function '{0}' has no description")]
    MissingDescription(String),

    #[error("No callable functions registered on '{0}'")]
    NoCallableOperations(String),

    #[error("Function '{function}' is not defined on '{target}'")]
    UnknownFunction { target: String, function: String },

    #[error("Missing required argument '{argument}' for function '{function}'")]
    MissingArgument { function: String, argument: String },

    #[error("Cannot convert argument '{argument}' to {expected}: got {found}")]
    ArgumentConversion {
        argument: String,
        expected: String,
        found: String,
    },

    #[error("Function '{function}' failed: {message}")]
    FunctionFailed { function: String, message: String },

    #[error("Invalid function name '{0}': expected 1-63 characters of [A-Za-z0-9_-]")]
    InvalidFunctionName(String),

    #[error("Function '{0}' is registered more than once")]
    DuplicateFunction(String),

    #[error("Missing API key")]
    MissingApiKey,

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),
}

impl GeminiError {
    /// Cancellation is reported apart from failures so callers can skip error UI.
    pub fn is_canceled(&self) -> bool {
        matches!(self, GeminiError::Canceled)
    }

    /// HTTP status of a failed request, when the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            GeminiError::RequestFailed { status, .. } => Some(*status),
            GeminiError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Error body returned by the API: `{"error": {"code", "message", "status"}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    #[serde(default)]
    error: Option<ApiError>,
}

impl ApiError {
    /// The envelope carried by `body`, if it is one.
    pub(crate) fn from_body(body: &[u8]) -> Option<ApiError> {
        serde_json::from_slice::<ApiErrorEnvelope>(body)
            .ok()?
            .error
    }

    pub(crate) fn detail(&self) -> String {
        match &self.status {
            Some(status) => format!("{} ({})", self.message, status),
            None => self.message.clone(),
        }
    }

    /// `RequestFailed` with the envelope's code, or `fallback_status` when it has none.
    pub(crate) fn into_request_failed(self, fallback_status: u16) -> GeminiError {
        GeminiError::RequestFailed {
            status: self.code.unwrap_or(fallback_status),
            message: self.detail(),
        }
    }
}

/// Message for a failed response: the envelope's message when present, else the trimmed body.
pub(crate) fn error_message(body: &str) -> String {
    match ApiError::from_body(body.as_bytes()) {
        Some(error) => error.detail(),
        None => body.trim().to_string(),
    }
}
