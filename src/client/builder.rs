use super::model::{GenerativeModel, ModelDefaults};
use super::transport::{ReqwestTransport, Transport};
use crate::error::GeminiError;
use crate::types::*;
use std::env;
use std::fmt;
use std::sync::Arc;
use tracing::info;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const MODEL_ENV: &str = "GEMINI_MODEL";
pub const BASE_URL_ENV: &str = "GEMINI_BASE_URL";

/// `gemini-pro` and `models/gemini-pro` both name the same model.
pub(crate) fn normalize_model_name(model: &str) -> String {
    let model = model.trim();
    if model.starts_with("models/") || model.starts_with("tunedModels/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

pub struct GenerativeModelBuilder {
    api_key: Option<String>,
    model: String,
    base_url: String,
    defaults: ModelDefaults,
    transport: Option<Arc<dyn Transport>>,
}

impl fmt::Debug for GenerativeModelBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerativeModelBuilder")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl Default for GenerativeModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerativeModelBuilder {
    pub fn new() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            defaults: ModelDefaults::default(),
            transport: None,
        }
    }

    /// Reads `GEMINI_API_KEY`, `GEMINI_MODEL` and `GEMINI_BASE_URL`.
    pub fn from_env() -> Result<Self, GeminiError> {
        let api_key = env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or(GeminiError::MissingApiKey)?;
        let mut builder = Self::new().api_key(api_key);
        if let Ok(model) = env::var(MODEL_ENV) {
            builder = builder.model(model);
        }
        if let Ok(base_url) = env::var(BASE_URL_ENV) {
            builder = builder.base_url(base_url);
        }
        Ok(builder)
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn generation_config(mut self, config: GenerationConfig) -> Self {
        self.defaults.generation_config = Some(config);
        self
    }

    pub fn system_instruction(mut self, instruction: Content) -> Self {
        self.defaults.system_instruction = Some(instruction);
        self
    }

    pub fn safety_settings(mut self, settings: Vec<SafetySetting>) -> Self {
        self.defaults.safety_settings = Some(settings);
        self
    }

    pub fn tools(mut self, tools: Vec<Tool>) -> Self {
        self.defaults.tools = Some(tools);
        self
    }

    pub fn tool_config(mut self, config: ToolConfig) -> Self {
        self.defaults.tool_config = Some(config);
        self
    }

    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn http_client(self, client: reqwest::Client) -> Self {
        self.transport(ReqwestTransport::new(client))
    }

    pub fn build(self) -> Result<GenerativeModel, GeminiError> {
        let api_key = self
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(GeminiError::MissingApiKey)?;

        let mut base_url = self.base_url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url = Url::parse(&base_url)?;
        if self.model.trim().is_empty() {
            return Err(GeminiError::ConfigurationError(
                "Model name must not be empty".to_string(),
            ));
        }
        let model = normalize_model_name(&self.model);

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::default()));

        info!("Configured model {} at {}", model, base_url);
        Ok(GenerativeModel::new(
            model,
            api_key,
            base_url,
            transport,
            self.defaults,
        ))
    }
}
