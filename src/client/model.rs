use super::builder::GenerativeModelBuilder;
use super::chat::ChatSession;
use super::transport::{Transport, TransportRequest};
use crate::codec;
use crate::error::GeminiError;
use crate::stream::decode_json_array;
use crate::types::*;
use futures_util::Stream;
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use url::Url;

pub type ResponseStream =
    Pin<Box<dyn Stream<Item = Result<GenerateContentResponse, GeminiError>> + Send>>;

/// Request fields configured once on the model. Each one is used only when
/// the request leaves it unset.
#[derive(Debug, Clone, Default)]
pub(crate) struct ModelDefaults {
    pub generation_config: Option<GenerationConfig>,
    pub system_instruction: Option<Content>,
    pub safety_settings: Option<Vec<SafetySetting>>,
    pub tools: Option<Vec<Tool>>,
    pub tool_config: Option<ToolConfig>,
}

impl ModelDefaults {
    fn apply(&self, mut request: GenerateContentRequest) -> GenerateContentRequest {
        if request.generation_config.is_none() {
            request.generation_config = self.generation_config.clone();
        }
        if request.system_instruction.is_none() {
            request.system_instruction = self.system_instruction.clone();
        }
        if request.safety_settings.is_none() {
            request.safety_settings = self.safety_settings.clone();
        }
        if request.tools.is_none() {
            request.tools = self.tools.clone();
        }
        if request.tool_config.is_none() {
            request.tool_config = self.tool_config.clone();
        }
        request
    }
}

/// Runs `operation` unless `cancel` fires first.
///
/// The operation future is dropped as soon as the token fires, which aborts
/// the exchange. A result that settles after cancellation is discarded.
async fn cancellable<T, F>(cancel: &CancellationToken, operation: F) -> Result<T, GeminiError>
where
    F: Future<Output = Result<T, GeminiError>>,
{
    if cancel.is_cancelled() {
        return Err(GeminiError::Canceled);
    }
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!("Request canceled while in flight.");
            return Err(GeminiError::Canceled);
        }
        result = operation => result,
    };
    if cancel.is_cancelled() {
        info!("Request canceled; discarding late result.");
        return Err(GeminiError::Canceled);
    }
    result
}

/// URL with the API key replaced, for logging.
fn redact(url: &Url) -> String {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(name, value)| {
            let hidden = name == "key";
            let value = if hidden {
                "REDACTED".to_string()
            } else {
                value.into_owned()
            };
            (name.into_owned(), value)
        })
        .collect();
    let mut shown = url.clone();
    if !pairs.is_empty() {
        shown.query_pairs_mut().clear().extend_pairs(pairs);
    }
    shown.to_string()
}

/// Handle on one model of the API.
///
/// Holds no per-call state, so clones can issue requests concurrently.
#[derive(Clone)]
pub struct GenerativeModel {
    model: String,
    api_key: String,
    base_url: Url,
    transport: Arc<dyn Transport>,
    defaults: ModelDefaults,
}

impl fmt::Debug for GenerativeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerativeModel")
            .field("model", &self.model)
            .field("base_url", &self.base_url.as_str())
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl GenerativeModel {
    pub(crate) fn new(
        model: String,
        api_key: String,
        base_url: Url,
        transport: Arc<dyn Transport>,
        defaults: ModelDefaults,
    ) -> Self {
        Self {
            model,
            api_key,
            base_url,
            transport,
            defaults,
        }
    }

    pub fn builder() -> GenerativeModelBuilder {
        GenerativeModelBuilder::new()
    }

    /// Normalised model name, e.g. `models/gemini-1.5-flash`.
    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Same key, transport and defaults, different model.
    pub fn with_model(&self, model: impl AsRef<str>) -> Self {
        Self {
            model: super::builder::normalize_model_name(model.as_ref()),
            ..self.clone()
        }
    }

    pub fn start_chat(&self) -> ChatSession {
        ChatSession::new(self.clone())
    }

    fn endpoint(&self, method: &str) -> Result<Url, GeminiError> {
        let mut url = self.base_url.join(&format!("{}:{}", self.model, method))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    fn prepare(&self, request: GenerateContentRequest) -> Result<String, GeminiError> {
        let request = self.defaults.apply(request);
        request.validate()?;
        let body = codec::to_json(&request)?;
        trace!("Request body: {}", body);
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: TransportRequest,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<T, GeminiError> {
        cancellable(cancel, async {
            debug!("Sending {:?} {}", request.method, redact(url));
            let response = self.transport.send(request).await?;
            debug!("Response status {}", response.status);
            let body = response.error_for_status().await?.bytes().await?;
            trace!("Response body ({} bytes)", body.len());
            codec::from_response(&body)
        })
        .await
    }

    /// All models available to the key, following pagination.
    #[tracing::instrument(skip_all)]
    pub async fn list_models(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ModelInfo>, GeminiError> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = self.base_url.join("models")?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("key", &self.api_key);
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }
            let page: ListModelsResponse = self
                .send_json(TransportRequest::get(url.as_str()), &url, cancel)
                .await?;
            models.extend(page.models);
            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        info!("Listed {} models", models.len());
        Ok(models)
    }

    #[tracing::instrument(skip_all, fields(model = %self.model))]
    pub async fn generate_content(
        &self,
        request: GenerateContentRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerateContentResponse, GeminiError> {
        let body = self.prepare(request)?;
        let url = self.endpoint("generateContent")?;
        self.send_json(TransportRequest::post(url.as_str(), body), &url, cancel)
            .await
    }

    /// Starts a streamed generation.
    ///
    /// Resolves once the response headers arrive; fragments are then decoded
    /// as they come in. Cancelling `cancel` ends the stream with one
    /// `Canceled` item and releases the connection.
    #[tracing::instrument(skip_all, fields(model = %self.model))]
    pub async fn stream_generate_content(
        &self,
        request: GenerateContentRequest,
        cancel: &CancellationToken,
    ) -> Result<ResponseStream, GeminiError> {
        let body = self.prepare(request)?;
        let url = self.endpoint("streamGenerateContent")?;
        let response = cancellable(cancel, async {
            debug!("Sending streaming request {}", redact(&url));
            let response = self
                .transport
                .send(TransportRequest::post(url.as_str(), body))
                .await?;
            debug!("Response status {}", response.status);
            response.error_for_status().await
        })
        .await?;
        Ok(Box::pin(decode_json_array::<GenerateContentResponse>(
            response.body,
            cancel.clone(),
        )))
    }

    /// Image generation through the `predict` endpoint. The model must be an
    /// image model (see [`GenerativeModel::with_model`]).
    #[tracing::instrument(skip_all, fields(model = %self.model))]
    pub async fn generate_image(
        &self,
        request: GenerateImageRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerateImageResponse, GeminiError> {
        if request.instances.iter().all(|i| i.prompt.trim().is_empty()) {
            return Err(GeminiError::ConfigurationError(
                "Image request needs a prompt".to_string(),
            ));
        }
        let body = codec::to_json(&request)?;
        let url = self.endpoint("predict")?;
        self.send_json(TransportRequest::post(url.as_str(), body), &url, cancel)
            .await
    }
}
