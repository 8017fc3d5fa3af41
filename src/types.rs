use crate::codec::base64_bytes;
use crate::error::GeminiError;
use crate::schema::Schema;
use base64::Engine as _;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

// --- Enums ---

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Model,
    Function,
    #[serde(untagged)]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResponseModality {
    Text,
    Image,
    Audio,
    Other(String),
}

impl Serialize for ResponseModality {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ResponseModality::Text => serializer.serialize_str("TEXT"),
            ResponseModality::Image => serializer.serialize_str("IMAGE"),
            ResponseModality::Audio => serializer.serialize_str("AUDIO"),
            ResponseModality::Other(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for ResponseModality {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "TEXT" => Ok(ResponseModality::Text),
            "IMAGE" => Ok(ResponseModality::Image),
            "AUDIO" => Ok(ResponseModality::Audio),
            other => Ok(ResponseModality::Other(other.to_string())),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    FinishReasonUnspecified,
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    Language,
    Blocklist,
    ProhibitedContent,
    MalformedFunctionCall,
    Other,
    #[serde(untagged)]
    Unknown(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum HarmCategory {
    #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
    Harassment,
    #[serde(rename = "HARM_CATEGORY_HATE_SPEECH")]
    HateSpeech,
    #[serde(rename = "HARM_CATEGORY_SEXUALLY_EXPLICIT")]
    SexuallyExplicit,
    #[serde(rename = "HARM_CATEGORY_DANGEROUS_CONTENT")]
    DangerousContent,
    #[serde(rename = "HARM_CATEGORY_CIVIC_INTEGRITY")]
    CivicIntegrity,
    #[serde(untagged)]
    Other(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    HarmBlockThresholdUnspecified,
    BlockLowAndAbove,
    BlockMediumAndAbove,
    BlockOnlyHigh,
    BlockNone,
    Off,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmProbability {
    HarmProbabilityUnspecified,
    Negligible,
    Low,
    Medium,
    High,
    #[serde(untagged)]
    Other(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunctionCallingMode {
    Auto,
    Any,
    None,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PersonGeneration {
    DontAllow,
    AllowAdult,
    AllowAll,
}

// --- Conversation ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    // Blocked candidates come back with a role and no parts.
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl Content {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            parts,
            role: Some(role),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new(Role::Model, vec![Part::text(text)])
    }

    /// Role-less text content, the shape used for system instructions.
    pub fn instruction(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::text(text)],
            role: None,
        }
    }

    pub fn function_call(call: FunctionCall) -> Self {
        Self::new(Role::Model, vec![Part::FunctionCall { function_call: call }])
    }

    pub fn function_responses(responses: Vec<FunctionResponse>) -> Self {
        let parts = responses
            .into_iter()
            .map(|function_response| Part::FunctionResponse { function_response })
            .collect();
        Self::new(Role::Function, parts)
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Concatenated text of every text part, `None` when there is none.
    pub fn text(&self) -> Option<String> {
        let mut texts = self.parts.iter().filter_map(Part::as_text).peekable();
        texts.peek()?;
        Some(texts.collect())
    }

    /// Folds one streamed fragment into this in-progress turn.
    ///
    /// Text continues the trailing text part; any other part is appended as-is.
    pub fn merge_fragment(&mut self, fragment: Content) {
        if self.role.is_none() {
            self.role = fragment.role;
        }
        for part in fragment.parts {
            if let (Some(Part::Text { text: existing }), Part::Text { text }) =
                (self.parts.last_mut(), &part)
            {
                existing.push_str(text);
                continue;
            }
            self.parts.push(part);
        }
    }
}

/// One piece of a [`Content`]. Exactly one payload per part; anything the
/// crate does not model lands in `Unsupported`.
///
/// Decoding picks the variant from the key that is present and decodes its
/// payload strictly, so a known part with a broken payload is an error.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponse,
    },
    FileData {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
    Unsupported(Value),
}

fn part_payload<T, E>(key: &str, value: &Value) -> Result<T, E>
where
    T: DeserializeOwned,
    E: de::Error,
{
    T::deserialize(value).map_err(|e| E::custom(format!("invalid `{}` part: {}", key, e)))
}

impl<'de> Deserialize<'de> for Part {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let Value::Object(fields) = &value else {
            return Ok(Part::Unsupported(value));
        };
        if let Some(text) = fields.get("text") {
            return Ok(Part::Text {
                text: part_payload("text", text)?,
            });
        }
        if let Some(blob) = fields.get("inlineData") {
            return Ok(Part::InlineData {
                inline_data: part_payload("inlineData", blob)?,
            });
        }
        if let Some(call) = fields.get("functionCall") {
            return Ok(Part::FunctionCall {
                function_call: part_payload("functionCall", call)?,
            });
        }
        if let Some(response) = fields.get("functionResponse") {
            return Ok(Part::FunctionResponse {
                function_response: part_payload("functionResponse", response)?,
            });
        }
        if let Some(file) = fields.get("fileData") {
            return Ok(Part::FileData {
                file_data: part_payload("fileData", file)?,
            });
        }
        Ok(Part::Unsupported(value))
    }
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn inline_data(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Part::InlineData {
            inline_data: Blob::new(mime_type, data),
        }
    }

    pub fn file_data(mime_type: impl Into<String>, file_uri: impl Into<String>) -> Self {
        Part::FileData {
            file_data: FileData {
                mime_type: Some(mime_type.into()),
                file_uri: file_uri.into(),
            },
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn as_function_call(&self) -> Option<&FunctionCall> {
        match self {
            Part::FunctionCall { function_call } => Some(function_call),
            _ => None,
        }
    }

    pub fn as_inline_data(&self) -> Option<&Blob> {
        match self {
            Part::InlineData { inline_data } => Some(inline_data),
            _ => None,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Part::Unsupported(_))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    // Raw bytes; base64 on the wire.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub file_uri: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCall {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            args: Some(args),
            id: None,
        }
    }
}

/// Result of a client-side function, sent back to the model.
///
/// The wire format repeats the function name inside `response`; both copies
/// are kept so the server accepts the payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    pub name: String,
    pub response: FunctionResponsePayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FunctionResponsePayload {
    pub name: String,
    pub content: Value,
}

impl FunctionResponse {
    pub fn new(name: impl Into<String>, content: Value) -> Self {
        let name = name.into();
        Self {
            response: FunctionResponsePayload {
                name: name.clone(),
                content,
            },
            name,
            id: None,
        }
    }

    /// Error payload in the shape the model expects for a failed call.
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, serde_json::json!({ "error": message.into() }))
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }
}

// --- Tools ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<FunctionDeclaration>,
}

impl Tool {
    pub fn new(function_declarations: Vec<FunctionDeclaration>) -> Self {
        Self {
            function_declarations,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Schema>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_calling_config: Option<FunctionCallingConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallingConfig {
    pub mode: FunctionCallingMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_function_names: Option<Vec<String>>,
}

// --- Generation settings ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prebuilt_voice_config: Option<PrebuiltVoiceConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_config: Option<VoiceConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

impl SpeechConfig {
    pub fn voice(name: impl Into<String>) -> Self {
        Self {
            voice_config: Some(VoiceConfig {
                prebuilt_voice_config: Some(PrebuiltVoiceConfig {
                    voice_name: name.into(),
                }),
            }),
            language_code: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<ResponseModality>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

// --- generateContent ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_settings: Option<Vec<SafetySetting>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_content: Option<String>,
}

impl GenerateContentRequest {
    pub fn new(contents: Vec<Content>) -> Self {
        Self {
            contents,
            ..Default::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_tool_config(mut self, tool_config: ToolConfig) -> Self {
        self.tool_config = Some(tool_config);
        self
    }

    pub fn with_safety_settings(mut self, settings: Vec<SafetySetting>) -> Self {
        self.safety_settings = Some(settings);
        self
    }

    pub fn with_system_instruction(mut self, instruction: Content) -> Self {
        self.system_instruction = Some(instruction);
        self
    }

    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = Some(config);
        self
    }

    pub fn with_cached_content(mut self, name: impl Into<String>) -> Self {
        self.cached_content = Some(name.into());
        self
    }

    /// Rejects requests the server would refuse: no contents, a content
    /// without parts, or an inline blob without bytes.
    pub(crate) fn validate(&self) -> Result<(), GeminiError> {
        if self.contents.is_empty() {
            return Err(GeminiError::ConfigurationError(
                "Request must contain at least one content".to_string(),
            ));
        }
        if let Some(index) = self.contents.iter().position(Content::is_empty) {
            return Err(GeminiError::ConfigurationError(format!(
                "Content at index {} has no parts",
                index
            )));
        }
        let empty_blob = self
            .contents
            .iter()
            .chain(self.system_instruction.as_ref())
            .flat_map(|content| content.parts.iter())
            .filter_map(Part::as_inline_data)
            .find(|blob| blob.data.is_empty());
        if let Some(blob) = empty_blob {
            return Err(GeminiError::ConfigurationError(format!(
                "Inline data of type {} has no bytes",
                blob.mime_type
            )));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SafetyRating {
    pub category: HarmCategory,
    pub probability: HarmProbability,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub safety_ratings: Vec<SafetyRating>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub safety_ratings: Vec<SafetyRating>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_token_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_content_token_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidates_token_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_use_prompt_token_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thoughts_token_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_token_count: Option<i32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_feedback: Option<PromptFeedback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl GenerateContentResponse {
    pub fn first_content(&self) -> Option<&Content> {
        self.candidates.first()?.content.as_ref()
    }

    /// Text of the first candidate, empty when the model produced none.
    pub fn text(&self) -> String {
        self.first_content()
            .and_then(Content::text)
            .unwrap_or_default()
    }

    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.first_content()
            .map(|c| c.parts.iter().filter_map(Part::as_function_call).collect())
            .unwrap_or_default()
    }

    pub fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback.as_ref()?.block_reason.as_deref()
    }
}

// --- models ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_token_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_token_limit: Option<u32>,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

impl ModelInfo {
    pub fn supports(&self, method: &str) -> bool {
        self.supported_generation_methods.iter().any(|m| m == method)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListModelsResponse {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

// --- predict (image generation) ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ImagePrompt {
    pub prompt: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImageParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_generation: Option<PersonGeneration>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageRequest {
    pub instances: Vec<ImagePrompt>,
    pub parameters: ImageParameters,
}

impl GenerateImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            instances: vec![ImagePrompt {
                prompt: prompt.into(),
            }],
            parameters: ImageParameters::default(),
        }
    }

    pub fn sample_count(mut self, count: u32) -> Self {
        self.parameters.sample_count = Some(count);
        self
    }

    pub fn aspect_ratio(mut self, ratio: impl Into<String>) -> Self {
        self.parameters.aspect_ratio = Some(ratio.into());
        self
    }

    pub fn person_generation(mut self, policy: PersonGeneration) -> Self {
        self.parameters.person_generation = Some(policy);
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub mime_type: String,
    pub bytes_base64_encoded: String,
}

impl GeneratedImage {
    pub fn bytes(&self) -> Result<Vec<u8>, GeminiError> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.bytes_base64_encoded)
            .map_err(|e| {
                GeminiError::DeserializationFailed(format!("Base64 decode failed: {}", e))
            })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageResponse {
    #[serde(default)]
    pub predictions: Vec<GeneratedImage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn part_variants_round_trip_through_wire_shape() {
        let content = Content::new(
            Role::User,
            vec![
                Part::text("describe this"),
                Part::inline_data("image/png", vec![1, 2, 3]),
                Part::file_data("video/mp4", "files/abc"),
            ],
        );
        let value = serde_json::to_value(&content).unwrap();
        assert_eq!(
            value,
            json!({
                "role": "user",
                "parts": [
                    { "text": "describe this" },
                    { "inlineData": { "mimeType": "image/png", "data": "AQID" } },
                    { "fileData": { "mimeType": "video/mp4", "fileUri": "files/abc" } }
                ]
            })
        );
        let back: Content = serde_json::from_value(value).unwrap();
        assert_eq!(back, content);
    }

    #[test]
    fn unknown_part_shapes_are_unsupported() {
        let part: Part = serde_json::from_value(json!({ "executableCode": { "code": "1" } })).unwrap();
        assert!(!part.is_supported());
    }

    #[test]
    fn known_parts_with_broken_payloads_fail() {
        let bad_args = json!({ "functionCall": { "name": "add", "args": [1, 2] } });
        assert!(serde_json::from_value::<Part>(bad_args).is_err());

        let bad_text = json!({ "text": 42 });
        assert!(serde_json::from_value::<Part>(bad_text).is_err());

        let call: Part =
            serde_json::from_value(json!({ "functionCall": { "name": "add", "args": { "a": 1 } } }))
                .unwrap();
        assert_eq!(call.as_function_call().map(|c| c.name.as_str()), Some("add"));
    }

    #[test]
    fn function_response_repeats_the_name() {
        let response = FunctionResponse::new("add", json!(7));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "name": "add", "response": { "name": "add", "content": 7 } })
        );
    }

    #[test]
    fn merge_fragment_concatenates_text_and_appends_other_parts() {
        let mut turn = Content::default();
        turn.merge_fragment(Content::model("Hel"));
        turn.merge_fragment(Content::model("lo"));
        turn.merge_fragment(Content::function_call(FunctionCall::new("add", Map::new())));
        turn.merge_fragment(Content::model("!"));

        assert_eq!(turn.role, Some(Role::Model));
        assert_eq!(turn.parts.len(), 3);
        assert_eq!(turn.parts[0].as_text(), Some("Hello"));
        assert!(turn.parts[1].as_function_call().is_some());
        assert_eq!(turn.text().as_deref(), Some("Hello!"));
    }

    #[test]
    fn response_helpers_read_the_first_candidate() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "Sure. " },
                        { "functionCall": { "name": "add", "args": { "a": 1, "b": 2 } } }
                    ]
                },
                "finishReason": "STOP",
                "index": 0
            }],
            "usageMetadata": { "promptTokenCount": 4, "totalTokenCount": 9 }
        }))
        .unwrap();

        assert_eq!(response.text(), "Sure. ");
        assert_eq!(response.function_calls()[0].name, "add");
        assert_eq!(response.candidates[0].finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn blocked_prompt_exposes_block_reason() {
        let response: GenerateContentResponse =
            serde_json::from_value(json!({ "promptFeedback": { "blockReason": "SAFETY" } }))
                .unwrap();
        assert!(response.candidates.is_empty());
        assert_eq!(response.block_reason(), Some("SAFETY"));
        assert_eq!(response.text(), "");
    }

    #[test]
    fn image_request_matches_predict_shape() {
        let request = GenerateImageRequest::new("a cat")
            .sample_count(2)
            .aspect_ratio("16:9")
            .person_generation(PersonGeneration::DontAllow);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "instances": [{ "prompt": "a cat" }],
                "parameters": {
                    "sampleCount": 2,
                    "aspectRatio": "16:9",
                    "personGeneration": "dont_allow"
                }
            })
        );
    }

    #[test]
    fn generated_image_decodes_bytes() {
        let image = GeneratedImage {
            mime_type: "image/png".to_string(),
            bytes_base64_encoded: "AQID".to_string(),
        };
        assert_eq!(image.bytes().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn empty_request_fails_validation() {
        assert!(GenerateContentRequest::new(vec![]).validate().is_err());
        assert!(
            GenerateContentRequest::new(vec![Content::default()])
                .validate()
                .is_err()
        );
        assert!(
            GenerateContentRequest::new(vec![Content::user("hi")])
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn empty_inline_blobs_fail_validation() {
        let image = Content::new(
            Role::User,
            vec![Part::text("what is this?"), Part::inline_data("image/png", vec![])],
        );
        assert!(matches!(
            GenerateContentRequest::new(vec![image]).validate(),
            Err(GeminiError::ConfigurationError(_))
        ));

        let instruction = Content::new(Role::User, vec![Part::inline_data("audio/pcm", vec![])]);
        assert!(
            GenerateContentRequest::new(vec![Content::user("hi")])
                .with_system_instruction(instruction)
                .validate()
                .is_err()
        );

        let image = Content::new(Role::User, vec![Part::inline_data("image/png", vec![1])]);
        assert!(GenerateContentRequest::new(vec![image]).validate().is_ok());
    }
}
