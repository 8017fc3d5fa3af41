use super::model::GenerativeModel;
use crate::error::GeminiError;
use crate::function::find_function_call;
use crate::types::*;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A conversation with a model, owned by the caller.
///
/// Every turn resends the whole history. A turn is recorded only when the
/// model answered with content, so a failed or blocked turn can be retried
/// as is.
#[derive(Debug, Clone)]
pub struct ChatSession {
    model: GenerativeModel,
    history: Vec<Content>,
}

impl ChatSession {
    pub fn new(model: GenerativeModel) -> Self {
        Self {
            model,
            history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<Content>) -> Self {
        self.history = history;
        self
    }

    pub fn model(&self) -> &GenerativeModel {
        &self.model
    }

    pub fn history(&self) -> &[Content] {
        &self.history
    }

    pub fn into_history(self) -> Vec<Content> {
        self.history
    }

    fn request_with(&self, content: &Content) -> GenerateContentRequest {
        let mut contents = self.history.clone();
        contents.push(content.clone());
        GenerateContentRequest::new(contents)
    }

    fn record(&mut self, content: Content, mut reply: Content) {
        if reply.role.is_none() {
            reply.role = Some(Role::Model);
        }
        self.history.push(content);
        self.history.push(reply);
        debug!("Chat history now has {} turns", self.history.len());
    }

    pub async fn send(
        &mut self,
        content: Content,
        cancel: &CancellationToken,
    ) -> Result<GenerateContentResponse, GeminiError> {
        let response = self
            .model
            .generate_content(self.request_with(&content), cancel)
            .await?;
        if let Some(reply) = response.first_content().filter(|c| !c.is_empty()) {
            self.record(content, reply.clone());
        }
        Ok(response)
    }

    /// Streams one turn, calling `on_fragment` for each fragment as it
    /// arrives, and returns the merged reply.
    ///
    /// Any error item aborts the turn and leaves the history untouched.
    pub async fn send_stream<F>(
        &mut self,
        content: Content,
        cancel: &CancellationToken,
        mut on_fragment: F,
    ) -> Result<Content, GeminiError>
    where
        F: FnMut(&GenerateContentResponse),
    {
        let mut stream = self
            .model
            .stream_generate_content(self.request_with(&content), cancel)
            .await?;
        let mut reply = Content::default();
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            on_fragment(&fragment);
            if let Some(part) = fragment.first_content() {
                reply.merge_fragment(part.clone());
            }
        }
        if !reply.is_empty() {
            self.record(content, reply.clone());
        }
        Ok(reply)
    }

    /// Sends the results of the model's function calls as the next turn.
    pub async fn send_function_responses(
        &mut self,
        responses: Vec<FunctionResponse>,
        cancel: &CancellationToken,
    ) -> Result<GenerateContentResponse, GeminiError> {
        self.send(Content::function_responses(responses), cancel)
            .await
    }

    /// The function call the model made in its latest turn, if any.
    pub fn last_function_call(&self) -> Option<&FunctionCall> {
        self.history
            .last()
            .filter(|c| c.role == Some(Role::Model))
            .and_then(find_function_call)
    }
}
