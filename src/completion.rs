#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! The boundary to the text-generation service.
//!
//! Grading only ever needs "system + user message in, text out", so that is
//! all [`CompletionService`] exposes. [`OpenAiService`] talks to any
//! OpenAI-compatible chat completions endpoint.

use std::time::Duration;

use async_openai::{
    Client as OpenAIClient,
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
};
use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::{
    config::GraderConfig,
    error::{GraderError, Result},
};

/// One stateless request to the text-generation service.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(on(String, into))]
pub struct CompletionRequest {
    /// Instruction sent with the `system` role.
    pub system:      String,
    /// Message sent with the `user` role.
    pub user:        String,
    /// Model identifier.
    pub model:       String,
    /// Sampling temperature.
    #[builder(default = 0.5)]
    pub temperature: f32,
    /// Nucleus sampling mass.
    #[builder(default = 1.0)]
    pub top_p:       f32,
}

impl CompletionRequest {
    /// Returns `(role, content)` pairs in the order they are sent.
    pub fn messages(&self) -> [(&'static str, &str); 2] {
        [("system", self.system.as_str()), ("user", self.user.as_str())]
    }
}

/// Something that turns a [`CompletionRequest`] into generated text.
#[allow(async_fn_in_trait)]
pub trait CompletionService {
    /// Sends `request` and returns the generated text, or the reason the
    /// exchange failed.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

impl<S: CompletionService> CompletionService for &S {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        (**self).complete(request).await
    }
}

/// [`CompletionService`] backed by an OpenAI-compatible chat completions API.
#[derive(Clone)]
pub struct OpenAiService {
    /// The underlying async-openai client.
    client:  OpenAIClient<OpenAIConfig>,
    /// Upper bound on a single exchange, if configured.
    timeout: Option<Duration>,
}

impl OpenAiService {
    /// Creates a client for the endpoint in `config`, authenticating with
    /// `api_key`.
    pub fn new(config: &GraderConfig, api_key: impl Into<String>) -> Self {
        let client = OpenAIClient::with_config(
            OpenAIConfig::new()
                .with_api_base(config.api_base().to_owned())
                .with_api_key(api_key.into()),
        );

        Self {
            client,
            timeout: config.request_timeout(),
        }
    }

    /// Converts a request into the chat message list the API expects.
    fn chat_messages(request: &CompletionRequest) -> Result<Vec<ChatCompletionRequestMessage>> {
        let err = |e: OpenAIError| GraderError::completion(&request.model, e);
        Ok(vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system.clone())
                .build()
                .map_err(err)?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.user.clone())
                .build()
                .map_err(err)?
                .into(),
        ])
    }
}

impl CompletionService for OpenAiService {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(request.model.clone())
            .messages(Self::chat_messages(request)?)
            .temperature(request.temperature)
            .top_p(request.top_p)
            .build()
            .map_err(|e| GraderError::completion(&request.model, e))?;

        let chat = self.client.chat();
        let call = chat.create(chat_request);
        let response = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                GraderError::completion(
                    &request.model,
                    format!("no response within {} seconds", limit.as_secs()),
                )
            })?,
            None => call.await,
        }
        .map_err(|e| GraderError::completion(&request.model, e))?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|content| content.trim().to_owned())
            .ok_or_else(|| GraderError::completion(&request.model, "response contained no content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_sampling_defaults() {
        let request = CompletionRequest::builder()
            .system("sys")
            .user("usr")
            .model("gpt-4o-mini")
            .build();

        assert_eq!(request.temperature, 0.5);
        assert_eq!(request.top_p, 1.0);
        assert_eq!(request.messages(), [("system", "sys"), ("user", "usr")]);
    }
}
