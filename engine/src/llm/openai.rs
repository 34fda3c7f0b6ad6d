//! OpenAI backend wrapping `async-openai`, an alternate provider alongside
//! Anthropic and Ollama.

use crate::error::LlmError;
use crate::llm::LlmBackend;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures::StreamExt;
use futures_core::stream::BoxStream;

pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
}

impl OpenAiBackend {
    pub fn new(api_key: String) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        OpenAiBackend { client: Client::with_config(config) }
    }

    fn classify(err: async_openai::error::OpenAIError) -> LlmError {
        match &err {
            async_openai::error::OpenAIError::ApiError(api_err)
                if api_err.code.as_deref() == Some("rate_limit_exceeded") =>
            {
                LlmError::Transient(err.to_string())
            }
            _ => LlmError::Permanent(err.to_string()),
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete(&self, system: &str, prompt: &str, model: &str) -> Result<String, LlmError> {
        let system_message = ChatCompletionRequestSystemMessageArgs::default()
            .content(system)
            .build()
            .map_err(|e| LlmError::Permanent(e.to_string()))?;
        let user_message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| LlmError::Permanent(e.to_string()))?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(vec![system_message.into(), user_message.into()])
            .build()
            .map_err(|e| LlmError::Permanent(e.to_string()))?;

        let response = self.client.chat().create(request).await.map_err(Self::classify)?;
        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn stream(&self, system: &str, prompt: &str, model: &str) -> Result<BoxStream<'static, Result<String, LlmError>>, LlmError> {
        let system_message = ChatCompletionRequestSystemMessageArgs::default()
            .content(system)
            .build()
            .map_err(|e| LlmError::Permanent(e.to_string()))?;
        let user_message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| LlmError::Permanent(e.to_string()))?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(vec![system_message.into(), user_message.into()])
            .stream(true)
            .build()
            .map_err(|e| LlmError::Permanent(e.to_string()))?;

        let stream = self.client.chat().create_stream(request).await.map_err(Self::classify)?;

        let fragments = stream.map(|chunk_result| {
            let chunk = chunk_result.map_err(Self::classify)?;
            let text = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
                .unwrap_or_default();
            Ok(text)
        });

        Ok(Box::pin(fragments))
    }
}
