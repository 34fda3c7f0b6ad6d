//! Ollama backend for local/self-hosted model deployments, wrapping
//! `ollama-rs`.

use crate::error::LlmError;
use crate::llm::LlmBackend;
use async_trait::async_trait;
use futures::StreamExt;
use futures_core::stream::BoxStream;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::Ollama;

pub struct OllamaBackend {
    client: Ollama,
}

impl OllamaBackend {
    pub fn new(host: String) -> Self {
        let (base, port) = split_host(&host);
        OllamaBackend { client: Ollama::new(base, port) }
    }

    fn prompt_with_system(system: &str, prompt: &str) -> String {
        if system.trim().is_empty() {
            prompt.to_string()
        } else {
            format!("{system}\n\n{prompt}")
        }
    }
}

fn split_host(host: &str) -> (String, u16) {
    // `ollama-rs` wants a base URL and a port separately; local deployments
    // nearly always run on the default 11434, so fall back to that when the
    // configured host carries no explicit port.
    if let Some((scheme_and_host, port_str)) = host.rsplit_once(':') {
        if let Ok(port) = port_str.parse() {
            return (scheme_and_host.to_string(), port);
        }
    }
    (host.to_string(), 11434)
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn complete(&self, system: &str, prompt: &str, model: &str) -> Result<String, LlmError> {
        let full_prompt = Self::prompt_with_system(system, prompt);
        let request = GenerationRequest::new(model.to_string(), full_prompt);
        let response = self
            .client
            .generate(request)
            .await
            .map_err(|e| LlmError::Transient(e.to_string()))?;
        Ok(response.response)
    }

    async fn stream(&self, system: &str, prompt: &str, model: &str) -> Result<BoxStream<'static, Result<String, LlmError>>, LlmError> {
        let full_prompt = Self::prompt_with_system(system, prompt);
        let request = GenerationRequest::new(model.to_string(), full_prompt);
        let stream = self
            .client
            .generate_stream(request)
            .await
            .map_err(|e| LlmError::Transient(e.to_string()))?;

        let fragments = stream.map(|chunk_result| match chunk_result {
            Ok(responses) => Ok(responses.into_iter().map(|r| r.response).collect::<Vec<_>>().join("")),
            Err(e) => Err(LlmError::Transient(e.to_string())),
        });

        Ok(Box::pin(fragments))
    }
}
