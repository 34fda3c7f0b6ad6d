//! LLM Gateway (C4): a provider-agnostic streaming/non-streaming interface
//! with model tiering, exponential-backoff retries, and in-line paragraph
//! reformatting for narrative streams.

pub mod anthropic;
pub mod ollama;
pub mod openai;

use crate::config::{EngineConfig, LlmProviderKind};
use crate::error::{LlmError, Result};
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use std::time::Duration;

/// What a given LLM call is for. Drives model tiering and, for
/// `story_generation`, the paragraph-reformatting watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseCase {
    StoryGeneration,
    ImageSceneDescription,
    SummaryGeneration,
    ParagraphReformatting,
    CharacterVisualUpdate,
    ImagePromptSynthesis,
    TitleExtraction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Reasoning,
    Utility,
}

impl UseCase {
    pub fn tier(&self) -> ModelTier {
        match self {
            UseCase::StoryGeneration | UseCase::ImageSceneDescription => ModelTier::Reasoning,
            UseCase::SummaryGeneration
            | UseCase::ParagraphReformatting
            | UseCase::CharacterVisualUpdate
            | UseCase::ImagePromptSynthesis
            | UseCase::TitleExtraction => ModelTier::Utility,
        }
    }
}

/// A raw provider backend. Implementations only need to know how to call
/// their specific vendor API; retries, tiering, and reformatting all live in
/// `LlmGateway` above this trait.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn stream(&self, system: &str, prompt: &str, model: &str) -> Result<BoxStream<'static, Result<String, LlmError>>, LlmError>;
    async fn complete(&self, system: &str, prompt: &str, model: &str) -> Result<String, LlmError>;
}

/// Construct the configured backend.
pub fn build_backend(config: &EngineConfig) -> Result<Box<dyn LlmBackend>> {
    match config.llm_provider {
        LlmProviderKind::Anthropic => {
            let key = config
                .anthropic_api_key
                .clone()
                .ok_or_else(|| crate::error::EngineError::Config("missing ANTHROPIC_API_KEY".to_string()))?;
            Ok(Box::new(anthropic::AnthropicBackend::new(key)))
        }
        LlmProviderKind::OpenAi => {
            let key = config
                .openai_api_key
                .clone()
                .ok_or_else(|| crate::error::EngineError::Config("missing OPENAI_API_KEY".to_string()))?;
            Ok(Box::new(openai::OpenAiBackend::new(key)))
        }
        LlmProviderKind::Ollama => Ok(Box::new(ollama::OllamaBackend::new(config.ollama_host.clone()))),
    }
}

/// Provider-agnostic gateway sitting above a `LlmBackend`. Owns model
/// tiering, retry/backoff, and paragraph reformatting.
pub struct LlmGateway {
    backend: Box<dyn LlmBackend>,
    reasoning_model: String,
    utility_model: String,
    max_retries: u32,
}

impl LlmGateway {
    pub fn new(backend: Box<dyn LlmBackend>, reasoning_model: String, utility_model: String, max_retries: u32) -> Self {
        LlmGateway { backend, reasoning_model, utility_model, max_retries }
    }

    fn model_for(&self, use_case: UseCase) -> &str {
        match use_case.tier() {
            ModelTier::Reasoning => &self.reasoning_model,
            ModelTier::Utility => &self.utility_model,
        }
    }

    /// Non-streaming call used for summaries, titles, visual extraction, and
    /// image-prompt synthesis.
    pub async fn complete(&self, system: &str, prompt: &str, use_case: UseCase) -> Result<String, LlmError> {
        let model = self.model_for(use_case).to_string();
        retry_with_backoff(self.max_retries, || self.backend.complete(system, prompt, &model)).await
    }

    /// Streaming call for long narrative generation, with the paragraph
    /// reformatting pipeline spliced in for `story_generation`.
    ///
    /// Returns a fully materialized `Vec<String>` of fragments rather than a
    /// lazy stream at this layer: the reformatter needs the entire
    /// accumulated response before it can decide whether to intervene, and
    /// the Stream Handler (C7) re-chunks the result for its own pacing.
    pub async fn stream_collected(&self, system: &str, prompt: &str, use_case: UseCase) -> Result<String, LlmError> {
        let model = self.model_for(use_case).to_string();
        let full_text = retry_with_backoff(self.max_retries, || async {
            let mut stream = self.backend.stream(system, prompt, &model).await?;
            let mut collected = String::new();
            use futures::StreamExt;
            while let Some(fragment) = stream.next().await {
                collected.push_str(&fragment?);
            }
            Ok(collected)
        })
        .await?;

        if use_case == UseCase::StoryGeneration && needs_reformatting(&full_text) {
            match self.reformat_text_with_paragraphs(&full_text).await {
                Ok(reformatted) => Ok(reformatted),
                Err(_) => Ok(full_text),
            }
        } else {
            Ok(full_text)
        }
    }

    /// Reformat narrative text into paragraphs, retrying up to three times
    /// with progressively stronger instructions. Always receives the
    /// entire accumulated response, never just the initial detection buffer.
    async fn reformat_text_with_paragraphs(&self, full_text: &str) -> Result<String, LlmError> {
        let escalations = [
            "Reformat the following text into well-separated paragraphs, inserting a blank line between each paragraph. Preserve every word exactly.",
            "The previous reformatting did not add paragraph breaks. You MUST insert a blank line (double newline) between distinct paragraphs. Preserve every word exactly, changing only whitespace.",
            "This is critical: insert double-newline paragraph breaks roughly every 3-5 sentences or at natural scene shifts. Do not summarize, do not omit any sentence.",
        ];
        let model = self.utility_model.clone();
        for (attempt, instruction) in escalations.iter().enumerate() {
            let prompt = format!("{instruction}\n\n{full_text}");
            match retry_with_backoff(self.max_retries, || self.backend.complete("", &prompt, &model)).await {
                Ok(reformatted) if reformatted.contains("\n\n") => return Ok(reformatted),
                Ok(_) if attempt + 1 == escalations.len() => {
                    return Err(LlmError::MalformedResponse("reformatter never produced paragraph breaks".to_string()));
                }
                Ok(_) => continue,
                Err(e) if attempt + 1 == escalations.len() => return Err(e),
                Err(_) => continue,
            }
        }
        Err(LlmError::MalformedResponse("reformatting exhausted all retries".to_string()))
    }
}

/// Heuristic detector for narrative that needs paragraph reformatting
/// missing double-newlines, too many sentences in one block, or a
/// dialogue-density that suggests unbroken back-and-forth.
fn needs_reformatting(text: &str) -> bool {
    let sample: String = text.chars().take(1000).collect();
    let has_double_newline = sample.contains("\n\n");
    if has_double_newline {
        return false;
    }
    let sentence_count = sample.matches(|c: char| c == '.' || c == '!' || c == '?').count();
    let dialogue_marks = sample.matches('"').count();
    let dialogue_density = dialogue_marks as f64 / sample.len().max(1) as f64;
    sentence_count >= 8 || dialogue_density > 0.02
}

/// Exponential backoff retry, up to `max_retries` attempts, starting at
/// 1000ms and doubling. Retries on "overloaded"-style transient errors.
async fn retry_with_backoff<T, F, Fut>(max_retries: u32, mut f: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, LlmError>>,
{
    let mut delay = Duration::from_millis(1000);
    let mut last_err = None;
    for attempt in 0..max_retries.max(1) {
        match f().await {
            Ok(value) => return Ok(value),
            Err(LlmError::Permanent(msg)) => return Err(LlmError::Permanent(msg)),
            Err(e) => {
                last_err = Some(e);
                if attempt + 1 < max_retries {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| LlmError::Transient("retries exhausted".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_reformatting_flags_dense_dialogue_without_breaks() {
        let text = "\"Hello,\" she said. \"Are you coming?\" he asked. \"Yes,\" she replied. \"Good,\" he said. \"Let's go,\" she added. \"Right now,\" he insisted. \"Fine,\" she sighed. \"Thanks,\" he said.".repeat(2);
        assert!(needs_reformatting(&text));
    }

    #[test]
    fn needs_reformatting_is_false_when_paragraphs_already_present() {
        let text = "First paragraph with some sentences. More words here.\n\nSecond paragraph continues the story further.";
        assert!(!needs_reformatting(text));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_with_backoff_stops_immediately_on_permanent_error() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let calls = AtomicU32::new(0);
        let result: Result<(), LlmError> = retry_with_backoff(5, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::Permanent("nope".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_with_backoff_succeeds_after_transient_failures() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(5, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(LlmError::Transient("overloaded".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
