use std::time::Duration;

/// Environment tag carried through to the persisted state shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

/// Which LLM provider backs a given tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProviderKind {
    Anthropic,
    OpenAi,
    Ollama,
}

fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_u64_env_or_default(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Top-level engine configuration, loaded once at process start.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub environment: Environment,
    pub llm_provider: LlmProviderKind,
    pub reasoning_model: String,
    pub utility_model: String,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub ollama_host: String,
    pub image_api_key: Option<String>,
    pub image_endpoint: String,
    pub database_url: Option<String>,
    pub standard_llm_timeout: Duration,
    pub conclusion_stream_timeout: Duration,
    pub summary_drain_timeout: Duration,
    pub image_call_timeout: Duration,
    pub max_retries: u32,
    pub word_pace: Duration,
    pub story_length: usize,
}

impl EngineConfig {
    /// Load configuration from environment variables, loading a `.env` file first
    /// if present (ignoring the "file not found" case since production deploys
    /// rarely ship one).
    pub fn from_env() -> crate::error::Result<Self> {
        let _ = dotenvy::dotenv();

        let environment = match get_env_or_default("ENVIRONMENT", "development").as_str() {
            "production" => Environment::Production,
            _ => Environment::Development,
        };

        let llm_provider = match get_env_or_default("LLM_PROVIDER", "anthropic").as_str() {
            "openai" => LlmProviderKind::OpenAi,
            "ollama" => LlmProviderKind::Ollama,
            _ => LlmProviderKind::Anthropic,
        };

        let anthropic_api_key = std::env::var("ANTHROPIC_API_KEY").ok();
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();

        match llm_provider {
            LlmProviderKind::Anthropic if anthropic_api_key.is_none() => {
                return Err(crate::error::EngineError::Config(
                    "ANTHROPIC_API_KEY is required when LLM_PROVIDER=anthropic".to_string(),
                ));
            }
            LlmProviderKind::OpenAi if openai_api_key.is_none() => {
                return Err(crate::error::EngineError::Config(
                    "OPENAI_API_KEY is required when LLM_PROVIDER=openai".to_string(),
                ));
            }
            _ => {}
        }

        let (default_reasoning, default_utility) = match llm_provider {
            LlmProviderKind::Anthropic => ("claude-opus-4", "claude-haiku-4"),
            LlmProviderKind::OpenAi => ("gpt-4o", "gpt-4o-mini"),
            LlmProviderKind::Ollama => ("llama3.1:70b", "llama3.1:8b"),
        };

        Ok(EngineConfig {
            environment,
            llm_provider,
            reasoning_model: get_env_or_default("REASONING_MODEL", default_reasoning),
            utility_model: get_env_or_default("UTILITY_MODEL", default_utility),
            anthropic_api_key,
            openai_api_key,
            ollama_host: get_env_or_default("OLLAMA_HOST", "http://localhost:11434"),
            image_api_key: std::env::var("IMAGE_API_KEY").ok(),
            image_endpoint: get_env_or_default(
                "IMAGE_ENDPOINT",
                "https://api.openai.com/v1/images/generations",
            ),
            database_url: std::env::var("DATABASE_URL").ok(),
            standard_llm_timeout: Duration::from_secs(parse_u64_env_or_default(
                "LLM_TIMEOUT_SECS",
                30,
            )),
            conclusion_stream_timeout: Duration::from_secs(parse_u64_env_or_default(
                "CONCLUSION_TIMEOUT_SECS",
                60,
            )),
            summary_drain_timeout: Duration::from_secs(parse_u64_env_or_default(
                "SUMMARY_DRAIN_TIMEOUT_SECS",
                60,
            )),
            image_call_timeout: Duration::from_secs(parse_u64_env_or_default(
                "IMAGE_TIMEOUT_SECS",
                30,
            )),
            max_retries: parse_u64_env_or_default("MAX_RETRIES", 5) as u32,
            word_pace: Duration::from_millis(parse_u64_env_or_default("WORD_PACE_MS", 20)),
            story_length: parse_u64_env_or_default("STORY_LENGTH", 10) as usize,
        })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            environment: Environment::Development,
            llm_provider: LlmProviderKind::Anthropic,
            reasoning_model: "claude-opus-4".to_string(),
            utility_model: "claude-haiku-4".to_string(),
            anthropic_api_key: None,
            openai_api_key: None,
            ollama_host: "http://localhost:11434".to_string(),
            image_api_key: None,
            image_endpoint: "https://api.openai.com/v1/images/generations".to_string(),
            database_url: None,
            standard_llm_timeout: Duration::from_secs(30),
            conclusion_stream_timeout: Duration::from_secs(60),
            summary_drain_timeout: Duration::from_secs(60),
            image_call_timeout: Duration::from_secs(30),
            max_retries: 5,
            word_pace: Duration::from_millis(20),
            story_length: 10,
        }
    }
}
