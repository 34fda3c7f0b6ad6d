use thiserror::Error;

/// Errors surfaced by the Prompt Builder (C3).
#[derive(Error, Debug)]
pub enum PromptError {
    #[error("missing required variable '{0}' for prompt template '{1}'")]
    MissingVariable(String, String),

    #[error("chapter {0} has no lesson question loaded")]
    MissingQuestion(usize),

    #[error("chapter {0} has no recorded response to build consequence fragment from")]
    MissingResponse(usize),
}

/// Errors surfaced by the LLM Gateway (C4).
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("permanent provider error: {0}")]
    Permanent(String),

    #[error("request to provider timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("provider returned an unparsable response: {0}")]
    MalformedResponse(String),
}

/// Errors surfaced by the Image Prompt Synthesizer (C5).
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("image generation failed: {0}")]
    Generation(String),

    #[error("image request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("image endpoint returned no usable payload")]
    EmptyPayload,
}

/// Errors surfaced by the State Store Adapter (C8).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("no state found for id {0}")]
    NotFound(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// A problem encountered while reconstructing state from a stored snapshot.
/// Never fatal: the reconstruction falls back to a safe default and keeps going.
#[derive(Error, Debug, Clone)]
#[error("state reconstruction warning: {0}")]
pub struct StateReconstructionWarning(pub String);

/// Malformed or out-of-protocol client message.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed client message: {0}")]
    Malformed(String),

    #[error("unexpected message for current adventure phase: {0}")]
    UnexpectedMessage(String),
}

/// Crate-wide error used at the Session Coordinator boundary (C9), where
/// every component's failure needs to collapse into one `error` message.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// The `kind` field used in the outbound `error{kind, message}` message.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Prompt(_) => "prompt",
            EngineError::Llm(_) => "llm",
            EngineError::Image(_) => "image",
            EngineError::Store(_) => "store",
            EngineError::Protocol(_) => "protocol",
            EngineError::Config(_) => "config",
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
