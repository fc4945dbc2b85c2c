use thiserror::Error;

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("IO error occurred: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid model configuration: {0}")]
    ConfigurationError(String),

    #[error("Tokenization error: {0}")]
    TokenizationError(String),

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Failed to load {0}")]
    LoadError(String),

    #[error("HuggingFace Hub error: {0}")]
    HuggingFaceAPIError(#[from] hf_hub::api::sync::ApiError),
}

impl LLMError {
    /// A role or control token that cannot be resolved to an id.
    pub fn token_not_found(token: &str) -> Self {
        LLMError::ConfigurationError(format!(
            "token {token:?} not found in vocab or special tokens"
        ))
    }
}
