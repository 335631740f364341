use thiserror::Error;

/// Failure of a single call against the generative-language API.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Non-success HTTP status. `code` and `message` come from the
    /// `{"error": {...}}` body when the API sent one.
    #[error(
        "upstream returned HTTP {status}: {}",
        .message.as_deref().unwrap_or("no error message")
    )]
    Status {
        status: u16,
        code: Option<i64>,
        message: Option<String>,
    },

    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream transport error: {0}")]
    Transport(String),

    #[error("invalid upstream payload: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else if err.is_decode() {
            UpstreamError::Decode(err.to_string())
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

/// Typed failures of the description-to-image pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("NO_WORKING_MODEL")]
    NoWorkingModel,

    #[error("NO_DESCRIPTION_GENERATED")]
    NoDescriptionGenerated,

    #[error("MODEL_OVERLOADED")]
    ModelOverloaded,

    #[error("API_ERROR: {0}")]
    ApiError(String),

    #[error("GENERATION_FAILED")]
    GenerationFailed,
}

impl GenerationError {
    pub fn code(&self) -> &'static str {
        match self {
            GenerationError::NoWorkingModel => "NO_WORKING_MODEL",
            GenerationError::NoDescriptionGenerated => "NO_DESCRIPTION_GENERATED",
            GenerationError::ModelOverloaded => "MODEL_OVERLOADED",
            GenerationError::ApiError(_) => "API_ERROR",
            GenerationError::GenerationFailed => "GENERATION_FAILED",
        }
    }

    /// Message shown to the person who asked for the image.
    pub fn user_message(&self) -> String {
        match self {
            GenerationError::NoWorkingModel => {
                "No working AI models available. Please try again later.".to_string()
            }
            GenerationError::NoDescriptionGenerated => {
                "AI failed to generate image description. Please try again.".to_string()
            }
            GenerationError::ModelOverloaded => {
                "AI model is currently overloaded. Please try again later.".to_string()
            }
            GenerationError::ApiError(detail) => format!("AI service error: {detail}"),
            GenerationError::GenerationFailed => {
                "Failed to generate image. Please try again.".to_string()
            }
        }
    }

    /// Every failure can be retried by the user; none is fatal.
    pub fn is_retryable(&self) -> bool {
        true
    }
}

impl From<UpstreamError> for GenerationError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Status {
                status,
                code,
                message,
            } => {
                if code == Some(503) || status == 503 {
                    GenerationError::ModelOverloaded
                } else if let Some(message) = message.filter(|value| !value.trim().is_empty()) {
                    GenerationError::ApiError(message)
                } else {
                    GenerationError::GenerationFailed
                }
            }
            UpstreamError::Timeout | UpstreamError::Transport(_) | UpstreamError::Decode(_) => {
                GenerationError::GenerationFailed
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
