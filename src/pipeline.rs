use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    error::GenerationError,
    gemini::{ContentRequest, GenerationConfig, GenerativeBackend},
    image_lookup::ImageLookup,
    resolver,
};

pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(15);
pub const MAX_MODEL_ATTEMPTS: usize = 3;

pub const PROGRESS_STARTED: &str = "Generating..";
pub const PROGRESS_NO_MODEL: &str = "No working model found";
pub const PROGRESS_RESOLVING_IMAGE: &str = "Generating image from description...";
pub const PROGRESS_DONE: &str = "Image generated successfully!";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub image_url: String,
    pub description: String,
    pub model_used: String,
    pub success: bool,
}

/// A trimmed prompt with at least one non-whitespace character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt(String);

impl Prompt {
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub fn build_instruction(prompt: &str) -> String {
    format!(
        "Create a detailed visual description for an image about: \"{prompt}\". Return only the descriptive text. Make it creative and visual."
    )
}

/// Prompt -> model description -> stock-photo lookup URL.
#[derive(Clone, Debug)]
pub struct ImagePipeline<B> {
    backend: B,
    lookup: ImageLookup,
    config: GenerationConfig,
    timeout: Duration,
    max_attempts: usize,
}

impl<B: GenerativeBackend> ImagePipeline<B> {
    pub fn new(backend: B, lookup: ImageLookup) -> Self {
        Self {
            backend,
            lookup,
            config: GenerationConfig::default(),
            timeout: DEFAULT_GENERATION_TIMEOUT,
            max_attempts: MAX_MODEL_ATTEMPTS,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn lookup(&self) -> &ImageLookup {
        &self.lookup
    }

    /// Runs the whole generation. `on_progress` receives status lines in the
    /// order the steps happen. Candidate models are tried in priority order and
    /// the error of the last attempt is returned when none succeeds.
    pub async fn generate<F>(
        &self,
        prompt: &Prompt,
        mut on_progress: F,
    ) -> Result<GenerationResult, GenerationError>
    where
        F: FnMut(&str),
    {
        let prompt = prompt.as_str();
        on_progress(PROGRESS_STARTED);
        let candidates = resolver::resolve_candidates(&self.backend, self.max_attempts).await;
        if candidates.is_empty() {
            on_progress(PROGRESS_NO_MODEL);
            return Err(GenerationError::NoWorkingModel);
        }

        let request = ContentRequest {
            instruction: build_instruction(prompt),
            config: self.config,
            timeout: Some(self.timeout),
        };

        let mut last_error = GenerationError::NoWorkingModel;
        for (index, model) in candidates.iter().enumerate() {
            if index > 0 {
                on_progress(&format!(
                    "Model {} failed, trying {}..",
                    candidates[index - 1].name, model.name
                ));
            }
            info!(model = %model.name, "requesting description");
            match self.describe(&model.name, &request).await {
                Ok(description) => {
                    on_progress(PROGRESS_RESOLVING_IMAGE);
                    let image_url = self.lookup.lookup_url(prompt);
                    on_progress(PROGRESS_DONE);
                    return Ok(GenerationResult {
                        image_url,
                        description,
                        model_used: model.name.clone(),
                        success: true,
                    });
                }
                Err(err) => {
                    warn!(model = %model.name, error = %err, "description request failed");
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }

    async fn describe(
        &self,
        model: &str,
        request: &ContentRequest,
    ) -> Result<String, GenerationError> {
        let response = self.backend.generate_content(model, request).await?;
        response
            .first_text()
            .ok_or(GenerationError::NoDescriptionGenerated)
    }
}
