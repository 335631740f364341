use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::UpstreamError;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const MODEL_FAMILY_TAG: &str = "gemini";
const GENERATE_CONTENT_METHOD: &str = "generateContent";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub name: String,
    pub display_name: String,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
        }
    }
}

/// Outcome of a catalog listing. A failed listing keeps its reason instead of
/// collapsing into an empty catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelListing {
    Available(Vec<ModelDescriptor>),
    Unavailable { reason: String },
}

impl ModelListing {
    /// Usable models, empty when the listing failed.
    pub fn models(&self) -> &[ModelDescriptor] {
        match self {
            ModelListing::Available(models) => models,
            ModelListing::Unavailable { .. } => &[],
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, ModelListing::Available(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f64,
    pub max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            max_output_tokens: 150,
            top_k: Some(40),
            top_p: Some(0.95),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentRequest {
    pub instruction: String,
    pub config: GenerationConfig,
    pub timeout: Option<Duration>,
}

impl ContentRequest {
    fn body(&self) -> serde_json::Value {
        json!({
            "contents": [
                { "parts": [ { "text": self.instruction } ] }
            ],
            "generationConfig": self.config,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ContentResponse {
    #[serde(default)]
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<Part>>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl ContentResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            candidates: Some(vec![Candidate {
                content: Some(CandidateContent {
                    parts: Some(vec![Part {
                        text: Some(text.into()),
                    }]),
                }),
            }]),
        }
    }

    /// `candidates[0].content.parts[0].text`, trimmed, when non-blank.
    pub fn first_text(&self) -> Option<String> {
        self.candidates
            .as_ref()
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.content.as_ref())
            .and_then(|content| content.parts.as_ref())
            .and_then(|parts| parts.first())
            .and_then(|part| part.text.as_deref())
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    }
}

/// The two calls the pipeline needs from a generative-language backend.
pub trait GenerativeBackend: Send + Sync {
    fn list_models(&self) -> impl Future<Output = ModelListing> + Send;

    fn generate_content(
        &self,
        model: &str,
        request: &ContentRequest,
    ) -> impl Future<Output = Result<ContentResponse, UpstreamError>> + Send;
}

#[derive(Debug, Deserialize)]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<RawModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawModel {
    name: String,
    display_name: Option<String>,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<i64>,
    message: Option<String>,
}

#[derive(Clone, Debug)]
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>, UpstreamError> {
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;
        let response = assert_ok_response(response).await?;
        let payload: ListModelsResponse = response.json().await?;
        Ok(filter_generation_models(payload.models))
    }
}

fn filter_generation_models(models: Vec<RawModel>) -> Vec<ModelDescriptor> {
    models
        .into_iter()
        .filter(|model| {
            model.name.contains(MODEL_FAMILY_TAG)
                && model
                    .supported_generation_methods
                    .iter()
                    .any(|method| method == GENERATE_CONTENT_METHOD)
        })
        .map(|model| {
            let name = model
                .name
                .strip_prefix("models/")
                .unwrap_or(&model.name)
                .to_string();
            let display_name = model.display_name.unwrap_or_else(|| name.clone());
            ModelDescriptor { name, display_name }
        })
        .collect()
}

async fn assert_ok_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, UpstreamError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let body = serde_json::from_str::<ErrorEnvelope>(&text)
        .ok()
        .and_then(|envelope| envelope.error);
    let (code, message) = match body {
        Some(body) => (body.code, body.message),
        None => (None, None),
    };
    Err(UpstreamError::Status {
        status,
        code,
        message,
    })
}

impl GenerativeBackend for GeminiClient {
    async fn list_models(&self) -> ModelListing {
        match self.fetch_models().await {
            Ok(models) => {
                debug!(count = models.len(), "fetched generation models");
                ModelListing::Available(models)
            }
            Err(err) => {
                warn!(error = %err, "model listing failed");
                ModelListing::Unavailable {
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn generate_content(
        &self,
        model: &str,
        request: &ContentRequest,
    ) -> Result<ContentResponse, UpstreamError> {
        let mut builder = self
            .http
            .post(format!("{}/models/{model}:generateContent", self.base_url))
            .query(&[("key", self.api_key.as_str())])
            .json(&request.body());
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        let response = builder.send().await?;
        debug!(model, status = %response.status(), "generateContent response");
        let response = assert_ok_response(response).await?;
        let body = response.bytes().await?;
        // A success body we cannot read carries no usable text.
        let payload = serde_json::from_slice::<ContentResponse>(&body).unwrap_or_else(|err| {
            warn!(model, error = %err, "unreadable generateContent body");
            ContentResponse::default()
        });
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, methods: &[&str]) -> RawModel {
        RawModel {
            name: name.to_string(),
            display_name: None,
            supported_generation_methods: methods.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn keeps_only_gemini_models_that_generate_content() {
        let models = filter_generation_models(vec![
            raw("models/gemini-1.5-flash", &["generateContent", "countTokens"]),
            raw("models/embedding-001", &["embedContent"]),
            raw("models/gemini-embedding", &["embedContent"]),
            raw("models/text-bison-001", &["generateContent"]),
        ]);
        assert_eq!(
            models,
            vec![ModelDescriptor::new("gemini-1.5-flash", "gemini-1.5-flash")]
        );
    }

    #[test]
    fn first_text_requires_non_blank_text() {
        assert_eq!(
            ContentResponse::from_text("  a misty forest  ").first_text().as_deref(),
            Some("a misty forest")
        );
        assert_eq!(ContentResponse::from_text("   ").first_text(), None);
        assert_eq!(ContentResponse::default().first_text(), None);

        let no_parts: ContentResponse =
            serde_json::from_value(json!({"candidates": [{"content": {}}]})).unwrap();
        assert_eq!(no_parts.first_text(), None);
    }

    #[test]
    fn request_body_uses_camel_case_generation_config() {
        let request = ContentRequest {
            instruction: "describe".to_string(),
            config: GenerationConfig {
                temperature: 0.7,
                max_output_tokens: 200,
                top_k: None,
                top_p: None,
            },
            timeout: None,
        };
        let body = request.body();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "describe");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 200);
        assert!(body["generationConfig"].get("topK").is_none());
    }

    #[test]
    fn failed_listing_reads_as_empty() {
        let listing = ModelListing::Unavailable {
            reason: "HTTP 403".to_string(),
        };
        assert!(listing.models().is_empty());
        assert!(!listing.is_available());
    }
}
