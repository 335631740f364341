use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;
use tracing::{error, info, warn};
use url::Url;

use crate::{
    error::GenerationError,
    gemini::{GeminiClient, GenerativeBackend, ModelDescriptor, ModelListing},
    image_lookup::fallback_description,
    image_processing,
    pipeline::{GenerationResult, ImagePipeline, Prompt},
    resolver,
    scoring::{self, UPLOADED_IMAGE_PROMPT, ViralityScore},
    store::{
        ImageRegistry, KeyValueStore, LocalFileStorage, UPLOADS_PREFIX, digest_parts,
        get_extension_from_mime_type,
    },
};

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
const FALLBACK_MODEL: &str = "fallback";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ImagePipeline<GeminiClient>>,
    pub registry: Arc<ImageRegistry<LocalFileStorage>>,
}

pub fn build_router(state: AppState) -> Router {
    let uploads_dir = state.registry.storage().base_dir().join(UPLOADS_PREFIX);
    Router::new()
        .route("/api/generate-image", post(generate_image))
        .route("/api/score", post(score_image))
        .route("/api/images", get(list_images).post(save_image))
        .route("/api/images/{id}", get(get_image))
        .route(
            "/api/upload",
            post(upload_image).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/uploads", get(list_uploads))
        .route("/api/models", get(list_models))
        .nest_service("/cache/uploads", ServeDir::new(uploads_dir))
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorResponse { error: message.to_string() })).into_response()
}

#[derive(Debug, Default, Deserialize)]
struct GenerateImageRequest {
    #[serde(default)]
    prompt: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateImageResponse {
    #[serde(flatten)]
    result: GenerationResult,
    progress: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FallbackImage {
    image_url: String,
    description: String,
    model_used: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationFailure {
    success: bool,
    error: &'static str,
    message: String,
    retryable: bool,
    fallback: FallbackImage,
    progress: Vec<String>,
}

fn failure_status(err: &GenerationError) -> StatusCode {
    match err {
        GenerationError::ModelOverloaded | GenerationError::NoWorkingModel => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        GenerationError::NoDescriptionGenerated
        | GenerationError::ApiError(_)
        | GenerationError::GenerationFailed => StatusCode::BAD_GATEWAY,
    }
}

async fn generate_image(
    State(state): State<AppState>,
    payload: Result<Json<GenerateImageRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection, "rejected generate-image body");
            return json_error(StatusCode::BAD_REQUEST, "Prompt is required");
        }
    };
    let Some(prompt) = request.prompt.as_deref().and_then(Prompt::new) else {
        return json_error(StatusCode::BAD_REQUEST, "Prompt is required");
    };

    let mut progress = Vec::new();
    let outcome = state
        .pipeline
        .generate(&prompt, |message| progress.push(message.to_string()))
        .await;

    match outcome {
        Ok(result) => {
            info!(model = %result.model_used, "image generated");
            (StatusCode::OK, Json(GenerateImageResponse { result, progress })).into_response()
        }
        Err(err) => {
            warn!(error = %err, "image generation failed");
            let fallback = FallbackImage {
                image_url: state.pipeline.lookup().fallback_url(prompt.as_str()),
                description: fallback_description(prompt.as_str()),
                model_used: FALLBACK_MODEL,
            };
            let body = GenerationFailure {
                success: false,
                error: err.code(),
                message: err.user_message(),
                retryable: err.is_retryable(),
                fallback,
                progress,
            };
            (failure_status(&err), Json(body)).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScoreRequest {
    #[serde(default)]
    image_url: String,
    #[serde(default)]
    prompt: String,
    #[serde(default = "default_ai_generated")]
    ai_generated: bool,
}

fn default_ai_generated() -> bool {
    true
}

async fn score_image(Json(request): Json<ScoreRequest>) -> Json<ViralityScore> {
    Json(scoring::virality_score(
        &request.image_url,
        &request.prompt,
        request.ai_generated,
    ))
}

#[derive(Debug, Deserialize)]
struct SaveImageRequest {
    #[serde(default)]
    url: String,
}

#[derive(Serialize)]
struct SaveImageResponse {
    id: String,
}

/// Accepts http(s) links plus the `blob:` and `data:image/` references a
/// browser produces for local files.
fn is_storable_image_url(raw: &str) -> bool {
    if raw.starts_with("data:image/") {
        return true;
    }
    match Url::parse(raw) {
        Ok(url) => matches!(url.scheme(), "http" | "https" | "blob"),
        Err(_) => false,
    }
}

async fn save_image(
    State(state): State<AppState>,
    Json(request): Json<SaveImageRequest>,
) -> Response {
    let url = request.url.trim();
    if url.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "url is required");
    }
    if !is_storable_image_url(url) {
        return json_error(StatusCode::BAD_REQUEST, "unsupported image url");
    }
    match state.registry.save_uploaded_image(url).await {
        Ok(id) => (StatusCode::CREATED, Json(SaveImageResponse { id })).into_response(),
        Err(err) => {
            error!(error = %err, "saving image record failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to save image")
        }
    }
}

async fn list_images(State(state): State<AppState>) -> Response {
    match state.registry.list_images().await {
        Ok(records) => Json(records).into_response(),
        Err(err) => {
            error!(error = %err, "listing image records failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to list images")
        }
    }
}

async fn get_image(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.registry.get_image(&id).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => json_error(StatusCode::NOT_FOUND, "image not found"),
        Err(err) => {
            error!(error = %err, "reading image record failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to read image")
        }
    }
}

#[derive(Serialize)]
struct UploadResponse {
    url: String,
    key: String,
    id: String,
    width: u32,
    height: u32,
    score: ViralityScore,
}

async fn upload_image(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut file_name = None;
    let mut bytes = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() == Some("file") {
                    file_name = Some(field.file_name().unwrap_or("").to_string());
                    match field.bytes().await {
                        Ok(data) => bytes = Some(data),
                        Err(err) => {
                            return json_error(
                                StatusCode::BAD_REQUEST,
                                &format!("failed to read file: {err}"),
                            );
                        }
                    }
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                return json_error(
                    StatusCode::BAD_REQUEST,
                    &format!("failed to read form: {err}"),
                );
            }
        }
    }

    let (Some(file_name), Some(bytes)) = (file_name, bytes) else {
        return json_error(StatusCode::BAD_REQUEST, "no file uploaded");
    };
    if bytes.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "uploaded file is empty");
    }
    let probe = match image_processing::probe_image(&bytes) {
        Ok(probe) => probe,
        Err(err) => {
            warn!(file_name = %file_name, error = %err, "rejected upload");
            return json_error(StatusCode::BAD_REQUEST, "file is not a supported image");
        }
    };

    let hash = digest_parts(&[&bytes[..]]);
    let ext = get_extension_from_mime_type(probe.mime_type);
    let key = format!("{UPLOADS_PREFIX}{hash}.{ext}");
    let storage = state.registry.storage();
    if let Err(err) = storage.put(&key, &bytes).await {
        error!(error = %err, "storing upload failed");
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to save file");
    }
    let url = storage.get_public_url(&key);
    let id = match state.registry.save_uploaded_image(&url).await {
        Ok(id) => id,
        Err(err) => {
            error!(error = %err, "saving upload record failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to save image");
        }
    };
    let score = scoring::virality_score(&url, UPLOADED_IMAGE_PROMPT, false);
    info!(key = %key, width = probe.width, height = probe.height, "stored upload");

    (
        StatusCode::OK,
        Json(UploadResponse {
            url,
            key,
            id,
            width: probe.width,
            height: probe.height,
            score,
        }),
    )
        .into_response()
}

#[derive(Serialize)]
struct UploadEntry {
    key: String,
    url: String,
}

async fn list_uploads(State(state): State<AppState>) -> Response {
    let storage = state.registry.storage();
    match storage.list(UPLOADS_PREFIX).await {
        Ok(keys) => {
            let entries: Vec<UploadEntry> = keys
                .into_iter()
                .map(|key| UploadEntry {
                    url: storage.get_public_url(&key),
                    key,
                })
                .collect();
            Json(entries).into_response()
        }
        Err(err) => {
            error!(error = %err, "listing uploads failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to list uploads")
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ModelsResponse {
    available: bool,
    models: Vec<ModelDescriptor>,
    selected: Option<ModelDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let listing = state.pipeline.backend().list_models().await;
    let selected = resolver::select_model(listing.models());
    let available = listing.is_available();
    let (models, reason) = match listing {
        ModelListing::Available(models) => (models, None),
        ModelListing::Unavailable { reason } => (Vec::new(), Some(reason)),
    };
    Json(ModelsResponse {
        available,
        models,
        selected,
        reason,
    })
}
