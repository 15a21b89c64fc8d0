//! Request handlers for the extraction API.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::llm::{LlmClient, LlmConfig};
use crate::models::{ChunkType, Document, FileRef, ProcessingError};
use crate::pipeline::{BatchInput, DispatchError, Dispatcher};

use super::AppState;

/// Request parameters sent alongside the uploads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessParams {
    #[serde(default)]
    pub text_model: Option<String>,
    #[serde(default)]
    pub vision_model: Option<String>,
    /// Default document language; "en" or "de".
    #[serde(default)]
    pub lang: Option<String>,
    /// When false, thumbnails and figure/visual payloads are nulled.
    #[serde(default)]
    pub return_images: bool,
    /// Per-file overrides keyed by uploaded filename.
    #[serde(default)]
    pub perfile_settings: HashMap<String, PerFileSettings>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PerFileSettings {
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub extra_metainfo: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct ProcessResults {
    pub extracted: Vec<Document>,
    pub errors: Vec<ProcessingError>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

type ApiResult = Result<Json<ProcessResults>, (StatusCode, Json<ApiError>)>;

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError {
            error: message.into(),
        }),
    )
}

fn internal(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError {
            error: message.into(),
        }),
    )
}

fn validate_params(params: &ProcessParams, filenames: &[String]) -> Result<(), String> {
    if let Some(lang) = &params.lang {
        if lang != "en" && lang != "de" {
            return Err(format!("unsupported lang '{lang}', expected 'en' or 'de'"));
        }
    }
    for name in params.perfile_settings.keys() {
        if !filenames.iter().any(|f| f == name) {
            return Err(format!(
                "perfile_settings references unknown file '{name}'"
            ));
        }
    }
    Ok(())
}

fn build_dispatcher(
    state: &AppState,
    params: &ProcessParams,
) -> Result<Dispatcher, (StatusCode, Json<ApiError>)> {
    let settings = &state.settings;
    let model = |name: &Option<String>, default: &str| -> Result<Arc<LlmClient>, String> {
        let model_name = name.clone().unwrap_or_else(|| default.to_string());
        let config = LlmConfig::new(settings.llm_base_url.clone(), model_name)
            .with_api_key(settings.llm_api_key.clone());
        LlmClient::new(config).map(Arc::new).map_err(|e| e.to_string())
    };

    let text_model = model(&params.text_model, "llama-3.2-3b-preview").map_err(internal)?;
    let vision_model = model(&params.vision_model, "pixtral-12b").map_err(internal)?;
    Dispatcher::new(settings, text_model, vision_model)
        .map_err(|e| internal(format!("dispatcher setup failed: {e}")))
}

fn apply_perfile_settings(inputs: &mut [BatchInput], params: &ProcessParams) {
    for input in inputs.iter_mut() {
        if let Some(overrides) = params.perfile_settings.get(&input.filename) {
            input.language = overrides.lang.clone();
            input.extra_metainfo = overrides.extra_metainfo.clone();
        }
    }
}

/// Null out image payloads unless the caller asked for them.
fn shape_images(results: &mut ProcessResults, return_images: bool) {
    if return_images {
        return;
    }
    for doc in &mut results.extracted {
        doc.metainfo.thumbnail = None;
        for chunk in &mut doc.chunks {
            if matches!(chunk.chunk_type, ChunkType::Figure | ChunkType::VisualPage) {
                chunk.non_embeddable_content = None;
            }
        }
    }
}

async fn run_batch(
    state: &AppState,
    params: ProcessParams,
    inputs: Vec<BatchInput>,
) -> ApiResult {
    let dispatcher = build_dispatcher(state, &params)?;
    let language = params.lang.clone().unwrap_or_else(|| "en".to_string());

    let (extracted, errors) = dispatcher
        .extract_batch(inputs, &language)
        .await
        .map_err(|e| match e {
            DispatchError::DuplicateFilename(_) => bad_request(e.to_string()),
            other => internal(other.to_string()),
        })?;

    let mut results = ProcessResults { extracted, errors };
    shape_images(&mut results, params.return_images);
    Ok(Json(results))
}

/// `POST /process_files_by_stream`: multipart upload processing.
pub async fn process_files_by_stream(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult {
    let mut params: Option<ProcessParams> = None;
    let mut inputs: Vec<BatchInput> = Vec::new();
    let mut filenames: Vec<String> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("malformed multipart body: {e}")))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("params") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("unreadable params field: {e}")))?;
                let parsed: ProcessParams = serde_json::from_str(&raw)
                    .map_err(|e| bad_request(format!("invalid params json: {e}")))?;
                params = Some(parsed);
            }
            Some("pdfs") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| bad_request("file part without a filename"))?;
                if filenames.contains(&filename) {
                    return Err(bad_request(format!(
                        "duplicate filename in request: {filename}"
                    )));
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("unreadable upload {filename}: {e}")))?;
                filenames.push(filename.clone());
                inputs.push(BatchInput::new(filename, FileRef::Memory(bytes.to_vec())));
            }
            other => {
                tracing::debug!(field = ?other, "ignoring unknown multipart field");
            }
        }
    }

    let params = params.unwrap_or_default();
    validate_params(&params, &filenames).map_err(bad_request)?;
    apply_perfile_settings(&mut inputs, &params);
    run_batch(&state, params, inputs).await
}

/// Body of `POST /process_files_by_path`.
#[derive(Debug, Deserialize)]
pub struct ProcessByPathRequest {
    pub pdfs: Vec<String>,
    #[serde(default)]
    pub params: ProcessParams,
}

/// `POST /process_files_by_path`: server-local paths, JSON body.
pub async fn process_files_by_path(
    State(state): State<AppState>,
    Json(request): Json<ProcessByPathRequest>,
) -> ApiResult {
    let filenames: Vec<String> = request.pdfs.clone();
    validate_params(&request.params, &filenames).map_err(bad_request)?;

    let mut inputs: Vec<BatchInput> = request
        .pdfs
        .iter()
        .map(|path| {
            BatchInput::new(path.clone(), FileRef::Path(std::path::PathBuf::from(path)))
        })
        .collect();
    apply_perfile_settings(&mut inputs, &request.params);
    run_batch(&state, request.params, inputs).await
}

/// `GET /health`.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
