use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use leafid_core::{CaptureSource, HistoryEntry, Identification, PlantRecord, ScoredLabel};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, PageError};
use crate::pipeline::{self, ImagePayload};
use crate::server::views::{self, PageContext};
use crate::state::AppState;

// ============================================================================
// Health and metrics
// ============================================================================

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "classifier": state.classifier.name(),
        "labels": state.classifier.labels().len(),
        "history": state.history.is_some(),
    }))
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "Metrics exporter not installed").into_response(),
    }
}

// ============================================================================
// Identification
// ============================================================================

/// JSON body of a successful identification
#[derive(Debug, Serialize, Deserialize)]
pub struct IdentifyResponse {
    pub label: String,
    pub confidence: f32,
    pub top_k: Vec<ScoredLabel>,

    /// Plant details; `null` when the species has no record
    pub info: Option<PlantInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_as: Option<String>,

    pub latency_us: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlantInfo {
    pub scientific_name: String,
    pub uses: String,
    pub precautions: Option<String>,
}

impl From<Identification> for IdentifyResponse {
    fn from(identification: Identification) -> Self {
        let info = identification.plant.record().map(|record| PlantInfo {
            scientific_name: record.scientific_name.clone(),
            uses: record.uses.clone(),
            precautions: record.precautions.clone(),
        });
        let prediction = identification.prediction;
        Self {
            label: prediction.label,
            confidence: prediction.confidence,
            top_k: prediction.top_k,
            info,
            saved_as: identification.saved_as,
            latency_us: prediction.latency_us,
        }
    }
}

/// Pull the `file` field out of a multipart form
async fn read_upload(mut multipart: Multipart, source: CaptureSource) -> Result<ImagePayload, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed form data: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        if filename.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(ApiError::bad_request("No selected file"));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;
        return Ok(ImagePayload::upload(bytes.to_vec(), filename, source));
    }

    Err(ApiError::bad_request("No file part"))
}

pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(views::index_page(&PageContext::from_state(&state)))
}

/// Browser form upload, answered with an HTML page
pub async fn identify_page(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Html<String>, PageError> {
    let payload = read_upload(multipart, CaptureSource::Upload).await?;
    let identification = pipeline::identify(&state, payload).await?;
    Ok(Html(views::result_page(
        &identification,
        &PageContext::from_state(&state),
    )))
}

/// Programmatic multipart upload
pub async fn identify_api(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<IdentifyResponse>, ApiError> {
    let payload = read_upload(multipart, CaptureSource::Api).await?;
    let identification = pipeline::identify(&state, payload).await?;
    Ok(Json(identification.into()))
}

#[derive(Debug, Deserialize)]
pub struct Base64Request {
    /// `data:image/...;base64,` URL or bare base64
    pub image: Option<String>,
}

/// Webcam frame posted as base64
pub async fn identify_base64(
    State(state): State<AppState>,
    payload: Result<Json<Base64Request>, JsonRejection>,
) -> Result<Json<IdentifyResponse>, ApiError> {
    let Json(req) = payload
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e.body_text())))?;
    let image = req
        .image
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("No image provided"))?;
    let bytes = leafid_classifiers::decode_data_url(&image)?;
    let identification = pipeline::identify(&state, ImagePayload::webcam(bytes)).await?;
    Ok(Json(identification.into()))
}

// ============================================================================
// Plant records
// ============================================================================

pub async fn get_plant(
    State(state): State<AppState>,
    Path(label): Path<String>,
) -> Result<Json<PlantRecord>, ApiError> {
    let record = state.plants.lookup(&label)?;
    Ok(Json(record))
}

pub async fn list_plants(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.plants.labels()?))
}

// ============================================================================
// History
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

const MAX_HISTORY_LIMIT: usize = 500;

async fn recent_history(state: &AppState, limit: usize) -> Result<Vec<HistoryEntry>, ApiError> {
    let history = state
        .history
        .clone()
        .ok_or_else(|| ApiError::not_found("Prediction history is disabled"))?;
    let limit = limit.min(MAX_HISTORY_LIMIT);
    let entries = tokio::task::spawn_blocking(move || history.recent(limit))
        .await
        .map_err(|e| leafid_core::Error::internal(format!("history task failed: {}", e)))??;
    Ok(entries)
}

pub async fn history_api(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let limit = query.limit.unwrap_or(state.settings.history_page_size);
    Ok(Json(recent_history(&state, limit).await?))
}

pub async fn history_page(State(state): State<AppState>) -> Result<Html<String>, PageError> {
    let entries = recent_history(&state, state.settings.history_page_size).await?;
    Ok(Html(views::history_page(
        &entries,
        &PageContext::from_state(&state),
    )))
}
