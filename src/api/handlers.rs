use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use super::ApiState;
use crate::orchestrator::{DownloadRequest, DownloadResponse};
use crate::transcribe::TranscriptionResult;
use crate::IngestError;

/// Body of `POST /transcribe`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscribeRequest {
    #[serde(rename = "audioURI")]
    pub audio_uri: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn download(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::download(IngestError::Validation(e.body_text())))?;

    state
        .orchestrator
        .handle_download(request)
        .await
        .map(Json)
        .map_err(ApiError::download)
}

pub async fn transcribe(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<TranscribeRequest>, JsonRejection>,
) -> Result<Json<TranscriptionResult>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::transcribe(IngestError::Validation(e.body_text())))?;

    let audio_uri = request
        .audio_uri
        .as_deref()
        .map(str::trim)
        .filter(|uri| !uri.is_empty())
        .ok_or_else(|| ApiError::transcribe(IngestError::Validation("audioURI is required".to_string())))?;

    let service = state.orchestrator.transcription().ok_or_else(|| {
        ApiError::transcribe(IngestError::Transcription("transcription is not configured".to_string()))
    })?;

    service
        .transcribe_uri(audio_uri)
        .await
        .map(Json)
        .map_err(ApiError::transcribe)
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
