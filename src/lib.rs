//! Media Ingest - An HTTP service that archives media from various platforms
//!
//! This library resolves a video URL, streams the combined and audio-only renditions into
//! S3-compatible object storage, and optionally transcribes the stored audio using AWS
//! Transcribe.

pub mod api;
pub mod cli;
pub mod config;
pub mod extractors;
pub mod orchestrator;
pub mod storage;
pub mod transcribe;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use extractors::{MediaExtractor, MediaMetadata, QualityTier};
pub use orchestrator::{DownloadOrchestrator, DownloadRequest, DownloadResponse};
pub use storage::{ObjectStore, StorageObject};
pub use transcribe::{TranscriptionResult, TranscriptionService, Transcriber};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Failures of a single download or transcription request.
///
/// Every variant collapses to the same generic HTTP response; the variant only matters for
/// server-side logs and the `x-error-code` header.
#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Media extraction failed: {0}")]
    Extraction(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Failed to fetch stored artifact: {0}")]
    Fetch(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),
}

impl IngestError {
    /// Stable machine-readable code for this failure
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::Validation(_) => "validation_error",
            IngestError::Extraction(_) => "extraction_error",
            IngestError::Upload(_) => "upload_error",
            IngestError::Fetch(_) => "fetch_error",
            IngestError::Transcription(_) => "transcription_error",
        }
    }
}
