use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::extractors::AudioFormat;
use crate::storage::{self, ObjectStore, StorageError, StorageObject};
use crate::IngestError;

pub mod aws;
pub mod processor;

pub use aws::AwsTranscriber;

/// Transcription result with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    /// The transcribed text
    pub transcript: String,

    /// Segments with timestamps (if available)
    pub segments: Vec<TranscriptSegment>,

    /// Word-level timestamps
    pub words: Vec<WordTimestamp>,

    /// Transcription metadata
    pub metadata: TranscriptionMetadata,
}

/// Individual transcript segment with timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start time in seconds
    pub start_time: f64,

    /// End time in seconds
    pub end_time: f64,

    /// Segment text
    pub text: String,

    /// Confidence score (0.0 to 1.0)
    pub confidence: Option<f64>,

    /// Speaker ID (if speaker identification is enabled)
    pub speaker_id: Option<String>,
}

/// A single recognized word
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTimestamp {
    pub word: String,
    pub start_time: f64,
    pub end_time: f64,
    pub confidence: Option<f64>,
    pub speaker_id: Option<String>,
}

/// Metadata about the transcription process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionMetadata {
    /// Engine job ID
    pub job_id: String,

    /// Language detected/used
    pub language: String,

    /// URI of the transcribed audio artifact
    pub audio_uri: String,

    /// Processing time in seconds
    pub processing_duration: Option<f64>,

    /// Audio duration in seconds
    pub audio_duration: Option<f64>,

    /// Overall confidence score
    pub confidence: Option<f64>,

    /// Timestamp when transcription completed
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

/// Audio fetched from storage, ready to be transcribed
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    pub object: StorageObject,
    pub format: Option<AudioFormat>,
    pub data: Bytes,
}

/// Speech-to-text engine.
///
/// `audio.data` is advisory for batch engines that read straight from storage (AWS Transcribe
/// only uses `audio.object`). `TranscriptionService` has already checked it is non-empty, so an
/// engine never sees a missing or empty artifact.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &AudioArtifact) -> crate::Result<TranscriptionResult>;
}

/// Fetch-then-transcribe access to stored audio artifacts
#[derive(Clone)]
pub struct TranscriptionService {
    storage: Arc<dyn ObjectStore>,
    transcriber: Arc<dyn Transcriber>,
    staging_dir: Option<PathBuf>,
}

impl TranscriptionService {
    pub fn new(storage: Arc<dyn ObjectStore>, transcriber: Arc<dyn Transcriber>) -> Self {
        Self {
            storage,
            transcriber,
            staging_dir: None,
        }
    }

    /// Stage fetched artifacts in `dir` instead of the system temp directory
    pub fn with_staging_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.staging_dir = dir;
        self
    }

    /// Download a stored artifact through a temporary file and load it into memory
    pub async fn fetch_artifact(&self, bucket: &str, key: &str) -> Result<AudioArtifact, IngestError> {
        let staged = self.staging_file()?;

        self.storage
            .download_to(bucket, key, staged.path())
            .await
            .map_err(|e| match e {
                StorageError::NotFound(key) => IngestError::Fetch(format!("object does not exist: {}", key)),
                other => IngestError::Fetch(other.to_string()),
            })?;

        let data = tokio::fs::read(staged.path())
            .await
            .map_err(|e| IngestError::Fetch(format!("failed to read staged artifact: {}", e)))?;

        tracing::debug!(key = %key, size_bytes = data.len(), "Fetched audio artifact");

        Ok(AudioArtifact {
            object: StorageObject::new(bucket, key),
            format: extension_of(key).and_then(AudioFormat::from_extension),
            data: Bytes::from(data),
        })
    }

    /// Transcribe an already fetched artifact
    pub async fn transcribe(&self, audio: &AudioArtifact) -> Result<TranscriptionResult, IngestError> {
        if audio.data.is_empty() {
            return Err(IngestError::Transcription(format!("{} is empty", audio.object.uri)));
        }

        self.transcriber
            .transcribe(audio)
            .await
            .map_err(|e| IngestError::Transcription(format!("{:#}", e)))
    }

    /// Fetch and transcribe an object of the configured bucket
    pub async fn transcribe_object(&self, object: &StorageObject) -> Result<TranscriptionResult, IngestError> {
        let artifact = self.fetch_artifact(&object.bucket, &object.key).await?;
        self.transcribe(&artifact).await
    }

    /// Transcribe a previously produced audio artifact given its `scheme://bucket/key` URI
    pub async fn transcribe_uri(&self, audio_uri: &str) -> Result<TranscriptionResult, IngestError> {
        let (bucket, key) = storage::parse_uri(audio_uri)
            .map_err(|e| IngestError::Validation(e.to_string()))?;

        let artifact = self.fetch_artifact(&bucket, &key).await?;
        self.transcribe(&artifact).await
    }

    fn staging_file(&self) -> Result<tempfile::NamedTempFile, IngestError> {
        let staged = match &self.staging_dir {
            Some(dir) => {
                fs_err::create_dir_all(dir)
                    .map_err(|e| IngestError::Fetch(e.to_string()))?;
                tempfile::Builder::new().prefix("artifact_").tempfile_in(dir)
            }
            None => tempfile::Builder::new().prefix("artifact_").tempfile(),
        };

        staged.map_err(|e| IngestError::Fetch(format!("failed to create staging file: {}", e)))
    }
}

fn extension_of(key: &str) -> Option<&str> {
    Path::new(key).extension().and_then(|ext| ext.to_str())
}
