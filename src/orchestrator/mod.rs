//! Download orchestration: resolve, fan out two uploads, fan in, optionally transcribe.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub mod keys;

pub use keys::{ArtifactKeys, KeyClock, KeyLayout, MediaReference};

use crate::extractors::{MediaExtractor, QualityTier, VIDEO_MIME_TYPE};
use crate::storage::{ObjectStore, StorageError, StorageObject};
use crate::transcribe::{TranscriptionResult, TranscriptionService};
use crate::utils::extract_domain;
use crate::IngestError;

/// Body of `POST /download`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Source media URL
    pub url: Option<String>,

    /// Override the configured default for transcribing the audio artifact
    pub transcribe: Option<bool>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            transcribe: None,
        }
    }
}

/// Body of a successful `POST /download`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadResponse {
    #[serde(rename = "videoURI")]
    pub video_uri: String,

    #[serde(rename = "audioURI")]
    pub audio_uri: String,

    /// `null` when transcription is skipped or fails
    pub transcript: Option<TranscriptionResult>,
}

/// Why a single upload pipeline did not produce its object
#[derive(Debug)]
enum PipelineError {
    Failed(IngestError),
    /// Stopped because the sibling pipeline failed first
    Cancelled,
}

/// Coordinates extraction, the concurrent dual upload and optional transcription
#[derive(Clone)]
pub struct DownloadOrchestrator {
    extractor: Arc<dyn MediaExtractor>,
    storage: Arc<dyn ObjectStore>,
    transcription: Option<TranscriptionService>,
    transcribe_by_default: bool,
    layout: KeyLayout,
    clock: Arc<KeyClock>,
}

impl DownloadOrchestrator {
    pub fn new(
        extractor: Arc<dyn MediaExtractor>,
        storage: Arc<dyn ObjectStore>,
        layout: KeyLayout,
    ) -> Self {
        Self {
            extractor,
            storage,
            transcription: None,
            transcribe_by_default: false,
            layout,
            clock: Arc::new(KeyClock::system()),
        }
    }

    /// Attach a transcription client; `by_default` decides for requests that don't say
    pub fn with_transcription(mut self, service: TranscriptionService, by_default: bool) -> Self {
        self.transcription = Some(service);
        self.transcribe_by_default = by_default;
        self
    }

    pub fn with_clock(mut self, clock: Arc<KeyClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn transcription(&self) -> Option<&TranscriptionService> {
        self.transcription.as_ref()
    }

    /// Run one download request end to end.
    ///
    /// Either both artifacts end up stored or neither does. The work runs on its own task, so a
    /// caller that stops waiting (client disconnect) cancels the uploads and the cleanup still
    /// completes.
    pub async fn handle_download(&self, request: DownloadRequest) -> Result<DownloadResponse, IngestError> {
        let url = request
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| IngestError::Validation("A media URL is required".to_string()))?
            .to_string();
        let transcribe = request.transcribe.unwrap_or(self.transcribe_by_default);

        let cancel = CancellationToken::new();
        let _abandoned = cancel.clone().drop_guard();

        let orchestrator = self.clone();
        let task = tokio::spawn(async move { orchestrator.download(&url, transcribe, &cancel).await });

        task.await
            .map_err(|e| IngestError::Upload(format!("download task failed: {}", e)))?
    }

    async fn download(
        &self,
        url: &str,
        transcribe: bool,
        cancel: &CancellationToken,
    ) -> Result<DownloadResponse, IngestError> {
        let start = Instant::now();

        let metadata = self
            .extractor
            .resolve_metadata(url)
            .await
            .map_err(|e| IngestError::Extraction(format!("{:#}", e)))?;

        let reference = MediaReference {
            title: metadata.title,
            timestamp: self.clock.next(),
        };
        let keys = self.layout.keys(&reference);

        tracing::info!(
            url = %url,
            domain = extract_domain(url).as_deref().unwrap_or("unknown"),
            platform = %metadata.platform,
            title = %reference.title,
            video_key = %keys.video,
            audio_key = %keys.audio,
            "Starting download"
        );

        let (video, audio) = self.upload_both(url, &keys, cancel).await?;

        let transcript = if transcribe {
            self.try_transcribe(&audio).await
        } else {
            None
        };

        tracing::info!(
            video_uri = %video.uri,
            audio_uri = %audio.uri,
            transcribed = transcript.is_some(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Download complete"
        );

        Ok(DownloadResponse {
            video_uri: video.uri,
            audio_uri: audio.uri,
            transcript,
        })
    }

    /// Run both pipelines concurrently and wait until both have settled
    async fn upload_both(
        &self,
        url: &str,
        keys: &ArtifactKeys,
        request_cancel: &CancellationToken,
    ) -> Result<(StorageObject, StorageObject), IngestError> {
        let cancel = request_cancel.child_token();
        let audio_format = self.layout.audio_format();

        let (video, audio) = tokio::join!(
            self.run_pipeline(url, QualityTier::HighestCombined, &keys.video, VIDEO_MIME_TYPE, &cancel),
            self.run_pipeline(url, QualityTier::HighestAudioOnly, &keys.audio, audio_format.mime_type(), &cancel),
        );

        match (video, audio) {
            (Ok(video), Ok(audio)) => Ok((video, audio)),
            (video, audio) => {
                for stored in [&video, &audio].into_iter().filter_map(|r| r.as_ref().ok()) {
                    self.discard(stored).await;
                }

                let error = [video.err(), audio.err()]
                    .into_iter()
                    .flatten()
                    .find_map(|e| match e {
                        PipelineError::Failed(e) => Some(e),
                        PipelineError::Cancelled => None,
                    })
                    .unwrap_or_else(|| IngestError::Upload("upload cancelled".to_string()));

                tracing::error!(error = %error, code = error.code(), "Download pipelines failed");
                Err(error)
            }
        }
    }

    /// extractor stream -> object store sink for one rendition
    async fn run_pipeline(
        &self,
        url: &str,
        tier: QualityTier,
        key: &str,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<StorageObject, PipelineError> {
        let result = match self.extractor.open_stream(url, tier).await {
            Ok(stream) => self
                .storage
                .put_stream(key, content_type, stream, cancel)
                .await
                .map_err(|e| match e {
                    StorageError::Cancelled => PipelineError::Cancelled,
                    StorageError::Source(msg) => PipelineError::Failed(IngestError::Extraction(msg)),
                    other => PipelineError::Failed(IngestError::Upload(other.to_string())),
                }),
            Err(e) => Err(PipelineError::Failed(IngestError::Extraction(format!("{:#}", e)))),
        };

        match &result {
            Err(PipelineError::Failed(e)) => {
                tracing::warn!(tier = ?tier, key = %key, error = %e, "Pipeline failed, cancelling sibling");
                cancel.cancel();
            }
            Err(PipelineError::Cancelled) => {
                tracing::debug!(tier = ?tier, key = %key, "Pipeline cancelled");
            }
            Ok(_) => {}
        }

        result
    }

    /// Compensating delete for an artifact whose sibling failed
    async fn discard(&self, object: &StorageObject) {
        match self.storage.delete(&object.key).await {
            Ok(()) => tracing::info!(uri = %object.uri, "Removed orphaned artifact"),
            Err(e) => tracing::warn!(uri = %object.uri, error = %e, "Failed to remove orphaned artifact"),
        }
    }

    /// Transcription never fails the download; errors only leave the transcript empty
    async fn try_transcribe(&self, audio: &StorageObject) -> Option<TranscriptionResult> {
        let service = self.transcription.as_ref()?;

        match service.transcribe_object(audio).await {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!(uri = %audio.uri, error = %e, code = e.code(), "Transcription skipped");
                None
            }
        }
    }
}
