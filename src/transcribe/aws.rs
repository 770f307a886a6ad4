use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_transcribe::types::{Media, MediaFormat, Settings};
use aws_sdk_transcribe::Client as TranscribeClient;
use uuid::Uuid;

use super::processor::TranscriptionProcessor;
use super::{AudioArtifact, TranscriptionResult, Transcriber};
use crate::config::TranscriptionConfig;
use crate::extractors::AudioFormat;
use crate::utils::normalize_language_code;

/// AWS Transcribe batch-job backend.
///
/// Transcribe reads media straight from S3, so the job points at the artifact's object URI; the
/// fetched bytes only serve as proof the object exists and is non-empty.
pub struct AwsTranscriber {
    client: TranscribeClient,
    settings: TranscriptionConfig,
}

impl AwsTranscriber {
    pub fn new(client: TranscribeClient, settings: TranscriptionConfig) -> Self {
        Self { client, settings }
    }

    pub fn from_config(sdk_config: &aws_config::SdkConfig, settings: TranscriptionConfig) -> Self {
        Self::new(TranscribeClient::new(sdk_config), settings)
    }

    /// Start AWS Transcribe job with auto language detection and speaker identification
    async fn start_transcription_job(&self, audio: &AudioArtifact) -> Result<String> {
        let job_name = format!("media-ingest_{}", Uuid::new_v4());

        tracing::info!(job = %job_name, audio_uri = %audio.object.uri, "Starting transcription job");

        let media = Media::builder()
            .media_file_uri(&audio.object.uri)
            .build();

        let mut job_builder = self.client
            .start_transcription_job()
            .transcription_job_name(&job_name)
            .media(media);

        if let Some(format) = audio.format {
            job_builder = job_builder.media_format(media_format(format));
        }

        // Handle language detection
        if let Some(lang) = self.settings.default_language.as_deref() {
            let lang = normalize_language_code(lang);
            tracing::info!("Using configured language: {}", lang);
            job_builder = job_builder.language_code(lang.as_str().into());
        } else {
            tracing::debug!("Using automatic language detection");
            job_builder = job_builder.identify_language(true);
        }

        if let Some(sample_rate) = self.settings.sample_rate {
            job_builder = job_builder.media_sample_rate_hertz(sample_rate as i32);
        }

        // Alternatives give word-level timestamps with confidences
        let mut settings = Settings::builder()
            .show_alternatives(true)
            .max_alternatives(2); // AWS requires minimum of 2

        if self.settings.speaker_identification {
            let requested = self.settings.max_speakers.unwrap_or(10);
            let clamped = requested.clamp(2, 10);
            if requested != clamped {
                tracing::warn!("Max speakers clamped from {} to {} (AWS supports 2-10)", requested, clamped);
            }
            settings = settings
                .show_speaker_labels(true)
                .max_speaker_labels(clamped as i32);
        }

        job_builder = job_builder.settings(settings.build());

        job_builder.send().await
            .context("Failed to start transcription job")?;

        Ok(job_name)
    }
}

#[async_trait]
impl Transcriber for AwsTranscriber {
    async fn transcribe(&self, audio: &AudioArtifact) -> Result<TranscriptionResult> {
        let job_id = self.start_transcription_job(audio).await?;

        let processed = TranscriptionProcessor::new(
            self.client.clone(),
            job_id,
            self.settings.max_segment_length,
        )
        .wait_for_completion()
        .await?;

        Ok(processed.into_result(&audio.object.uri))
    }
}

fn media_format(format: AudioFormat) -> MediaFormat {
    match format {
        AudioFormat::Mp3 => MediaFormat::Mp3,
        AudioFormat::Flac => MediaFormat::Flac,
        AudioFormat::Wav => MediaFormat::Wav,
        AudioFormat::Ogg => MediaFormat::Ogg,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_format_mapping() {
        assert_eq!(media_format(AudioFormat::Mp3), MediaFormat::Mp3);
        assert_eq!(media_format(AudioFormat::Flac), MediaFormat::Flac);
        assert_eq!(media_format(AudioFormat::Wav), MediaFormat::Wav);
        assert_eq!(media_format(AudioFormat::Ogg), MediaFormat::Ogg);
    }
}
