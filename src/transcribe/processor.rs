use anyhow::{Context, Result};
use aws_sdk_transcribe::types::{TranscriptionJob, TranscriptionJobStatus};
use aws_sdk_transcribe::Client as TranscribeClient;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use super::{TranscriptSegment, TranscriptionMetadata, TranscriptionResult, WordTimestamp};

/// Processed transcription result from AWS
#[derive(Debug, Clone)]
pub struct ProcessedTranscription {
    pub job_id: String,
    pub language: String,
    pub transcript: String,
    pub segments: Vec<TranscriptSegment>,
    pub words: Vec<WordTimestamp>,
    pub processing_duration: Duration,
}

impl ProcessedTranscription {
    pub fn into_result(self, audio_uri: &str) -> TranscriptionResult {
        let metadata = TranscriptionMetadata {
            job_id: self.job_id,
            language: self.language,
            audio_uri: audio_uri.to_string(),
            processing_duration: Some(self.processing_duration.as_secs_f64()),
            audio_duration: self.segments.last().map(|s| s.end_time),
            confidence: average_confidence(
                &self.segments.iter().filter_map(|s| s.confidence).collect::<Vec<_>>(),
            ),
            completed_at: chrono::Utc::now(),
        };

        TranscriptionResult {
            transcript: self.transcript,
            segments: self.segments,
            words: self.words,
            metadata,
        }
    }
}

/// AWS Transcribe transcript format
#[derive(Debug, Deserialize)]
struct AwsTranscript {
    results: TranscriptResults,
}

#[derive(Debug, Deserialize)]
struct TranscriptResults {
    transcripts: Vec<TranscriptText>,
    items: Vec<TranscriptItem>,
}

#[derive(Debug, Deserialize)]
struct TranscriptText {
    transcript: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptItem {
    start_time: Option<String>,
    end_time: Option<String>,
    #[serde(rename = "type")]
    item_type: String,
    alternatives: Vec<Alternative>,
    speaker_label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    confidence: Option<String>,
    content: String,
}

/// Transcription job processor
pub struct TranscriptionProcessor {
    client: TranscribeClient,
    job_id: String,
    max_segment_length: f64,
}

impl TranscriptionProcessor {
    pub fn new(client: TranscribeClient, job_id: String, max_segment_length: f64) -> Self {
        Self { client, job_id, max_segment_length }
    }

    /// Poll the job until it settles, then fetch and process the transcript
    pub async fn wait_for_completion(&self) -> Result<ProcessedTranscription> {
        let start_time = Instant::now();
        let mut check_count = 0u64;

        let job = loop {
            check_count += 1;

            let job = self.get_transcription_job().await?;

            match job.transcription_job_status() {
                Some(TranscriptionJobStatus::InProgress) | Some(TranscriptionJobStatus::Queued) => {
                    tracing::debug!(
                        job = %self.job_id,
                        elapsed_secs = start_time.elapsed().as_secs(),
                        check = check_count,
                        "Transcription in progress"
                    );

                    sleep(poll_delay(check_count)).await;
                }
                Some(TranscriptionJobStatus::Completed) => break job,
                Some(TranscriptionJobStatus::Failed) => {
                    let failure_reason = job.failure_reason()
                        .unwrap_or("Unknown error");
                    anyhow::bail!("Transcription job failed: {}", failure_reason);
                }
                other => {
                    anyhow::bail!("Unexpected transcription job status: {:?}", other);
                }
            }
        };

        tracing::info!(
            job = %self.job_id,
            elapsed_secs = start_time.elapsed().as_secs(),
            "Transcription completed"
        );

        self.process_transcription_result(job, start_time.elapsed()).await
    }

    /// Get transcription job details
    async fn get_transcription_job(&self) -> Result<TranscriptionJob> {
        let response = self.client
            .get_transcription_job()
            .transcription_job_name(&self.job_id)
            .send()
            .await
            .context("Failed to get transcription job status")?;

        response.transcription_job()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Transcription job not found"))
    }

    /// Process completed transcription result
    async fn process_transcription_result(
        &self,
        job: TranscriptionJob,
        processing_duration: Duration,
    ) -> Result<ProcessedTranscription> {
        let transcript_uri = job.transcript()
            .and_then(|t| t.transcript_file_uri())
            .ok_or_else(|| anyhow::anyhow!("No transcript URI found"))?;

        let transcript_json = self.download_transcript(transcript_uri).await?;

        let (transcript, segments, words) = parse_transcript(&transcript_json, self.max_segment_length)?;

        Ok(ProcessedTranscription {
            job_id: self.job_id.clone(),
            language: job.language_code()
                .map(|lc| lc.as_str().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            transcript,
            segments,
            words,
            processing_duration,
        })
    }

    /// Download transcript JSON from the pre-signed URI AWS hands out
    async fn download_transcript(&self, uri: &str) -> Result<String> {
        let response = reqwest::get(uri).await
            .context("Failed to download transcript")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to download transcript: HTTP {}", response.status());
        }

        let content = response.text().await
            .context("Failed to read transcript content")?;

        Ok(content)
    }
}

/// Delay before the next status check: 5s, growing by 2s per check, capped at 30s
fn poll_delay(check_count: u64) -> Duration {
    let secs = std::cmp::min(5 + check_count.saturating_sub(1) * 2, 30);
    Duration::from_secs(secs)
}

/// Parse an AWS transcript document into full text, segments and words
fn parse_transcript(
    json: &str,
    max_segment_length: f64,
) -> Result<(String, Vec<TranscriptSegment>, Vec<WordTimestamp>)> {
    let aws_transcript: AwsTranscript = serde_json::from_str(json)
        .context("Failed to parse transcript JSON")?;

    let transcript = aws_transcript.results.transcripts
        .first()
        .map(|t| t.transcript.clone())
        .unwrap_or_default();

    let words = extract_words(&aws_transcript.results.items);
    let segments = group_segments(&aws_transcript.results.items, max_segment_length);

    Ok((transcript, segments, words))
}

fn extract_words(items: &[TranscriptItem]) -> Vec<WordTimestamp> {
    items
        .iter()
        .filter(|item| item.item_type == "pronunciation")
        .filter_map(|item| {
            let start_time = item.start_time.as_ref()?.parse::<f64>().ok()?;
            let end_time = item.end_time.as_ref()?.parse::<f64>().ok()?;
            let alt = item.alternatives.first()?;
            Some(WordTimestamp {
                word: alt.content.clone(),
                start_time,
                end_time,
                confidence: alt.confidence.as_ref().and_then(|c| c.parse::<f64>().ok()),
                speaker_id: item.speaker_label.clone(),
            })
        })
        .collect()
}

/// Group words into segments.
///
/// A new segment starts on a speaker change, a gap over one second, once the segment exceeds
/// `max_segment_length`, or at a sentence end past half that length.
fn group_segments(items: &[TranscriptItem], max_segment_length: f64) -> Vec<TranscriptSegment> {
    let mut segments = Vec::new();
    let mut current_text = String::new();
    let mut current_start: Option<f64> = None;
    let mut current_end: Option<f64> = None;
    let mut confidences = Vec::new();
    let mut current_speaker: Option<String> = None;

    let mut flush = |text: &str, start: Option<f64>, end: Option<f64>, confidences: &[f64], speaker: Option<String>| {
        if let (false, Some(start), Some(end)) = (text.is_empty(), start, end) {
            segments.push(TranscriptSegment {
                start_time: start,
                end_time: end,
                text: text.trim().to_string(),
                confidence: average_confidence(confidences),
                speaker_id: speaker,
            });
        }
    };

    for item in items {
        match item.item_type.as_str() {
            "pronunciation" => {
                let start_time = item.start_time.as_ref().and_then(|s| s.parse::<f64>().ok());
                let end_time = item.end_time.as_ref().and_then(|s| s.parse::<f64>().ok());
                let content = item.alternatives.first()
                    .map(|alt| alt.content.clone())
                    .unwrap_or_default();
                let confidence = item.alternatives.first()
                    .and_then(|alt| alt.confidence.as_ref())
                    .and_then(|c| c.parse::<f64>().ok());

                let elapsed = current_start.zip(start_time).map(|(seg_start, now)| now - seg_start);
                let speaker_changed = current_speaker.as_ref() != item.speaker_label.as_ref();
                let time_gap = start_time.zip(current_end)
                    .map(|(start, end)| start - end > 1.0)
                    .unwrap_or(false);
                let segment_too_long = elapsed.map(|e| e > max_segment_length).unwrap_or(false);
                let natural_break = current_text.ends_with(['.', '!', '?'])
                    && elapsed.map(|e| e > max_segment_length / 2.0).unwrap_or(false);

                if current_text.is_empty() || speaker_changed || time_gap || segment_too_long || natural_break {
                    flush(&current_text, current_start, current_end, &confidences, current_speaker.take());

                    current_text = content;
                    current_start = start_time;
                    current_end = end_time;
                    confidences = confidence.into_iter().collect();
                    current_speaker = item.speaker_label.clone();
                } else {
                    current_text.push(' ');
                    current_text.push_str(&content);
                    current_end = end_time.or(current_end);
                    confidences.extend(confidence);
                }
            }
            "punctuation" => {
                if let Some(alt) = item.alternatives.first() {
                    current_text.push_str(&alt.content);
                }
            }
            _ => {}
        }
    }

    flush(&current_text, current_start, current_end, &confidences, current_speaker);

    segments
}

fn average_confidence(confidences: &[f64]) -> Option<f64> {
    if confidences.is_empty() {
        None
    } else {
        Some(confidences.iter().sum::<f64>() / confidences.len() as f64)
    }
}
