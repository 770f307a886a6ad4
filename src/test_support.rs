//! In-memory collaborators for unit tests.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::extractors::{MediaExtractor, MediaMetadata, MediaStream, QualityTier};
use crate::storage::{ObjectStore, StorageError, StorageObject, StorageResult};
use crate::transcribe::{AudioArtifact, TranscriptionMetadata, TranscriptionResult, Transcriber};

/// Object store keeping every object in a map keyed by `(bucket, key)`
pub struct MemoryStore {
    bucket: String,
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    failing_puts: HashSet<String>,
    operations: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: Mutex::new(BTreeMap::new()),
            failing_puts: HashSet::new(),
            operations: Mutex::new(Vec::new()),
        }
    }

    /// Make every write to `key` fail once its stream is drained
    pub fn failing_put(mut self, key: &str) -> Self {
        self.failing_puts.insert(key.to_string());
        self
    }

    pub fn insert(&self, key: &str, data: &[u8]) {
        let bucket = self.bucket.clone();
        self.insert_in(&bucket, key, data);
    }

    /// Seed an object in a bucket other than the store's own
    pub fn insert_in(&self, bucket: &str, key: &str, data: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), data.to_vec());
    }

    pub fn contents(&self, key: &str) -> Option<Vec<u8>> {
        self.contents_in(&self.bucket, key)
    }

    fn contents_in(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Keys stored in the store's own bucket
    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(bucket, _)| *bucket == self.bucket)
            .map(|(_, key)| key.clone())
            .collect()
    }

    pub fn operations(&self) -> Vec<String> {
        self.operations.lock().unwrap().clone()
    }

    fn record(&self, operation: &str, key: &str) {
        self.operations.lock().unwrap().push(format!("{} {}", operation, key));
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_stream(
        &self,
        key: &str,
        _content_type: &str,
        mut stream: MediaStream,
        cancel: &CancellationToken,
    ) -> StorageResult<StorageObject> {
        self.record("put", key);
        let mut data = Vec::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StorageError::Cancelled),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => data.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(StorageError::Source(e.to_string())),
                None => break,
            }
        }

        if self.failing_puts.contains(key) {
            return Err(StorageError::Upload(format!("simulated failure for {}", key)));
        }

        self.objects
            .lock()
            .unwrap()
            .insert((self.bucket.clone(), key.to_string()), data);
        Ok(self.object(key))
    }

    async fn download_to(&self, bucket: &str, key: &str, dest: &Path) -> StorageResult<u64> {
        self.record("download", key);
        let data = self
            .contents_in(bucket, key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        tokio::fs::write(dest, &data)
            .await
            .map_err(|e| StorageError::Download(e.to_string()))?;
        Ok(data.len() as u64)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.record("delete", key);
        self.objects
            .lock()
            .unwrap()
            .remove(&(self.bucket.clone(), key.to_string()));
        Ok(())
    }
}

/// Scripted behaviour of one rendition
#[derive(Clone)]
pub enum StreamScript {
    Chunks(Vec<&'static [u8]>),
    FailAfter(Vec<&'static [u8]>, &'static str),
    /// Never yields anything
    Pending,
    OpenFails(&'static str),
}

impl StreamScript {
    fn into_stream(self) -> crate::Result<MediaStream> {
        let chunks = |chunks: Vec<&'static [u8]>| {
            futures_util::stream::iter(
                chunks
                    .into_iter()
                    .map(|c| Ok::<Bytes, std::io::Error>(Bytes::from_static(c)))
                    .collect::<Vec<_>>(),
            )
        };

        Ok(match self {
            StreamScript::Chunks(data) => chunks(data).boxed(),
            StreamScript::FailAfter(data, msg) => chunks(data)
                .chain(futures_util::stream::iter(vec![Err(std::io::Error::other(msg))]))
                .boxed(),
            StreamScript::Pending => futures_util::stream::pending().boxed(),
            StreamScript::OpenFails(msg) => anyhow::bail!(msg),
        })
    }
}

/// Extractor resolving every URL to a fixed title
pub struct FakeExtractor {
    title: String,
    resolvable: bool,
    video: StreamScript,
    audio: StreamScript,
    calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            resolvable: true,
            video: StreamScript::Chunks(vec![b"video-1", b"video-2"]),
            audio: StreamScript::Chunks(vec![b"audio-1"]),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unresolvable(mut self) -> Self {
        self.resolvable = false;
        self
    }

    pub fn with_video(mut self, script: StreamScript) -> Self {
        self.video = script;
        self
    }

    pub fn with_audio(mut self, script: StreamScript) -> Self {
        self.audio = script;
        self
    }

    /// Number of extractor calls of any kind
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaExtractor for FakeExtractor {
    async fn resolve_metadata(&self, url: &str) -> crate::Result<MediaMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.resolvable {
            anyhow::bail!("Video unavailable: {}", url);
        }

        Ok(MediaMetadata {
            title: self.title.clone(),
            duration: Some(12.0),
            platform: "Fake".to_string(),
        })
    }

    async fn open_stream(&self, _url: &str, tier: QualityTier) -> crate::Result<MediaStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match tier {
            QualityTier::HighestCombined => self.video.clone().into_stream(),
            QualityTier::HighestAudioOnly => self.audio.clone().into_stream(),
        }
    }

    fn supports_url(&self, _url: &str) -> bool {
        true
    }

    fn platform_name(&self) -> &'static str {
        "Fake"
    }
}

/// Deterministic transcript for an artifact URI
pub fn sample_transcript(audio_uri: &str) -> TranscriptionResult {
    TranscriptionResult {
        transcript: "hello from the clip".to_string(),
        segments: Vec::new(),
        words: Vec::new(),
        metadata: TranscriptionMetadata {
            job_id: "job-1".to_string(),
            language: "en-US".to_string(),
            audio_uri: audio_uri.to_string(),
            processing_duration: None,
            audio_duration: None,
            confidence: None,
            completed_at: chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default(),
        },
    }
}

/// Transcriber answering every call the same way
pub struct StaticTranscriber {
    failure: Option<&'static str>,
    calls: Arc<AtomicUsize>,
}

impl StaticTranscriber {
    pub fn succeeding() -> Self {
        Self {
            failure: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(message: &'static str) -> Self {
        Self {
            failure: Some(message),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Transcriber for StaticTranscriber {
    async fn transcribe(&self, audio: &AudioArtifact) -> crate::Result<TranscriptionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failure {
            Some(message) => anyhow::bail!(message),
            None => Ok(sample_transcript(&audio.object.uri)),
        }
    }
}
