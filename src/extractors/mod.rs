use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use url::Url;

pub mod ytdlp;

use crate::config::MediaConfig;
use crate::Result;

/// Byte stream produced by an extractor. Production errors surface as `Err` items.
pub type MediaStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Metadata resolved for a source URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Title or description of the media
    pub title: String,

    /// Duration in seconds if available
    pub duration: Option<f64>,

    /// Name of the platform that resolved the URL
    pub platform: String,
}

/// Which rendition of the media to stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTier {
    /// Best single-file rendition carrying both video and audio
    HighestCombined,
    /// Best audio track, re-encoded into the configured audio container
    HighestAudioOnly,
}

impl QualityTier {
    /// Key suffix distinguishing the artifacts produced for each tier
    pub fn key_suffix(&self) -> &'static str {
        match self {
            QualityTier::HighestCombined => "AV",
            QualityTier::HighestAudioOnly => "A",
        }
    }
}

/// Container of the combined audio/video artifact
pub const VIDEO_EXTENSION: &str = "mp4";

/// MIME type of the combined audio/video artifact
pub const VIDEO_MIME_TYPE: &str = "video/mp4";

/// ffmpeg arguments rewrapping whatever container the site serves into a streamable mp4
pub const VIDEO_REMUX_ARGS: &[&str] = &["-c", "copy", "-f", "mp4", "-movflags", "frag_keyframe+empty_moov"];

/// Supported audio containers for the audio-only artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Flac,
    Wav,
    Ogg,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
            AudioFormat::Ogg => "ogg",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "mp3" => Some(AudioFormat::Mp3),
            "flac" => Some(AudioFormat::Flac),
            "wav" => Some(AudioFormat::Wav),
            "ogg" => Some(AudioFormat::Ogg),
            _ => None,
        }
    }

    /// Get MIME type for the format
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Ogg => "audio/ogg",
        }
    }

    /// ffmpeg arguments encoding stdin audio into this container on stdout
    pub fn ffmpeg_args(&self) -> &'static [&'static str] {
        match self {
            AudioFormat::Mp3 => &["-c:a", "libmp3lame", "-q:a", "2", "-f", "mp3"],
            AudioFormat::Flac => &["-c:a", "flac", "-f", "flac"],
            AudioFormat::Wav => &["-c:a", "pcm_s16le", "-f", "wav"],
            AudioFormat::Ogg => &["-c:a", "libvorbis", "-f", "ogg"],
        }
    }
}

/// Trait for extracting media from different platforms
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Resolve metadata (title) for a URL
    async fn resolve_metadata(&self, url: &str) -> Result<MediaMetadata>;

    /// Start producing the requested rendition of the media
    async fn open_stream(&self, url: &str, tier: QualityTier) -> Result<MediaStream>;

    /// Check if this extractor supports the given URL
    fn supports_url(&self, url: &str) -> bool;

    /// Get the name of this platform
    fn platform_name(&self) -> &'static str;
}

/// Registry for managing multiple extractors
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn MediaExtractor>>,
}

impl ExtractorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Create a registry with the default yt-dlp backed extractors
    pub fn from_config(media: &MediaConfig) -> Self {
        let mut registry = Self::new();

        registry.register(Box::new(ytdlp::YtDlpExtractor::youtube(media)));
        registry.register(Box::new(ytdlp::YtDlpExtractor::twitter(media)));

        registry
    }

    /// Register a new extractor
    pub fn register(&mut self, extractor: Box<dyn MediaExtractor>) {
        self.extractors.push(extractor);
    }

    /// Find an extractor that supports the given URL
    pub fn find_extractor(&self, url: &str) -> Option<&dyn MediaExtractor> {
        self.extractors
            .iter()
            .find(|extractor| extractor.supports_url(url))
            .map(|boxed| boxed.as_ref())
    }

    /// List all supported platforms
    pub fn list_platforms(&self) -> Vec<&'static str> {
        self.extractors
            .iter()
            .map(|extractor| extractor.platform_name())
            .collect()
    }

    fn require_extractor(&self, url: &str) -> Result<&dyn MediaExtractor> {
        validate_url(url)?;

        self.find_extractor(url)
            .ok_or_else(|| anyhow::anyhow!("No extractor found for URL: {}", url))
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaExtractor for ExtractorRegistry {
    async fn resolve_metadata(&self, url: &str) -> Result<MediaMetadata> {
        self.require_extractor(url)?.resolve_metadata(url).await
    }

    async fn open_stream(&self, url: &str, tier: QualityTier) -> Result<MediaStream> {
        self.require_extractor(url)?.open_stream(url, tier).await
    }

    fn supports_url(&self, url: &str) -> bool {
        self.find_extractor(url).is_some()
    }

    fn platform_name(&self) -> &'static str {
        "Registry"
    }
}

/// Validate and normalize URLs
pub fn validate_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url)
        .map_err(|_| anyhow::anyhow!("Invalid URL format: {}", url))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("URL must use HTTP or HTTPS protocol");
    }

    Ok(parsed)
}
