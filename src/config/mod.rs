use anyhow::{Context, Result};
use aws_config::Region;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::extractors::AudioFormat;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,

    /// AWS configuration
    pub aws: AwsConfig,

    /// Media extraction settings
    pub media: MediaConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the HTTP server binds to
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    /// AWS region
    pub region: String,

    /// S3 bucket receiving the video and audio artifacts
    pub s3_bucket: String,

    /// Optional S3 key prefix
    pub s3_key_prefix: Option<String>,

    /// Custom endpoint for S3-compatible providers (MinIO, R2, ...)
    pub endpoint_url: Option<String>,

    /// Transcription job settings
    pub transcription: TranscriptionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Transcribe the audio artifact after every download unless the request opts out
    pub enabled: bool,

    /// Default language code (auto-detect if not specified)
    pub default_language: Option<String>,

    /// Sample rate hint passed to the transcription job
    pub sample_rate: Option<u32>,

    /// Enable speaker identification
    pub speaker_identification: bool,

    /// Maximum speakers for identification
    pub max_speakers: Option<u8>,

    /// Maximum segment length in seconds when grouping words
    pub max_segment_length: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path to the yt-dlp binary
    pub yt_dlp_path: String,

    /// Path to the ffmpeg binary
    pub ffmpeg_path: String,

    /// yt-dlp format selector for the combined audio/video stream
    pub video_format: String,

    /// yt-dlp format selector for the audio-only stream
    pub audio_source_format: String,

    /// Container the audio-only artifact is encoded into
    pub audio_format: AudioFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Temporary directory for staging fetched artifacts
    pub temp_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind: "0.0.0.0:8080".to_string(),
            },
            aws: AwsConfig {
                region: "us-east-1".to_string(),
                s3_bucket: "".to_string(),
                s3_key_prefix: Some("media-ingest/".to_string()),
                endpoint_url: None,
                transcription: TranscriptionConfig {
                    enabled: true,
                    default_language: None,
                    sample_rate: None,
                    speaker_identification: false,
                    max_speakers: None,
                    max_segment_length: 10.0,
                },
            },
            media: MediaConfig {
                yt_dlp_path: "yt-dlp".to_string(),
                ffmpeg_path: "ffmpeg".to_string(),
                video_format: "best[ext=mp4]/best".to_string(),
                audio_source_format: "bestaudio/best".to_string(),
                audio_format: AudioFormat::Mp3,
            },
            app: AppConfig { temp_dir: None },
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let config_path = match explicit_path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .context("Failed to parse config file")?;

            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(&config_path)?;
            tracing::info!("Wrote default configuration to {}", config_path.display());
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("media-ingest").join("config.yaml"))
    }

    /// Validate the settings a running service depends on
    pub fn validate(&self) -> Result<()> {
        if self.aws.s3_bucket.is_empty() {
            anyhow::bail!("AWS S3 bucket must be configured");
        }

        self.bind_addr()?;

        if self.media.yt_dlp_path.trim().is_empty() {
            anyhow::bail!("media.yt_dlp_path must not be empty");
        }

        Ok(())
    }

    /// Parsed server bind address
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.server.bind))
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Bind Address: {}", self.server.bind);
        println!("  AWS Region: {}", self.aws.region);
        println!("  S3 Bucket: {}", self.aws.s3_bucket);
        if let Some(prefix) = &self.aws.s3_key_prefix {
            println!("  S3 Prefix: {}", prefix);
        }
        if let Some(endpoint) = &self.aws.endpoint_url {
            println!("  S3 Endpoint: {}", endpoint);
        }
        println!("  Audio Format: {}", self.media.audio_format.as_str());
        println!("  Transcription: {}", if self.aws.transcription.enabled { "enabled" } else { "disabled" });
    }

    /// Get AWS region
    pub fn aws_region(&self) -> Region {
        Region::new(self.aws.region.clone())
    }
}
