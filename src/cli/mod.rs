use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "media-ingest",
    about = "Media Ingest - Archive videos from YouTube, Twitter and more into S3, with optional AWS Transcribe transcripts",
    version,
    long_about = "An HTTP service that resolves a video URL, streams the combined video and an audio-only rendition into S3-compatible storage, and transcribes the stored audio. The same operations are available as one-shot commands."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Configuration file (defaults to ./config.yaml, then the user config directory)
    #[arg(short, long, global = true, value_name = "FILE", env = "MEDIA_INGEST_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service
    Serve {
        /// Address to listen on (overrides server.bind)
        #[arg(short, long, value_name = "ADDR", env = "MEDIA_INGEST_BIND")]
        bind: Option<String>,
    },

    /// Download one URL into storage and print the resulting URIs as JSON
    Download {
        /// Video URL (YouTube, Twitter/X)
        #[arg(value_name = "URL")]
        url: String,

        /// Skip transcription of the audio artifact
        #[arg(long)]
        no_transcribe: bool,
    },

    /// Transcribe an audio artifact that is already in storage
    Transcribe {
        /// Storage URI of the audio artifact, e.g. s3://bucket/key.mp3
        #[arg(value_name = "AUDIO_URI")]
        audio_uri: String,
    },

    /// Show or initialise the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// List supported platforms
    Platforms,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_download_flags() {
        let cli = Cli::try_parse_from(["media-ingest", "download", "https://youtu.be/abc", "--no-transcribe", "-v"]).unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Download { url, no_transcribe } => {
                assert_eq!(url, "https://youtu.be/abc");
                assert!(no_transcribe);
            }
            _ => panic!("expected download command"),
        }
    }

    #[test]
    fn test_transcribe_requires_uri() {
        assert!(Cli::try_parse_from(["media-ingest", "transcribe"]).is_err());
    }
}
