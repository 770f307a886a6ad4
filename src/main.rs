use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use media_ingest::api::{self, ApiState};
use media_ingest::extractors::ExtractorRegistry;
use media_ingest::orchestrator::KeyLayout;
use media_ingest::storage::s3::S3Store;
use media_ingest::transcribe::aws::AwsTranscriber;
use media_ingest::utils;
use media_ingest::{Cli, Commands, Config, DownloadOrchestrator, DownloadRequest, TranscriptionService};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_json);

    let config = Config::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Serve { bind } => {
            let mut config = config;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            config.validate()?;
            warn_missing_dependencies(&config).await;

            let addr = config.bind_addr()?;
            let orchestrator = build_orchestrator(&config).await;
            api::serve(addr, Arc::new(ApiState::new(orchestrator))).await?;
        }
        Commands::Download { url, no_transcribe } => {
            config.validate()?;
            warn_missing_dependencies(&config).await;

            let orchestrator = build_orchestrator(&config).await;
            let request = DownloadRequest {
                url: Some(url),
                transcribe: no_transcribe.then_some(false),
            };

            let response = orchestrator
                .handle_download(request)
                .await
                .context("Download failed")?;

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Transcribe { audio_uri } => {
            config.validate()?;

            let orchestrator = build_orchestrator(&config).await;
            let service = orchestrator
                .transcription()
                .context("Transcription is not configured")?;

            let result = service
                .transcribe_uri(&audio_uri)
                .await
                .context("Transcription failed")?;

            if let Some(duration) = result.metadata.audio_duration {
                tracing::info!("Transcribed {} of audio", utils::format_duration(duration));
            }
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                let path = match cli.config {
                    Some(path) => path,
                    None => Config::config_path()?,
                };
                println!("Configuration file: {}", path.display());
                println!("Edit it to set aws.s3_bucket before running `media-ingest serve`.");
            }
        }
        Commands::Platforms => {
            let registry = ExtractorRegistry::from_config(&config.media);
            println!("Supported platforms:");
            for platform in registry.list_platforms() {
                println!("  • {}", platform);
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "media_ingest=debug,tower_http=debug"
    } else {
        "media_ingest=info,tower_http=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

// Missing tools only warn; the binaries may live somewhere `--version` can't reach.
async fn warn_missing_dependencies(config: &Config) {
    for dep in utils::check_dependencies(&config.media).await {
        tracing::warn!("Dependency check: {} not available", dep);
    }
}

async fn build_orchestrator(config: &Config) -> DownloadOrchestrator {
    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(config.aws_region())
        .load()
        .await;

    let storage = Arc::new(S3Store::from_config(&sdk_config, &config.aws));
    let transcriber = Arc::new(AwsTranscriber::from_config(
        &sdk_config,
        config.aws.transcription.clone(),
    ));

    let transcription = TranscriptionService::new(storage.clone(), transcriber)
        .with_staging_dir(config.app.temp_dir.clone());

    let layout = KeyLayout::new(
        config.aws.s3_key_prefix.as_deref(),
        config.media.audio_format,
    );

    DownloadOrchestrator::new(
        Arc::new(ExtractorRegistry::from_config(&config.media)),
        storage,
        layout,
    )
    .with_transcription(transcription, config.aws.transcription.enabled)
}
