use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use serde_json::Value;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

use super::{AudioFormat, MediaExtractor, MediaMetadata, MediaStream, QualityTier, VIDEO_REMUX_ARGS};
use crate::config::MediaConfig;
use crate::Result;

const CHUNK_SIZE: usize = 64 * 1024;
const MAX_TITLE_LEN: usize = 100;

/// How a site reports the human-readable name of a post
#[derive(Debug, Clone, Copy)]
enum TitleSource {
    Title,
    /// Tweets carry their text in `description`; `title` is usually "User - text"
    Description,
}

/// Extractor driving the yt-dlp binary.
///
/// Both renditions pass through ffmpeg so the bytes always match the container the key names:
/// the combined one is remuxed into mp4, the audio one re-encoded into the configured format.
pub struct YtDlpExtractor {
    platform: &'static str,
    url_markers: &'static [&'static str],
    title_source: TitleSource,
    yt_dlp_path: String,
    ffmpeg_path: String,
    video_format: String,
    audio_source_format: String,
    audio_format: AudioFormat,
}

impl YtDlpExtractor {
    pub fn youtube(media: &MediaConfig) -> Self {
        Self::with_site(
            "YouTube",
            &[
                "youtube.com/watch",
                "youtu.be/",
                "youtube.com/embed/",
                "youtube.com/v/",
                "youtube.com/shorts/",
                "m.youtube.com/",
            ],
            TitleSource::Title,
            media,
        )
    }

    pub fn twitter(media: &MediaConfig) -> Self {
        Self::with_site(
            "Twitter/X",
            &[
                "twitter.com/",
                "x.com/",
                "mobile.twitter.com/",
                "m.twitter.com/",
            ],
            TitleSource::Description,
            media,
        )
    }

    fn with_site(
        platform: &'static str,
        url_markers: &'static [&'static str],
        title_source: TitleSource,
        media: &MediaConfig,
    ) -> Self {
        Self {
            platform,
            url_markers,
            title_source,
            yt_dlp_path: media.yt_dlp_path.clone(),
            ffmpeg_path: media.ffmpeg_path.clone(),
            video_format: media.video_format.clone(),
            audio_source_format: media.audio_source_format.clone(),
            audio_format: media.audio_format,
        }
    }

    /// Get video information using yt-dlp
    async fn get_video_info(&self, url: &str) -> Result<Value> {
        tracing::debug!("Extracting video info for: {}", url);

        let output = Command::new(&self.yt_dlp_path)
            .args([
                "--dump-json",
                "--no-playlist",
                url,
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to run {}: {}", self.yt_dlp_path, e))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp failed: {}", error.trim());
        }

        let json_str = String::from_utf8(output.stdout)?;
        let info: Value = serde_json::from_str(&json_str)?;

        Ok(info)
    }

    fn title_from_info(&self, info: &Value) -> Option<String> {
        let raw = match self.title_source {
            TitleSource::Title => info["title"].as_str(),
            TitleSource::Description => info["description"]
                .as_str()
                .filter(|s| !s.trim().is_empty())
                .or_else(|| info["title"].as_str()),
        }?;

        let cleaned = raw.replace('\n', " ").trim().to_string();
        if cleaned.is_empty() {
            return None;
        }

        if cleaned.chars().count() > MAX_TITLE_LEN {
            let truncated: String = cleaned.chars().take(MAX_TITLE_LEN - 3).collect();
            Some(format!("{}...", truncated))
        } else {
            Some(cleaned)
        }
    }

    fn spawn_yt_dlp(&self, url: &str, format: &str) -> Result<(Child, ChildStdout, JoinHandle<String>)> {
        let mut child = Command::new(&self.yt_dlp_path)
            .args([
                "--no-playlist",
                "--quiet",
                "--no-warnings",
                "--no-part",
                "--format", format,
                "--output", "-",
                url,
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to start {}: {}", self.yt_dlp_path, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("yt-dlp stdout was not captured"))?;
        let stderr = collect_stderr(child.stderr.take());

        Ok((child, stdout, stderr))
    }

    /// ffmpeg output arguments producing the container for `tier`
    fn ffmpeg_output_args(&self, tier: QualityTier) -> Vec<&'static str> {
        match tier {
            QualityTier::HighestCombined => VIDEO_REMUX_ARGS.to_vec(),
            QualityTier::HighestAudioOnly => {
                let mut args = vec!["-vn"];
                args.extend_from_slice(self.audio_format.ffmpeg_args());
                args
            }
        }
    }

    fn spawn_ffmpeg(
        &self,
        input: ChildStdout,
        output_args: &[&str],
    ) -> Result<(Child, ChildStdout, JoinHandle<String>)> {
        let input: Stdio = input
            .try_into()
            .map_err(|e| anyhow::anyhow!("Failed to hand yt-dlp output to ffmpeg: {}", e))?;

        let mut child = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error", "-i", "pipe:0"])
            .args(output_args)
            .arg("pipe:1")
            .stdin(input)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to start {}: {}", self.ffmpeg_path, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("ffmpeg stdout was not captured"))?;
        let stderr = collect_stderr(child.stderr.take());

        Ok((child, stdout, stderr))
    }
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    async fn resolve_metadata(&self, url: &str) -> Result<MediaMetadata> {
        let info = self.get_video_info(url).await?;

        let title = self
            .title_from_info(&info)
            .ok_or_else(|| anyhow::anyhow!("yt-dlp returned no title for {}", url))?;

        Ok(MediaMetadata {
            title,
            duration: info["duration"].as_f64(),
            platform: self.platform.to_string(),
        })
    }

    async fn open_stream(&self, url: &str, tier: QualityTier) -> Result<MediaStream> {
        tracing::debug!(url = %url, tier = ?tier, "Opening media stream");

        let source_format = match tier {
            QualityTier::HighestCombined => &self.video_format,
            QualityTier::HighestAudioOnly => &self.audio_source_format,
        };

        let (yt_child, yt_stdout, yt_stderr) = self.spawn_yt_dlp(url, source_format)?;
        let (ff_child, ff_stdout, ff_stderr) =
            self.spawn_ffmpeg(yt_stdout, &self.ffmpeg_output_args(tier))?;

        let pipeline = ProcessPipeline {
            reader: ff_stdout,
            stages: vec![
                Stage { name: "yt-dlp", child: yt_child, stderr: yt_stderr },
                Stage { name: "ffmpeg", child: ff_child, stderr: ff_stderr },
            ],
        };

        Ok(pipeline.into_stream(CHUNK_SIZE))
    }

    fn supports_url(&self, url: &str) -> bool {
        let url_lower = url.to_lowercase();
        self.url_markers.iter().any(|marker| url_lower.contains(marker))
    }

    fn platform_name(&self) -> &'static str {
        self.platform
    }
}

/// One process of a streaming pipeline
struct Stage {
    name: &'static str,
    child: Child,
    stderr: JoinHandle<String>,
}

/// Chain of child processes whose last stdout is the produced stream.
///
/// Dropping the pipeline kills every stage.
struct ProcessPipeline<R> {
    reader: R,
    stages: Vec<Stage>,
}

impl<R> ProcessPipeline<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    fn into_stream(self, chunk_size: usize) -> MediaStream {
        futures_util::stream::unfold(Some(self), move |state| async move {
            let mut pipeline = state?;
            let mut buf = BytesMut::with_capacity(chunk_size);

            match pipeline.reader.read_buf(&mut buf).await {
                Ok(0) => match pipeline.finish().await {
                    Ok(()) => None,
                    Err(e) => Some((Err(e), None)),
                },
                Ok(_) => Some((Ok::<Bytes, std::io::Error>(buf.freeze()), Some(pipeline))),
                Err(e) => Some((Err(e), None)),
            }
        })
        .boxed()
    }

    /// Reap every stage once output is exhausted, reporting the first one that failed
    async fn finish(self) -> std::io::Result<()> {
        let mut first_failure = None;

        for mut stage in self.stages {
            let status = stage.child.wait().await?;
            if !status.success() && first_failure.is_none() {
                let stderr = stage.stderr.await.unwrap_or_default();
                first_failure = Some(stage_failure(stage.name, status, &stderr));
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn stage_failure(name: &str, status: ExitStatus, stderr: &str) -> std::io::Error {
    let detail = stderr.trim();
    if detail.is_empty() {
        std::io::Error::other(format!("{} exited with {}", name, status))
    } else {
        std::io::Error::other(format!("{} exited with {}: {}", name, status, detail))
    }
}

/// Drain a child's stderr in the background so a chatty process never blocks on a full pipe
fn collect_stderr<R>(stderr: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = String::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_string(&mut buf).await;
        }
        buf
    })
}
