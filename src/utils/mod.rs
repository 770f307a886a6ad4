use url::Url;

use crate::config::MediaConfig;

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = ((bytes_f.log10() / THRESHOLD.log10()).floor() as usize).min(UNITS.len() - 1);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", bytes_f / THRESHOLD.powi(unit_index as i32), UNITS[unit_index])
    }
}

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Make a media title safe to embed in an object key.
///
/// Path separators and other punctuation become `_`; letters, digits, spaces, `-`, `_` and `.`
/// survive.
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            c if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.') => c,
            _ => '_',
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Expand short language names into the codes the transcription engine expects
pub fn normalize_language_code(lang: &str) -> String {
    let normalized = match lang.to_lowercase().as_str() {
        "en" | "english" => "en-US",
        "es" | "spanish" => "es-ES",
        "fr" | "french" => "fr-FR",
        "de" | "german" => "de-DE",
        "it" | "italian" => "it-IT",
        "pt" | "portuguese" => "pt-BR",
        "ja" | "japanese" => "ja-JP",
        "ko" | "korean" => "ko-KR",
        "zh" | "chinese" => "zh-CN",
        "ar" | "arabic" => "ar-SA",
        "hi" | "hindi" => "hi-IN",
        "ru" | "russian" => "ru-RU",
        _ => lang,
    };

    normalized.to_string()
}

/// Host of a URL without the `www.` prefix, for log lines
pub fn extract_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

/// Report the configured external tools that cannot be executed
pub async fn check_dependencies(media: &MediaConfig) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(&media.yt_dlp_path).await {
        missing.push(format!("{} - required for media extraction", media.yt_dlp_path));
    }

    if !check_command_available(&media.ffmpeg_path).await {
        missing.push(format!("{} - required to encode the audio artifact", media.ffmpeg_path));
    }

    missing
}

/// Check if a command runs successfully with `--version`
async fn check_command_available(command: &str) -> bool {
    let flag = if command.ends_with("ffmpeg") { "-version" } else { "--version" };

    tokio::process::Command::new(command)
        .arg(flag)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(8 * 1024 * 1024), "8.0 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.0), "30s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3661.0), "1h 1m 1s");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Hello World!"), "Hello World_");
        assert_eq!(sanitize_filename("AC/DC live"), "AC_DC live");
        assert_eq!(sanitize_filename("  spaced  "), "spaced");
        assert_eq!(sanitize_filename("Café ü.2"), "Café ü.2");
    }

    #[test]
    fn test_normalize_language_code() {
        assert_eq!(normalize_language_code("en"), "en-US");
        assert_eq!(normalize_language_code("Spanish"), "es-ES");
        assert_eq!(normalize_language_code("zh-TW"), "zh-TW");
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(extract_domain("https://www.youtube.com/watch?v=123"), Some("youtube.com".to_string()));
        assert_eq!(extract_domain("https://x.com/user/status/1"), Some("x.com".to_string()));
        assert_eq!(extract_domain("invalid-url"), None);
    }

    #[tokio::test]
    async fn test_check_dependencies_reports_missing_tools() {
        let media = MediaConfig {
            yt_dlp_path: "/nonexistent/yt-dlp".to_string(),
            ffmpeg_path: "/nonexistent/ffmpeg".to_string(),
            ..crate::Config::default().media
        };

        let missing = check_dependencies(&media).await;
        assert_eq!(missing.len(), 2);
        assert!(missing[0].starts_with("/nonexistent/yt-dlp"));
    }
}
