use std::sync::atomic::{AtomicI64, Ordering};

use crate::extractors::{AudioFormat, QualityTier, VIDEO_EXTENSION};
use crate::utils::sanitize_filename;

/// Title and creation instant a pair of artifacts is named after
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaReference {
    pub title: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// Storage keys for the two artifacts of one download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactKeys {
    pub video: String,
    pub audio: String,
}

/// Naming scheme `{prefix}{title}_{timestamp}_{suffix}.{ext}`
#[derive(Debug, Clone)]
pub struct KeyLayout {
    prefix: String,
    audio_format: AudioFormat,
}

impl KeyLayout {
    pub fn new(prefix: Option<&str>, audio_format: AudioFormat) -> Self {
        Self {
            prefix: prefix.unwrap_or_default().to_string(),
            audio_format,
        }
    }

    pub fn audio_format(&self) -> AudioFormat {
        self.audio_format
    }

    pub fn keys(&self, reference: &MediaReference) -> ArtifactKeys {
        let title = sanitize_filename(&reference.title);
        let title = if title.is_empty() { "untitled".to_string() } else { title };
        let stem = format!("{}{}_{}", self.prefix, title, reference.timestamp);

        ArtifactKeys {
            video: format!(
                "{}_{}.{}",
                stem,
                QualityTier::HighestCombined.key_suffix(),
                VIDEO_EXTENSION
            ),
            audio: format!(
                "{}_{}.{}",
                stem,
                QualityTier::HighestAudioOnly.key_suffix(),
                self.audio_format.as_str()
            ),
        }
    }
}

/// Millisecond clock that never hands out the same value twice.
///
/// Two requests for the same title within one millisecond still get distinct keys.
pub struct KeyClock {
    last: AtomicI64,
    source: fn() -> i64,
}

impl KeyClock {
    /// Clock backed by the system time
    pub fn system() -> Self {
        Self::with_source(|| chrono::Utc::now().timestamp_millis())
    }

    pub fn with_source(source: fn() -> i64) -> Self {
        Self {
            last: AtomicI64::new(i64::MIN),
            source,
        }
    }

    /// `max(now, last + 1)`
    pub fn next(&self) -> i64 {
        let now = (self.source)();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = if now > last { now } else { last + 1 };
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}

impl Default for KeyClock {
    fn default() -> Self {
        Self::system()
    }
}
