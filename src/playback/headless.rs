// Output sinks for machines without a sound device
//
// Both sinks take as long as the real output would, so session timing
// (speaking -> listening) behaves the same as with audio hardware.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use super::sink::{AudioPlayer, SpeechSynthesizer};
use crate::audio::AudioFile;

/// Prints the reply and paces by word count
pub struct PacedSynthesizer {
    per_word: Duration,
}

impl PacedSynthesizer {
    pub fn new(per_word: Duration) -> Self {
        Self { per_word }
    }
}

impl Default for PacedSynthesizer {
    fn default() -> Self {
        // Roughly 150 words per minute
        Self::new(Duration::from_millis(400))
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for PacedSynthesizer {
    async fn speak(&self, text: &str) -> Result<()> {
        info!("Assistant: {}", text);
        let words = text.split_whitespace().count().max(1) as u32;
        tokio::time::sleep(self.per_word * words).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "paced-text"
    }
}

/// Resolves audio references to WAV files under `base_dir` and waits out
/// their duration
pub struct WavFilePlayer {
    base_dir: PathBuf,
}

impl WavFilePlayer {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn resolve(&self, audio_ref: &str) -> PathBuf {
        let trimmed = audio_ref.strip_prefix("file://").unwrap_or(audio_ref);
        let path = Path::new(trimmed);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

#[async_trait::async_trait]
impl AudioPlayer for WavFilePlayer {
    async fn play(&self, audio_ref: &str) -> Result<()> {
        let path = self.resolve(audio_ref);
        let file = tokio::task::spawn_blocking(move || AudioFile::open(path))
            .await
            .context("WAV loader task panicked")??;

        info!("Playing {} ({:.1}s)", file.path, file.duration_seconds);
        tokio::time::sleep(file.duration()).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}
