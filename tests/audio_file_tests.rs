// Integration tests for WAV-backed audio sources
//
// These tests write small WAV files with hound and verify they can be read
// back, metered and "played" by the headless player.

use anyhow::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use voice_session::audio::{AudioBackendConfig, AudioFile, AudioLevelMonitor, WavFileBackend};
use voice_session::playback::{AudioPlayer, WavFilePlayer};

/// Write `seconds` of a constant-amplitude square wave at 16kHz mono
fn write_tone(dir: &Path, name: &str, seconds: f64, amplitude: i16) -> Result<PathBuf> {
    let path = dir.join(name);
    let spec = WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(&path, spec)?;
    let total = (16000.0 * seconds) as usize;
    for i in 0..total {
        let sample = if (i / 20) % 2 == 0 { amplitude } else { -amplitude };
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    Ok(path)
}

#[test]
fn test_audio_file_open() -> Result<()> {
    // Setup: Create a 1.5 second file
    let temp_dir = TempDir::new()?;
    let path = write_tone(temp_dir.path(), "reply.wav", 1.5, 8000)?;

    let audio = AudioFile::open(&path)?;

    // Verify basic properties
    assert_eq!(audio.sample_rate, 16000);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples.len(), 24000);
    assert!((audio.duration_seconds - 1.5).abs() < 0.001);
    assert_eq!(audio.duration(), Duration::from_millis(1500));
    assert!(audio.path.contains("reply.wav"));

    Ok(())
}

#[test]
fn test_audio_file_frames() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = write_tone(temp_dir.path(), "tone.wav", 0.25, 4000)?;
    let audio = AudioFile::open(&path)?;

    let frames = audio.frames(100);

    // Verify: 100ms + 100ms + a 50ms tail
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].samples.len(), 1600);
    assert_eq!(frames[2].samples.len(), 800);
    assert_eq!(frames[1].timestamp_ms, 100);
    assert!(frames[0].level() > 0.0);

    Ok(())
}

#[test]
fn test_audio_file_missing() {
    let result = AudioFile::open("/nonexistent/reply.wav");
    assert!(result.is_err(), "Opening a missing file should fail");
}

#[tokio::test(start_paused = true)]
async fn test_level_monitor_tracks_wav_source() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = write_tone(temp_dir.path(), "mic.wav", 1.0, 16000)?;

    let backend = WavFileBackend::open(&path, AudioBackendConfig::default())?;
    let monitor = AudioLevelMonitor::start(Some(Box::new(backend)), Duration::from_millis(16)).await;
    let mut level = monitor.subscribe();

    // Verify: the meter rises while the source plays
    let raised = tokio::time::timeout(Duration::from_secs(2), level.wait_for(|l| *l > 0.1))
        .await
        .is_ok_and(|r| r.is_ok());
    assert!(raised, "Level should rise while audio plays");
    assert!(monitor.level() <= 1.0);

    // ...and falls back to zero once it runs out
    let silenced = tokio::time::timeout(Duration::from_secs(5), level.wait_for(|l| *l == 0.0))
        .await
        .is_ok_and(|r| r.is_ok());
    assert!(silenced, "Level should drop to zero when the source ends");

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_level_monitor_without_audio_graph_is_silent() {
    let monitor = AudioLevelMonitor::start(None, Duration::from_millis(16)).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(monitor.level(), 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_wav_player_waits_out_duration() -> Result<()> {
    let temp_dir = TempDir::new()?;
    write_tone(temp_dir.path(), "summary.wav", 2.0, 1000)?;
    let player = WavFilePlayer::new(temp_dir.path());

    let started = tokio::time::Instant::now();
    player.play("summary.wav").await?;

    assert!(started.elapsed() >= Duration::from_secs(2));

    // Verify: a reference that does not resolve is an error
    assert!(player.play("missing.wav").await.is_err());

    Ok(())
}
