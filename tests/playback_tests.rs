// Integration tests for reply playback arbitration

mod common;

use common::{settle, FakeSink, SharedOutput};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use voice_session::playback::{PlaybackContent, PlaybackSource, PlaybackStatus, ResponsePlayback};

fn arbiter(
    output: &Arc<FakeSink>,
) -> (
    ResponsePlayback,
    mpsc::UnboundedReceiver<voice_session::playback::PlaybackFinished>,
) {
    let shared = Arc::new(SharedOutput(Arc::clone(output)));
    let (done_tx, done_rx) = mpsc::unbounded_channel();
    (ResponsePlayback::new(shared.clone(), shared, done_tx), done_rx)
}

#[tokio::test(start_paused = true)]
async fn test_new_playback_never_overlaps_previous() {
    let output = FakeSink::new(Duration::from_secs(5));
    let (mut playback, mut done) = arbiter(&output);

    // Setup: speech starts, then remote audio for a newer reply arrives
    let first = playback
        .start(PlaybackContent::Speech("Your next meeting is at ten".into()))
        .await;
    settle().await;
    assert_eq!(output.active(), 1);

    let second = playback
        .start(PlaybackContent::RemoteAudio("replies/next.wav".into()))
        .await;
    assert_eq!(
        playback.status(),
        PlaybackStatus::Playing {
            source: PlaybackSource::RemoteAudio
        }
    );

    // Verify: the first one was silenced before the second began
    let finished = done.recv().await.expect("playback should report");
    assert_eq!(finished.id, second);
    assert!(finished.error.is_none());
    assert_ne!(first, second);
    assert_eq!(output.max_active(), 1);
    assert_eq!(
        output.played(),
        vec![
            "Your next meeting is at ten".to_string(),
            "replies/next.wav".to_string()
        ]
    );

    assert!(playback.finish(second));
    assert_eq!(playback.status(), PlaybackStatus::Idle);
    assert!(done.try_recv().is_err(), "Cancelled playback must not report");
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_and_is_idempotent() {
    let output = FakeSink::new(Duration::from_secs(5));
    let (mut playback, mut done) = arbiter(&output);

    let id = playback.start(PlaybackContent::Speech("Done".into())).await;
    settle().await;

    playback.stop().await;
    playback.stop().await;

    assert_eq!(output.active(), 0);
    assert!(!playback.is_current(id));
    assert!(!playback.finish(id));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(done.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_sink_failure_is_reported_as_completion() {
    let output = FakeSink::failing(Duration::from_millis(100));
    let (mut playback, mut done) = arbiter(&output);

    let id = playback.start(PlaybackContent::Speech("Hello".into())).await;
    let finished = done.recv().await.expect("playback should report");

    assert_eq!(finished.id, id);
    assert_eq!(finished.source, PlaybackSource::Speech);
    assert!(finished.error.unwrap().contains("output device unavailable"));
}
