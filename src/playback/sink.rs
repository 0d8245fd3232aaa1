use anyhow::Result;

/// Local text-to-speech output
///
/// Cancellation is by dropping the returned future; implementations must
/// silence output when that happens.
#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Speak `text`, resolving when the utterance has finished
    async fn speak(&self, text: &str) -> Result<()>;

    fn name(&self) -> &str;
}

/// Output for audio the backend rendered remotely
#[async_trait::async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Play the referenced asset, resolving when it has finished
    async fn play(&self, audio_ref: &str) -> Result<()>;

    fn name(&self) -> &str;
}
