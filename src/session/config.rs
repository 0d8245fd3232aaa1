use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

use crate::capture::SpeechRecognizer;
use crate::config::{Config, TransportConfig, VoicePolicy};
use crate::playback::{AudioPlayer, SpeechSynthesizer};
use crate::presenter::PresentationSink;
use crate::transport::Connector;

/// Configuration for a voice session manager
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Gate, timeout and continuous-mode policy
    pub policy: VoicePolicy,

    /// Backend link knobs
    pub transport: TransportConfig,
}

impl From<&Config> for SessionConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            policy: cfg.voice.clone(),
            transport: cfg.transport.clone(),
        }
    }
}

/// Capability handles injected into the manager
pub struct SessionDeps {
    pub recognizer: Box<dyn SpeechRecognizer>,
    pub connector: Arc<dyn Connector>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub player: Arc<dyn AudioPlayer>,
    /// Advisory microphone level, see [`crate::audio::AudioLevelMonitor`]
    pub level: watch::Receiver<f32>,
    pub presenter: Arc<dyn PresentationSink>,
}
