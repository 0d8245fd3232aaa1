//! Response playback
//!
//! Arbitrates between locally synthesized speech and remote audio for an
//! assistant reply. Only one plays at a time and every playback is
//! cancelable.

mod arbiter;
mod headless;
mod sink;

pub use arbiter::{PlaybackContent, PlaybackFinished, PlaybackSource, PlaybackStatus, ResponsePlayback};
pub use headless::{PacedSynthesizer, WavFilePlayer};
pub use sink::{AudioPlayer, SpeechSynthesizer};
