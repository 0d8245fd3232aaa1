pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod http;
pub mod playback;
pub mod presenter;
pub mod session;
pub mod store;
pub mod transport;

pub use audio::{AudioBackend, AudioBackendConfig, AudioFile, AudioFrame, AudioLevelMonitor, WavFileBackend};
pub use capture::{LineRecognizer, SpeechCaptureEngine, SpeechRecognizer, TranscriptEvent};
pub use config::Config;
pub use error::{CaptureError, ErrorReason, ProtocolError, TransportError};
pub use http::{create_router, AppState};
pub use playback::{AudioPlayer, PacedSynthesizer, ResponsePlayback, SpeechSynthesizer, WavFilePlayer};
pub use presenter::{LogPresenter, PresentationSink};
pub use session::{
    Control, SessionClosed, SessionConfig, SessionDeps, SessionHandle, SessionSummary,
    VoiceSessionManager, VoiceState,
};
pub use store::{SessionSnapshot, StoreReader};
pub use transport::{ConnectionState, TransportClient, WebSocketConnector};
