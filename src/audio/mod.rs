pub mod backend;
pub mod file;
pub mod level;

pub use backend::{AudioBackend, AudioBackendConfig, AudioFrame};
pub use file::{AudioFile, WavFileBackend};
pub use level::{AudioLevelMonitor, DEFAULT_CADENCE};
