use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub voice: VoicePolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            http: HttpConfig::default(),
        }
    }
}

fn default_name() -> String {
    "voice-session".to_string()
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3939
}

/// Connection and delivery knobs for the backend link
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Backend WebSocket endpoint (ws:// or wss://)
    pub url: String,

    /// Optional credential, appended as the `token` query parameter
    pub auth_token: Option<String>,

    /// Maximum number of commands held while the link is down
    pub queue_capacity: usize,

    /// First reconnect delay; doubles on every failed attempt
    pub backoff_base_ms: u64,

    /// Upper bound for a single reconnect delay
    pub backoff_max_ms: u64,

    /// Reconnect attempts before the link is declared failed
    pub max_attempts: u32,

    /// Hard limit on a single connect attempt
    pub attempt_timeout_ms: u64,

    /// Ping cadence while connected; two silent intervals count as a dead link
    pub heartbeat_interval_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws".to_string(),
            auth_token: None,
            queue_capacity: 50,
            backoff_base_ms: 1_000,
            backoff_max_ms: 30_000,
            max_attempts: 5,
            attempt_timeout_ms: 10_000,
            heartbeat_interval_ms: 25_000,
        }
    }
}

impl TransportConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

/// Session-level policy knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoicePolicy {
    /// Final transcripts below this confidence are not dispatched.
    /// Default 0.0 accepts every final result.
    pub min_confidence: f32,

    /// Resume listening after each reply instead of returning to idle
    pub continuous: bool,

    /// How long to wait for the matching response
    pub response_timeout_ms: u64,

    /// Dispatches allowed per command (original + manual retries)
    pub max_command_attempts: u32,
}

impl Default for VoicePolicy {
    fn default() -> Self {
        Self {
            min_confidence: 0.0,
            continuous: false,
            response_timeout_ms: 15_000,
            max_command_attempts: 2,
        }
    }
}

impl VoicePolicy {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn accepts(&self, confidence: f32) -> bool {
        confidence >= self.min_confidence
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("VOICE_SESSION").separator("__"))
            .build()
            .with_context(|| format!("Failed to read config {}", path))?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_accepts_zero_confidence() {
        let policy = VoicePolicy::default();
        assert!(policy.accepts(0.0));
        assert!(policy.accepts(0.42));
    }

    #[test]
    fn test_strict_policy_gates_low_confidence() {
        let policy = VoicePolicy {
            min_confidence: 0.6,
            ..VoicePolicy::default()
        };
        assert!(!policy.accepts(0.59));
        assert!(policy.accepts(0.6));
    }

    #[test]
    fn test_transport_defaults() {
        let cfg = TransportConfig::default();
        assert_eq!(cfg.queue_capacity, 50);
        assert_eq!(cfg.backoff_base(), Duration::from_secs(1));
        assert_eq!(cfg.backoff_max(), Duration::from_secs(30));
        assert_eq!(cfg.max_attempts, 5);
    }

    #[test]
    fn test_partial_file_keeps_defaults() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("voice.toml");
        std::fs::write(&path, "[voice]\ncontinuous = true\n")?;

        let stem = dir.path().join("voice");
        let cfg = Config::load(&stem.to_string_lossy())?;

        assert!(cfg.voice.continuous);
        assert_eq!(cfg.voice.response_timeout(), Duration::from_secs(15));
        assert_eq!(cfg.service.name, "voice-session");
        assert_eq!(cfg.transport.queue_capacity, 50);
        Ok(())
    }
}
