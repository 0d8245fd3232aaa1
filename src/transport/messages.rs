use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ProtocolError;

/// Client-side context attached to every command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandContext {
    pub timestamp: DateTime<Utc>,
    /// Ambient microphone level at dispatch time (advisory)
    pub audio_level: f32,
    /// Correlation id of the previous turn in the same session, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_correlation_id: Option<Uuid>,
}

/// Outbound unit of work sent to the assistant backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMessage {
    #[serde(alias = "sessionId")]
    pub session_id: Uuid,
    #[serde(alias = "correlationId")]
    pub correlation_id: Uuid,
    pub transcript: String,
    pub confidence: f32,
    pub context: CommandContext,
}

/// Reply to a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    #[serde(alias = "correlationId")]
    pub correlation_id: Uuid,

    /// Human-readable reply
    #[serde(default, alias = "response")]
    pub text: String,

    /// Pre-rendered audio for the reply
    #[serde(default, alias = "audioRef", alias = "audio_path")]
    pub audio_ref: Option<String>,

    /// Side effects performed by the backend. Opaque to the client.
    #[serde(default)]
    pub actions: Vec<Value>,

    #[serde(default)]
    pub success: Option<bool>,

    #[serde(default)]
    pub command_type: Option<String>,

    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl ResponseMessage {
    pub fn audio(&self) -> Option<&str> {
        self.audio_ref
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }

    pub fn has_speakable_content(&self) -> bool {
        self.audio().is_some() || !self.text.trim().is_empty()
    }
}

/// Frames written to the backend
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    VoiceCommand(CommandMessage),
    Ping { timestamp: DateTime<Utc> },
}

/// Frames read from the backend, classified
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Response(ResponseMessage),
    /// Audio rendered after the text reply was already delivered
    LateAudio { payload: Value },
    /// Server accepted a command and is working on it
    Processing,
    /// `connection_established` / `pong`
    Liveness,
    ServerError { message: String },
    /// Push traffic unrelated to an outstanding command
    Update(Value),
}

impl OutboundMessage {
    pub fn to_text(&self) -> String {
        // Serializing these types cannot fail: all keys are strings and all
        // values are plain data.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Classify a text frame from the backend
pub fn parse_inbound(text: &str) -> Result<InboundMessage, ProtocolError> {
    let value: Value = serde_json::from_str(text)?;
    let kind = value.get("type").and_then(Value::as_str).map(str::to_string);

    let message = match kind.as_deref() {
        Some("voice_response") => InboundMessage::Response(parse_response(value, kind)?),
        Some("voice_audio") => InboundMessage::LateAudio { payload: value },
        Some("voice_processing") => InboundMessage::Processing,
        Some("connection_established") | Some("pong") => InboundMessage::Liveness,
        Some("error") => {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string());
            InboundMessage::ServerError { message }
        }
        Some("update") => {
            InboundMessage::Update(value.get("payload").cloned().unwrap_or(Value::Null))
        }
        Some(_) => InboundMessage::Update(value),
        None if value.get("correlation_id").is_some() || value.get("correlationId").is_some() => {
            InboundMessage::Response(parse_response(value, None)?)
        }
        None => return Err(ProtocolError::MissingCorrelation(None)),
    };

    Ok(message)
}

fn parse_response(value: Value, kind: Option<String>) -> Result<ResponseMessage, ProtocolError> {
    let has_id = value.get("correlation_id").is_some() || value.get("correlationId").is_some();
    if !has_id {
        return Err(ProtocolError::MissingCorrelation(kind));
    }
    Ok(serde_json::from_value(value)?)
}
