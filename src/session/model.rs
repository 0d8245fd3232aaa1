use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Externally visible state of the voice interaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceState {
    #[default]
    Idle,
    Listening,
    Processing,
    Speaking,
    Error,
}

/// One continuous voice interaction, from start until it returns to idle
///
/// Ending a session consumes it into a [`SessionSummary`]; a new
/// interaction always gets a new `VoiceSession`.
#[derive(Debug)]
pub struct VoiceSession {
    id: Uuid,
    created_at: DateTime<Utc>,
    commands: Vec<Uuid>,
    lost_commands: u32,
}

impl VoiceSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            commands: Vec::new(),
            lost_commands: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn last_command(&self) -> Option<Uuid> {
        self.commands.last().copied()
    }

    pub fn record_command(&mut self, correlation_id: Uuid) {
        self.commands.push(correlation_id);
    }

    pub fn record_lost(&mut self) {
        self.lost_commands += 1;
    }

    pub fn finish(self) -> SessionSummary {
        let ended_at = Utc::now();
        let duration = ended_at.signed_duration_since(self.created_at);

        SessionSummary {
            id: self.id,
            created_at: self.created_at,
            ended_at,
            commands: self.commands,
            duration_secs: duration.num_milliseconds().max(0) as f64 / 1000.0,
            lost_commands: self.lost_commands,
        }
    }
}

impl Default for VoiceSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable record of an ended session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Dispatched command correlation ids, in order
    pub commands: Vec<Uuid>,
    pub duration_secs: f64,
    /// Commands that never got an answer
    pub lost_commands: u32,
}
