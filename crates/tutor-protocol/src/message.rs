use serde::Deserialize;
use serde::Serialize;

use crate::error_code::ErrorCode;
use crate::session::ChatMessage;
use crate::session::InterviewPhase;
use crate::session::SessionMode;

/// Inbound message from a connected client. The `type` field is the
/// discriminator; unknown or malformed payloads are rejected by the
/// orchestrator's parse step, never by this type itself.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Auth {
        token: String,
    },
    StartSession {
        problem_id: String,
        mode: SessionMode,
    },
    ResumeSession {
        session_id: String,
    },
    Message {
        content: String,
        code: String,
    },
    RequestHint {
        code: String,
    },
    NudgeRequest {
        trigger: String,
        #[serde(default)]
        context: Option<String>,
    },
    TimeUpdate {
        time_remaining: u64,
    },
    TimeUp {
        code: String,
    },
    EndSession,
}

/// Outbound message from the server. One connection may interleave messages
/// for different turns only insofar as the orchestrator's per-session lock
/// allows (see `tutor-server::orchestrator`); within a single turn the
/// sequence is always zero-or-more `AssistantChunk` then exactly one of
/// `AssistantMessage` or `Error`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    SessionStarted {
        session_id: String,
    },
    SessionResumed {
        session_id: String,
        problem_id: String,
        mode: SessionMode,
        chat_history: Vec<ChatMessage>,
        last_editor_code: String,
        time_remaining: Option<u64>,
        interview_phase: Option<InterviewPhase>,
        whiteboard_state: Option<String>,
    },
    AssistantChunk {
        text: String,
    },
    AssistantMessage {
        text: String,
    },
    ReviewPhaseStarted,
    Error {
        code: ErrorCode,
        message: String,
    },
}

impl ServerMessage {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code,
            message: message.into(),
        }
    }
}
