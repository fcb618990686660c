use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Learning,
    Interview,
    PatternQuiz,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InterviewPhase {
    Solving,
    Review,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Everything the store persists for one session. Mutated exclusively under
/// the owning orchestrator's per-session lock and written atomically after
/// every mutation (see `tutor-store`).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Session {
    pub id: String,
    pub problem_id: String,
    pub mode: SessionMode,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    #[serde(default)]
    pub hint_count: u32,
    #[serde(default)]
    pub last_editor_code: String,
    #[serde(default)]
    pub time_remaining: Option<u64>,
    #[serde(default)]
    pub interview_phase: Option<InterviewPhase>,
    #[serde(default)]
    pub whiteboard_state: Option<String>,
    /// Upstream tutor conversation id, if the backend supports resuming one.
    /// Not meaningful on its own: a fresh process still needs `reclaim` to
    /// succeed for this to be usable (see `tutor-tutor`).
    #[serde(default)]
    pub conversation_id: Option<String>,
}

impl Session {
    pub fn new(id: String, problem_id: String, mode: SessionMode) -> Self {
        let interview_phase = match mode {
            SessionMode::Interview => Some(InterviewPhase::Solving),
            _ => None,
        };
        Self {
            id,
            problem_id,
            mode,
            started_at: Utc::now(),
            ended_at: None,
            chat_history: Vec::new(),
            hint_count: 0,
            last_editor_code: String::new(),
            time_remaining: None,
            interview_phase,
            whiteboard_state: None,
            conversation_id: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Lightweight projection returned by `Store::list`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionSummary {
    pub id: String,
    pub problem_id: String,
    pub mode: SessionMode,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<&Session> for SessionSummary {
    fn from(s: &Session) -> Self {
        Self {
            id: s.id.clone(),
            problem_id: s.problem_id.clone(),
            mode: s.mode,
            started_at: s.started_at,
            ended_at: s.ended_at,
        }
    }
}
