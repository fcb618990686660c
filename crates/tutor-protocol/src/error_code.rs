use serde::Deserialize;
use serde::Serialize;

/// The error taxonomy from the design doc's "Error Handling Design" section,
/// carried as a closed enum so every crate boundary converts into it
/// explicitly rather than falling back to a string.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AuthRejected,
    Validation,
    NotFound,
    Conflict,
    ExecutorTimeout,
    ExecutorSpawn,
    ExecutorRuntime,
    TutorSpawn,
    TutorStream,
    StoreCorrupt,
    StoreIo,
    Internal,
}

/// The `{type: error, code, message}` envelope sent to clients. `message` is
/// intentionally generic; callers must never interpolate filesystem paths,
/// stack traces, or raw subprocess stderr into it (see `tutor-exec`'s
/// stderr-hygiene pass for the one place that sanitizes such text before it
/// is allowed anywhere near this struct).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ErrorEnvelope {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorEnvelope {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
