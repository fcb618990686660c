use thiserror::Error;
use tutor_protocol::ErrorCode;
use tutor_protocol::ErrorEnvelope;

/// Orchestrator-level outcomes. Every other crate's error type converts into
/// one of these through an explicit `From` impl below — never through a
/// catch-all `Display` — so the wire envelope's `message` field can never
/// accidentally carry a path, a stack frame, or raw subprocess stderr.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("auth rejected")]
    AuthRejected,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found")]
    NotFound,

    #[error("conflicting operation on this session")]
    Conflict,

    #[error("executor timed out")]
    ExecutorTimeout,

    #[error("executor failed to start")]
    ExecutorSpawn,

    #[error("executor runtime error")]
    ExecutorRuntime,

    #[error("tutor backend failed to start")]
    TutorSpawn,

    #[error("tutor backend stream failed")]
    TutorStream,

    #[error("session record is corrupt")]
    StoreCorrupt,

    #[error("store io error")]
    StoreIo,

    #[error("internal error")]
    Internal,
}

impl OrchestratorError {
    /// The one place a `OrchestratorError` becomes the generic, detail-free
    /// pair a client is allowed to see. Internal detail stays at the
    /// `tracing::error!`/`tracing::warn!` call sites that produced the error.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        let code = match self {
            OrchestratorError::AuthRejected => ErrorCode::AuthRejected,
            OrchestratorError::Validation(_) => ErrorCode::Validation,
            OrchestratorError::NotFound => ErrorCode::NotFound,
            OrchestratorError::Conflict => ErrorCode::Conflict,
            OrchestratorError::ExecutorTimeout => ErrorCode::ExecutorTimeout,
            OrchestratorError::ExecutorSpawn => ErrorCode::ExecutorSpawn,
            OrchestratorError::ExecutorRuntime => ErrorCode::ExecutorRuntime,
            OrchestratorError::TutorSpawn => ErrorCode::TutorSpawn,
            OrchestratorError::TutorStream => ErrorCode::TutorStream,
            OrchestratorError::StoreCorrupt => ErrorCode::StoreCorrupt,
            OrchestratorError::StoreIo => ErrorCode::StoreIo,
            OrchestratorError::Internal => ErrorCode::Internal,
        };
        let message = match self {
            OrchestratorError::Validation(detail) => detail.clone(),
            _ => generic_message(code),
        };
        ErrorEnvelope::new(code, message)
    }

    pub fn http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            OrchestratorError::AuthRejected => StatusCode::UNAUTHORIZED,
            OrchestratorError::Validation(_) => StatusCode::BAD_REQUEST,
            OrchestratorError::NotFound => StatusCode::NOT_FOUND,
            OrchestratorError::Conflict => StatusCode::CONFLICT,
            OrchestratorError::ExecutorTimeout
            | OrchestratorError::ExecutorSpawn
            | OrchestratorError::ExecutorRuntime
            | OrchestratorError::TutorSpawn
            | OrchestratorError::TutorStream
            | OrchestratorError::StoreCorrupt
            | OrchestratorError::StoreIo
            | OrchestratorError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn generic_message(code: ErrorCode) -> String {
    match code {
        ErrorCode::AuthRejected => "authentication failed".to_string(),
        ErrorCode::Validation => "invalid request".to_string(),
        ErrorCode::NotFound => "not found".to_string(),
        ErrorCode::Conflict => "conflicting request in progress".to_string(),
        ErrorCode::ExecutorTimeout => "code took too long to run".to_string(),
        ErrorCode::ExecutorSpawn => "failed to run code".to_string(),
        ErrorCode::ExecutorRuntime => "execution failed".to_string(),
        ErrorCode::TutorSpawn => "tutor is unavailable".to_string(),
        ErrorCode::TutorStream => "tutor connection was interrupted".to_string(),
        ErrorCode::StoreCorrupt => "session record is unreadable".to_string(),
        ErrorCode::StoreIo => "a storage error occurred".to_string(),
        ErrorCode::Internal => "an internal error occurred".to_string(),
    }
}

impl From<tutor_store::StoreError> for OrchestratorError {
    fn from(e: tutor_store::StoreError) -> Self {
        match e {
            tutor_store::StoreError::InvalidSessionId | tutor_store::StoreError::InvalidProblemId => {
                OrchestratorError::Validation("invalid id".to_string())
            }
            tutor_store::StoreError::PathEscape => OrchestratorError::Validation("invalid id".to_string()),
            tutor_store::StoreError::NotFound => OrchestratorError::NotFound,
            tutor_store::StoreError::Io(e) => {
                tracing::error!(error = %e, "store io error");
                OrchestratorError::StoreIo
            }
            tutor_store::StoreError::IdGenerationExhausted(attempts) => {
                tracing::error!(attempts, "session id generation exhausted");
                OrchestratorError::Internal
            }
        }
    }
}

impl From<tutor_exec::ExecutorError> for OrchestratorError {
    fn from(e: tutor_exec::ExecutorError) -> Self {
        tracing::warn!(error = %e, "executor rejected request");
        match e {
            tutor_exec::ExecutorError::CodeTooLarge { .. } | tutor_exec::ExecutorError::ProblemIdTooLong { .. } => {
                OrchestratorError::Validation(e.to_string())
            }
            tutor_exec::ExecutorError::WorkspaceSetup(_) => OrchestratorError::ExecutorSpawn,
        }
    }
}

impl From<tutor_tutor::TutorError> for OrchestratorError {
    fn from(e: tutor_tutor::TutorError) -> Self {
        tracing::warn!(error = %e, "tutor adapter error");
        match e {
            tutor_tutor::TutorError::SpawnFailed(_) => OrchestratorError::TutorSpawn,
            tutor_tutor::TutorError::WriteFailed(_)
            | tutor_tutor::TutorError::BackendClosed
            | tutor_tutor::TutorError::MalformedLine(_) => OrchestratorError::TutorStream,
            tutor_tutor::TutorError::Lost => OrchestratorError::Conflict,
        }
    }
}
