use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid session id")]
    InvalidSessionId,

    #[error("invalid problem id")]
    InvalidProblemId,

    #[error("path escapes the store root")]
    PathEscape,

    #[error("session not found")]
    NotFound,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to generate a unique session id after {0} attempts")]
    IdGenerationExhausted(u32),
}

/// `get()` distinguishes "doesn't exist", "exists but unreadable", and
/// "exists and is fine" so a corrupt file on disk never turns into a 500 or
/// a panic further up the stack (see P2/P3 and scenario 5 in the design
/// doc's testable properties).
#[derive(Debug)]
pub enum StoreOutcome<T> {
    Found(T),
    NotFound,
    Corrupt,
}

impl<T> StoreOutcome<T> {
    pub fn found(self) -> Option<T> {
        match self {
            StoreOutcome::Found(v) => Some(v),
            _ => None,
        }
    }
}
