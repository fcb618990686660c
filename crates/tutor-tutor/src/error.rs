use thiserror::Error;

#[derive(Error, Debug)]
pub enum TutorError {
    #[error("failed to spawn tutor backend: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("failed to write to tutor backend stdin: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("tutor backend conversation could not be resumed")]
    Lost,

    #[error("tutor backend closed its output stream")]
    BackendClosed,

    #[error("malformed line from tutor backend: {0}")]
    MalformedLine(String),
}
