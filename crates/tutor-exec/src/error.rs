use thiserror::Error;

/// Pre-flight rejections only. Anything that fails *after* the child is
/// spawned (spawn failure, timeout, missing marker, a crashing interpreter)
/// is reported as a categorical error inside the result, not as an `Err`
/// here — a learner's broken code must never unwind the orchestrator.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("submitted code is {len} bytes, exceeding the {max}-byte limit")]
    CodeTooLarge { len: usize, max: usize },

    #[error("problem id is {len} characters, exceeding the {max}-character limit")]
    ProblemIdTooLong { len: usize, max: usize },

    #[error("failed to prepare run workspace: {0}")]
    WorkspaceSetup(#[source] std::io::Error),
}
