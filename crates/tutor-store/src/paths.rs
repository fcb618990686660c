use std::path::Path;
use std::path::PathBuf;

use tutor_protocol::is_valid_problem_id;
use tutor_protocol::is_valid_session_id;

use crate::error::StoreError;

/// Build `{dir}/{id}.json`, validating `id` against the 16-hex-character
/// format *before* any path is constructed, then rejecting the result unless
/// its resolved form is strictly a descendant of `dir`. The second check
/// only matters if `dir` itself contains a symlink; the format check alone
/// already rules out `..` or `/` appearing in `id`, but both are kept so a
/// future relaxation of the id format can't silently reopen the path
/// traversal this function exists to prevent.
pub fn session_file_path(dir: &Path, id: &str) -> Result<PathBuf, StoreError> {
    if !is_valid_session_id(id) {
        return Err(StoreError::InvalidSessionId);
    }
    join_and_verify(dir, &format!("{id}.json"))
}

/// Counters are a single shared file, but every caller passes in a
/// caller-supplied `problem_id`; validate it with the same rigor before it
/// is used as a map key; this path is derived only for defense in depth
/// (see `catalog::problem_file_path` for the one place a problem id really
/// does select a file).
pub fn counters_file_path(dir: &Path) -> Result<PathBuf, StoreError> {
    join_and_verify(dir, "_problem_history.json")
}

pub fn validate_problem_id(id: &str) -> Result<(), StoreError> {
    if is_valid_problem_id(id) {
        Ok(())
    } else {
        Err(StoreError::InvalidProblemId)
    }
}

fn join_and_verify(dir: &Path, filename: &str) -> Result<PathBuf, StoreError> {
    std::fs::create_dir_all(dir)?;
    let candidate = dir.join(filename);
    let resolved_dir = dir.canonicalize()?;
    // The file itself may not exist yet; canonicalize its parent instead and
    // re-attach the filename so this works for both reads and first writes.
    let resolved_parent = candidate
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| dir.to_path_buf());
    let resolved_parent = resolved_parent.canonicalize().unwrap_or(resolved_parent);
    if resolved_parent != resolved_dir {
        return Err(StoreError::PathEscape);
    }
    Ok(candidate)
}
