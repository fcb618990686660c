use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

/// Serialize `value` and replace `path` with it atomically: write to a
/// sibling temp file in the same directory, then `rename` over the target.
/// A crash or power loss between the write and the rename leaves whichever
/// of the two files was last durably renamed untouched — the readable
/// content at `path` is always either the previous version or the new one,
/// never a half-written one.
///
/// Runs on a blocking thread via `tokio::task::spawn_blocking` at the call
/// site (see `session_store.rs`); this function itself is synchronous so it
/// can be unit tested without an async runtime.
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| std::io::Error::other(format!("failed to serialize: {e}")))?;
    tmp.write_all(&json)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| std::io::Error::other(format!("failed to rename into place: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde::Serialize;
    use tempfile::tempdir;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Payload {
        value: u32,
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("thing.json");
        write_json_atomic(&path, &Payload { value: 42 }).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let read_back: Payload = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(read_back, Payload { value: 42 });
    }

    #[test]
    fn overwrite_never_leaves_file_missing_or_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("thing.json");
        write_json_atomic(&path, &Payload { value: 1 }).unwrap();
        write_json_atomic(&path, &Payload { value: 2 }).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(!bytes.is_empty());
        let read_back: Payload = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(read_back, Payload { value: 2 });
    }
}
