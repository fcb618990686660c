use std::path::Path;
use std::path::PathBuf;

use rand::Rng;
use tokio::sync::Mutex;
use tutor_protocol::ChatMessage;
use tutor_protocol::Session;
use tutor_protocol::SessionMode;
use tutor_protocol::SessionSummary;

use crate::atomic::write_json_atomic;
use crate::error::StoreError;
use crate::error::StoreOutcome;
use crate::paths::session_file_path;

const ID_GENERATION_ATTEMPTS: u32 = 3;

/// Durable store for `Session` records. The mutex guards the
/// read-modify-write cycle of every mutating operation; all file I/O runs on
/// a blocking thread via `spawn_blocking` so the cooperative scheduler is
/// never blocked on disk (see §5 of the design doc).
pub struct SessionStore {
    sessions_dir: PathBuf,
    lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub async fn create(&self, session: Session) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let path = session_file_path(&self.sessions_dir, &session.id)?;
        write_blocking(path, session).await
    }

    /// Mint a fresh session with a random 16-hex-character id, retrying on
    /// the astronomically unlikely collision before giving up. The check and
    /// the eventual create share the same lock acquisition so two concurrent
    /// callers can never be handed the same id.
    pub async fn create_new(
        &self,
        problem_id: String,
        mode: SessionMode,
    ) -> Result<Session, StoreError> {
        let _guard = self.lock.lock().await;
        for _ in 0..ID_GENERATION_ATTEMPTS {
            let id = generate_session_id();
            let path = session_file_path(&self.sessions_dir, &id)?;
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                continue;
            }
            let session = Session::new(id, problem_id, mode);
            write_blocking(path, session.clone()).await?;
            return Ok(session);
        }
        Err(StoreError::IdGenerationExhausted(ID_GENERATION_ATTEMPTS))
    }

    pub async fn get(&self, session_id: &str) -> Result<StoreOutcome<Session>, StoreError> {
        let path = match session_file_path(&self.sessions_dir, session_id) {
            Ok(p) => p,
            Err(StoreError::InvalidSessionId) => return Ok(StoreOutcome::NotFound),
            Err(e) => return Err(e),
        };
        let _guard = self.lock.lock().await;
        Ok(read_session(&path).await)
    }

    pub async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        let path = session_file_path(&self.sessions_dir, session_id)?;
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let _guard = self.lock.lock().await;
        let dir = self.sessions_dir.clone();
        tokio::task::spawn_blocking(move || list_blocking(&dir))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e.to_string())))
    }

    /// Most recent still-open session for `problem_id`, if any. Used to back
    /// `GET /api/sessions/latest-resumable` when the client doesn't already
    /// know a session id to resume (e.g. after a full page reload).
    pub async fn latest_resumable(&self, problem_id: &str) -> Result<Option<String>, StoreError> {
        let summaries = self.list().await?;
        let best = summaries
            .into_iter()
            .filter(|s| s.problem_id == problem_id && s.ended_at.is_none())
            .max_by_key(|s| s.started_at);
        Ok(best.map(|s| s.id))
    }

    pub async fn append_message(
        &self,
        session_id: &str,
        message: ChatMessage,
    ) -> Result<(), StoreError> {
        self.mutate(session_id, |session| session.chat_history.push(message))
            .await
    }

    pub async fn set_code(&self, session_id: &str, code: String) -> Result<(), StoreError> {
        self.mutate(session_id, |session| session.last_editor_code = code)
            .await
    }

    pub async fn set_timer(&self, session_id: &str, remaining: u64) -> Result<(), StoreError> {
        self.mutate(session_id, |session| session.time_remaining = Some(remaining))
            .await
    }

    pub async fn increment_hint_count(&self, session_id: &str) -> Result<(), StoreError> {
        self.mutate(session_id, |session| session.hint_count += 1)
            .await
    }

    pub async fn set_interview_phase(
        &self,
        session_id: &str,
        phase: tutor_protocol::InterviewPhase,
    ) -> Result<(), StoreError> {
        self.mutate(session_id, |session| session.interview_phase = Some(phase))
            .await
    }

    pub async fn set_conversation_id(
        &self,
        session_id: &str,
        conversation_id: Option<String>,
    ) -> Result<(), StoreError> {
        self.mutate(session_id, |session| session.conversation_id = conversation_id)
            .await
    }

    pub async fn end(&self, session_id: &str) -> Result<(), StoreError> {
        self.mutate(session_id, |session| {
            if session.ended_at.is_none() {
                session.ended_at = Some(chrono::Utc::now());
            }
        })
        .await
    }

    /// Read-modify-write a session under the store lock. Returns
    /// `StoreError::NotFound` if the session doesn't exist or is corrupt —
    /// callers that need to distinguish the two should use `get` instead.
    async fn mutate(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut Session) + Send,
    ) -> Result<(), StoreError> {
        let path = session_file_path(&self.sessions_dir, session_id)?;
        let _guard = self.lock.lock().await;
        let mut session = match read_session(&path).await {
            StoreOutcome::Found(s) => s,
            StoreOutcome::NotFound | StoreOutcome::Corrupt => return Err(StoreError::NotFound),
        };
        f(&mut session);
        write_blocking(path, session).await
    }
}

fn generate_session_id() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 8] = rng.random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

async fn read_session(path: &Path) -> StoreOutcome<Session> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(_) => return StoreOutcome::NotFound,
    };
    match serde_json::from_slice::<Session>(&bytes) {
        Ok(session) => StoreOutcome::Found(session),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupt session file");
            StoreOutcome::Corrupt
        }
    }
}

async fn write_blocking(path: PathBuf, session: Session) -> Result<(), StoreError> {
    tokio::task::spawn_blocking(move || write_json_atomic(&path, &session))
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e.to_string())))??;
    Ok(())
}

fn list_blocking(dir: &Path) -> Vec<SessionSummary> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut summaries = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if path.file_stem().and_then(|s| s.to_str()) == Some("_problem_history") {
            continue;
        }
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read session file");
                continue;
            }
        };
        match serde_json::from_slice::<Session>(&bytes) {
            Ok(session) => summaries.push(SessionSummary::from(&session)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping corrupt session file");
            }
        }
    }
    summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tutor_protocol::Role;
    use tutor_protocol::SessionMode;

    fn new_session(id: &str) -> Session {
        Session::new(id.to_string(), "two-sum".to_string(), SessionMode::Learning)
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.create(new_session("0123456789abcdef")).await.unwrap();
        let outcome = store.get("0123456789abcdef").await.unwrap();
        match outcome {
            StoreOutcome::Found(s) => assert_eq!(s.problem_id, "two-sum"),
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_rejects_bad_id_without_touching_disk() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let outcome = store.get("../../etc/passwd").await.unwrap();
        assert!(matches!(outcome, StoreOutcome::NotFound));
    }

    #[tokio::test]
    async fn corrupt_file_is_reported_without_panicking() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        std::fs::write(dir.path().join("0123456789abcdef.json"), b"not json").unwrap();
        let outcome = store.get("0123456789abcdef").await.unwrap();
        assert!(matches!(outcome, StoreOutcome::Corrupt));
    }

    #[tokio::test]
    async fn list_skips_corrupt_files_but_returns_the_rest() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.create(new_session("0123456789abcdef")).await.unwrap();
        std::fs::write(dir.path().join("fedcba9876543210.json"), b"{ broken").unwrap();
        let summaries = store.list().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, "0123456789abcdef");
    }

    #[tokio::test]
    async fn append_message_persists_across_reads() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.create(new_session("0123456789abcdef")).await.unwrap();
        store
            .append_message(
                "0123456789abcdef",
                ChatMessage {
                    role: Role::User,
                    content: "hi".into(),
                    timestamp: chrono::Utc::now(),
                },
            )
            .await
            .unwrap();
        let session = store.get("0123456789abcdef").await.unwrap().found().unwrap();
        assert_eq!(session.chat_history.len(), 1);
    }

    #[tokio::test]
    async fn end_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.create(new_session("0123456789abcdef")).await.unwrap();
        store.end("0123456789abcdef").await.unwrap();
        let first = store.get("0123456789abcdef").await.unwrap().found().unwrap();
        store.end("0123456789abcdef").await.unwrap();
        let second = store.get("0123456789abcdef").await.unwrap().found().unwrap();
        assert_eq!(first.ended_at, second.ended_at);
    }

    #[tokio::test]
    async fn latest_resumable_prefers_open_sessions() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.create(new_session("0123456789abcdef")).await.unwrap();
        store.create(new_session("fedcba9876543210")).await.unwrap();
        store.end("fedcba9876543210").await.unwrap();
        let resumable = store.latest_resumable("two-sum").await.unwrap();
        assert_eq!(resumable.as_deref(), Some("0123456789abcdef"));
    }
}
