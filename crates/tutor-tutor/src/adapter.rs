use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[cfg(unix)]
use std::os::unix::process::CommandExt;

use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::process::Child;
use tokio::process::ChildStdin;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

use crate::error::TutorError;
use crate::wire::BackendLine;
use crate::wire::BackendRequest;

/// Queue depth between the backend's stdout reader and `chat`'s drain loop.
/// Bounds how far a slow client (one that isn't consuming chunks) can let
/// the backend get ahead before the reader task's send blocks, which in turn
/// leaves the subprocess's own stdout pipe buffer to apply backpressure.
const CHUNK_QUEUE_DEPTH: usize = 64;
const END_GRACE: std::time::Duration = std::time::Duration::from_millis(500);

pub struct ChatResult {
    pub text: String,
    pub conversation_id: Option<String>,
}

/// Owns exactly one tutor backend subprocess and its pipes for the life of a
/// session. Safe to hold across a disconnect/reconnect cycle via the
/// registry's park/reclaim; `chat` and `end` are the only methods that touch
/// the child, and both tolerate being called after it has already exited.
pub struct TutorAdapter {
    session_id: String,
    workspace: PathBuf,
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    output_rx: Mutex<mpsc::Receiver<BackendLine>>,
    alive: Arc<AtomicBool>,
    conversation_id: Mutex<Option<String>>,
}

impl TutorAdapter {
    /// Spawns `backend_cmd` with `workspace` as its working directory and a
    /// fresh session group, and starts the background line reader.
    pub fn start(
        session_id: String,
        workspace: PathBuf,
        backend_cmd: &str,
        backend_args: &[String],
    ) -> Result<Self, TutorError> {
        std::fs::create_dir_all(&workspace).map_err(TutorError::SpawnFailed)?;

        let mut cmd = Command::new(backend_cmd);
        cmd.args(backend_args)
            .current_dir(&workspace)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(TutorError::SpawnFailed)?;
        let stdin = child.stdin.take().expect("stdin piped");
        let stdout = child.stdout.take().expect("stdout piped");

        let (tx, rx) = mpsc::channel(CHUNK_QUEUE_DEPTH);
        let alive = Arc::new(AtomicBool::new(true));
        spawn_reader(stdout, tx, Arc::clone(&alive));

        Ok(Self {
            session_id,
            workspace,
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            output_rx: Mutex::new(rx),
            alive,
            conversation_id: Mutex::new(None),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub async fn conversation_id(&self) -> Option<String> {
        self.conversation_id.lock().await.clone()
    }

    /// Sends one request and drains chunks until `done`, invoking `on_chunk`
    /// for each streamed piece of text. Locking `output_rx` for the whole
    /// call is what makes "only one chat in flight" true even if a caller
    /// forgets to serialize on their own end.
    pub async fn chat(&self, user_message: &str, current_code: &str) -> Result<ChunkDrain<'_>, TutorError> {
        if !self.is_alive() {
            return Err(TutorError::BackendClosed);
        }
        let request = BackendRequest::Chat {
            message: user_message,
            code: current_code,
        };
        self.write_request(&request).await?;
        Ok(ChunkDrain { adapter: self })
    }

    /// Asks the backend to reattach `conversation_id`. Succeeds only if the
    /// backend answers with a `resume_ack{ok: true}` line; any other
    /// response, or the channel closing first, is reported as `Lost` so the
    /// orchestrator can fall back to replaying chat history into a fresh
    /// adapter instead.
    pub async fn resume(&self, conversation_id: &str) -> Result<(), TutorError> {
        if !self.is_alive() {
            return Err(TutorError::Lost);
        }
        self.write_request(&BackendRequest::Resume { conversation_id }).await?;
        let mut rx = self.output_rx.lock().await;
        match rx.recv().await {
            Some(BackendLine::ResumeAck { ok: true }) => {
                *self.conversation_id.lock().await = Some(conversation_id.to_string());
                Ok(())
            }
            _ => Err(TutorError::Lost),
        }
    }

    async fn write_request(&self, request: &BackendRequest<'_>) -> Result<(), TutorError> {
        let line = serde_json::to_string(request).map_err(|e| TutorError::WriteFailed(io::Error::other(e)))?;
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(TutorError::WriteFailed)?;
        stdin.write_all(b"\n").await.map_err(TutorError::WriteFailed)?;
        stdin.flush().await.map_err(TutorError::WriteFailed)
    }

    /// Closes stdin, signals the process group, and after a grace period
    /// kills it outright. Idempotent: calling `end` twice, or calling it
    /// after the child already exited on its own, is a no-op both times.
    pub async fn end(&self) {
        self.alive.store(false, Ordering::Release);
        {
            let mut stdin = self.stdin.lock().await;
            let _ = stdin.shutdown().await;
        }
        let mut child = self.child.lock().await;
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            unsafe {
                libc::kill(-(pid as i32), libc::SIGTERM);
            }
        }
        let already_exited = tokio::time::timeout(END_GRACE, child.wait()).await.is_ok();
        if !already_exited {
            #[cfg(unix)]
            if let Some(pid) = child.id() {
                unsafe {
                    libc::kill(-(pid as i32), libc::SIGKILL);
                }
            }
            let _ = child.wait().await;
        }
    }
}

/// Drains the chunk queue for one `chat` call. Callers pull chunks with
/// `next()` until it yields `Done` with the final assembled text.
pub struct ChunkDrain<'a> {
    adapter: &'a TutorAdapter,
}

pub enum DrainedChunk {
    Text(String),
    Done(ChatResult),
}

impl ChunkDrain<'_> {
    pub async fn next(&mut self) -> Result<DrainedChunk, TutorError> {
        let mut rx = self.adapter.output_rx.lock().await;
        match rx.recv().await {
            Some(BackendLine::Chunk { text }) => Ok(DrainedChunk::Text(text)),
            Some(BackendLine::Done { text, conversation_id }) => {
                if let Some(id) = conversation_id.clone() {
                    *self.adapter.conversation_id.lock().await = Some(id);
                }
                Ok(DrainedChunk::Done(ChatResult { text, conversation_id }))
            }
            Some(BackendLine::ResumeAck { .. }) => {
                Err(TutorError::MalformedLine("unexpected resume_ack during chat".to_string()))
            }
            None => {
                self.adapter.alive.store(false, Ordering::Release);
                Err(TutorError::BackendClosed)
            }
        }
    }
}

fn spawn_reader(
    stdout: tokio::process::ChildStdout,
    tx: mpsc::Sender<BackendLine>,
    alive: Arc<AtomicBool>,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<BackendLine>(&line) {
                        Ok(parsed) => {
                            if tx.send(parsed).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "dropping malformed line from tutor backend");
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "error reading from tutor backend stdout");
                    break;
                }
            }
        }
        alive.store(false, Ordering::Release);
    });
}
