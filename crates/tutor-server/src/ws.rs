use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::CloseFrame;
use axum::extract::ws::Message;
use axum::extract::ws::WebSocket;
use axum::extract::State;
use axum::extract::WebSocketUpgrade;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use tutor_protocol::ChatMessage;
use tutor_protocol::ClientMessage;
use tutor_protocol::ErrorCode;
use tutor_protocol::InterviewPhase;
use tutor_protocol::Role;
use tutor_protocol::Session;
use tutor_protocol::ServerMessage;
use tutor_protocol::SessionMode;
use tutor_tutor::DrainedChunk;
use tutor_tutor::TutorAdapter;

use crate::error::OrchestratorError;
use crate::state::AppState;

const AUTH_REJECTED_CLOSE_CODE: u16 = 4001;
const RESUME_DEADLINE: Duration = Duration::from_secs(30);

pub async fn ws_handler(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_connection(state, socket))
}

/// One orchestrator instance per connection. Owns the session it currently
/// has open and, if any, the tutor adapter reclaimed or spawned for it;
/// both are released in `cleanup` on every exit path.
struct Connection {
    state: Arc<AppState>,
    session_id: Option<String>,
    adapter: Option<Arc<TutorAdapter>>,
}

async fn run_connection(state: Arc<AppState>, socket: WebSocket) {
    let (mut tx, mut rx) = socket.split();

    let authed = match rx.next().await {
        Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Auth { token }) => state.auth.validate(&token).await,
            _ => false,
        },
        _ => false,
    };

    if !authed {
        let _ = tx
            .send(Message::Close(Some(CloseFrame {
                code: AUTH_REJECTED_CLOSE_CODE,
                reason: "auth rejected".into(),
            })))
            .await;
        return;
    }

    let mut conn = Connection {
        state,
        session_id: None,
        adapter: None,
    };

    while let Some(frame) = rx.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let parsed = match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Auth { .. }) => {
                continue;
            }
            Ok(msg) => msg,
            Err(e) => {
                let envelope = OrchestratorError::Validation(format!("malformed message: {e}")).to_envelope();
                if send_error(&mut tx, envelope.code, envelope.message).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let lock = match &conn.session_id {
            Some(id) => Some(conn.state.session_lock(id).await),
            None => None,
        };
        let _guard = match &lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };
        conn.dispatch(parsed, &mut tx).await;
    }

    conn.cleanup().await;
}

type WsSink = futures::stream::SplitSink<WebSocket, Message>;

impl Connection {
    async fn dispatch(&mut self, msg: ClientMessage, tx: &mut WsSink) {
        let result = match msg {
            ClientMessage::Auth { .. } => Ok(()),
            ClientMessage::StartSession { problem_id, mode } => self.start_session(problem_id, mode, tx).await,
            ClientMessage::ResumeSession { session_id } => self.resume_session(session_id, tx).await,
            ClientMessage::Message { content, code } => self.chat_turn(content, code, ChatKind::Message, tx).await,
            ClientMessage::RequestHint { code } => {
                self.chat_turn("Please give me a hint.".to_string(), code, ChatKind::Hint, tx)
                    .await
            }
            ClientMessage::NudgeRequest { trigger, context } => {
                let content = format!("[nudge:{trigger}] {}", context.unwrap_or_default());
                self.chat_turn(content, String::new(), ChatKind::Nudge, tx).await
            }
            ClientMessage::TimeUpdate { time_remaining } => self.time_update(time_remaining).await,
            ClientMessage::TimeUp { code } => self.time_up(code, tx).await,
            ClientMessage::EndSession => self.end_session().await,
        };

        if let Err(e) = result {
            let envelope = e.to_envelope();
            let _ = send_error(tx, envelope.code, envelope.message).await;
        }
    }

    async fn start_session(
        &mut self,
        problem_id: String,
        mode: SessionMode,
        tx: &mut WsSink,
    ) -> Result<(), OrchestratorError> {
        if self.session_id.is_some() {
            self.end_session().await?;
        }

        if self.state.catalog.get(&problem_id).is_none() {
            return Err(OrchestratorError::Validation("unknown problem id".to_string()));
        }

        let session = self.state.store.create_new(problem_id.clone(), mode).await?;
        let session_id = session.id.clone();

        let adapter = spawn_adapter(&self.state, &session_id)?;

        self.session_id = Some(session_id.clone());
        self.adapter = Some(Arc::new(adapter));

        send(tx, ServerMessage::SessionStarted { session_id }).await
    }

    async fn resume_session(&mut self, session_id: String, tx: &mut WsSink) -> Result<(), OrchestratorError> {
        let outcome = self.state.store.get(&session_id).await?;
        let session = match outcome {
            tutor_store::StoreOutcome::Found(session) => session,
            tutor_store::StoreOutcome::NotFound => return Err(OrchestratorError::NotFound),
            tutor_store::StoreOutcome::Corrupt => return Err(OrchestratorError::StoreCorrupt),
        };

        let adapter = match tokio::time::timeout(RESUME_DEADLINE, self.reclaim_or_respawn(&session_id, &session)).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(session_id, "resume attempt exceeded its deadline");
                return Err(OrchestratorError::TutorSpawn);
            }
        };

        self.session_id = Some(session_id.clone());
        self.adapter = Some(adapter);

        send(
            tx,
            ServerMessage::SessionResumed {
                session_id,
                problem_id: session.problem_id,
                mode: session.mode,
                chat_history: session.chat_history,
                last_editor_code: session.last_editor_code,
                time_remaining: session.time_remaining,
                interview_phase: session.interview_phase,
                whiteboard_state: session.whiteboard_state,
            },
        )
        .await
    }

    /// Reclaims a parked adapter, or spawns a fresh one. A fresh adapter
    /// tries to reattach the backend's own `conversation_id` first; only if
    /// the backend can't (or never had one) does it fall back to replaying
    /// the session's stored user turns. Split out from `resume_session` so
    /// the whole thing can be raced against the resume deadline as one
    /// future.
    async fn reclaim_or_respawn(
        &self,
        session_id: &str,
        session: &Session,
    ) -> Result<Arc<TutorAdapter>, OrchestratorError> {
        if let Some(adapter) = self.state.registry.reclaim(session_id).await {
            return Ok(adapter);
        }
        if self.state.catalog.get(&session.problem_id).is_none() {
            return Err(OrchestratorError::NotFound);
        }
        let adapter = Arc::new(spawn_adapter(&self.state, session_id)?);

        let reattached = match &session.conversation_id {
            Some(conversation_id) => adapter.resume(conversation_id).await.is_ok(),
            None => false,
        };
        if !reattached {
            replay_history(&adapter, session).await;
        }
        Ok(adapter)
    }

    async fn chat_turn(
        &mut self,
        content: String,
        code: String,
        kind: ChatKind,
        tx: &mut WsSink,
    ) -> Result<(), OrchestratorError> {
        let session_id = self.session_id.clone().ok_or(OrchestratorError::Validation("no active session".to_string()))?;
        let adapter = self.adapter.clone().ok_or(OrchestratorError::Internal)?;

        if !code.is_empty() {
            self.state.store.set_code(&session_id, code.clone()).await?;
        }
        self.state
            .store
            .append_message(
                &session_id,
                ChatMessage {
                    role: Role::User,
                    content: content.clone(),
                    timestamp: chrono::Utc::now(),
                },
            )
            .await?;

        let mut drain = adapter.chat(&content, &code).await?;
        let mut counted_hint = !matches!(kind, ChatKind::Hint);
        let mut assembled = String::new();

        loop {
            match drain.next().await {
                Ok(DrainedChunk::Text(text)) => {
                    if !counted_hint {
                        self.state.store.increment_hint_count(&session_id).await?;
                        tracing::debug!(session_id, "hint counted after streaming began");
                        counted_hint = true;
                    }
                    assembled.push_str(&text);
                    send(tx, ServerMessage::AssistantChunk { text }).await?;
                }
                Ok(DrainedChunk::Done(result)) => {
                    let final_text = if result.text.is_empty() { assembled } else { result.text };
                    self.state
                        .store
                        .append_message(
                            &session_id,
                            ChatMessage {
                                role: Role::Assistant,
                                content: final_text.clone(),
                                timestamp: chrono::Utc::now(),
                            },
                        )
                        .await?;
                    if let Some(conversation_id) = result.conversation_id {
                        self.state.store.set_conversation_id(&session_id, Some(conversation_id)).await?;
                    }
                    return send(tx, ServerMessage::AssistantMessage { text: final_text }).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn time_update(&mut self, time_remaining: u64) -> Result<(), OrchestratorError> {
        let session_id = self.session_id.clone().ok_or(OrchestratorError::Validation("no active session".to_string()))?;
        self.state.store.set_timer(&session_id, time_remaining).await?;
        Ok(())
    }

    async fn time_up(&mut self, code: String, tx: &mut WsSink) -> Result<(), OrchestratorError> {
        let session_id = self.session_id.clone().ok_or(OrchestratorError::Validation("no active session".to_string()))?;
        if !code.is_empty() {
            self.state.store.set_code(&session_id, code).await?;
        }
        self.state
            .store
            .set_interview_phase(&session_id, InterviewPhase::Review)
            .await?;
        send(tx, ServerMessage::ReviewPhaseStarted).await
    }

    async fn end_session(&mut self) -> Result<(), OrchestratorError> {
        let Some(session_id) = self.session_id.take() else {
            return Ok(());
        };
        self.state.store.end(&session_id).await?;
        if let Some(adapter) = self.adapter.take() {
            adapter.end().await;
            let _ = tokio::fs::remove_dir_all(self.state.workspace_for(&session_id)).await;
        }
        Ok(())
    }

    /// Runs on every exit path (disconnect, fatal error, or normal end).
    /// Each step is independent so a failure in one doesn't skip the rest.
    /// A bare disconnect within the park TTL is not terminal: `ended_at` is
    /// only written when the adapter isn't going to be parked, so
    /// `latest_resumable` can still find the session until the sweep
    /// actually reaps it.
    async fn cleanup(&mut self) {
        let Some(session_id) = self.session_id.take() else {
            return;
        };

        if let Some(adapter) = self.adapter.take() {
            if adapter.is_alive() {
                self.state.registry.park(session_id, adapter).await;
                return;
            }
            adapter.end().await;
            let _ = tokio::fs::remove_dir_all(self.state.workspace_for(&session_id)).await;
        }

        if let Err(e) = self.state.store.end(&session_id).await {
            tracing::warn!(session_id, error = %e, "failed to finalize session on disconnect");
        }
    }
}

enum ChatKind {
    Message,
    Hint,
    Nudge,
}

fn spawn_adapter(state: &AppState, session_id: &str) -> Result<TutorAdapter, OrchestratorError> {
    let workspace = state.workspace_for(session_id);
    TutorAdapter::start(
        session_id.to_string(),
        workspace,
        &state.config.tutor_backend_cmd,
        &state.config.tutor_backend_args,
    )
    .map_err(OrchestratorError::from)
}

async fn replay_history(adapter: &TutorAdapter, session: &Session) {
    for message in &session.chat_history {
        if matches!(message.role, Role::User) {
            if let Ok(mut drain) = adapter.chat(&message.content, &session.last_editor_code).await {
                while matches!(drain.next().await, Ok(DrainedChunk::Text(_))) {}
            }
        }
    }
}

async fn send(tx: &mut WsSink, msg: ServerMessage) -> Result<(), OrchestratorError> {
    let text = serde_json::to_string(&msg).map_err(|_| OrchestratorError::Internal)?;
    tx.send(Message::Text(text.into())).await.map_err(|_| OrchestratorError::Internal)
}

async fn send_error(tx: &mut WsSink, code: ErrorCode, message: String) -> Result<(), axum::Error> {
    let msg = ServerMessage::error(code, message);
    let text = serde_json::to_string(&msg).unwrap_or_default();
    tx.send(Message::Text(text.into())).await
}
