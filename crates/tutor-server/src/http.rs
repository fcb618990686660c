use std::sync::Arc;

use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde::Serialize;
use tutor_protocol::ExecResult;
use tutor_protocol::ProblemSummary;
use tutor_protocol::RunMode;
use tutor_protocol::SessionSummary;

use crate::error::OrchestratorError;
use crate::state::AppState;

impl IntoResponse for OrchestratorError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let envelope = self.to_envelope();
        (status, Json(envelope)).into_response()
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    token: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    client_addr: axum::extract::ConnectInfo<std::net::SocketAddr>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, OrchestratorError> {
    let client_key = client_addr.0.ip().to_string();
    if !state.auth.check_rate_limit(&client_key).await {
        return Err(OrchestratorError::AuthRejected);
    }
    match state.auth.login(&body.password).await {
        Some(token) => Ok(Json(LoginResponse { token })),
        None => Err(OrchestratorError::AuthRejected),
    }
}

#[derive(Serialize)]
pub struct AuthStatusResponse {
    auth_required: bool,
}

pub async fn auth_status(State(state): State<Arc<AppState>>) -> Json<AuthStatusResponse> {
    Json(AuthStatusResponse {
        auth_required: state.auth.is_enabled(),
    })
}

pub async fn list_problems(State(state): State<Arc<AppState>>) -> Json<Vec<ProblemSummary>> {
    Json(state.catalog.list())
}

pub async fn get_problem(
    State(state): State<Arc<AppState>>,
    Path(problem_id): Path<String>,
) -> Result<Json<tutor_protocol::Problem>, OrchestratorError> {
    state
        .catalog
        .get(&problem_id)
        .cloned()
        .map(Json)
        .ok_or(OrchestratorError::NotFound)
}

#[derive(Deserialize)]
pub struct RunRequest {
    problem_id: String,
    code: String,
}

pub async fn run_code(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RunRequest>,
) -> Result<Json<ExecResult>, OrchestratorError> {
    execute(&state, body.problem_id, body.code, RunMode::Run).await
}

pub async fn submit_code(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RunRequest>,
) -> Result<Json<ExecResult>, OrchestratorError> {
    let result = execute(&state, body.problem_id.clone(), body.code, RunMode::Submit).await?;
    state.counters.record_attempt(&body.problem_id).await?;
    if result.0.all_passed() {
        state.counters.record_solve(&body.problem_id).await?;
    }
    Ok(result)
}

async fn execute(
    state: &AppState,
    problem_id: String,
    code: String,
    mode: RunMode,
) -> Result<Json<ExecResult>, OrchestratorError> {
    let problem = state.catalog.get(&problem_id).ok_or(OrchestratorError::NotFound)?;
    let result = state.executor.run(&code, problem, mode).await?;
    Ok(Json(result))
}

pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Result<Json<Vec<SessionSummary>>, OrchestratorError> {
    Ok(Json(state.store.list().await?))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<tutor_protocol::Session>, OrchestratorError> {
    match state.store.get(&session_id).await? {
        tutor_store::StoreOutcome::Found(session) => Ok(Json(session)),
        tutor_store::StoreOutcome::NotFound => Err(OrchestratorError::NotFound),
        tutor_store::StoreOutcome::Corrupt => Err(OrchestratorError::StoreCorrupt),
    }
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, OrchestratorError> {
    state.registry.kill(&session_id).await;
    let _ = tokio::fs::remove_dir_all(state.workspace_for(&session_id)).await;
    if state.store.delete(&session_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(OrchestratorError::NotFound)
    }
}

#[derive(Deserialize)]
pub struct LatestResumableQuery {
    problem_id: String,
}

#[derive(Serialize)]
pub struct LatestResumableResponse {
    session_id: Option<String>,
}

pub async fn latest_resumable(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LatestResumableQuery>,
) -> Result<Json<LatestResumableResponse>, OrchestratorError> {
    let session_id = state.store.latest_resumable(&query.problem_id).await?;
    Ok(Json(LatestResumableResponse { session_id }))
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

pub async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tempfile::TempDir;
    use tutor_common::Config;
    use tutor_exec::Executor;
    use tutor_store::CounterStore;
    use tutor_store::SessionStore;
    use tutor_tutor::TutorRegistry;

    fn test_state(dir: &TempDir) -> Arc<AppState> {
        let problems_dir = dir.path().join("problems");
        std::fs::create_dir_all(&problems_dir).unwrap();
        std::fs::write(
            problems_dir.join("two-sum.json"),
            r#"{
                "id": "two-sum",
                "title": "Two Sum",
                "difficulty": "easy",
                "tags": ["arrays"],
                "entry_point": "two_sum",
                "test_cases": [{"input": [[2, 7], 9], "expected": [0, 1]}]
            }"#,
        )
        .unwrap();

        let sessions_dir = dir.path().join("sessions");
        let workspaces_dir = dir.path().join("workspaces");
        let catalog = tutor_store::Catalog::load(&problems_dir);
        let store = SessionStore::new(&sessions_dir);
        let counters = CounterStore::new(&sessions_dir).unwrap();
        let executor = Arc::new(Executor::new(&workspaces_dir));
        let registry = Arc::new(TutorRegistry::new());
        let auth = Arc::new(crate::auth::AuthManager::new(Some("hunter2".to_string())));
        let config = Config {
            sessions_dir: sessions_dir.clone(),
            workspaces_dir: workspaces_dir.clone(),
            problems_dir,
            ..Config::default()
        };
        Arc::new(AppState::new(
            config,
            catalog,
            store,
            counters,
            registry,
            executor,
            auth,
            workspaces_dir,
        ))
    }

    fn client_addr() -> axum::extract::ConnectInfo<SocketAddr> {
        axum::extract::ConnectInfo("127.0.0.1:9".parse().unwrap())
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let Json(body) = healthz().await;
        assert_eq!(body.status, "ok");
    }

    #[tokio::test]
    async fn auth_status_reflects_configured_password() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let Json(body) = auth_status(State(state)).await;
        assert!(body.auth_required);
    }

    #[tokio::test]
    async fn login_rejects_wrong_password_then_accepts_right_one() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let rejected = login(
            State(Arc::clone(&state)),
            client_addr(),
            Json(LoginRequest {
                password: "wrong".to_string(),
            }),
        )
        .await;
        assert!(rejected.is_err());

        let accepted = login(
            State(state),
            client_addr(),
            Json(LoginRequest {
                password: "hunter2".to_string(),
            }),
        )
        .await
        .unwrap();
        assert!(!accepted.0.token.is_empty());
    }

    #[tokio::test]
    async fn list_and_get_problem_round_trip() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let Json(summaries) = list_problems(State(Arc::clone(&state))).await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, "two-sum");

        let Json(problem) = get_problem(State(Arc::clone(&state)), Path("two-sum".to_string())).await.unwrap();
        assert_eq!(problem.entry_point, "two_sum");

        let missing = get_problem(State(state), Path("no-such-problem".to_string())).await;
        assert!(matches!(missing, Err(OrchestratorError::NotFound)));
    }

    #[tokio::test]
    async fn session_lifecycle_through_rest_handlers() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let session = state
            .store
            .create_new("two-sum".to_string(), tutor_protocol::SessionMode::Learning)
            .await
            .unwrap();

        let Json(sessions) = list_sessions(State(Arc::clone(&state))).await.unwrap();
        assert_eq!(sessions.len(), 1);

        let Json(fetched) = get_session(State(Arc::clone(&state)), Path(session.id.clone())).await.unwrap();
        assert_eq!(fetched.id, session.id);

        let status = delete_session(State(Arc::clone(&state)), Path(session.id.clone())).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let gone = delete_session(State(state), Path(session.id)).await;
        assert!(matches!(gone, Err(OrchestratorError::NotFound)));
    }

    #[tokio::test]
    async fn latest_resumable_returns_none_when_nothing_open() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let Json(response) = latest_resumable(
            State(state),
            Query(LatestResumableQuery {
                problem_id: "two-sum".to_string(),
            }),
        )
        .await
        .unwrap();
        assert!(response.session_id.is_none());
    }
}
