use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::chat::{ChatMessage, ChatReply, ChatService};
use crate::errors::ChatError;
use crate::llm::Content;
use crate::site::{SiteStatus, validate_site_id};
use crate::workflow::{OperationOutcome, SiteWorkflow};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub workflow: Arc<SiteWorkflow>,
    pub chat: ChatService,
}

pub type SharedState = Arc<AppState>;

// ── Request / response payload types ──────────────────────────────────

#[derive(Deserialize)]
pub struct ChatRequest {
    #[serde(alias = "content")]
    pub message: Content,
}

#[derive(Deserialize)]
pub struct CommitRequest {
    pub message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub site_id: String,
    pub status: SiteStatus,
}

#[derive(Serialize)]
pub struct ClearedResponse {
    pub cleared: usize,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

/// A failed chat request: the assistant reply the UI renders, plus the
/// underlying error.
#[derive(Serialize)]
struct ChatFailure {
    #[serde(flatten)]
    reply: ChatReply,
    error: String,
}

fn chat_failure_response(err: ChatError) -> Response {
    let status = if err.is_bad_request() {
        StatusCode::BAD_REQUEST
    } else {
        tracing::error!(error = %err, "chat request failed");
        StatusCode::INTERNAL_SERVER_ERROR
    };
    let body = ChatFailure {
        reply: ChatReply::failure(&err),
        error: err.to_string(),
    };
    (status, Json(body)).into_response()
}

fn check_site_id(site_id: &str) -> Result<(), ApiError> {
    validate_site_id(site_id).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// 200 on success, 400 for unmet preconditions, 500 otherwise. The outcome
/// is the body in every case.
fn outcome_response(outcome: OperationOutcome) -> Response {
    let status = if outcome.success {
        StatusCode::OK
    } else if outcome.is_precondition_failure() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(outcome)).into_response()
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/sites/{site_id}/status", get(get_status))
        .route("/api/sites/{site_id}/chat", post(chat))
        .route(
            "/api/sites/{site_id}/messages",
            get(list_messages).delete(clear_messages),
        )
        .route("/api/sites/{site_id}/undo", post(undo))
        .route("/api/sites/{site_id}/redo", post(redo))
        .route("/api/sites/{site_id}/publish", post(publish))
        .route("/api/sites/{site_id}/start-over", post(start_over))
        .route("/api/sites/{site_id}/commit", post(commit))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn get_status(
    State(state): State<SharedState>,
    Path(site_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    check_site_id(&site_id)?;
    let status = state.chat.status().get(&site_id);
    Ok(Json(StatusResponse { site_id, status }))
}

async fn chat(
    State(state): State<SharedState>,
    Path(site_id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Response {
    match state.chat.handle(&site_id, req.message).await {
        Ok(reply) => Json(reply).into_response(),
        Err(err) => chat_failure_response(err),
    }
}

async fn list_messages(
    State(state): State<SharedState>,
    Path(site_id): Path<String>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    check_site_id(&site_id)?;
    let messages = state
        .chat
        .store()
        .load(&site_id)
        .await
        .map_err(|e| ApiError::Internal(format!("{:#}", e)))?;
    Ok(Json(messages))
}

async fn clear_messages(
    State(state): State<SharedState>,
    Path(site_id): Path<String>,
) -> Result<Json<ClearedResponse>, ApiError> {
    check_site_id(&site_id)?;
    let cleared = state
        .chat
        .store()
        .clear(&site_id)
        .await
        .map_err(|e| ApiError::Internal(format!("{:#}", e)))?;
    tracing::info!(site_id = %site_id, cleared, "chat history cleared");
    Ok(Json(ClearedResponse { cleared }))
}

async fn undo(State(state): State<SharedState>, Path(site_id): Path<String>) -> Response {
    outcome_response(state.workflow.undo_last_commit(&site_id).await)
}

async fn redo(State(state): State<SharedState>, Path(site_id): Path<String>) -> Response {
    outcome_response(state.workflow.redo_last_commit(&site_id).await)
}

async fn publish(State(state): State<SharedState>, Path(site_id): Path<String>) -> Response {
    outcome_response(state.workflow.publish(&site_id).await)
}

async fn start_over(State(state): State<SharedState>, Path(site_id): Path<String>) -> Response {
    outcome_response(state.workflow.start_over(&site_id).await)
}

async fn commit(
    State(state): State<SharedState>,
    Path(site_id): Path<String>,
    Json(req): Json<CommitRequest>,
) -> Result<Response, ApiError> {
    if req.message.trim().is_empty() {
        return Err(ApiError::BadRequest("Commit message must not be empty".to_string()));
    }
    Ok(outcome_response(
        state.workflow.apply_and_commit(&site_id, &req.message).await,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::{
        AssistantPool, AssistantRequest, AssistantResult, CodingAssistant,
    };
    use crate::chat::FileChatStore;
    use crate::errors::AssistantError;
    use crate::git::{GitIdentity, GitRunner};
    use crate::llm::{CompletionRequest, LlmChat, LlmError};
    use crate::router::DecisionRouter;
    use crate::site::{SiteResolver, SiteStatusStore};
    use crate::workflow::WorkflowSettings;
    use axum::body::Body;
    use axum::http::Request;
    use git2::Repository;
    use http_body_util::BodyExt;
    use std::fs;
    use tempfile::{TempDir, tempdir};
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    struct AnswerModel;

    #[async_trait::async_trait]
    impl LlmChat for AnswerModel {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, LlmError> {
            Ok(r#"{"should_code": false, "response": "Hi there!"}"#.to_string())
        }
    }

    struct NeverAssistant;

    #[async_trait::async_trait]
    impl CodingAssistant for NeverAssistant {
        async fn run(
            &self,
            _request: &AssistantRequest,
            _cancel: CancellationToken,
        ) -> Result<AssistantResult, AssistantError> {
            Err(AssistantError::Cancelled)
        }
    }

    fn commit_file(dir: &std::path::Path, name: &str, content: &str, msg: &str) {
        let repo = Repository::open(dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = git2::Signature::now("test", "test@test.com").unwrap();
        if let Ok(head) = repo.head() {
            let parent = head.peel_to_commit().unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &[&parent])
                .unwrap();
        } else {
            repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &[])
                .unwrap();
        }
    }

    fn test_app() -> (Router, TempDir) {
        let dir = tempdir().unwrap();
        let site_dir = dir.path().join("sites/acme");
        fs::create_dir_all(&site_dir).unwrap();
        Repository::init(&site_dir).unwrap();
        commit_file(&site_dir, "index.html", "<h1>Acme</h1>", "Initial commit");

        let git = GitRunner::default().with_identity(Some(GitIdentity {
            name: "test".into(),
            email: "test@test.com".into(),
        }));
        let pool = Arc::new(AssistantPool::new());
        let workflow = Arc::new(
            SiteWorkflow::new(
                git,
                SiteResolver::new(dir.path().join("sites")),
                WorkflowSettings::default(),
            )
            .with_pool(pool.clone()),
        );
        let chat = ChatService::new(
            workflow.clone(),
            SiteStatusStore::new(),
            Arc::new(FileChatStore::new(&dir.path().join("data"))),
            DecisionRouter::new(Arc::new(AnswerModel), 10),
            Arc::new(NeverAssistant),
            pool,
            10_000,
        );
        let state = Arc::new(AppState { workflow, chat });
        (api_router().with_state(state), dir)
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, json: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    fn post_empty(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _dir) = test_app();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_status_defaults_to_ready() {
        let (app, _dir) = test_app();
        let req = Request::builder()
            .uri("/api/sites/unknown-site/status")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(json["siteId"], "unknown-site");
        assert_eq!(json["status"], "READY");
    }

    #[tokio::test]
    async fn test_invalid_site_id_is_bad_request() {
        let (app, _dir) = test_app();
        let req = Request::builder()
            .uri("/api/sites/a..b/status")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_undo_without_history_is_bad_request() {
        let (app, _dir) = test_app();
        let resp = app.oneshot(post_empty("/api/sites/acme/undo")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "No changes to undo");
        assert_eq!(json["errorKind"], "precondition");
    }

    #[tokio::test]
    async fn test_redo_without_undo_is_bad_request() {
        let (app, _dir) = test_app();
        let resp = app.oneshot(post_empty("/api/sites/acme/redo")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(json["message"], "No changes to restore");
    }

    #[tokio::test]
    async fn test_manual_commit_then_undo_redo() {
        let (app, dir) = test_app();
        fs::write(dir.path().join("sites/acme/index.html"), "<h1>Acme Co</h1>").unwrap();

        let resp = app
            .clone()
            .oneshot(post_json(
                "/api/sites/acme/commit",
                serde_json::json!({"message": "Rename heading"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["commitMessage"], "Rename heading");
        assert!(!json["commitHash"].as_str().unwrap().is_empty());

        let resp = app
            .clone()
            .oneshot(post_empty("/api/sites/acme/undo"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(post_empty("/api/sites/acme/redo"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            fs::read_to_string(dir.path().join("sites/acme/index.html")).unwrap(),
            "<h1>Acme Co</h1>"
        );
    }

    #[tokio::test]
    async fn test_commit_on_missing_site() {
        let (app, _dir) = test_app();
        let resp = app
            .oneshot(post_json(
                "/api/sites/ghost/commit",
                serde_json::json!({"message": "x"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json: serde_json::Value = body_json(resp.into_body()).await;
        assert!(json["error"].as_str().unwrap().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_publish_without_remote_is_server_error() {
        let (app, _dir) = test_app();
        let resp = app
            .oneshot(post_empty("/api/sites/acme/publish"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_chat_and_history() {
        let (app, _dir) = test_app();
        let resp = app
            .clone()
            .oneshot(post_json(
                "/api/sites/acme/chat",
                serde_json::json!({"message": "hello?"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(json["message"]["role"], "assistant");
        assert_eq!(json["message"]["content"], "Hi there!");
        assert_eq!(json["codeChanged"], false);

        let req = Request::builder()
            .uri("/api/sites/acme/messages")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        let messages: Vec<serde_json::Value> = body_json(resp.into_body()).await;
        assert_eq!(messages.len(), 2);

        let req = Request::builder()
            .method("DELETE")
            .uri("/api/sites/acme/messages")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let json: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(json["cleared"], 2);
    }

    #[tokio::test]
    async fn test_chat_empty_message_is_bad_request() {
        let (app, _dir) = test_app();
        let resp = app
            .oneshot(post_json(
                "/api/sites/acme/chat",
                serde_json::json!({"content": "  "}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(json["message"]["role"], "assistant");
        assert_eq!(json["error"], "Message must not be empty");
    }

    #[tokio::test]
    async fn test_chat_on_missing_site_still_answers_as_assistant() {
        let (app, _dir) = test_app();
        let resp = app
            .oneshot(post_json(
                "/api/sites/ghost/chat",
                serde_json::json!({"message": "change the color"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(json["message"]["role"], "assistant");
        assert!(!json["message"]["content"].as_str().unwrap().is_empty());
        assert_eq!(json["codeChanged"], false);
        assert!(json["error"].as_str().unwrap().contains("does not exist"));
    }
}
