//! HTTP chat server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Answer a question scoped to the caller's department |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `/chat` requires `Authorization: Bearer <session token>` (see
//! [`crate::auth`]). The department comes from the token only; the request
//! body carries just the question:
//!
//! ```json
//! { "message": "How many vacation days do I get?" }
//! ```
//!
//! and the response names the department whose documents were searched:
//!
//! ```json
//! { "response": "...", "department_context_used": "HR" }
//! ```
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "unauthorized", "message": "missing bearer token" } }
//! ```
//!
//! Error codes: `unauthorized` (401), `bad_request` (400) and
//! `generation_failed` (502). Upstream error text is logged, never returned.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{AuthError, SessionKey};
use crate::error::PipelineError;
use crate::pipeline::{ChatRequest, Pipeline};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub session_key: Arc<SessionKey>,
}

/// Build the router. Split from [`run_server`] so tests can drive it
/// without a socket.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind to `bind` and serve until the process is terminated.
pub async fn run_server(bind: &str, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);

    println!("chat server listening on http://{}", bind);
    tracing::info!(%bind, "server started");

    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized",
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::AccessDenied => unauthorized("no validated department"),
            PipelineError::InvalidQuestion(msg) => bad_request(msg),
            PipelineError::Generation(_) => AppError {
                status: StatusCode::BAD_GATEWAY,
                code: "generation_failed",
                message: "the assistant could not produce an answer".to_string(),
            },
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingDepartment => unauthorized("token missing department scope"),
            _ => unauthorized("could not validate credentials"),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatBody {
    #[serde(alias = "question")]
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    department_context_used: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// The department is resolved before the body is looked at, so
/// unauthenticated requests are rejected without touching the pipeline.
async fn handle_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChatBody>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let token = bearer_token(&headers).ok_or_else(|| unauthorized("missing bearer token"))?;
    let department = state.session_key.department(token).map_err(|e| {
        tracing::warn!(error = %e, "rejected session token");
        AppError::from(e)
    })?;

    let Json(body) = body.map_err(|e| bad_request(e.body_text()))?;

    let answer = state
        .pipeline
        .run(ChatRequest {
            question: body.message,
            department: Some(department),
        })
        .await?;

    Ok(Json(ChatResponse {
        response: answer.answer,
        department_context_used: answer.department.to_string(),
    }))
}
