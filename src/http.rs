//! HTTP control interface over a [`SupervisorHandle`].
//!
//! | Route                        | Auth | Response                     |
//! | ---------------------------- | ---- | ---------------------------- |
//! | `GET /api/health`            | no   | liveness of the supervisor   |
//! | `GET /api/gateway/status`    | yes  | [`StatusReport`]             |
//! | `POST /api/gateway/start`    | yes  | [`OperationResult`]          |
//! | `POST /api/gateway/stop`     | yes  | [`OperationResult`]          |
//! | `POST /api/gateway/restart`  | yes  | [`OperationResult`]          |
//!
//! Operation results map to 200 on success and 500 otherwise.
//!
//! [`StatusReport`]: crate::StatusReport

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, AUTHORIZATION,
        },
        HeaderValue, Method, StatusCode,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::{OperationResult, SupervisorHandle};

#[derive(Clone)]
struct AppState {
    supervisor: SupervisorHandle,
    token: Option<Arc<str>>,
}

/// Builds the control router. With `token` set, every route but health
/// requires `Authorization: Bearer <token>`.
pub fn router(supervisor: SupervisorHandle, token: Option<String>) -> Router {
    let state = AppState {
        supervisor,
        token: token.filter(|t| !t.is_empty()).map(Arc::from),
    };

    Router::new()
        .route("/api/gateway/status", get(status))
        .route("/api/gateway/start", post(start))
        .route("/api/gateway/stop", post(stop))
        .route("/api/gateway/restart", post(restart))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token))
        .route("/api/health", get(health))
        .fallback(not_found)
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

/// Serves the control router until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    supervisor: SupervisorHandle,
    token: Option<String>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router(supervisor, token))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "timestamp": chrono::Local::now().to_rfc3339(),
    }))
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.supervisor.status().await)
}

async fn start(State(state): State<AppState>) -> Response {
    operation_response(state.supervisor.start().await)
}

async fn stop(State(state): State<AppState>) -> Response {
    operation_response(state.supervisor.stop().await)
}

async fn restart(State(state): State<AppState>) -> Response {
    operation_response(state.supervisor.restart().await)
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
}

fn operation_response(result: OperationResult) -> Response {
    let code = if result.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (code, Json(result)).into_response()
}

async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(token) = state.token.as_deref() else {
        return next.run(request).await;
    };
    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|presented| presented == token);
    if authorized {
        next.run(request).await
    } else {
        tracing::debug!(uri = %request.uri(), "rejected unauthorized request");
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" }))).into_response()
    }
}

/// Answers preflight requests and stamps permissive CORS headers on every response.
async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Authorization, Content-Type"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    response
}
