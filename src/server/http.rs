//! HTTP surface for the execution service.
//!
//! `POST /execute` runs one script and `GET /health` reports liveness. Every
//! failure is rendered as `{"error": "..."}`.

use anyhow::Result;
use axum::{
    Router,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::execution::{ExecutionError, ExecutionOutput, ExecutionRequest, ExecutionService};

pub struct Server {
    config: Config,
    service: ExecutionService,
}

pub struct AppState {
    pub service: ExecutionService,
}

impl Server {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            service: ExecutionService::new(config),
        })
    }

    /// Serve until Ctrl-C or SIGTERM, then drain in-flight requests.
    pub async fn run(&self) -> Result<()> {
        let state = Arc::new(AppState {
            service: self.service.clone(),
        });
        let app = router(state, self.config.server.max_body_bytes);

        let addr: SocketAddr =
            format!("{}:{}", self.config.server.bind, self.config.server.port).parse()?;

        info!("Starting HTTP server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the router. Exposed so tests can drive it without a socket.
pub fn router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/execute", post(execute))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

// Error response type
pub(crate) struct AppError(StatusCode, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

impl From<ExecutionError> for AppError {
    fn from(err: ExecutionError) -> Self {
        let status = match &err {
            ExecutionError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            e if e.is_caller_fault() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError(status, err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError(rejection.status(), rejection.body_text())
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct ExecuteRequest {
    script: Option<String>,
}

async fn execute(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<ExecutionOutput>, AppError> {
    let Json(body) = payload?;
    let script = body.script.unwrap_or_default();
    let request = ExecutionRequest::new(script)?;

    let output = state.service.execute(&request).await?;
    Ok(Json(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::service::tests::{python3, test_config};
    use crate::sandbox::IsolationProbe;
    use crate::sandbox::detect::MockIsolationProbe;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use serde_json::Value;
    use tower::ServiceExt;

    fn app(config: &Config) -> Router {
        let mut probe = MockIsolationProbe::new();
        probe.expect_locate().returning(|| None);
        let probe: Arc<dyn IsolationProbe> = Arc::new(probe);

        let state = Arc::new(AppState {
            service: ExecutionService::with_probe(config, probe),
        });
        router(state, config.server.max_body_bytes)
    }

    fn post_execute(body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/execute")
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn unreachable_config() -> Config {
        let mut config = Config::default();
        config.executor.python_path = "/nonexistent/pyexec/python3".into();
        config.executor.workspace_dir = std::env::temp_dir().join("pyexec-http-tests");
        config
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(&unreachable_config()), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn missing_script_is_bad_request() {
        let (status, body) = send(app(&unreachable_config()), post_execute("{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "Script is required"}));
    }

    #[tokio::test]
    async fn script_without_main_is_bad_request() {
        let (status, body) = send(
            app(&unreachable_config()),
            post_execute(r#"{"script": "x = 1"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "Script must contain a main() function"}));
        assert!(body.get("result").is_none());
    }

    #[tokio::test]
    async fn malformed_json_uses_error_envelope() {
        let (status, body) = send(app(&unreachable_config()), post_execute("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let mut config = unreachable_config();
        config.server.max_body_bytes = 64;
        let script = format!(
            r#"{{"script": "def main():\n    return '{}'"}}"#,
            "a".repeat(200)
        );
        let response = app(&config).oneshot(post_execute(script)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn spawn_failure_is_server_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = unreachable_config();
        config.executor.workspace_dir = tmp.path().to_path_buf();

        let (status, body) = send(
            app(&config),
            post_execute(r#"{"script": "def main():\n    return 1"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("Failed to start"));
    }

    #[tokio::test]
    async fn executes_example_script() {
        let Some(python) = python3() else { return };
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(&python, tmp.path());

        let (status, body) = send(
            app(&config),
            post_execute(r#"{"script": "def main():\n    print(\"hi\")\n    return {\"x\": 1}"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"result": {"x": 1}, "stdout": "hi"}));
    }

    #[tokio::test]
    async fn non_serializable_result_is_bad_request() {
        let Some(python) = python3() else { return };
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(&python, tmp.path());

        let (status, body) = send(
            app(&config),
            post_execute(r#"{"script": "def main():\n    return {1, 2}"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(
            body["error"]
                .as_str()
                .unwrap()
                .contains("JSON serializable")
        );
        assert!(body.get("result").is_none());
    }
}
