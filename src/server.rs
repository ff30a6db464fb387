use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::files::{BufferedExchange, ExchangeError, FileHandler, RegistrySnapshot};
use crate::observability::MetricsSnapshot;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<FileHandler>,
    /// Context the file handler answers under
    pub mount: Arc<str>,
}

impl AppState {
    pub fn new(handler: FileHandler, mount: impl Into<Arc<str>>) -> Self {
        Self {
            handler: Arc::new(handler),
            mount: mount.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("exchange failed: {0}")]
    Exchange(#[from] ExchangeError),
    #[error("file handler task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("file handler closed the exchange without a response")]
    NoResponse,
    #[error("invalid response: {0}")]
    InvalidResponse(#[from] axum::http::Error),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

impl ServeError {
    fn code(&self) -> &'static str {
        match self {
            ServeError::Exchange(_) => "EXCHANGE_FAILED",
            ServeError::Task(_) => "TASK_FAILED",
            ServeError::NoResponse => "NO_RESPONSE",
            ServeError::InvalidResponse(_) => "INVALID_RESPONSE",
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        error!(error = %self, "Failed to serve file");
        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!(body))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub mount: String,
    pub metrics: MetricsSnapshot,
    pub registrations: RegistrySnapshot,
}

/// Router with health, status and the file handler as fallback
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .fallback(serve_file)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn run(address: Option<SocketAddr>, config_path: Option<PathBuf>) -> Result<(), AnyError> {
    info!("Loading configuration");
    let config = match config_path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
    .map_err(|e| format!("Failed to load config: {}", e))?;

    let handler = config
        .file_handler()
        .map_err(|e| format!("Failed to register files: {}", e))?;
    let snapshot = handler.snapshot();
    info!(
        files = snapshot.files.len(),
        directories = snapshot.directories.len(),
        mount = %config.server.mount,
        "File handler ready"
    );

    let address = address.unwrap_or(config.server.bind_addr);
    let app = router(AppState::new(handler, config.server.mount.as_str()));

    let listener = TcpListener::bind(address).await?;
    info!(%address, "fileserve listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        mount: state.mount.to_string(),
        metrics: state.handler.metrics().snapshot(),
        registrations: state.handler.snapshot(),
    })
}

/// Answer any other request from the file handler
///
/// Reads may hit the disk, so dispatch runs on the blocking pool.
async fn serve_file(State(state): State<AppState>, uri: Uri) -> Result<Response, ServeError> {
    let mut exchange = BufferedExchange::new(uri.path()).with_mount(state.mount.as_ref());
    let handler = state.handler.clone();

    let (exchange, outcome) = tokio::task::spawn_blocking(move || {
        let outcome = handler.handle(&mut exchange);
        (exchange, outcome)
    })
    .await?;
    outcome?;

    into_response(exchange)
}

fn into_response(exchange: BufferedExchange) -> Result<Response, ServeError> {
    let (status, headers, body) = exchange.into_parts();
    let status = status.ok_or(ServeError::NoResponse)?;

    let mut builder = Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    Ok(builder.body(Body::from(body))?)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_response_requires_status() {
        let exchange = BufferedExchange::new("/a.txt");
        assert!(matches!(into_response(exchange), Err(ServeError::NoResponse)));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ServeError::NoResponse.code(), "NO_RESPONSE");
        let response = ServeError::NoResponse.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
