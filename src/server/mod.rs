//! HTTP surface: report streaming, run lookup and health.
//!
//! `POST /generate-report` starts a run and streams its progress as
//! server-sent events, one `data: <json>` frame per event, ending with a
//! single `complete` or `error` frame. A client that disconnects does not
//! cancel the run.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Router,
};
use futures::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::pipeline::{PipelineController, PipelineError, RunRequest};
use crate::storage::StoreError;

/// Errors returned as JSON bodies.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Run {0} not found")]
    NotFound(Uuid),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl From<PipelineError> for ServerError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidRequest(message) => ServerError::BadRequest(message),
            other => ServerError::BadRequest(format!("run could not start: {}", other)),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<PipelineController>,
}

impl AppState {
    pub fn new(controller: Arc<PipelineController>) -> Self {
        Self { controller }
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/generate-report", post(generate_report))
        .route("/runs/{id}", get(get_run))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `addr` and serves until the process stops.
pub async fn serve(state: AppState, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn generate_report(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    request.validate()?;

    let (mut events, handle) = state.controller.spawn(request);
    tokio::spawn(async move {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Run task panicked");
        }
    });

    let stream = async_stream::stream! {
        while let Some(event) = events.recv().await {
            let terminal = event.is_terminal();
            yield Ok(Event::default().data(event.to_wire().to_string()));
            if terminal {
                break;
            }
        }
    };
    Ok(Sse::new(stream))
}

async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServerError> {
    let run = state
        .controller
        .store()
        .get_run(id)
        .await?
        .ok_or(ServerError::NotFound(id))?;
    Ok(Json(run))
}
