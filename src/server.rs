//! Streaming AI relay HTTP server.
//!
//! Accepts a question, forwards it to the configured chat-completion
//! provider with streaming enabled, and pipes the provider's event stream
//! straight back to the caller. The relay is stateless per request: each
//! question gets one upstream call and one pass-through body, nothing is
//! buffered or retried here.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask-ai` | Relay a question; responds with `text/event-stream` |
//! | `OPTIONS` | `/ask-ai` | CORS preflight (handled by the CORS layer, empty body) |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Every handled failure produces a JSON body of the shape:
//!
//! ```json
//! { "error": "Question is required" }
//! ```
//!
//! Statuses: `400` missing/empty question, `429` upstream rate limit,
//! `402` upstream out of credits, `500` anything else. Upstream status and
//! body are logged for diagnosis but never leaked to the caller.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted — the expected caller is
//! a browser-based study tool on another origin.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::context::{self, StudyContext};
use crate::db;
use crate::models::AskRequest;
use crate::upstream::{self, UpstreamError};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (wrapped in `Arc` for cheap cloning across handlers).
    pub config: Arc<Config>,
    /// Study database, used for metadata reads only on this path.
    pub pool: SqlitePool,
    /// Reused upstream HTTP client.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config, pool: SqlitePool) -> anyhow::Result<Self> {
        let http = upstream::build_client(&config.upstream)?;
        Ok(Self {
            config: Arc::new(config),
            pool,
            http,
        })
    }
}

/// Starts the relay server.
///
/// Binds to the address configured in `[server].bind` and runs until the
/// process is terminated. This is the entry point used by `exr serve`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = db::connect(config).await?;
    let state = AppState::new(config.clone(), pool)?;

    let app = router(state);

    println!("Relay listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the relay router. Exposed separately so tests can serve it on an
/// ephemeral port.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ask-ai", post(handle_ask))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

/// JSON error body, the only error shape this service emits.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "relay internal error");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl From<UpstreamError> for AppError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::RateLimited => AppError {
                status: StatusCode::TOO_MANY_REQUESTS,
                message: err.to_string(),
            },
            UpstreamError::OutOfCredits => AppError {
                status: StatusCode::PAYMENT_REQUIRED,
                message: err.to_string(),
            },
            UpstreamError::Service { status, ref body } => {
                tracing::error!(status, body = %body, "upstream service error");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "AI service error".to_string(),
                }
            }
            UpstreamError::Transport(ref transport) => {
                tracing::error!(error = %transport, "upstream transport error");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "AI service error".to_string(),
                }
            }
            UpstreamError::MissingCredential => AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: err.to_string(),
            },
        }
    }
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
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

// ============ POST /ask-ai ============

/// Handler for `POST /ask-ai`.
///
/// Validates the question, builds the per-user study context, opens the
/// upstream streamed completion, and returns the upstream body as its own.
/// Chunk boundaries are not preserved (axum may re-frame), byte content and
/// order are.
async fn handle_ask(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, AppError> {
    let request: AskRequest = serde_json::from_slice(&body)
        .map_err(|err| anyhow::Error::new(err).context("decoding request body"))?;

    if request.question.trim().is_empty() {
        return Err(bad_request("Question is required"));
    }

    let study_context = match &request.user_id {
        Some(user_id) => context::build_context(&state.pool, user_id).await?,
        None => StudyContext::anonymous(),
    };

    let messages = upstream::build_messages(&request.question, &study_context);
    let upstream_response =
        upstream::open_stream(&state.http, &state.config.upstream, &messages).await?;

    tracing::debug!(user_id = ?request.user_id, "relaying answer stream");

    let stream_body = Body::from_stream(upstream_response.bytes_stream());
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        stream_body,
    )
        .into_response())
}
