//! HTTP front-end for the retrieval pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload-pdf/` | Multipart PDF upload; builds/extends the index |
//! | `POST` | `/query/` | Form query; retrieval plus generated answer |
//! | `POST` | `/process-pdf` | Multipart PDF + query in one shot; ranked chunks |
//! | `POST` | `/generate-questions/` | Two clarifying questions for a text block |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Codes: `bad_request` (400), `precondition` (400), `upstream` (500).
//! A generation failure alone is not an error: `/query/` stays 200 and the
//! answer text describes the failure.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the API is consumed
//! from browser front-ends.
//!
//! # Concurrency
//!
//! Handlers share one [`Pipeline`]. Uploads mutate the index only through
//! full-swap or transactional append operations, so a query racing an
//! upload sees the previous index or the finished one.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::PipelineError;
use crate::pipeline::{Pipeline, NO_RESULTS_MESSAGE};

/// Upload size cap; the axum default (2 MB) is too small for scanned PDFs.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<Pipeline>,
}

/// Starts the HTTP server described by `config`.
///
/// Fails fast on startup preconditions: the store CA bundle and the
/// `GEMINI_API_KEY` are checked before binding.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    crate::config::check_store_preconditions(config)?;
    let api_key = crate::config::gemini_api_key()?;

    let config = Arc::new(config.clone());
    let pipeline = Arc::new(Pipeline::from_config(config.clone(), Some(api_key)).await?);

    let bind_addr = config.server.bind.clone();
    let app = build_router(AppState { config, pipeline });

    tracing::info!(addr = %bind_addr, "server listening");
    println!("docquery server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router with all routes and the CORS layer. Separated from
/// [`run_server`] so tests can drive handlers in-process.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload-pdf/", post(handle_upload))
        .route("/query/", post(handle_query))
        .route("/process-pdf", post(handle_process_pdf))
        .route("/generate-questions/", post(handle_generate_questions))
        .route("/health", get(handle_health))
        .layer(axum::extract::DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Inner error detail with a machine-readable code and human-readable message.
#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match &err {
            PipelineError::Validation(_) => bad_request(err.to_string()),
            PipelineError::Precondition(_) | PipelineError::DocumentNotFound(_) => AppError {
                status: StatusCode::BAD_REQUEST,
                code: "precondition".to_string(),
                message: err.to_string(),
            },
            _ => AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "upstream".to_string(),
                message: err.to_string(),
            },
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

// ============ POST /upload-pdf/ ============

#[derive(Serialize)]
struct UploadResponse {
    message: String,
}

/// Accepts a multipart `file` field, spools it to a temp file, and runs
/// the indexing flow. The temp file is removed on every exit path,
/// including failures (drop-based cleanup).
async fn handle_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let (bytes, _) = read_upload(multipart).await?;

    let tmp = spool_to_tempfile(&bytes)?;
    state
        .pipeline
        .index_document_from_path(tmp.path())
        .await
        .map_err(AppError::from)?;

    Ok(Json(UploadResponse {
        message: "PDF uploaded and indexed successfully.".to_string(),
    }))
}

// ============ POST /query/ ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    k: Option<usize>,
}

#[derive(Serialize)]
struct QueryResponse {
    query: String,
    answer: Option<String>,
    results: Vec<ResultItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Serialize)]
struct ResultItem {
    content: String,
    score: f32,
}

async fn handle_query(
    State(state): State<AppState>,
    Form(req): Form<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    let answer = state
        .pipeline
        .ask(&req.query, req.k)
        .await
        .map_err(AppError::from)?;

    let results: Vec<ResultItem> = answer
        .retrieved
        .iter()
        .map(|r| ResultItem {
            content: r.content.label(),
            score: r.score,
        })
        .collect();

    // The top hit's page image, base64-encoded, on the visual backend.
    let image_base64 = answer
        .retrieved
        .first()
        .and_then(|r| r.content.as_image())
        .map(|page| base64::engine::general_purpose::STANDARD.encode(&page.png));

    let empty = answer.retrieved.is_empty();
    Ok(Json(QueryResponse {
        query: answer.query,
        answer: if empty { None } else { Some(answer.text) },
        results,
        image_base64,
        message: empty.then(|| NO_RESULTS_MESSAGE.to_string()),
    }))
}

// ============ POST /process-pdf ============

/// Single-shot variant: upload and query in one multipart request
/// (`file` + `query` fields). Returns the ranked chunk contents only.
async fn handle_process_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Vec<ResultItem>>, AppError> {
    let (bytes, query) = read_upload(multipart).await?;
    let query = query.ok_or_else(|| bad_request("missing form field: query"))?;

    let tmp = spool_to_tempfile(&bytes)?;
    state
        .pipeline
        .index_document_from_path(tmp.path())
        .await
        .map_err(AppError::from)?;

    let retrieved = state
        .pipeline
        .retrieve(&query, None)
        .await
        .map_err(AppError::from)?;

    Ok(Json(
        retrieved
            .iter()
            .map(|r| ResultItem {
                content: r.content.label(),
                score: r.score,
            })
            .collect(),
    ))
}

// ============ POST /generate-questions/ ============

#[derive(Deserialize)]
struct QuestionRequest {
    query: String,
}

#[derive(Serialize)]
struct QuestionResponse {
    questions: String,
}

async fn handle_generate_questions(
    State(state): State<AppState>,
    Json(req): Json<QuestionRequest>,
) -> Result<Json<QuestionResponse>, AppError> {
    let text = req.query.trim();
    if text.is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let answerer = state
        .pipeline
        .answerer()
        .ok_or_else(|| AppError::from(PipelineError::Precondition(
            "answer generation is not configured".into(),
        )))?;

    let questions = answerer
        .generate_questions(text)
        .await
        .map_err(AppError::from)?;

    Ok(Json(QuestionResponse { questions }))
}

// ============ Upload helpers ============

/// Pull the `file` bytes (and optional `query` field) out of a multipart
/// request.
async fn read_upload(mut multipart: Multipart) -> Result<(Vec<u8>, Option<String>), AppError> {
    let mut file: Option<Vec<u8>> = None;
    let mut query: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.to_string()))?
    {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(e.to_string()))?;
                file = Some(bytes.to_vec());
            }
            Some("query") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(e.to_string()))?;
                query = Some(text);
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| bad_request("missing multipart field: file"))?;
    Ok((file, query))
}

fn spool_to_tempfile(bytes: &[u8]) -> Result<tempfile::NamedTempFile, AppError> {
    let mut tmp = tempfile::Builder::new()
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| AppError::from(PipelineError::upstream(crate::error::Stage::Load, e)))?;
    tmp.write_all(bytes)
        .map_err(|e| AppError::from(PipelineError::upstream(crate::error::Stage::Load, e)))?;
    Ok(tmp)
}
