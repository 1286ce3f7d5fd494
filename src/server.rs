//! HTTP upload service: `POST /convert` takes a multipart EPUB upload and
//! answers with the PDF as an attachment.

use std::io::Write;
use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tower_http::cors::CorsLayer;

use crate::config::{ConvertConfig, ServerConfig};
use crate::error::ConvertError;
use crate::observer::LogObserver;
use crate::pipeline::{convert_file, ConversionOutput};

pub const SERVICE_NAME: &str = "EPUB to PDF Converter";

/// Request-level failures, rendered as `{"error": "<message>"}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(&'static str),

    #[error("Failed to read upload: {0}")]
    Upload(#[from] MultipartError),

    #[error("Conversion failed: {0}")]
    Conversion(String),
}

impl From<ConvertError> for ApiError {
    fn from(e: ConvertError) -> Self {
        ApiError::Conversion(e.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upload(e) => e.status(),
            ApiError::Conversion(msg) => {
                log::error!("Conversion failed: {msg}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

#[derive(Clone)]
struct AppState {
    convert: Arc<ConvertConfig>,
}

/// Build the application router. Useful for both the server and tests.
pub fn router(config: &ServerConfig) -> Router {
    let state = AppState {
        convert: Arc::new(config.convert.clone()),
    };
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/convert", post(convert))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(CorsLayer::permissive())
}

/// Bind and serve until Ctrl+C.
pub async fn serve(config: ServerConfig) -> std::io::Result<()> {
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("{SERVICE_NAME} listening on {addr} ({:?} layout)", config.convert.mode);

    axum::serve(listener, router(&config))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    log::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("failed to install Ctrl+C handler: {e}");
    }
}

async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "service": "EPUB to PDF Converter API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "POST /convert": "Upload an EPUB file (multipart field 'file') and receive a PDF",
            "GET /health": "Service health check",
        }
    }))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "service": SERVICE_NAME }))
}

async fn convert(State(state): State<AppState>, mut multipart: Multipart) -> Result<Response, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await?;
            upload = Some((filename, data));
            break;
        }
    }

    let (filename, data) = upload.ok_or(ApiError::BadRequest("No file provided"))?;
    if filename.is_empty() {
        return Err(ApiError::BadRequest("No file selected"));
    }
    if !is_epub(&filename) {
        return Err(ApiError::BadRequest("Invalid file type. Only EPUB files are allowed"));
    }

    let config = Arc::clone(&state.convert);
    let output = tokio::task::spawn_blocking(move || convert_upload(&data, &config))
        .await
        .map_err(|e| ApiError::Conversion(e.to_string()))??;

    let download = pdf_filename(&filename);
    log::info!(
        "converted '{filename}' -> '{download}' ({} bytes, {} page(s), {} chapter(s))",
        output.pdf.len(),
        output.page_count(),
        output.chapters
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{download}\"")),
        ],
        output.pdf,
    )
        .into_response())
}

/// Spool the upload to a temporary `.epub` file and convert it. The file is
/// removed when the handle drops.
fn convert_upload(data: &[u8], config: &ConvertConfig) -> Result<ConversionOutput, ConvertError> {
    let mut spool = tempfile::Builder::new().prefix("upload-").suffix(".epub").tempfile()?;
    spool.write_all(data)?;
    spool.flush()?;
    convert_file(spool.path(), config, &LogObserver)
}

fn is_epub(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("epub"))
}

/// Make an uploaded filename safe to echo back: only the last path
/// component survives, spaces become `_`, anything outside `[A-Za-z0-9._-]`
/// is dropped, and leading dots are stripped.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            _ => None,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "converted".to_string()
    } else {
        cleaned.to_string()
    }
}

/// `<sanitised-basename>.pdf` for an uploaded EPUB name.
pub fn pdf_filename(upload_name: &str) -> String {
    let safe = sanitize_filename(upload_name);
    let stem = match safe.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => safe.as_str(),
    };
    format!("{stem}.pdf")
}
