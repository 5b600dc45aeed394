//! HTTP façade: upload/clean, payment webhook, token-gated download.

use crate::error::{Result, ScrubError};
use crate::gate::PaymentGate;
use crate::parser::parse_table;
use crate::pipeline::{clean, CleanOptions, MissingValueStrategy, TextCase};
use crate::store::FileStore;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use hyper::Server;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
const PREVIEW_ROWS: usize = 10;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn FileStore>,
    pub gate: Arc<PaymentGate>,
}

/// Liveness marker
async fn root() -> impl IntoResponse {
    Json(json!({ "message": "tabscrub is running" }))
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "tabscrub",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Multipart form fields accepted by `/clean-data/`.
struct CleanRequest {
    filename: String,
    bytes: Vec<u8>,
    options: CleanOptions,
}

#[derive(Debug, Serialize)]
struct CleanResponse {
    status: &'static str,
    original_rows: usize,
    cleaned_rows: usize,
    /// Store key the client attaches as `metadata.file_key` when
    /// initializing payment.
    file_key: String,
    cleaned_data_sample: Vec<Map<String, Value>>,
}

// Both fields default so a malformed delivery reaches the gate and comes
// back as a 400 decline instead of a framework rejection.
#[derive(Debug, Deserialize)]
struct WebhookBody {
    #[serde(default)]
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    status: &'static str,
    download_token: String,
}

async fn read_clean_request(mut multipart: Multipart) -> Result<CleanRequest> {
    let mut filename = None;
    let mut bytes = None;
    let mut options = CleanOptions::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ScrubError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                filename = Some(field.file_name().unwrap_or_default().to_string());
                bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ScrubError::BadRequest(format!("failed to read upload: {e}")))?
                        .to_vec(),
                );
            }
            "columns_to_clean" => {
                let raw = read_text_field(field).await?;
                let columns: Vec<String> = raw
                    .split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect();
                if !columns.is_empty() {
                    options.columns = Some(columns);
                }
            }
            "missing_value_strategy" => {
                options.missing = read_text_field(field).await?.parse::<MissingValueStrategy>()?;
            }
            "remove_duplicates" => {
                options.dedup = parse_bool(&read_text_field(field).await?)?;
            }
            "text_format" => {
                options.text_case = read_text_field(field).await?.parse::<TextCase>()?;
            }
            // Unknown fields are ignored, matching lenient form handling
            _ => {}
        }
    }

    let filename =
        filename.ok_or_else(|| ScrubError::BadRequest("missing 'file' field".to_string()))?;
    let bytes = bytes.unwrap_or_default();
    if bytes.is_empty() {
        return Err(ScrubError::BadRequest("uploaded file is empty".to_string()));
    }

    Ok(CleanRequest { filename, bytes, options })
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| ScrubError::BadRequest(format!("unreadable form field: {e}")))
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ScrubError::BadRequest(format!(
            "remove_duplicates must be a boolean, got '{other}'"
        ))),
    }
}

/// Upload a tabular file, run the cleaning pipeline, persist the result.
/// The response carries the stored-file key the client must attach as
/// `metadata.file_key` when initializing payment.
async fn clean_data(
    Extension(state): Extension<AppState>,
    multipart: Multipart,
) -> Response {
    let request = match read_clean_request(multipart).await {
        Ok(req) => req,
        Err(e) => return error_response(&e),
    };

    let outcome = parse_table(&request.bytes, &request.filename)
        .and_then(|table| clean(table, &request.options));
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => return error_response(&e),
    };

    match state.store.save(&outcome.table).await {
        Ok(file_key) => {
            info!(file_key = %file_key, rows = outcome.cleaned_rows, "stored cleaned upload");
            Json(CleanResponse {
                status: "success",
                original_rows: outcome.original_rows,
                cleaned_rows: outcome.cleaned_rows,
                file_key,
                cleaned_data_sample: outcome.table.to_records(PREVIEW_ROWS),
            })
            .into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// Payment gateway webhook: `{event, data: {reference, ...}}`.
async fn paystack_webhook(
    Extension(state): Extension<AppState>,
    Json(body): Json<WebhookBody>,
) -> Response {
    match state.gate.notify(&body.event, &body.data).await {
        Ok(token) => Json(TokenResponse {
            status: "success",
            download_token: token,
        })
        .into_response(),
        Err(e) => error_response(&e),
    }
}

/// Redeem a one-time download token for the cleaned file.
async fn download(
    Extension(state): Extension<AppState>,
    Path(token): Path<String>,
) -> Response {
    match state.gate.redeem(&token).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "text/csv"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"cleaned.csv\"",
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

fn status_for(err: &ScrubError) -> StatusCode {
    match err {
        ScrubError::UnsupportedFormat(_)
        | ScrubError::Decode(_)
        | ScrubError::Parse { .. }
        | ScrubError::ColumnSelectionMismatch(_)
        | ScrubError::EmptyResult
        | ScrubError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ScrubError::Forbidden(_) => StatusCode::FORBIDDEN,
        ScrubError::NotFound(_) => StatusCode::NOT_FOUND,
        ScrubError::GatewayVerification(_) => StatusCode::PAYMENT_REQUIRED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &ScrubError) -> Response {
    let status = status_for(err);
    if status.is_server_error() {
        error!(error = %err, "request failed");
    }
    (
        status,
        Json(json!({ "status": "error", "message": err.to_string() })),
    )
        .into_response()
}

/// Create the HTTP server with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/clean-data/", post(clean_data))
        .route("/paystack/webhook/", post(paystack_webhook))
        .route("/download/:token", get(download))
        .layer(Extension(state))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on the specified port; returns after a shutdown
/// signal.
pub async fn start_server(state: AppState, port: u16) -> std::result::Result<(), hyper::Error> {
    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    println!("🚀 HTTP server running on http://localhost:{port}");
    println!("💚 Health check: http://localhost:{port}/health");

    Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
}
