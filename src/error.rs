use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScrubError {
    #[error("unsupported file type '.{0}': upload csv, tsv, txt or json")]
    UnsupportedFormat(String),

    #[error("file content is not valid UTF-8: {0}")]
    Decode(#[from] std::str::Utf8Error),

    #[error("failed to parse {format} content: {message}")]
    Parse { format: &'static str, message: String },

    #[error("requested columns not present after header normalization: {}", .0.join(", "))]
    ColumnSelectionMismatch(Vec<String>),

    #[error("no data left after cleaning; check your input file")]
    EmptyResult,

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("payment verification failed: {0}")]
    GatewayVerification(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV serialization failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ScrubError>;
