//! Error types for the indexing and answering pipelines.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Per-file extraction failure. The scan logs it and moves on.
    #[error("Failed to load '{filename}': {message}")]
    Load { filename: String, message: String },

    /// Embedding or upsert failure for one indexing batch.
    #[error("Batch indexing failed: {0}")]
    BatchIndex(String),

    #[error("Embedding request failed: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// Record-manager bookkeeping failure. Logged during cleanup/deletion,
    /// never undoes vector-store work already done.
    #[error("Record manager error: {0}")]
    RecordManager(String),

    /// Retrieval or streaming failure inside answer generation.
    #[error("Answer generation failed: {0}")]
    Generation(String),

    #[error("Chat model error: {0}")]
    Chat(String),

    /// Malformed or unsafe external input, rejected at the transport
    /// boundary before any core mutation.
    #[error("{0}")]
    Validation(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn load(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            filename: filename.into(),
            message: message.into(),
        }
    }

    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    pub fn vector_store(message: impl Into<String>) -> Self {
        Self::VectorStore(message.into())
    }

    pub fn record_manager(message: impl Into<String>) -> Self {
        Self::RecordManager(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::Json(_) => (StatusCode::BAD_REQUEST, "json_error"),
            Error::Chat(_) => (StatusCode::SERVICE_UNAVAILABLE, "chat_error"),
            Error::Http(_) => (StatusCode::BAD_GATEWAY, "http_error"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        let body = Json(json!({
            "error": {
                "code": error_type,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
