//! HTTP API server.
//!
//! A thin axum layer over the core operations. Indexing triggers return
//! immediately and run in a background task (serialized inside the
//! indexer); query answers stream as server-sent events, one event per
//! generated fragment.
//!
//! # Endpoints
//!
//! | Method   | Path                       | Description |
//! |----------|----------------------------|-------------|
//! | `POST`   | `/v1/index`                | Trigger background indexing (202) |
//! | `POST`   | `/v1/upload`               | Store a file, then trigger indexing |
//! | `POST`   | `/v1/query`                | Stream an answer via SSE |
//! | `GET`    | `/v1/documents`            | List loadable source files |
//! | `DELETE` | `/v1/documents/{filename}` | Remove a document everywhere |
//! | `GET`    | `/health`                  | Health check (returns version) |

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{delete, get, post},
    Json, Router,
};
use futures_util::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::answer::AnswerGenerator;
use crate::chat::HttpChatModel;
use crate::config::Config;
use crate::embedding::HttpEmbedder;
use crate::error::Error;
use crate::indexer::Indexer;
use crate::loader;
use crate::models::{DeleteOutcome, DocumentInfo, IndexReport};
use crate::record_manager::{RecordManager, SqliteRecordManager};
use crate::retriever::Retriever;
use crate::vector_store::{chroma::ChromaStore, memory::MemoryStore, VectorStore};

/// Shared application state: the config plus the assembled pipeline
/// components, all behind `Arc` for cheap cloning across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub indexer: Arc<Indexer>,
    pub answer: Arc<AnswerGenerator>,
}

impl AppState {
    /// Assemble the collaborator handles and pipeline components from the
    /// configuration. Ensures the record-manager schema exists.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let embedder = Arc::new(HttpEmbedder::new(&config.embedding)?);
        let chat = Arc::new(HttpChatModel::new(&config.chat)?);

        let vector_store: Arc<dyn VectorStore> = match config.vector_store.backend.as_str() {
            "chroma" => Arc::new(ChromaStore::new(&config.vector_store)?),
            _ => Arc::new(MemoryStore::new()),
        };

        let record_manager = Arc::new(SqliteRecordManager::open(&config.record_manager).await?);
        record_manager.create_schema().await?;

        let indexer = Arc::new(Indexer::new(
            embedder.clone(),
            vector_store.clone(),
            record_manager,
            chat.clone(),
            config.indexing.clone(),
            config.inference.clone(),
        ));

        let retriever = Arc::new(Retriever::new(embedder, vector_store));
        let answer = Arc::new(AnswerGenerator::new(retriever, chat));

        Ok(Self {
            config: Arc::new(config.clone()),
            indexer,
            answer,
        })
    }
}

/// Start the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let bind_addr = config.server.bind.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/v1/index", post(handle_index))
        .route("/v1/upload", post(handle_upload))
        .route("/v1/query", post(handle_query))
        .route("/v1/documents", get(handle_list_documents))
        .route("/v1/documents/{filename}", delete(handle_delete_document))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    tracing::info!("Server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ GET /health ============

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ============ POST /v1/index ============

#[derive(Debug, Deserialize)]
struct IndexRequest {
    #[serde(default)]
    directory: Option<String>,
}

/// Trigger indexing in the background and return immediately. Completion
/// is observable only through the listing endpoint.
async fn handle_index(
    State(state): State<AppState>,
    Json(request): Json<IndexRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let dir = request
        .directory
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| state.config.data.dir.clone());

    spawn_indexing(&state, dir);

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "status": "accepted",
            "message": "Indexing started in background",
        })),
    )
}

fn spawn_indexing(state: &AppState, dir: std::path::PathBuf) {
    let indexer = state.indexer.clone();
    tokio::spawn(async move {
        let IndexReport {
            total_indexed,
            errors,
        } = indexer.run(&dir).await;
        tracing::info!(
            "Background indexing done: {} indexed, {} errors",
            total_indexed,
            errors
        );
    });
}

// ============ POST /v1/upload ============

/// Store the uploaded file under the data directory, then trigger indexing
/// over the whole directory.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, Error> {
    let mut stored: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::validation(format!("malformed multipart payload: {}", e)))?
    {
        let Some(filename) = field.file_name().map(|n| n.to_string()) else {
            continue;
        };
        validate_filename(&filename)?;

        let bytes = field
            .bytes()
            .await
            .map_err(|e| Error::validation(format!("failed to read upload: {}", e)))?;

        let data_dir = &state.config.data.dir;
        std::fs::create_dir_all(data_dir)?;
        std::fs::write(data_dir.join(&filename), &bytes)?;

        tracing::info!("File uploaded: {}", filename);
        stored = Some(filename);
    }

    let filename = stored.ok_or_else(|| Error::validation("no file in upload payload"))?;

    spawn_indexing(&state, state.config.data.dir.clone());

    Ok(Json(serde_json::json!({
        "status": "success",
        "filename": filename,
        "message": "File uploaded and indexing started",
    })))
}

// ============ POST /v1/query ============

#[derive(Debug, Deserialize)]
struct QueryRequest {
    question: String,
    #[serde(default = "default_k")]
    k: usize,
    #[serde(default)]
    metadata_filter: Option<serde_json::Map<String, serde_json::Value>>,
}

fn default_k() -> usize {
    4
}

/// Stream the generated answer as server-sent events, one per fragment.
async fn handle_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Sse<impl futures_util::Stream<Item = Result<Event, Infallible>>>, Error> {
    if request.question.trim().is_empty() {
        return Err(Error::validation("question must not be empty"));
    }

    let fragments = state
        .answer
        .answer_stream(request.question, request.k, request.metadata_filter);

    let events = fragments.map(|fragment| Ok(Event::default().data(fragment)));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

// ============ GET /v1/documents ============

async fn handle_list_documents(State(state): State<AppState>) -> Json<serde_json::Value> {
    let documents: Vec<DocumentInfo> = loader::list_documents(&state.config.data.dir);
    Json(serde_json::json!({ "documents": documents }))
}

// ============ DELETE /v1/documents/{filename} ============

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<serde_json::Value>, Error> {
    // Traversal guard runs before any filesystem or store mutation.
    validate_filename(&filename)?;

    let data_dir = &state.config.data.dir;
    if !data_dir.join(&filename).exists() {
        return Err(Error::NotFound(filename));
    }

    let DeleteOutcome {
        deleted_vectors,
        deleted_records,
    } = state.indexer.delete_document(data_dir, &filename).await?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "filename": filename,
        "deleted_vectors": deleted_vectors,
        "deleted_records": deleted_records,
    })))
}

/// Reject names that could resolve outside the data directory.
pub fn validate_filename(filename: &str) -> Result<(), Error> {
    if filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains("..")
        || filename.starts_with('~')
    {
        return Err(Error::validation(format!("invalid filename: {}", filename)));
    }
    Ok(())
}
