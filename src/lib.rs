//! # docqa
//!
//! A document question-answering service: office documents are chunked,
//! embedded, and incrementally indexed into a vector store; questions are
//! answered by retrieval-augmented generation with streamed output.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────────┐   ┌───────────────┐
//! │  Loader   │──▶│    Indexer       │──▶│ Vector Store  │
//! │ txt/pdf/  │   │ chunk+infer+embed│   │ + Record Mgr  │
//! │ csv/md    │   │ upsert+cleanup   │   └──────┬────────┘
//! └───────────┘   └──────────────────┘          │
//!                                    ┌──────────┤
//!                                    ▼          ▼
//!                              ┌──────────┐ ┌──────────┐
//!                              │Retriever │ │  Answer  │
//!                              │ + filter │─▶ stream   │
//!                              └──────────┘ └──────────┘
//! ```
//!
//! Collaborators (embeddings, chat generation, vector storage, record
//! keeping) sit behind traits so tests substitute fakes; the HTTP server
//! and CLI are thin layers over the same components.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and index-key derivation |
//! | [`loader`] | Directory scan and per-format text extraction |
//! | [`chunker`] | Boundary-preferring overlapping splitter |
//! | [`infer`] | Document category/department inference |
//! | [`embedding`] | Embedding collaborator |
//! | [`chat`] | Text-generation collaborator |
//! | [`vector_store`] | Vector store collaborator (Chroma HTTP / memory) |
//! | [`record_manager`] | Indexed-key bookkeeping (SQLite) |
//! | [`indexer`] | Incremental batch indexing and deletion |
//! | [`retriever`] | Filtered similarity search |
//! | [`answer`] | Streamed grounded answer generation |
//! | [`server`] | HTTP API server |

pub mod answer;
pub mod chat;
pub mod chunker;
pub mod config;
pub mod embedding;
pub mod error;
pub mod indexer;
pub mod infer;
pub mod loader;
pub mod models;
pub mod record_manager;
pub mod retriever;
pub mod server;
pub mod vector_store;
