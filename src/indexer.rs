//! Incremental indexing pipeline.
//!
//! Orchestrates load → infer → chunk → embed → upsert → cleanup in bounded
//! batches against the {record manager, vector store} pair. Chunk identity
//! is the deterministic index key (content + source), so re-indexing
//! unchanged files is a vector-store no-op, and keys that disappear from a
//! source are cleaned up at the end of that source's batch.
//!
//! A batch failure is counted and logged; it never stops the remaining
//! batches. Overlapping runs are serialized by a per-process guard to keep
//! the idempotence story intact.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::chat::ChatModel;
use crate::chunker::split_text;
use crate::config::{InferenceConfig, IndexingConfig};
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::infer::{infer_metadata, InferredMetadata};
use crate::loader::{self, LoadedDocument};
use crate::models::{Chunk, ChunkMetadata, DeleteOutcome, IndexReport, VectorEntry};
use crate::record_manager::RecordManager;
use crate::vector_store::{source_filter, VectorStore};

pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
    record_manager: Arc<dyn RecordManager>,
    chat: Arc<dyn ChatModel>,
    indexing: IndexingConfig,
    inference: InferenceConfig,
    /// Serializes indexing runs; overlapping runs race on record state.
    run_guard: tokio::sync::Mutex<()>,
}

/// Per-run bookkeeping: which keys each touched source produced so far, and
/// which sources are fully generated and awaiting stale-key cleanup.
#[derive(Default)]
struct RunState {
    seen: HashMap<String, HashSet<String>>,
    pending_cleanup: Vec<String>,
}

impl Indexer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<dyn VectorStore>,
        record_manager: Arc<dyn RecordManager>,
        chat: Arc<dyn ChatModel>,
        indexing: IndexingConfig,
        inference: InferenceConfig,
    ) -> Self {
        Self {
            embedder,
            vector_store,
            record_manager,
            chat,
            indexing,
            inference,
            run_guard: tokio::sync::Mutex::new(()),
        }
    }

    /// Index every loadable file under `dir`. Returns the run summary;
    /// per-file and per-batch failures are absorbed into it.
    pub async fn run(&self, dir: &Path) -> IndexReport {
        let _guard = self.run_guard.lock().await;

        let files = loader::scan_directory(dir);
        tracing::info!("Indexing {} files from {}", files.len(), dir.display());

        let mut report = IndexReport::default();
        let mut state = RunState::default();
        let mut batch: Vec<Chunk> = Vec::new();

        for path in files {
            let loaded = match loader::load_file(&path) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!("Failed to load file, skipping: {}", e);
                    continue;
                }
            };

            let inferred = if self.inference.enabled {
                infer_metadata(self.chat.as_ref(), &loaded.full_text()).await
            } else {
                InferredMetadata::default()
            };

            let source = loaded.filename.clone();
            for chunk in chunk_document(&loaded, &inferred, &self.indexing) {
                batch.push(chunk);
                if batch.len() >= self.indexing.batch_size {
                    let full = std::mem::take(&mut batch);
                    self.flush(full, &mut state, &mut report).await;
                }
            }

            // All of this source's chunks are generated; it becomes
            // eligible for cleanup once its last batch commits.
            state.pending_cleanup.push(source);
        }

        self.flush(batch, &mut state, &mut report).await;

        tracing::info!(
            "Indexing finished: {} indexed, {} batch errors",
            report.total_indexed,
            report.errors
        );
        report
    }

    /// Commit one batch, then clean up sources completed through it.
    async fn flush(&self, batch: Vec<Chunk>, state: &mut RunState, report: &mut IndexReport) {
        let batch_len = batch.len();
        if batch_len > 0 {
            match self.index_step(batch, &mut state.seen).await {
                Ok(indexed) => {
                    tracing::info!("Batch indexed: {} of {} chunks new", indexed, batch_len);
                    report.total_indexed += indexed;
                }
                Err(e) => {
                    report.errors += 1;
                    tracing::error!("Batch indexing failed, skipping batch: {}", e);
                    // The sources in this batch did not commit; cleaning
                    // them now would drop entries that are still current.
                    state.pending_cleanup.clear();
                    return;
                }
            }
        }

        let completed: Vec<String> = std::mem::take(&mut state.pending_cleanup);
        if !completed.is_empty() {
            self.cleanup_sources(&completed, &state.seen).await;
        }
    }

    /// One incremental index step: key, diff against recorded keys, embed
    /// and upsert only the new ones, then record the batch.
    async fn index_step(
        &self,
        batch: Vec<Chunk>,
        seen: &mut HashMap<String, HashSet<String>>,
    ) -> Result<u64> {
        // Dedup within the batch; identical spans share an index key.
        let mut keys: Vec<String> = Vec::with_capacity(batch.len());
        let mut unique: Vec<Chunk> = Vec::with_capacity(batch.len());
        let mut in_batch: HashSet<String> = HashSet::new();
        for chunk in batch {
            let key = chunk.index_key();
            if in_batch.insert(key.clone()) {
                keys.push(key);
                unique.push(chunk);
            }
        }

        let exists = self.record_manager.exists(&keys).await?;

        let new_indices: Vec<usize> = exists
            .iter()
            .enumerate()
            .filter(|(_, known)| !**known)
            .map(|(i, _)| i)
            .collect();

        if !new_indices.is_empty() {
            let texts: Vec<String> = new_indices
                .iter()
                .map(|&i| unique[i].text.clone())
                .collect();
            let vectors = self
                .embedder
                .embed(&texts)
                .await
                .map_err(|e| Error::BatchIndex(e.to_string()))?;
            if vectors.len() != texts.len() {
                return Err(Error::BatchIndex(format!(
                    "embedding count mismatch: {} texts, {} vectors",
                    texts.len(),
                    vectors.len()
                )));
            }

            let entries: Vec<VectorEntry> = new_indices
                .iter()
                .zip(vectors)
                .map(|(&i, embedding)| VectorEntry {
                    id: keys[i].clone(),
                    embedding,
                    metadata: unique[i].metadata_json(),
                    text: unique[i].text.clone(),
                })
                .collect();

            self.vector_store
                .upsert(entries)
                .await
                .map_err(|e| Error::BatchIndex(e.to_string()))?;
        }

        // Record every key in the batch, refreshing timestamps for the
        // unchanged ones.
        let group_ids: Vec<String> = unique
            .iter()
            .map(|c| c.metadata.source.clone())
            .collect();
        self.record_manager
            .upsert(&keys, &group_ids)
            .await
            .map_err(|e| Error::BatchIndex(e.to_string()))?;

        for (chunk, key) in unique.iter().zip(keys.iter()) {
            seen.entry(chunk.metadata.source.clone())
                .or_default()
                .insert(key.clone());
        }

        Ok(new_indices.len() as u64)
    }

    /// Delete entries recorded for `sources` whose keys this run no longer
    /// produced. Best-effort: failures are logged, never fatal to the run.
    async fn cleanup_sources(&self, sources: &[String], seen: &HashMap<String, HashSet<String>>) {
        let recorded = match self.record_manager.list_keys(sources).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!("Stale-key listing failed, skipping cleanup: {}", e);
                return;
            }
        };

        let stale: Vec<String> = recorded
            .into_iter()
            .filter(|key| {
                !sources
                    .iter()
                    .any(|s| seen.get(s).map(|set| set.contains(key)).unwrap_or(false))
            })
            .collect();

        if stale.is_empty() {
            return;
        }

        if let Err(e) = self.vector_store.delete(&stale).await {
            tracing::warn!("Stale vector deletion failed: {}", e);
            return;
        }
        if let Err(e) = self.record_manager.delete_keys(&stale).await {
            tracing::warn!("Stale record deletion failed: {}", e);
            return;
        }

        tracing::info!("Cleaned up {} stale chunks from {:?}", stale.len(), sources);
    }

    /// Remove everything tied to one source file: vector entries, index
    /// records, and the file itself (best-effort). A record-manager failure
    /// is logged but does not undo the vector-store removal.
    pub async fn delete_document(&self, data_dir: &Path, filename: &str) -> Result<DeleteOutcome> {
        let filter = source_filter(filename);
        let ids = self.vector_store.get_ids(&filter).await?;
        let deleted_vectors = ids.len() as u64;
        if !ids.is_empty() {
            self.vector_store.delete(&ids).await?;
        }
        tracing::info!("Deleted {} vectors for: {}", deleted_vectors, filename);

        let mut deleted_records = 0u64;
        match self.record_manager.list_keys(&[filename.to_string()]).await {
            Ok(keys) if !keys.is_empty() => {
                match self.record_manager.delete_keys(&keys).await {
                    Ok(()) => deleted_records = keys.len() as u64,
                    Err(e) => {
                        tracing::error!("Failed to delete records for {}: {}", filename, e)
                    }
                }
            }
            Ok(_) => {}
            Err(e) => tracing::error!("Failed to list records for {}: {}", filename, e),
        }
        tracing::info!("Deleted {} records for: {}", deleted_records, filename);

        let file_path = data_dir.join(filename);
        if file_path.exists() {
            if let Err(e) = std::fs::remove_file(&file_path) {
                tracing::warn!("Failed to remove file {}: {}", file_path.display(), e);
            }
        }

        Ok(DeleteOutcome {
            deleted_vectors,
            deleted_records,
        })
    }
}

/// Split a loaded document into chunks carrying the full metadata set.
/// Segments without an explicit page store ordinal 0.
pub fn chunk_document(
    doc: &LoadedDocument,
    inferred: &InferredMetadata,
    indexing: &IndexingConfig,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for segment in &doc.segments {
        for span in split_text(&segment.text, indexing.chunk_size, indexing.chunk_overlap) {
            chunks.push(Chunk {
                text: span,
                metadata: ChunkMetadata {
                    source: doc.filename.clone(),
                    file_type: doc.file_type.clone(),
                    created_at: doc.created_at.clone(),
                    page: segment.page.unwrap_or(0),
                    category: inferred.category.clone(),
                    department: inferred.department.clone(),
                },
            });
        }
    }

    chunks
}
