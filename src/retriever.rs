//! Filtered similarity retrieval.

use std::sync::Arc;

use crate::embedding::{embed_query, Embedder};
use crate::error::Result;
use crate::models::SearchHit;
use crate::vector_store::{build_filter, VectorStore};

/// Upper bound on requested result counts.
pub const MAX_TOP_K: usize = 20;

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, vector_store: Arc<dyn VectorStore>) -> Self {
        Self {
            embedder,
            vector_store,
        }
    }

    /// The k nearest chunks to `question`, optionally restricted by an
    /// equality metadata filter. k is clamped into `1..=MAX_TOP_K`; no
    /// filter means unrestricted search.
    pub async fn retrieve(
        &self,
        question: &str,
        k: usize,
        metadata_filter: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Result<Vec<SearchHit>> {
        let k = k.clamp(1, MAX_TOP_K);
        let filter = metadata_filter.and_then(build_filter);

        let query = embed_query(self.embedder.as_ref(), question).await?;
        self.vector_store
            .similarity_search(&query, k, filter.as_ref())
            .await
    }
}
