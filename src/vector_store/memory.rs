//! In-process vector store with cosine ranking.
//!
//! Backs tests and single-node deployments that don't run a vector store
//! server. State is a flat id→entry map; search scans, filters, and ranks.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

use super::VectorStore;
use crate::error::{Error, Result};
use crate::models::{SearchHit, VectorEntry};

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, VectorEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn upsert(&self, entries: Vec<VectorEntry>) -> Result<()> {
        let mut map = self
            .entries
            .write()
            .map_err(|_| Error::vector_store("store lock poisoned"))?;
        for entry in entries {
            map.insert(entry.id.clone(), entry);
        }
        Ok(())
    }

    async fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&Value>,
    ) -> Result<Vec<SearchHit>> {
        let map = self
            .entries
            .read()
            .map_err(|_| Error::vector_store("store lock poisoned"))?;

        let mut hits: Vec<SearchHit> = map
            .values()
            .filter(|entry| match filter {
                Some(f) => matches_filter(&entry.metadata, f),
                None => true,
            })
            .map(|entry| SearchHit {
                id: entry.id.clone(),
                text: entry.text.clone(),
                metadata: entry.metadata.clone(),
                score: cosine_similarity(query, &entry.embedding),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn get_ids(&self, filter: &Value) -> Result<Vec<String>> {
        let map = self
            .entries
            .read()
            .map_err(|_| Error::vector_store("store lock poisoned"))?;

        let mut ids: Vec<String> = map
            .values()
            .filter(|entry| matches_filter(&entry.metadata, filter))
            .map(|entry| entry.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut map = self
            .entries
            .write()
            .map_err(|_| Error::vector_store("store lock poisoned"))?;
        for id in ids {
            map.remove(id);
        }
        Ok(())
    }
}

/// Evaluate a store-native equality filter against entry metadata.
/// Supports `{"$and": [..]}` and `{field: {"$eq": value}}` clauses.
fn matches_filter(metadata: &serde_json::Map<String, Value>, filter: &Value) -> bool {
    let Some(obj) = filter.as_object() else {
        return false;
    };

    if let Some(clauses) = obj.get("$and").and_then(|v| v.as_array()) {
        return clauses.iter().all(|clause| matches_filter(metadata, clause));
    }

    obj.iter().all(|(field, condition)| {
        let expected = match condition.get("$eq") {
            Some(v) => v,
            // A bare {field: value} condition is treated as equality.
            None => condition,
        };
        metadata.get(field) == Some(expected)
    })
}

/// Cosine similarity in `[-1.0, 1.0]`; 0.0 for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
