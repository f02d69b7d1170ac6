//! Vector store collaborator.
//!
//! The store owns chunk persistence and similarity ranking; this crate only
//! depends on the [`VectorStore`] seam. Two implementations:
//!
//! - [`chroma::ChromaStore`] — HTTP client for a Chroma-compatible server.
//! - [`memory::MemoryStore`] — in-process store with cosine ranking, used
//!   by tests and standalone deployments.

pub mod chroma;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::models::{SearchHit, VectorEntry};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace entries keyed by id.
    async fn upsert(&self, entries: Vec<VectorEntry>) -> Result<()>;

    /// The k nearest entries to `query`, best first, optionally restricted
    /// by a store-native filter from [`build_filter`].
    async fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&Value>,
    ) -> Result<Vec<SearchHit>>;

    /// Ids of all entries matching a filter.
    async fn get_ids(&self, filter: &Value) -> Result<Vec<String>>;

    async fn delete(&self, ids: &[String]) -> Result<()>;
}

/// Build a store-native filter from an equality field→value mapping.
///
/// A single condition passes through unchanged; multiple conditions combine
/// with logical AND. Only equality predicates are supported.
pub fn build_filter(conditions: &serde_json::Map<String, Value>) -> Option<Value> {
    if conditions.is_empty() {
        return None;
    }

    let mut clauses: Vec<Value> = conditions
        .iter()
        .map(|(field, value)| serde_json::json!({ field: { "$eq": value } }))
        .collect();

    if clauses.len() == 1 {
        return clauses.pop();
    }

    Some(serde_json::json!({ "$and": clauses }))
}

/// Shorthand for the filter matching a single source filename.
pub fn source_filter(filename: &str) -> Value {
    serde_json::json!({ "source": { "$eq": filename } })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_empty_filter_is_none() {
        assert_eq!(build_filter(&serde_json::Map::new()), None);
    }

    #[test]
    fn test_single_condition_passes_through() {
        let filter = build_filter(&map(&[("department", Value::from("General"))])).unwrap();
        assert_eq!(filter, serde_json::json!({"department": {"$eq": "General"}}));
    }

    #[test]
    fn test_multiple_conditions_combine_with_and() {
        let filter = build_filter(&map(&[
            ("a", Value::from(1)),
            ("b", Value::from(2)),
        ]))
        .unwrap();
        assert_eq!(
            filter,
            serde_json::json!({"$and": [
                {"a": {"$eq": 1}},
                {"b": {"$eq": 2}},
            ]})
        );
    }

    #[test]
    fn test_source_filter_shape() {
        assert_eq!(
            source_filter("a.txt"),
            serde_json::json!({"source": {"$eq": "a.txt"}})
        );
    }
}
