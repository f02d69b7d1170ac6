//! Core data models used throughout docqa.
//!
//! These types represent the chunks, index bookkeeping, and results that flow
//! through the indexing and answering pipelines.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A bounded text span plus metadata; the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Metadata attached to every chunk. `source` always equals the originating
/// filename and is never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub file_type: String,
    pub created_at: String,
    /// Page (PDF) or chunk offset within the document. Defaults to 0.
    #[serde(default)]
    pub page: i64,
    pub category: String,
    pub department: String,
}

impl Chunk {
    /// Deterministic identifier from chunk content + source. Stable across
    /// runs for unchanged content; distinct for identical content under
    /// different source names.
    pub fn index_key(&self) -> String {
        index_key(&self.metadata.source, &self.text)
    }

    pub fn metadata_json(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(&self.metadata) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

pub fn index_key(source: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// An entry stored in the vector store: id = IndexKey.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub text: String,
}

/// A ranked result returned from similarity search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub score: f32,
}

impl SearchHit {
    pub fn source(&self) -> &str {
        self.metadata
            .get("source")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
    }

    pub fn page(&self) -> i64 {
        self.metadata.get("page").and_then(|v| v.as_i64()).unwrap_or(0)
    }
}

/// Summary of one indexing run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub total_indexed: u64,
    pub errors: u64,
}

/// Counts returned by document deletion.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteOutcome {
    pub deleted_vectors: u64,
    pub deleted_records: u64,
}

/// A loadable source file, as reported by the listing endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub filename: String,
    pub size_bytes: u64,
    pub updated_at: String,
    pub file_type: String,
}

/// One turn of a chat exchange sent to the text-generation collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_key_stable() {
        let a = index_key("report.txt", "quarterly numbers");
        let b = index_key("report.txt", "quarterly numbers");
        assert_eq!(a, b);
    }

    #[test]
    fn test_index_key_includes_source() {
        let a = index_key("a.txt", "same content");
        let b = index_key("b.txt", "same content");
        assert_ne!(a, b);
    }

    #[test]
    fn test_index_key_differs_by_content() {
        let a = index_key("a.txt", "one");
        let b = index_key("a.txt", "two");
        assert_ne!(a, b);
    }
}
