//! Chroma-compatible HTTP vector store client.
//!
//! Talks to a Chroma server's v1 collection API: the collection is resolved
//! once (get-or-create) and its id cached for the life of the client.
//! Similarity scores are derived from the reported cosine distance.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::OnceCell;

use super::VectorStore;
use crate::config::VectorStoreConfig;
use crate::error::{Error, Result};
use crate::models::{SearchHit, VectorEntry};

pub struct ChromaStore {
    client: reqwest::Client,
    base_url: String,
    collection_name: String,
    collection_id: OnceCell<String>,
}

impl ChromaStore {
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        let base_url = config
            .url
            .clone()
            .ok_or_else(|| Error::vector_store("vector_store.url is not configured"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection_name: config.collection.clone(),
            collection_id: OnceCell::new(),
        })
    }

    /// Resolve (get-or-create) the collection id, once.
    async fn collection_id(&self) -> Result<&str> {
        self.collection_id
            .get_or_try_init(|| async {
                let url = format!("{}/api/v1/collections", self.base_url);
                let body = serde_json::json!({
                    "name": self.collection_name,
                    "get_or_create": true,
                });

                let response = self.client.post(&url).json(&body).send().await?;
                let status = response.status();
                if !status.is_success() {
                    let text = response.text().await.unwrap_or_default();
                    return Err(Error::vector_store(format!(
                        "collection setup failed ({}): {}",
                        status, text
                    )));
                }

                let json: Value = response.json().await?;
                json.get("id")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .ok_or_else(|| Error::vector_store("collection response missing id"))
            })
            .await
            .map(|s| s.as_str())
    }

    async fn post(&self, endpoint: &str, body: Value) -> Result<Value> {
        let collection_id = self.collection_id().await?;
        let url = format!(
            "{}/api/v1/collections/{}/{}",
            self.base_url, collection_id, endpoint
        );

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::vector_store(format!(
                "{} failed ({}): {}",
                endpoint, status, text
            )));
        }

        Ok(response.json().await.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn upsert(&self, entries: Vec<VectorEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut ids = Vec::with_capacity(entries.len());
        let mut embeddings = Vec::with_capacity(entries.len());
        let mut metadatas = Vec::with_capacity(entries.len());
        let mut documents = Vec::with_capacity(entries.len());
        for entry in entries {
            ids.push(entry.id);
            embeddings.push(entry.embedding);
            metadatas.push(Value::Object(entry.metadata));
            documents.push(entry.text);
        }

        self.post(
            "upsert",
            serde_json::json!({
                "ids": ids,
                "embeddings": embeddings,
                "metadatas": metadatas,
                "documents": documents,
            }),
        )
        .await?;
        Ok(())
    }

    async fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&Value>,
    ) -> Result<Vec<SearchHit>> {
        let mut body = serde_json::json!({
            "query_embeddings": [query],
            "n_results": k,
            "include": ["documents", "metadatas", "distances"],
        });
        if let Some(f) = filter {
            body["where"] = f.clone();
        }

        let json = self.post("query", body).await?;
        parse_query_response(&json)
    }

    async fn get_ids(&self, filter: &Value) -> Result<Vec<String>> {
        let json = self
            .post(
                "get",
                serde_json::json!({
                    "where": filter,
                    "include": [],
                }),
            )
            .await?;

        let ids = json
            .get("ids")
            .and_then(|v| v.as_array())
            .ok_or_else(|| Error::vector_store("get response missing ids"))?;

        Ok(ids
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.to_string())
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.post("delete", serde_json::json!({ "ids": ids })).await?;
        Ok(())
    }
}

/// Flatten Chroma's per-query nested arrays into ranked hits.
fn parse_query_response(json: &Value) -> Result<Vec<SearchHit>> {
    let first = |key: &str| -> Vec<Value> {
        json.get(key)
            .and_then(|v| v.as_array())
            .and_then(|outer| outer.first())
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default()
    };

    let ids = first("ids");
    let documents = first("documents");
    let metadatas = first("metadatas");
    let distances = first("distances");

    let mut hits = Vec::with_capacity(ids.len());
    for (i, id) in ids.iter().enumerate() {
        let Some(id) = id.as_str() else { continue };

        let metadata = metadatas
            .get(i)
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();
        let text = documents
            .get(i)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let distance = distances.get(i).and_then(|v| v.as_f64()).unwrap_or(0.0);

        hits.push(SearchHit {
            id: id.to_string(),
            text,
            metadata,
            score: 1.0 - distance as f32,
        });
    }

    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_response() {
        let json = serde_json::json!({
            "ids": [["k1", "k2"]],
            "documents": [["first text", "second text"]],
            "metadatas": [[{"source": "a.txt"}, {"source": "b.txt"}]],
            "distances": [[0.1, 0.4]],
        });

        let hits = parse_query_response(&json).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "k1");
        assert_eq!(hits[0].source(), "a.txt");
        assert!((hits[0].score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_parse_empty_query_response() {
        let json = serde_json::json!({"ids": [[]]});
        assert!(parse_query_response(&json).unwrap().is_empty());
    }
}
