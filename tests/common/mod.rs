//! Shared fakes for the integration suites: deterministic embeddings and a
//! scripted chat model, substituted through the collaborator traits.

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use docqa::chat::{ChatModel, FragmentStream};
use docqa::embedding::Embedder;
use docqa::error::{Error, Result};
use docqa::models::ChatMessage;

/// Deterministic pseudo-embedding: identical text always maps to the same
/// unit vector, similar to nothing else in particular.
pub fn hash_vector(text: &str, dims: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dims];
    for (i, b) in text.bytes().enumerate() {
        v[i % dims] += b as f32 / 255.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

pub struct FakeEmbedder {
    pub dims: usize,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self { dims: 8 }
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_vector(t, self.dims)).collect())
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

/// Embedder that fails on one specific call (0-based), isolating a single
/// batch while the surrounding batches succeed.
pub struct FlakyEmbedder {
    inner: FakeEmbedder,
    fail_on_call: usize,
    calls: AtomicUsize,
}

impl FlakyEmbedder {
    pub fn failing_on(call: usize) -> Self {
        Self {
            inner: FakeEmbedder::new(),
            fail_on_call: call,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == self.fail_on_call {
            return Err(Error::embedding("simulated embedding outage"));
        }
        self.inner.embed(texts).await
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }
}

/// Embedder that always fails; drives the retrieval-failure path.
pub struct BrokenEmbedder;

#[async_trait]
impl Embedder for BrokenEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::embedding("embedding service unreachable"))
    }

    fn dims(&self) -> usize {
        8
    }
}

/// Chat model with a fixed completion and scripted stream fragments.
/// `fail_after` injects a stream error after that many fragments.
pub struct FakeChat {
    pub completion: String,
    pub fragments: Vec<String>,
    pub fail_after: Option<usize>,
}

impl FakeChat {
    pub fn with_fragments(fragments: &[&str]) -> Self {
        Self {
            completion: String::new(),
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            fail_after: None,
        }
    }

    pub fn silent() -> Self {
        Self::with_fragments(&[])
    }
}

#[async_trait]
impl ChatModel for FakeChat {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        Ok(self.completion.clone())
    }

    async fn stream(&self, _messages: &[ChatMessage]) -> Result<FragmentStream> {
        let mut items: Vec<Result<String>> = self
            .fragments
            .iter()
            .take(self.fail_after.unwrap_or(usize::MAX))
            .cloned()
            .map(Ok)
            .collect();
        if self.fail_after.is_some() {
            items.push(Err(Error::Chat("simulated stream failure".to_string())));
        }
        Ok(futures_util::stream::iter(items).boxed())
    }
}

/// Chat model whose stream never ends; counts every fragment pulled so a
/// test can observe that cancellation stops the pulling.
pub struct EndlessChat {
    pub polls: Arc<AtomicUsize>,
}

#[async_trait]
impl ChatModel for EndlessChat {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        Ok(String::new())
    }

    async fn stream(&self, _messages: &[ChatMessage]) -> Result<FragmentStream> {
        let polls = self.polls.clone();
        let stream = futures_util::stream::unfold(0u64, move |i| {
            let polls = polls.clone();
            async move {
                polls.fetch_add(1, Ordering::SeqCst);
                Some((Ok(format!("fragment {} ", i)), i + 1))
            }
        });
        Ok(stream.boxed())
    }
}
