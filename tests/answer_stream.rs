//! Streaming answer-generation properties: fragment ordering, sentinel
//! behavior on empty context and failure, and consumer-driven cancellation.

mod common;

use futures_util::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{hash_vector, BrokenEmbedder, EndlessChat, FakeChat, FakeEmbedder};
use docqa::answer::{AnswerGenerator, ERROR_SENTINEL, NOT_FOUND_SENTINEL};
use docqa::chat::ChatModel;
use docqa::models::VectorEntry;
use docqa::retriever::Retriever;
use docqa::vector_store::{memory::MemoryStore, VectorStore};

async fn store_with_one_chunk() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let text = "Vacation requests go through the staff portal.";
    store
        .upsert(vec![VectorEntry {
            id: "k1".to_string(),
            embedding: hash_vector(text, 8),
            metadata: serde_json::json!({"source": "handbook.txt", "page": 0})
                .as_object()
                .unwrap()
                .clone(),
            text: text.to_string(),
        }])
        .await
        .unwrap();
    store
}

fn generator(store: Arc<MemoryStore>, chat: Arc<dyn ChatModel>) -> AnswerGenerator {
    let retriever = Arc::new(Retriever::new(Arc::new(FakeEmbedder::new()), store));
    AnswerGenerator::new(retriever, chat)
}

#[tokio::test]
async fn test_fragments_arrive_in_generation_order() {
    let store = store_with_one_chunk().await;
    let chat = Arc::new(FakeChat::with_fragments(&["Through ", "the ", "portal."]));
    let generator = generator(store, chat);

    let fragments: Vec<String> = generator
        .answer_stream("How do I request vacation?".to_string(), 4, None)
        .collect()
        .await;

    assert_eq!(fragments, vec!["Through ", "the ", "portal."]);
}

#[tokio::test]
async fn test_empty_context_yields_single_not_found_sentinel() {
    let store = Arc::new(MemoryStore::new());
    let chat = Arc::new(FakeChat::with_fragments(&["should never be produced"]));
    let generator = generator(store, chat);

    let fragments: Vec<String> = generator
        .answer_stream("Anything at all?".to_string(), 4, None)
        .collect()
        .await;

    assert_eq!(fragments, vec![NOT_FOUND_SENTINEL.to_string()]);
}

#[tokio::test]
async fn test_retrieval_failure_yields_single_error_sentinel() {
    let store = store_with_one_chunk().await;
    let retriever = Arc::new(Retriever::new(Arc::new(BrokenEmbedder), store));
    let generator = AnswerGenerator::new(
        retriever,
        Arc::new(FakeChat::with_fragments(&["unused"])),
    );

    let fragments: Vec<String> = generator
        .answer_stream("Does this fail cleanly?".to_string(), 4, None)
        .collect()
        .await;

    assert_eq!(fragments, vec![ERROR_SENTINEL.to_string()]);
}

#[tokio::test]
async fn test_mid_stream_failure_ends_with_error_sentinel() {
    let store = store_with_one_chunk().await;
    let chat = Arc::new(FakeChat {
        completion: String::new(),
        fragments: vec!["Partial ".to_string(), "answer".to_string()],
        fail_after: Some(2),
    });
    let generator = generator(store, chat);

    let fragments: Vec<String> = generator
        .answer_stream("What happens on failure?".to_string(), 4, None)
        .collect()
        .await;

    assert_eq!(
        fragments,
        vec![
            "Partial ".to_string(),
            "answer".to_string(),
            ERROR_SENTINEL.to_string()
        ]
    );
}

#[tokio::test]
async fn test_dropping_consumer_cancels_generation() {
    let store = store_with_one_chunk().await;
    let polls = Arc::new(AtomicUsize::new(0));
    let chat = Arc::new(EndlessChat {
        polls: polls.clone(),
    });
    let generator = generator(store, chat);

    let mut fragments = generator.answer_stream("Stream forever?".to_string(), 4, None);
    let first = fragments.next().await;
    assert!(first.is_some());
    drop(fragments);

    // Give the producer time to observe the closed channel, then verify it
    // stopped pulling from the collaborator.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let after_drop = polls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(polls.load(Ordering::SeqCst), after_drop);

    // Bounded channel: the producer can only ever run a small buffer ahead.
    assert!(after_drop < 64);
}

#[tokio::test]
async fn test_filtered_question_reaches_matching_chunk() {
    let store = Arc::new(MemoryStore::new());
    let text = "Security reviews run quarterly.";
    store
        .upsert(vec![VectorEntry {
            id: "sec".to_string(),
            embedding: hash_vector(text, 8),
            metadata: serde_json::json!({
                "source": "security.md",
                "page": 0,
                "department": "IT",
            })
            .as_object()
            .unwrap()
            .clone(),
            text: text.to_string(),
        }])
        .await
        .unwrap();

    let chat = Arc::new(FakeChat::with_fragments(&["Quarterly."]));
    let generator = generator(store, chat);

    let matching = serde_json::json!({"department": "IT"});
    let fragments: Vec<String> = generator
        .answer_stream(
            "How often are security reviews?".to_string(),
            4,
            matching.as_object().cloned(),
        )
        .collect()
        .await;
    assert_eq!(fragments, vec!["Quarterly."]);

    // A non-matching filter retrieves nothing and hits the sentinel path.
    let other = serde_json::json!({"department": "HR"});
    let fragments: Vec<String> = generator
        .answer_stream(
            "How often are security reviews?".to_string(),
            4,
            other.as_object().cloned(),
        )
        .collect()
        .await;
    assert_eq!(fragments, vec![NOT_FOUND_SENTINEL.to_string()]);
}
