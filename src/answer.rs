//! Streamed, grounded answer generation.
//!
//! Retrieval and generation run in a producer task that feeds a bounded
//! channel; the consumer side relays fragments as they arrive. Dropping the
//! consumer closes the channel, the producer's next send fails, and it stops
//! pulling fragments from the chat collaborator — no orphaned work.
//!
//! This boundary never raises: any retrieval or generation failure becomes
//! exactly one error sentinel fragment followed by a clean end of stream.

use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::chat::ChatModel;
use crate::models::{ChatMessage, SearchHit};
use crate::retriever::Retriever;

/// Fragment emitted when retrieval finds nothing to ground an answer on.
pub const NOT_FOUND_SENTINEL: &str =
    "The requested information was not found in the indexed documents.";

/// Fragment emitted when retrieval or generation fails.
pub const ERROR_SENTINEL: &str = "[ERROR] Answer generation failed.";

const SYSTEM_PROMPT: &str = "\
You are an assistant that answers questions about indexed documents.
Answer the user's question using only the context below.
If the context does not contain the answer, reply exactly:
\"The requested information was not found in the indexed documents.\"

Context:
";

/// Buffered fragments between producer and consumer.
const CHANNEL_CAPACITY: usize = 16;

pub struct AnswerGenerator {
    retriever: Arc<Retriever>,
    chat: Arc<dyn ChatModel>,
}

impl AnswerGenerator {
    pub fn new(retriever: Arc<Retriever>, chat: Arc<dyn ChatModel>) -> Self {
        Self { retriever, chat }
    }

    /// Stream an answer to `question` grounded in the k nearest chunks.
    /// Fragments arrive in generation order, first fragment before the full
    /// answer exists.
    pub fn answer_stream(
        &self,
        question: String,
        k: usize,
        metadata_filter: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> ReceiverStream<String> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let retriever = self.retriever.clone();
        let chat = self.chat.clone();

        tokio::spawn(async move {
            produce(retriever, chat, question, k, metadata_filter, tx).await;
        });

        ReceiverStream::new(rx)
    }
}

async fn produce(
    retriever: Arc<Retriever>,
    chat: Arc<dyn ChatModel>,
    question: String,
    k: usize,
    metadata_filter: Option<serde_json::Map<String, serde_json::Value>>,
    tx: mpsc::Sender<String>,
) {
    let hits = match retriever
        .retrieve(&question, k, metadata_filter.as_ref())
        .await
    {
        Ok(hits) => hits,
        Err(e) => {
            tracing::error!("Retrieval failed: {}", e);
            let _ = tx.send(ERROR_SENTINEL.to_string()).await;
            return;
        }
    };

    if hits.is_empty() {
        let _ = tx.send(NOT_FOUND_SENTINEL.to_string()).await;
        return;
    }

    let messages = vec![
        ChatMessage::system(format!("{}{}", SYSTEM_PROMPT, format_context(&hits))),
        ChatMessage::user(question),
    ];

    let mut fragments = match chat.stream(&messages).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!("Generation failed to start: {}", e);
            let _ = tx.send(ERROR_SENTINEL.to_string()).await;
            return;
        }
    };

    while let Some(item) = fragments.next().await {
        match item {
            Ok(fragment) => {
                if tx.send(fragment).await.is_err() {
                    // Consumer went away; stop pulling from the collaborator.
                    tracing::debug!("Answer consumer dropped, cancelling generation");
                    return;
                }
            }
            Err(e) => {
                tracing::error!("Generation stream failed: {}", e);
                let _ = tx.send(ERROR_SENTINEL.to_string()).await;
                return;
            }
        }
    }
}

/// Render retrieved chunks as a context block: one `[source, page]` header
/// per chunk, blocks separated by blank lines.
pub fn format_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| format!("[source: {}, page: {}]\n{}", hit.source(), hit.page(), hit.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
