//! Document category/department inference.
//!
//! Sends the head of a document's text to the chat collaborator and parses
//! a JSON classification out of the reply. This boundary never fails
//! outward: any error falls back to the default pair.

use crate::chat::ChatModel;
use crate::models::ChatMessage;

/// Characters of document text handed to the classifier.
const CLASSIFY_HEAD_CHARS: usize = 2000;

pub const DEFAULT_CATEGORY: &str = "other";
pub const DEFAULT_DEPARTMENT: &str = "General";

const CATEGORIES: &str = "policy, manual, guideline, FAQ, report, minutes, notice, other";

/// Inferred document classification.
#[derive(Debug, Clone, PartialEq)]
pub struct InferredMetadata {
    pub category: String,
    pub department: String,
}

impl Default for InferredMetadata {
    fn default() -> Self {
        Self {
            category: DEFAULT_CATEGORY.to_string(),
            department: DEFAULT_DEPARTMENT.to_string(),
        }
    }
}

/// Classify a document's category and owning department from its leading
/// text. Called once per document, not per chunk.
pub async fn infer_metadata(chat: &dyn ChatModel, text: &str) -> InferredMetadata {
    let head: String = text.chars().take(CLASSIFY_HEAD_CHARS).collect();
    let prompt = format!(
        "Classify the following internal document and reply with JSON only.\n\n\
         Category candidates: {CATEGORIES}\n\
         If the owning department is unclear, use \"{DEFAULT_DEPARTMENT}\".\n\n\
         {{\"category\": \"...\", \"department\": \"...\"}}\n\n\
         Document content:\n{head}"
    );

    match chat.complete(&[ChatMessage::user(prompt)]).await {
        Ok(reply) => parse_classification(&reply),
        Err(e) => {
            tracing::warn!("Metadata inference failed, using defaults: {}", e);
            InferredMetadata::default()
        }
    }
}

/// Parse a classification reply, tolerating a fenced code block wrapper.
/// Anything unparseable yields the defaults.
fn parse_classification(reply: &str) -> InferredMetadata {
    let content = strip_fence(reply.trim());

    let parsed: serde_json::Value = match serde_json::from_str(content.trim()) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Unparseable classification reply, using defaults: {}", e);
            return InferredMetadata::default();
        }
    };

    let field = |name: &str, default: &str| {
        parsed
            .get(name)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(default)
            .to_string()
    };

    InferredMetadata {
        category: field("category", DEFAULT_CATEGORY),
        department: field("department", DEFAULT_DEPARTMENT),
    }
}

fn strip_fence(content: &str) -> &str {
    if !content.contains("```") {
        return content;
    }
    let mut parts = content.split("```");
    let _before = parts.next();
    match parts.next() {
        Some(inner) => inner.strip_prefix("json").unwrap_or(inner),
        None => content,
    }
}
