//! Request and response shapes for the HTTP surface.
//!
//! Chunk metadata is validated into typed records at the ingestion
//! boundary; these are the equally typed shapes it flows out through.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A question for the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
    /// Metadata filters narrowing retrieval (e.g. `category`, `doc_id`).
    #[serde(default)]
    pub filters: Option<HashMap<String, String>>,
    /// Number of chunks to retrieve; defaults to 5, must be at least 1.
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Prior conversation context for follow-up questions.
    #[serde(default)]
    pub follow_up_context: Option<String>,
}

/// A pointer from an answer back to the chunk that supports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub doc_id: String,
    pub section: String,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

/// Coarse answer confidence. Always present on an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerMetadata {
    pub latency_ms: u64,
    /// The clamped k actually used for retrieval.
    pub retriever_k: usize,
    pub model: String,
}

/// A grounded answer with citations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    /// Ordered by retrieval rank; at most `top_k` entries.
    pub citations: Vec<Citation>,
    /// Deduplicated category/document labels of the retrieved context.
    pub policy_matches: Vec<String>,
    pub confidence: Confidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disclaimer: Option<String>,
    pub metadata: AnswerMetadata,
}

/// Batch ingestion report: total chunks upserted plus per-file errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub upserted: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub answer_id: String,
    pub helpful: bool,
    #[serde(default)]
    pub comment: Option<String>,
}
