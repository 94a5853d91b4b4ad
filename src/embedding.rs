//! Embedding provider: maps text to fixed-length vectors.
//!
//! The provider is a trait seam so the pipeline can be exercised with a
//! deterministic fake in tests. The production implementation talks to an
//! OpenAI-compatible `/embeddings` endpoint.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub trait EmbeddingProvider {
    /// Embed a batch of texts, preserving input order.
    fn embed(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send;
}

/// Client for an OpenAI-compatible embeddings endpoint.
///
/// Failures surface as [`Error::RetrievalUnavailable`]: embedding is the
/// retrieval leg of the pipeline, and a query that cannot be embedded
/// cannot be answered from the index.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(
        http: reqwest::Client,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

impl EmbeddingProvider for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .http
            .post(format!("{}/embeddings", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| {
                Error::RetrievalUnavailable(format!(
                    "embedding request failed: {e}"
                ))
            })?;

        if !response.status().is_success() {
            return Err(Error::RetrievalUnavailable(format!(
                "embedding provider returned {}",
                response.status()
            )));
        }

        let body: EmbeddingResponse = response.json().await.map_err(|e| {
            Error::RetrievalUnavailable(format!(
                "unreadable embedding response: {e}"
            ))
        })?;

        if body.data.len() != texts.len() {
            return Err(Error::RetrievalUnavailable(format!(
                "embedding provider returned {} vectors for {} inputs",
                body.data.len(),
                texts.len()
            )));
        }

        // The provider tags each vector with its input index; don't trust
        // the wire order.
        let mut entries = body.data;
        entries.sort_by_key(|e| e.index);
        Ok(entries.into_iter().map(|e| e.embedding).collect())
    }
}
