//! The retrieval pipeline: from a question to a grounded, cited answer.
//!
//! One invocation embeds the question, retrieves the nearest chunks,
//! assembles a bounded prompt, calls the generator, and shapes the
//! completion into an [`AskResponse`]. All intermediate state is local to
//! the invocation, so any number of asks may run concurrently against the
//! shared index.
//!
//! Citations are built from the retrieved chunks rather than parsed out
//! of the model text. The model is never trusted to emit structured
//! citations; the cost is that a citation may cover context the answer
//! didn't use.

use std::time::Instant;

use crate::{
    embedding::EmbeddingProvider,
    error::{Error, Result},
    generate::AnswerGenerator,
    index::{ScoredChunk, SearchOptions, VectorIndex},
    prompt::{self, DISCLAIMER, REFUSAL, build_prompt},
    schemas::{AnswerMetadata, AskRequest, AskResponse, Citation, Confidence},
};

/// Citation snippets are hard-cut to this many characters.
pub const CITATION_SNIPPET_CHARS: usize = 500;

/// The shaped answer line is hard-cut to this many characters.
const MAX_ANSWER_CHARS: usize = 1000;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// k used when the request doesn't specify one.
    pub default_top_k: usize,
    /// Hard ceiling on k, to bound retrieval and prompt cost.
    pub max_top_k: usize,
    /// Minimum similarity for a chunk to enter the context.
    pub score_threshold: f32,
    /// Reported in answer metadata.
    pub model_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_top_k: 20,
            score_threshold: 0.10,
            model_name: "gpt-4o-mini".to_string(),
        }
    }
}

pub struct Pipeline<E, G> {
    index: VectorIndex,
    embedder: E,
    generator: G,
    config: PipelineConfig,
}

impl<E, G> Pipeline<E, G>
where
    E: EmbeddingProvider,
    G: AnswerGenerator,
{
    pub fn new(
        index: VectorIndex,
        embedder: E,
        generator: G,
        config: PipelineConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            generator,
            config,
        }
    }

    /// The embedding provider, shared with ingestion.
    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Answer a question from the indexed policy chunks.
    ///
    /// Fails with [`Error::RetrievalUnavailable`] when the index is empty
    /// or the question cannot be embedded, and [`Error::Generation`] when
    /// the generator errors or returns unusable output. A question that
    /// retrieves nothing above the similarity threshold is not an error:
    /// it produces the fixed refusal answer without calling the generator.
    pub async fn ask(&self, req: &AskRequest) -> Result<AskResponse> {
        let started = Instant::now();

        let question = req.question.trim();
        if question.is_empty() {
            return Err(Error::Validation(
                "question must not be empty".into(),
            ));
        }
        let requested_k = req.top_k.unwrap_or(self.config.default_top_k);
        if requested_k == 0 {
            return Err(Error::Validation("top_k must be at least 1".into()));
        }
        let top_k = requested_k.min(self.config.max_top_k);

        if self.index.is_empty()? {
            return Err(Error::RetrievalUnavailable(
                "the chunk index is empty; ingest policy documents first"
                    .into(),
            ));
        }

        let query = self
            .embedder
            .embed(std::slice::from_ref(&req.question))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::RetrievalUnavailable(
                    "embedding provider returned no vector".into(),
                )
            })?;

        let hits = self.index.search(&query, &SearchOptions {
            top_k,
            threshold: self.config.score_threshold,
            filters: req.filters.as_ref(),
        })?;

        if hits.is_empty() {
            tracing::debug!(
                question,
                "no chunk cleared the similarity threshold"
            );
            return Ok(self.refusal(top_k, started));
        }

        let prompt =
            build_prompt(question, req.follow_up_context.as_deref(), &hits);
        let completion = self.generator.complete(&prompt).await?;

        self.shape(&hits, &completion, top_k, started)
    }

    /// The designed "no policy match" answer: normal content, never an
    /// error, and produced without touching the generator.
    fn refusal(&self, top_k: usize, started: Instant) -> AskResponse {
        AskResponse {
            answer: REFUSAL.to_string(),
            citations: Vec::new(),
            policy_matches: Vec::new(),
            confidence: Confidence::Low,
            disclaimer: Some(DISCLAIMER.to_string()),
            metadata: self.metadata(top_k, started),
        }
    }

    fn shape(
        &self,
        hits: &[ScoredChunk],
        completion: &str,
        top_k: usize,
        started: Instant,
    ) -> Result<AskResponse> {
        let answer = completion
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(|line| prompt::cut_chars(line, MAX_ANSWER_CHARS).to_string())
            .ok_or_else(|| {
                Error::Generation("generator returned unusable output".into())
            })?;

        let citations = hits
            .iter()
            .map(|hit| Citation {
                doc_id: hit.chunk.doc_id.clone(),
                section: hit.chunk.heading.clone(),
                snippet: prompt::cut_chars(
                    &hit.chunk.text,
                    CITATION_SNIPPET_CHARS,
                )
                .to_string(),
                page: hit.chunk.page,
            })
            .collect();

        // Labels of the retrieved context, not of what the model actually
        // used: a known approximation that over-cites rather than
        // under-cites.
        let mut policy_matches: Vec<String> = Vec::new();
        for hit in hits {
            let label = hit
                .chunk
                .category
                .clone()
                .unwrap_or_else(|| hit.chunk.doc_id.clone());
            if !policy_matches.contains(&label) {
                policy_matches.push(label);
            }
        }

        Ok(AskResponse {
            answer,
            citations,
            policy_matches,
            confidence: confidence_for(hits[0].score),
            disclaimer: Some(DISCLAIMER.to_string()),
            metadata: self.metadata(top_k, started),
        })
    }

    fn metadata(&self, top_k: usize, started: Instant) -> AnswerMetadata {
        AnswerMetadata {
            latency_ms: started.elapsed().as_millis() as u64,
            retriever_k: top_k,
            model: self.config.model_name.clone(),
        }
    }
}

/// Confidence derived from the best similarity score (cosine convention).
fn confidence_for(top_score: f32) -> Confidence {
    if top_score >= 0.75 {
        Confidence::High
    } else if top_score >= 0.40 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}
