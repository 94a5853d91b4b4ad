//! Nearest-neighbor search over the stored chunk embeddings.
//!
//! Scoring is brute-force cosine similarity over every stored vector,
//! parallelized with rayon. Scores follow the cosine convention (higher =
//! closer, range [-1, 1]) and are surfaced as-is, never re-normalized.

use std::{collections::HashMap, sync::Arc};

use rayon::prelude::*;

use crate::{
    error::Result,
    store::{ChunkRecord, ChunkStore},
};

/// A retrieved chunk with its similarity score and 1-indexed rank.
///
/// Ephemeral: produced per query, discarded after response assembly.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: ChunkRecord,
    pub score: f32,
    pub rank: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions<'a> {
    pub top_k: usize,
    /// Minimum similarity; results below it are discarded.
    pub threshold: f32,
    /// Metadata filters (`doc_id`, `category`, `section`); every entry
    /// must match. An unknown key matches nothing.
    pub filters: Option<&'a HashMap<String, String>>,
}

/// Read-side view of the chunk store for similarity queries.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    store: Arc<ChunkStore>,
}

impl VectorIndex {
    pub fn new(store: Arc<ChunkStore>) -> Self {
        Self { store }
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.store.is_empty()
    }

    /// Return the `top_k` most similar chunks above the threshold, best
    /// first. Vectors whose dimension differs from the query are skipped.
    pub fn search(
        &self,
        query: &[f32],
        opts: &SearchOptions<'_>,
    ) -> Result<Vec<ScoredChunk>> {
        let vectors = self.store.vectors()?;

        let mut scored: Vec<(u64, f32)> = vectors
            .par_iter()
            .filter_map(|(key, vector)| {
                (vector.len() == query.len())
                    .then(|| (*key, cosine_similarity(query, vector)))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut hits = Vec::new();
        for (key, score) in scored {
            if hits.len() == opts.top_k {
                break;
            }
            // Sorted descending, so everything past here is below too.
            if score < opts.threshold {
                break;
            }
            let Some(chunk) = self.store.chunk(key)? else {
                continue;
            };
            if let Some(filters) = opts.filters
                && !matches_filters(&chunk, filters)
            {
                continue;
            }
            hits.push(ScoredChunk {
                chunk,
                score,
                rank: hits.len() + 1,
            });
        }

        Ok(hits)
    }
}

fn matches_filters(
    chunk: &ChunkRecord,
    filters: &HashMap<String, String>,
) -> bool {
    filters.iter().all(|(key, value)| match key.as_str() {
        "doc_id" | "source" => chunk.doc_id == *value,
        "category" => chunk.category.as_deref() == Some(value.as_str()),
        "section" | "heading" => chunk.heading == *value,
        _ => false,
    })
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}
