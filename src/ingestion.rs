//! Ingestion: load, chunk, embed, and upsert policy documents.
//!
//! Batches are isolated per file: one bad upload is recorded in the
//! report's errors and never aborts its siblings.

use crate::{
    chunking::{ChunkingConfig, chunk_heading, chunk_text},
    embedding::EmbeddingProvider,
    error::Result,
    loader::{LoadedDocument, load_bytes},
    store::{ChunkRecord, ChunkStore},
};

/// Outcome of a batch ingestion: total chunks upserted plus one error
/// string per failed file.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub upserted: usize,
    pub errors: Vec<String>,
}

/// Ingest a single loaded document: chunk, embed, and replace its entry
/// in the store. Returns the number of chunks upserted.
///
/// Chunking is deterministic for a given configuration, so re-ingesting
/// an unchanged document yields the same count.
pub async fn ingest_document<E: EmbeddingProvider>(
    store: &ChunkStore,
    embedder: &E,
    config: &ChunkingConfig,
    doc: &LoadedDocument,
) -> Result<usize> {
    let chunks = chunk_text(&doc.text, config.chunk_size, config.overlap);
    if chunks.is_empty() {
        store.replace_document(&doc.filename, Some(&doc.category), &[])?;
        return Ok(0);
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed(&texts).await?;

    let items: Vec<(ChunkRecord, Vec<f32>)> = chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| {
            (
                ChunkRecord {
                    doc_id: doc.filename.clone(),
                    heading: chunk_heading(&chunk.text),
                    text: chunk.text,
                    page: None,
                    category: Some(doc.category.clone()),
                    index: chunk.index,
                },
                vector,
            )
        })
        .collect();

    store.replace_document(&doc.filename, Some(&doc.category), &items)?;

    tracing::info!(
        doc_id = %doc.filename,
        chunks = items.len(),
        "ingested document"
    );
    Ok(items.len())
}

/// Ingest a batch of uploaded files, isolating failures per file.
pub async fn ingest_batch<E: EmbeddingProvider>(
    store: &ChunkStore,
    embedder: &E,
    config: &ChunkingConfig,
    files: &[(String, Vec<u8>)],
) -> IngestReport {
    let mut report = IngestReport::default();

    for (filename, bytes) in files {
        let outcome = async {
            let doc = load_bytes(filename, bytes)?;
            ingest_document(store, embedder, config, &doc).await
        }
        .await;

        match outcome {
            Ok(count) => report.upserted += count,
            Err(e) => {
                tracing::warn!(file = %filename, error = %e, "ingestion failed");
                report.errors.push(format!("{filename}: {e}"));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::Result;

    /// Embeds every text as a constant unit vector; ingestion only needs
    /// shape, not semantics.
    struct ConstantEmbedder;

    impl EmbeddingProvider for ConstantEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn test_store() -> (tempfile::TempDir, Arc<ChunkStore>) {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(
            ChunkStore::open(&tmp.path().join("chunks.redb")).unwrap(),
        );
        (tmp, store)
    }

    #[tokio::test]
    async fn ingest_chunks_and_metadata() {
        let (_tmp, store) = test_store();
        let doc = LoadedDocument {
            filename: "leave_policy.txt".to_string(),
            category: "Leave".to_string(),
            text: "Casual Leave\nEmployees get 12 days per year.".to_string(),
        };

        let count = ingest_document(
            &store,
            &ConstantEmbedder,
            &ChunkingConfig::default(),
            &doc,
        )
        .await
        .unwrap();

        assert_eq!(count, 1);
        let info = store.document("leave_policy.txt").unwrap().unwrap();
        assert_eq!(info.category.as_deref(), Some("Leave"));

        let key = crate::doc_id::chunk_key(
            crate::doc_id::DocumentId::new("leave_policy.txt").numeric,
            0,
        );
        let chunk = store.chunk(key).unwrap().unwrap();
        assert_eq!(chunk.heading, "Casual Leave");
        assert_eq!(chunk.category.as_deref(), Some("Leave"));
    }

    #[tokio::test]
    async fn reingestion_is_idempotent() {
        let (_tmp, store) = test_store();
        let doc = LoadedDocument {
            filename: "leave_policy.txt".to_string(),
            category: "Leave".to_string(),
            text: "Policy clause. ".repeat(300),
        };
        let config = ChunkingConfig::default();

        let first =
            ingest_document(&store, &ConstantEmbedder, &config, &doc)
                .await
                .unwrap();
        let second =
            ingest_document(&store, &ConstantEmbedder, &config, &doc)
                .await
                .unwrap();

        assert!(first > 1, "long document should produce several chunks");
        assert_eq!(first, second);
        assert_eq!(store.chunk_count().unwrap(), first);
    }

    #[tokio::test]
    async fn batch_isolates_failures() {
        let (_tmp, store) = test_store();
        let files = vec![
            (
                "leave_policy.txt".to_string(),
                b"Casual Leave: 12 days per year.".to_vec(),
            ),
            ("salary.pdf".to_string(), b"%PDF-1.4 binary".to_vec()),
            (
                "exit_policy.txt".to_string(),
                b"Notice period is 60 days.".to_vec(),
            ),
        ];

        let report = ingest_batch(
            &store,
            &ConstantEmbedder,
            &ChunkingConfig::default(),
            &files,
        )
        .await;

        assert_eq!(report.upserted, 2, "files 1 and 3 each yield one chunk");
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("salary.pdf:"));

        assert!(store.document("leave_policy.txt").unwrap().is_some());
        assert!(store.document("exit_policy.txt").unwrap().is_some());
        assert!(store.document("salary.pdf").unwrap().is_none());
    }

    #[tokio::test]
    async fn chunk_text_feeds_citation_bounds() {
        // A chunk longer than the citation snippet cut must still ingest
        // whole; truncation happens at response shaping, not here.
        let (_tmp, store) = test_store();
        let long_line = "policy ".repeat(120); // ~840 chars, single chunk
        let doc = LoadedDocument {
            filename: "long_policy.txt".to_string(),
            category: "Long".to_string(),
            text: long_line.clone(),
        };

        ingest_document(
            &store,
            &ConstantEmbedder,
            &ChunkingConfig::default(),
            &doc,
        )
        .await
        .unwrap();

        let key = crate::doc_id::chunk_key(
            crate::doc_id::DocumentId::new("long_policy.txt").numeric,
            0,
        );
        let chunk = store.chunk(key).unwrap().unwrap();
        assert!(
            chunk.text.chars().count()
                > crate::pipeline::CITATION_SNIPPET_CHARS
        );
        assert_eq!(chunk.text.trim_end(), long_line.trim_end());
    }
}
