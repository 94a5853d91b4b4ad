//! Persisted chunk store: chunk records and their embedding vectors.
//!
//! One redb database holds three tables:
//! - `chunks`: chunk key -> JSON-encoded [`ChunkRecord`]
//! - `vectors`: chunk key -> embedding bytes (4-byte dimension header,
//!   then f32 LE values)
//! - `documents`: doc id -> JSON-encoded document entry (category, chunk
//!   count)
//!
//! Chunk keys come from [`crate::doc_id::chunk_key`], so a document's
//! chunks can be enumerated and replaced without a scan. Replacing a
//! document happens in a single write transaction, which is what makes
//! re-ingestion idempotent.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::{
    doc_id::{DocumentId, chunk_key},
    error::Result,
};

const CHUNKS: TableDefinition<u64, &[u8]> = TableDefinition::new("chunks");
const VECTORS: TableDefinition<u64, &[u8]> = TableDefinition::new("vectors");
const DOCUMENTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("documents");

/// Vector header size: 4 bytes dimension (u32 LE).
const VECTOR_HEADER_SIZE: usize = 4;

/// An immutable unit of retrievable text, produced once at ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Source document identifier (the filename).
    pub doc_id: String,
    /// Human-readable section label.
    pub heading: String,
    pub text: String,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub category: Option<String>,
    /// Zero-based position within the source document.
    pub index: usize,
}

/// Per-document metadata kept alongside the chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocumentEntry {
    category: Option<String>,
    chunks: u32,
}

/// A document listing row for the /docs surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub doc_id: String,
    pub category: Option<String>,
    pub chunks: u32,
}

pub struct ChunkStore {
    db: Database,
}

impl ChunkStore {
    /// Open or create a chunk store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        // Ensure all tables exist by opening them in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(CHUNKS)?;
        txn.open_table(VECTORS)?;
        txn.open_table(DOCUMENTS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Replace a document's chunks and vectors in a single transaction.
    ///
    /// Stale chunks from a previous ingestion of the same document are
    /// removed first, so the stored count always reflects the latest
    /// chunking run.
    pub fn replace_document(
        &self,
        doc_id: &str,
        category: Option<&str>,
        items: &[(ChunkRecord, Vec<f32>)],
    ) -> Result<()> {
        let base = DocumentId::new(doc_id).numeric;

        let txn = self.db.begin_write()?;
        {
            let mut chunks = txn.open_table(CHUNKS)?;
            let mut vectors = txn.open_table(VECTORS)?;
            let mut documents = txn.open_table(DOCUMENTS)?;

            let previous = documents
                .get(doc_id)?
                .and_then(|v| {
                    serde_json::from_slice::<DocumentEntry>(v.value()).ok()
                })
                .map(|entry| entry.chunks)
                .unwrap_or(0);

            for position in 0..previous as usize {
                let key = chunk_key(base, position);
                chunks.remove(key)?;
                vectors.remove(key)?;
            }

            for (record, vector) in items {
                let key = chunk_key(base, record.index);
                chunks.insert(key, serde_json::to_vec(record)?.as_slice())?;
                vectors.insert(key, encode_vector(vector).as_slice())?;
            }

            let entry = DocumentEntry {
                category: category.map(str::to_string),
                chunks: items.len() as u32,
            };
            documents.insert(doc_id, serde_json::to_vec(&entry)?.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Load a chunk record by its storage key.
    pub fn chunk(&self, key: u64) -> Result<Option<ChunkRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CHUNKS)?;
        Ok(table
            .get(key)?
            .and_then(|v| serde_json::from_slice(v.value()).ok()))
    }

    /// Load every stored (chunk key, embedding vector) pair.
    ///
    /// Malformed entries are skipped.
    pub fn vectors(&self) -> Result<Vec<(u64, Vec<f32>)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(VECTORS)?;

        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            if let Some(vector) = decode_vector(v.value()) {
                result.push((k.value(), vector));
            }
        }
        Ok(result)
    }

    /// Whether the store holds any embedding vectors at all.
    pub fn is_empty(&self) -> Result<bool> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(VECTORS)?;
        Ok(table.iter()?.next().is_none())
    }

    /// Total number of stored chunks.
    pub fn chunk_count(&self) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CHUNKS)?;
        Ok(table.iter()?.count())
    }

    /// List all ingested documents, sorted by doc id.
    pub fn list_documents(&self) -> Result<Vec<DocumentInfo>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;

        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            if let Ok(entry) =
                serde_json::from_slice::<DocumentEntry>(v.value())
            {
                result.push(DocumentInfo {
                    doc_id: k.value().to_string(),
                    category: entry.category,
                    chunks: entry.chunks,
                });
            }
        }
        Ok(result)
    }

    /// Look up a single ingested document.
    pub fn document(&self, doc_id: &str) -> Result<Option<DocumentInfo>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        Ok(table.get(doc_id)?.and_then(|v| {
            serde_json::from_slice::<DocumentEntry>(v.value()).ok().map(
                |entry| DocumentInfo {
                    doc_id: doc_id.to_string(),
                    category: entry.category,
                    chunks: entry.chunks,
                },
            )
        }))
    }
}

impl std::fmt::Debug for ChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStore").finish_non_exhaustive()
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes =
        Vec::with_capacity(VECTOR_HEADER_SIZE + std::mem::size_of_val(vector));
    bytes.extend_from_slice(&(vector.len() as u32).to_le_bytes());
    bytes.extend_from_slice(bytemuck::cast_slice(vector));
    bytes
}

fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() < VECTOR_HEADER_SIZE {
        return None;
    }
    let dimension = u32::from_le_bytes(bytes[0..4].try_into().ok()?) as usize;
    if bytes.len() != VECTOR_HEADER_SIZE + dimension * 4 {
        return None;
    }
    Some(bytemuck::cast_slice(&bytes[VECTOR_HEADER_SIZE..]).to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(doc_id: &str, index: usize, text: &str) -> ChunkRecord {
        ChunkRecord {
            doc_id: doc_id.to_string(),
            heading: text.lines().next().unwrap_or("").to_string(),
            text: text.to_string(),
            page: None,
            category: Some("Leave".to_string()),
            index,
        }
    }

    fn test_store() -> (tempfile::TempDir, ChunkStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = ChunkStore::open(&tmp.path().join("chunks.redb")).unwrap();
        (tmp, store)
    }

    #[test]
    fn replace_and_load_roundtrip() {
        let (_tmp, store) = test_store();
        let rec = record("leave_policy.txt", 0, "Casual Leave: 12 days");

        store
            .replace_document(
                "leave_policy.txt",
                Some("Leave"),
                &[(rec.clone(), vec![1.0, 0.0, 0.5])],
            )
            .unwrap();

        let base = DocumentId::new("leave_policy.txt").numeric;
        let loaded = store.chunk(chunk_key(base, 0)).unwrap().unwrap();
        assert_eq!(loaded, rec);

        let vectors = store.vectors().unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(vectors[0].1, vec![1.0, 0.0, 0.5]);
    }

    #[test]
    fn reingest_replaces_stale_chunks() {
        let (_tmp, store) = test_store();
        let items: Vec<_> = (0..3)
            .map(|i| {
                (record("doc.txt", i, &format!("chunk {i}")), vec![i as f32])
            })
            .collect();
        store.replace_document("doc.txt", None, &items).unwrap();
        assert_eq!(store.chunk_count().unwrap(), 3);

        // Re-ingest with fewer chunks; the extras must disappear.
        store
            .replace_document("doc.txt", None, &items[..1])
            .unwrap();
        assert_eq!(store.chunk_count().unwrap(), 1);
        assert_eq!(store.vectors().unwrap().len(), 1);
        assert_eq!(store.document("doc.txt").unwrap().unwrap().chunks, 1);
    }

    #[test]
    fn documents_are_listed() {
        let (_tmp, store) = test_store();
        store
            .replace_document(
                "leave_policy.txt",
                Some("Leave"),
                &[(record("leave_policy.txt", 0, "text"), vec![1.0])],
            )
            .unwrap();
        store
            .replace_document(
                "exit_policy.txt",
                Some("Exit"),
                &[(record("exit_policy.txt", 0, "text"), vec![1.0])],
            )
            .unwrap();

        let docs = store.list_documents().unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().any(|d| d.doc_id == "leave_policy.txt"));

        let doc = store.document("exit_policy.txt").unwrap().unwrap();
        assert_eq!(doc.category.as_deref(), Some("Exit"));
        assert!(store.document("missing.txt").unwrap().is_none());
    }

    #[test]
    fn empty_store_reports_empty() {
        let (_tmp, store) = test_store();
        assert!(store.is_empty().unwrap());

        store
            .replace_document(
                "doc.txt",
                None,
                &[(record("doc.txt", 0, "text"), vec![0.1, 0.2])],
            )
            .unwrap();
        assert!(!store.is_empty().unwrap());
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("chunks.redb");

        {
            let store = ChunkStore::open(&path).unwrap();
            store
                .replace_document(
                    "doc.txt",
                    None,
                    &[(record("doc.txt", 0, "persisted"), vec![1.0, 2.0])],
                )
                .unwrap();
        }

        {
            let store = ChunkStore::open(&path).unwrap();
            assert_eq!(store.chunk_count().unwrap(), 1);
            let vectors = store.vectors().unwrap();
            assert_eq!(vectors[0].1, vec![1.0, 2.0]);
        }
    }

    #[test]
    fn vector_encoding_roundtrip() {
        let vector = vec![0.25, -1.5, 3.0];
        assert_eq!(decode_vector(&encode_vector(&vector)), Some(vector));
    }

    #[test]
    fn malformed_vector_bytes_are_rejected() {
        assert_eq!(decode_vector(&[]), None);
        assert_eq!(decode_vector(&[3, 0]), None);
        // Header claims 2 floats but only one is present.
        let mut bytes = 2u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&1.0f32.to_le_bytes());
        assert_eq!(decode_vector(&bytes), None);
    }
}
