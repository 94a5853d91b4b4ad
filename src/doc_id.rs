use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

/// A stable document identifier derived from the source filename.
///
/// The numeric form keys redb tables; the short hex form is for human
/// display and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentId {
    /// The numeric ID used as the key in redb tables.
    pub numeric: u64,
    /// The short hex string for human display (e.g. "a1b2c3d4").
    pub short: String,
}

impl DocumentId {
    /// Generate a stable document ID from the source filename.
    pub fn new(filename: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        filename.hash(&mut hasher);
        let numeric = hasher.finish();
        Self {
            numeric,
            short: format!("{numeric:016x}")[..8].to_string(),
        }
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.short)
    }
}

/// Derive a chunk-level storage key from a document key and chunk position.
///
/// Chunk identity is (document, position): chunk 0 reuses the document key,
/// later chunks fold the position into the upper bits.
pub fn chunk_key(base_id: u64, chunk_index: usize) -> u64 {
    if chunk_index == 0 {
        base_id
    } else {
        base_id ^ ((chunk_index as u64) << 48)
    }
}

/// Recover (document key, position) from a chunk key.
///
/// Only reliable when the chunk key was produced by [`chunk_key`] with a
/// position below 2^16.
pub fn parse_chunk_key(key: u64) -> (u64, usize) {
    let chunk_index = (key >> 48) as usize;
    if chunk_index == 0 {
        (key, 0)
    } else {
        (key ^ ((chunk_index as u64) << 48), chunk_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = DocumentId::new("leave_policy.txt");
        let b = DocumentId::new("leave_policy.txt");
        assert_eq!(a, b);
    }

    #[test]
    fn different_filenames_differ() {
        let a = DocumentId::new("leave_policy.txt");
        let b = DocumentId::new("exit_policy.txt");
        assert_ne!(a.numeric, b.numeric);
    }

    #[test]
    fn display_has_hash_prefix() {
        let id = DocumentId::new("leave_policy.txt");
        let s = id.to_string();
        assert!(s.starts_with('#'));
        assert_eq!(s.len(), 9); // # + 8 hex chars
    }

    #[test]
    fn chunk_key_roundtrip() {
        let base = DocumentId::new("leave_policy.txt").numeric;

        assert_eq!(chunk_key(base, 0), base);
        assert_eq!(parse_chunk_key(chunk_key(base, 0)), (base, 0));

        let key = chunk_key(base, 3);
        assert_ne!(key, base);
        assert_eq!(parse_chunk_key(key), (base, 3));
    }

    #[test]
    fn chunk_keys_are_distinct() {
        let base = DocumentId::new("leave_policy.txt").numeric;
        let keys: Vec<u64> = (0..10).map(|i| chunk_key(base, i)).collect();
        let unique: std::collections::HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), keys.len());
    }
}
