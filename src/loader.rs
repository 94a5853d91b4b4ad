//! File-type-specific document loading for ingestion.
//!
//! Only plain-text formats are supported; anything else is reported as a
//! per-file ingestion error rather than aborting the batch.

use std::path::Path;

use crate::error::{Error, Result};

/// Supported file extensions for policy documents.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["md", "txt"];

/// A document read and validated at the ingestion boundary.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// Source filename; doubles as the document id in citations.
    pub filename: String,
    /// Policy category derived from the filename.
    pub category: String,
    pub text: String,
}

/// Load a document from raw upload bytes.
pub fn load_bytes(filename: &str, bytes: &[u8]) -> Result<LoadedDocument> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some(ext) if SUPPORTED_EXTENSIONS.contains(&ext) => {}
        _ => {
            return Err(Error::Ingestion(format!(
                "unsupported file type (expected one of: {})",
                SUPPORTED_EXTENSIONS.join(", ")
            )));
        }
    }

    let text = std::str::from_utf8(bytes)
        .map_err(|_| Error::Ingestion("file is not valid UTF-8".into()))?;

    Ok(LoadedDocument {
        filename: filename.to_string(),
        category: derive_category(filename),
        text: text.to_string(),
    })
}

/// Load a document from a filesystem path.
pub fn load_path(path: &Path) -> Result<LoadedDocument> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Ingestion("path has no filename".into()))?;
    let bytes = std::fs::read(path)?;
    load_bytes(filename, &bytes)
}

/// Derive a human-readable category from a policy filename:
/// `leave_policy.txt` becomes `Leave`, `work_from_home.md` becomes
/// `Work From Home`.
pub fn derive_category(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    let stem = stem.strip_suffix("_policy").unwrap_or(stem);

    stem.split('_')
        .filter(|word| !word.is_empty())
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => {
            first.to_uppercase().collect::<String>()
                + &chars.as_str().to_lowercase()
        }
        None => String::new(),
    }
}
