//! Prompt assembly: the fixed grounding instruction plus the retrieved
//! context block.

use crate::index::ScoredChunk;

/// The designed refusal content for questions the context cannot answer.
/// This is a normal, successful answer, not an error.
pub const REFUSAL: &str = "I don't have that in policy, contact HR.";

/// Standing disclaimer attached to every answer.
pub const DISCLAIMER: &str =
    "If your contract specifies otherwise, the contract prevails.";

/// Each chunk's text is hard-cut to this many characters before it enters
/// the context block, to bound prompt size. The cut is character-based,
/// not sentence-aware.
pub const CONTEXT_CHUNK_CHARS: usize = 1000;

/// The fixed system instruction for grounded answering.
pub const SYSTEM_PROMPT: &str = "\
You are a precise HR policy assistant. Answer only from the provided policy context.
- Cite at least one source section with its doc id and section header.
- If the answer is not clearly in the context, say exactly: \"I don't have that in policy, contact HR.\"
- Do not make up any answer.
- Keep the answer under 200 words unless asked for details.";

/// A generator-ready prompt: fixed instructions plus the per-question
/// user turn.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Assemble the prompt from the question, optional follow-up context, and
/// the retrieved chunks in rank order.
pub fn build_prompt(
    question: &str,
    follow_up_context: Option<&str>,
    chunks: &[ScoredChunk],
) -> Prompt {
    let context = chunks
        .iter()
        .map(|hit| {
            format!(
                "[{} | {}]\n{}",
                hit.chunk.doc_id,
                hit.chunk.heading,
                cut_chars(&hit.chunk.text, CONTEXT_CHUNK_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut user = String::new();
    if let Some(previous) = follow_up_context {
        user.push_str("Previous conversation context:\n");
        user.push_str(previous);
        user.push_str("\n\n");
    }
    user.push_str("Context:\n");
    user.push_str(&context);
    user.push_str("\n\nQuestion: ");
    user.push_str(question);

    Prompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}

/// Hard character cut, safe on multi-byte UTF-8.
pub fn cut_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
