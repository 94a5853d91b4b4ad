//! Runtime settings, read from the environment once at startup.
//!
//! Provider endpoints and models are configuration, not code paths: the
//! same pipeline serves whichever OpenAI-compatible embedding and chat
//! services the environment points it at.

use std::{fmt::Display, str::FromStr};

use crate::error::{Error, Result};

/// Default embedding endpoint (OpenAI-compatible).
const DEFAULT_EMBEDDING_API_BASE: &str = "https://api.openai.com/v1";
/// Default chat-completions endpoint (Groq speaks the OpenAI dialect).
const DEFAULT_LLM_API_BASE: &str = "https://api.groq.com/openai/v1";
/// Default base URL of the messaging channel's send API.
const DEFAULT_GRAPH_API_BASE: &str = "https://graph.facebook.com/v17.0";

#[derive(Debug, Clone)]
pub struct Settings {
    /// Optional API key required on /ask and /ingest (`API_KEY`).
    /// When unset the check is skipped entirely.
    pub api_key: Option<String>,
    /// Name of the persisted chunk index (`VECTORSTORE_NAME`).
    pub vectorstore_name: String,
    pub embedding_api_base: String,
    pub embedding_api_key: Option<String>,
    pub embedding_model: String,
    pub llm_api_base: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Results scoring below this cosine similarity are discarded.
    pub score_threshold: f32,
    pub default_top_k: usize,
    pub max_top_k: usize,
    /// Messaging-channel bridge settings; None when the webhook is not
    /// configured (routes then reject inbound traffic).
    pub webhook: Option<WebhookSettings>,
}

#[derive(Debug, Clone)]
pub struct WebhookSettings {
    /// Token echoed back during webhook subscription (`WHATSAPP_VERIFY_TOKEN`).
    pub verify_token: String,
    /// Secret for the HMAC-SHA256 signature over raw request bodies
    /// (`WHATSAPP_APP_SECRET`).
    pub app_secret: String,
    /// Sender identity for outbound replies (`WHATSAPP_PHONE_ID`). Replies
    /// are logged instead of sent when unset.
    pub phone_id: Option<String>,
    /// Bearer token for the send API (`WHATSAPP_TOKEN`).
    pub access_token: Option<String>,
    pub graph_api_base: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let webhook = match (
            env_var("WHATSAPP_VERIFY_TOKEN"),
            env_var("WHATSAPP_APP_SECRET"),
        ) {
            (Some(verify_token), Some(app_secret)) => Some(WebhookSettings {
                verify_token,
                app_secret,
                phone_id: env_var("WHATSAPP_PHONE_ID"),
                access_token: env_var("WHATSAPP_TOKEN"),
                graph_api_base: env_var("GRAPH_API_BASE")
                    .unwrap_or_else(|| DEFAULT_GRAPH_API_BASE.to_string()),
            }),
            _ => None,
        };

        Ok(Self {
            api_key: env_var("API_KEY"),
            vectorstore_name: env_var("VECTORSTORE_NAME")
                .unwrap_or_else(|| "company-policies".to_string()),
            embedding_api_base: env_var("EMBEDDING_API_BASE")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_API_BASE.to_string()),
            embedding_api_key: env_var("OPENAI_API_KEY"),
            embedding_model: env_var("EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            llm_api_base: env_var("LLM_API_BASE")
                .unwrap_or_else(|| DEFAULT_LLM_API_BASE.to_string()),
            llm_api_key: env_var("GROQ_API_KEY"),
            llm_model: env_var("LLM_MODEL")
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            chunk_size: env_parse("CHUNK_SIZE", 1000)?,
            chunk_overlap: env_parse("CHUNK_OVERLAP", 200)?,
            score_threshold: env_parse("SCORE_THRESHOLD", 0.10)?,
            default_top_k: env_parse("DEFAULT_TOP_K", 5)?,
            max_top_k: env_parse("MAX_TOP_K", 20)?,
            webhook,
        })
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env_var(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e| {
            Error::Config(format!("invalid value for {name}: {e}"))
        }),
    }
}
