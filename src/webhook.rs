//! Messaging-channel bridge (WhatsApp-style webhook).
//!
//! Inbound traffic is trusted only after its HMAC-SHA256 signature over
//! the raw request body checks out; verification happens before any JSON
//! parsing and the comparison is constant time. Verified messages are fed
//! through the retrieval pipeline and the answer is relayed back through
//! the channel's send API.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;

use crate::{
    config::WebhookSettings,
    embedding::EmbeddingProvider,
    error::{Error, Result},
    generate::AnswerGenerator,
    schemas::{AskRequest, AskResponse},
    server::{ApiError, AppState},
};

type HmacSha256 = Hmac<Sha256>;

/// Fixed fallback sent when the pipeline fails for an inbound message.
const FALLBACK: &str =
    "Sorry, something went wrong. Please contact HR: hr@company.com";

/// Runtime webhook state: subscription token, signing secret, and the
/// outbound sender (absent when send credentials are not configured, in
/// which case replies are logged and dropped).
pub struct WebhookState {
    pub verify_token: String,
    pub app_secret: String,
    pub sender: Option<ChannelSender>,
}

impl WebhookState {
    pub fn from_settings(
        settings: &WebhookSettings,
        http: reqwest::Client,
    ) -> Self {
        let sender = match (&settings.phone_id, &settings.access_token) {
            (Some(phone_id), Some(token)) => Some(ChannelSender {
                http,
                api_base: settings.graph_api_base.clone(),
                phone_id: phone_id.clone(),
                access_token: token.clone(),
            }),
            _ => None,
        };
        Self {
            verify_token: settings.verify_token.clone(),
            app_secret: settings.app_secret.clone(),
            sender,
        }
    }
}

/// Client for the channel's Graph-style send API.
pub struct ChannelSender {
    http: reqwest::Client,
    api_base: String,
    phone_id: String,
    access_token: String,
}

impl ChannelSender {
    pub async fn send_text(&self, to: &str, body: &str) -> Result<()> {
        let response = self
            .http
            .post(format!(
                "{}/{}/messages",
                self.api_base, self.phone_id
            ))
            .bearer_auth(&self.access_token)
            .json(&json!({
                "messaging_product": "whatsapp",
                "to": to,
                "type": "text",
                "text": {"body": body},
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Config(format!(
                "channel send API returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Check the keyed hash over the raw body against the signature header
/// (`sha256=<hex>`). Constant-time comparison; any malformed input fails
/// closed.
pub fn verify_signature(
    app_secret: &str,
    body: &[u8],
    header: Option<&str>,
) -> bool {
    if app_secret.is_empty() {
        return false;
    }
    let Some(header) = header else {
        return false;
    };
    let hex_digest = header.strip_prefix("sha256=").unwrap_or(header);
    let Ok(claimed) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(app_secret.as_bytes())
    else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&claimed).is_ok()
}

// -- Inbound payload (the subset of the channel's event envelope we read) --

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    #[serde(default)]
    value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
struct ChangeValue {
    #[serde(default)]
    messages: Vec<InboundMessage>,
}

#[derive(Debug, Deserialize)]
struct InboundMessage {
    from: String,
    #[serde(default)]
    text: Option<MessageText>,
}

#[derive(Debug, Deserialize)]
struct MessageText {
    body: String,
}

/// Flatten the event envelope into (sender, question) pairs, skipping
/// non-text and empty messages.
fn extract_messages(payload: &WebhookPayload) -> Vec<(String, String)> {
    payload
        .entry
        .iter()
        .flat_map(|entry| &entry.changes)
        .flat_map(|change| &change.value.messages)
        .filter_map(|msg| {
            let body = msg.text.as_ref()?.body.trim();
            (!body.is_empty())
                .then(|| (msg.from.clone(), body.to_string()))
        })
        .collect()
}

/// Answer text relayed back to the sender, with the first citation's
/// document id appended when one exists.
fn reply_text(answer: &AskResponse) -> String {
    match answer.citations.first() {
        Some(citation) => {
            format!("{}\n\nSource: {}", answer.answer, citation.doc_id)
        }
        None => answer.answer.clone(),
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    challenge: Option<String>,
    #[serde(default)]
    verify_token: Option<String>,
}

/// `GET /webhook`: subscription handshake. Echoes the challenge as an
/// integer when the mode is `subscribe` and the token matches.
pub async fn verify<E, G>(
    State(state): State<Arc<AppState<E, G>>>,
    Query(params): Query<VerifyParams>,
) -> std::result::Result<String, ApiError>
where
    E: EmbeddingProvider + Send + Sync + 'static,
    G: AnswerGenerator + Send + Sync + 'static,
{
    let Some(webhook) = &state.webhook else {
        return Err(Error::Config("webhook is not configured".into()).into());
    };

    if params.mode.as_deref() == Some("subscribe")
        && params.verify_token.as_deref()
            == Some(webhook.verify_token.as_str())
    {
        let challenge: i64 = params
            .challenge
            .as_deref()
            .unwrap_or_default()
            .parse()
            .map_err(|_| {
                Error::Validation("challenge must be an integer".into())
            })?;
        return Ok(challenge.to_string());
    }

    Err(Error::Validation("webhook verification failed".into()).into())
}

/// `POST /webhook`: verified inbound messages are answered through the
/// pipeline and relayed back; a pipeline failure sends the fixed fallback
/// instead. The webhook caller always gets `{"status":"processed"}` once
/// the payload is verified and parsed.
pub async fn inbound<E, G>(
    State(state): State<Arc<AppState<E, G>>>,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<Json<serde_json::Value>, ApiError>
where
    E: EmbeddingProvider + Send + Sync + 'static,
    G: AnswerGenerator + Send + Sync + 'static,
{
    let Some(webhook) = &state.webhook else {
        return Err(Error::Config("webhook is not configured".into()).into());
    };

    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok());
    if !verify_signature(&webhook.app_secret, &body, signature) {
        return Err(Error::Auth("invalid webhook signature").into());
    }

    let payload: WebhookPayload =
        serde_json::from_slice(&body).map_err(|e| {
            Error::Validation(format!("unreadable webhook payload: {e}"))
        })?;

    for (from, question) in extract_messages(&payload) {
        let request = AskRequest {
            question,
            filters: None,
            top_k: None,
            follow_up_context: None,
        };
        let reply = match state.pipeline.ask(&request).await {
            Ok(answer) => reply_text(&answer),
            Err(e) => {
                tracing::error!(error = %e, "pipeline failed for inbound message");
                FALLBACK.to_string()
            }
        };

        match &webhook.sender {
            Some(sender) => {
                if let Err(e) = sender.send_text(&from, &reply).await {
                    tracing::error!(error = %e, to = %from, "reply delivery failed");
                }
            }
            None => {
                tracing::warn!(to = %from, "channel sender not configured; dropping reply");
            }
        }
    }

    Ok(Json(json!({"status": "processed"})))
}
