//! Answer generator: turns an assembled prompt into free text.
//!
//! Like the embedding provider, this is a trait seam with an
//! OpenAI-compatible chat-completions client behind it (Groq serves the
//! same dialect). Generation runs at temperature 0 with no tool calling;
//! the completion is raw text, never structured output.

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    prompt::Prompt,
};

pub trait AnswerGenerator {
    fn complete(
        &self,
        prompt: &Prompt,
    ) -> impl Future<Output = Result<String>> + Send;
}

#[derive(Debug, Clone)]
pub struct ChatGenerator {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatGenerator {
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

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl AnswerGenerator for ChatGenerator {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: &self.model,
                temperature: 0.0,
                messages: [
                    ChatMessage {
                        role: "system",
                        content: &prompt.system,
                    },
                    ChatMessage {
                        role: "user",
                        content: &prompt.user,
                    },
                ],
            })
            .send()
            .await
            .map_err(|e| {
                Error::Generation(format!("completion request failed: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(Error::Generation(format!(
                "generator returned {}",
                response.status()
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            Error::Generation(format!("unreadable completion response: {e}"))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                Error::Generation("generator returned no completion".into())
            })
    }
}
