use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GeminiConfig;
use crate::error::QueryError;

/// Appended to every question.
pub const PERSONA_PROMPT: &str = "You are Goku from DragonballZ. Give a very brief reply with no fluff. Always speak in the style of Goku.";

/// Telegram rejects messages longer than this many characters.
pub const MAX_REPLY_CHARS: usize = 4096;

const ELLIPSIS: &str = "...";

/// Anything that can answer a free-text question in character.
#[async_trait]
pub trait PersonaQuery: Send + Sync {
    async fn ask(&self, question: &str) -> Result<String, QueryError>;
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

/// Cut `text` down to Telegram's limit, marking the cut with an ellipsis.
/// Counts characters, not bytes.
pub fn truncate_reply(text: String) -> String {
    if text.chars().count() <= MAX_REPLY_CHARS {
        return text;
    }
    let keep = MAX_REPLY_CHARS - ELLIPSIS.chars().count();
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

/// Gemini `generateContent` client.
pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(client: reqwest::Client, config: GeminiConfig) -> Self {
        Self { client, config }
    }

    /// One-shot generation for a single prompt.
    pub async fn generate(&self, prompt: &str) -> Result<String, QueryError> {
        if self.config.api_key.is_empty() {
            return Err(QueryError::Config);
        }

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );

        debug!("Sending request to Gemini: {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QueryError::Upstream { status, body });
        }

        let parsed: GenerateContentResponse = response.json().await?;
        let text = parsed.text();
        if text.is_empty() {
            return Err(QueryError::EmptyResponse);
        }

        Ok(text)
    }
}

#[async_trait]
impl PersonaQuery for GeminiClient {
    async fn ask(&self, question: &str) -> Result<String, QueryError> {
        let prompt = format!("{} {}", question, PERSONA_PROMPT);
        let text = self.generate(&prompt).await?;
        Ok(truncate_reply(text))
    }
}
