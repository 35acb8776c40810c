//! Chat-completions client behind the `/ai` command.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::BotConfig;

/// Replies are cut to stay under Discord's 2000 character message limit.
pub const REPLY_LIMIT: usize = 1900;

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI API error: {0}")]
    Api(String),

    #[error("AI API returned no answer")]
    EmptyResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl ChatResponse {
    pub fn into_reply(self) -> Result<String, ChatError> {
        if let Some(error) = self.error {
            return Err(ChatError::Api(error.to_string()));
        }

        self.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(ChatError::EmptyResponse)
    }
}

#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    system_prompt: String,
}

impl ChatClient {
    /// Builds a client when an API key is configured; `None` disables `/ai`.
    pub fn from_config(config: &BotConfig) -> Result<Option<Self>, ChatError> {
        let Some(api_key) = config.ai_api_key.clone() else {
            return Ok(None);
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Some(ChatClient {
            http,
            api_url: config.ai_api_url.clone(),
            api_key,
            model: config.ai_model.clone(),
            system_prompt: config.ai_system_prompt.clone(),
        }))
    }

    pub fn messages(&self, user_message: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: "system",
                content: self.system_prompt.clone(),
            },
            ChatMessage {
                role: "user",
                content: user_message.to_string(),
            },
        ]
    }

    pub async fn ask(&self, user_message: &str) -> Result<String, ChatError> {
        let messages = self.messages(user_message);
        let request = ChatRequest {
            model: &self.model,
            messages: &messages,
            max_tokens: 1024,
            temperature: 0.7,
            top_p: 0.7,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        };

        debug!("Sending chat request to {} with model {}", self.api_url, self.model);
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("AI API answered {}: {}", status, body);
            return Err(ChatError::Api(format!("status {}", status)));
        }

        response.json::<ChatResponse>().await?.into_reply()
    }
}

/// Cuts `text` to [`REPLY_LIMIT`] characters, marking the cut with `...`.
pub fn truncate_reply(text: &str) -> String {
    if text.chars().count() <= REPLY_LIMIT {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(REPLY_LIMIT).collect();
    cut.push_str("...");
    cut
}
