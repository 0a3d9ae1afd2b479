//! Suggestion service backed by an OpenAI-compatible chat completion API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{SuggestionResponse, SuggestionService, Suggestions, TerminalContext, MAX_SUGGESTIONS};
use crate::config::SuggestionConfig;
use crate::error::SessionError;

const SYSTEM_PROMPT: &str = r#"You complete shell commands for a user working in a terminal.
You receive a JSON object with these fields:
- viewport: the lines currently visible in the terminal, separated by newlines.
- currentLine: what the user has typed so far. Your suggestions are appended to it.
- additionalContext: extra information about the terminal, possibly empty.

Answer with a JSON object and nothing else:
- suggestions: an array of 1 to 5 strings that continue currentLine, most likely first.
- observation: one sentence on what you think the user is trying to do.

Example input:
{"viewport": "modified:   src/App.tsx\nUntracked files:", "currentLine": "gi", "additionalContext": ""}
Example answer:
{"suggestions": ["t add .", "t status", "t commit -am \"update\""], "observation": "The user is about to stage and commit changes."}"#;

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Queries a chat completion endpoint for command suggestions.
pub struct OpenAiSuggestions {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl OpenAiSuggestions {
    pub fn new(api_base: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    /// Build from config, reading the key from the configured environment
    /// variable. Returns `None` when no key is set.
    pub fn from_config(config: &SuggestionConfig) -> Option<Self> {
        let api_key = std::env::var(&config.api_key_env).ok()?;
        if api_key.trim().is_empty() {
            return None;
        }
        Some(Self::new(&config.api_base, &api_key, &config.model))
    }
}

fn query_failed(message: impl std::fmt::Display) -> SessionError {
    SessionError::QueryFailed(message.to_string())
}

/// Parse the model's reply, tolerating a surrounding markdown code fence.
pub fn parse_completion(content: &str) -> Result<Suggestions, SessionError> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);

    let response: SuggestionResponse = serde_json::from_str(body.trim())
        .map_err(|e| query_failed(format!("malformed response: {e}")))?;
    Suggestions::try_from(response)
}

#[async_trait]
impl SuggestionService for OpenAiSuggestions {
    async fn query(&self, context: TerminalContext) -> Result<Suggestions, SessionError> {
        let user_content = serde_json::to_string(&context).map_err(query_failed)?;
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(query_failed)?;

        let status = response.status();
        if !status.is_success() {
            return Err(query_failed(format!("API returned {status}")));
        }

        let completion: ChatResponse = response.json().await.map_err(query_failed)?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| query_failed("response had no content"))?;

        debug!(len = content.len(), max = MAX_SUGGESTIONS, "completion received");
        parse_completion(&content)
    }
}
