//! AI command suggestions.
//!
//! The coalescer turns the bursty stream of terminal snapshots into at most
//! one outstanding query per session; the service answers those queries.

pub mod coalescer;
pub mod openai;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

pub use coalescer::{CoalescerEvent, SuggestionCoalescer, SuggestionUpdate};
pub use openai::OpenAiSuggestions;

/// Most suggestions a single answer may carry.
pub const MAX_SUGGESTIONS: usize = 5;

/// What the AI gets to see of a terminal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalContext {
    /// Visible lines, newline separated.
    pub viewport: String,
    /// Text the user is currently typing; suggestions are appended to it.
    pub current_line: String,
    /// Anything else worth knowing, may be empty.
    pub additional_context: String,
}

/// Raw answer shape expected from the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionResponse {
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub observation: String,
}

/// A validated answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestions {
    /// Most likely first, between one and [`MAX_SUGGESTIONS`] entries.
    pub items: Vec<String>,
    /// What the model thinks the user is doing.
    pub observation: String,
    pub received_at: DateTime<Utc>,
}

impl TryFrom<SuggestionResponse> for Suggestions {
    type Error = SessionError;

    fn try_from(response: SuggestionResponse) -> Result<Self, Self::Error> {
        let mut items: Vec<String> = response
            .suggestions
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .collect();
        if items.is_empty() {
            return Err(SessionError::QueryFailed(
                "response contained no suggestions".to_string(),
            ));
        }
        items.truncate(MAX_SUGGESTIONS);

        Ok(Self {
            items,
            observation: response.observation,
            received_at: Utc::now(),
        })
    }
}

/// The AI query contract.
#[async_trait]
pub trait SuggestionService: Send + Sync {
    async fn query(&self, context: TerminalContext) -> Result<Suggestions, SessionError>;
}
