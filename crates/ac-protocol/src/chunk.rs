//! Streamed response chunks.

use serde::{Deserialize, Deserializer, Serialize};

/// One `data:` payload of a streamed chat response.
///
/// Every field is optional on the wire; unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamChunk {
    /// Incremental assistant text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,
    /// Set on the final payload of a successful response. `null` reads as
    /// false.
    #[serde(
        default,
        deserialize_with = "null_as_false",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub done: bool,
    /// Name of a tool the agent is invoking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// All tools used during the turn, usually sent with `done`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_used: Option<Vec<String>>,
    /// Error reported by the backend itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            chunk: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn done() -> Self {
        Self {
            done: true,
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// The backend-reported error, if it is non-empty.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }

    /// True when no further payloads should be read after this one.
    pub fn is_terminal(&self) -> bool {
        self.done || self.error_message().is_some()
    }
}

fn null_as_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}
