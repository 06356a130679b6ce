//! Chat request and response types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which backend behavior handles a message.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Tool-using agent.
    #[default]
    Agent,
    /// Retrieval-augmented generation.
    Rag,
}

impl ChatMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Rag => "rag",
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "agent" => Ok(Self::Agent),
            "rag" => Ok(Self::Rag),
            other => Err(format!("unknown mode '{other}' (expected agent or rag)")),
        }
    }
}

/// A single chat turn sent to the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: String,
    pub mode: ChatMode,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, session_id: impl Into<String>, mode: ChatMode) -> Self {
        Self {
            message: message.into(),
            session_id: session_id.into(),
            mode,
        }
    }
}

/// Reply to a non-streaming chat request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
    pub mode: String,
    #[serde(default)]
    pub tools_used: Vec<String>,
}
