//! ac-protocol: Wire types shared by the agentchat crates.
//!
//! This crate defines the JSON payloads exchanged with the agent backend:
//! chat requests, streamed chunks, sessions, and the settings surface
//! (MCP tool servers, LLM provider configuration, health, tools).

pub mod chat;
pub mod chunk;
pub mod session;
pub mod settings;

pub use chat::{ChatMode, ChatRequest, ChatResponse};
pub use chunk::StreamChunk;
pub use session::{Role, Session, SessionInfo, SessionMessage};
pub use settings::{
    HealthStatus, LlmConfig, LlmConfigChange, LlmConfigResponse, LlmProvider, LocalTool,
    McpServer, McpServerChange, McpServerRequest, McpServerStatus, ToolsInfo,
};
