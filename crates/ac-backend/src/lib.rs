//! ac-backend: HTTP client for the agent backend.
//!
//! This crate talks to the chat service: the streaming chat endpoint, with
//! incremental event-stream ingestion and cancellation, plus the session,
//! MCP server, LLM config, health and tools endpoints.

pub mod client;
pub mod error;
pub mod ingest;
pub mod mock;
pub mod sse;

pub use client::{ChatClient, DEFAULT_BASE_URL};
pub use error::BackendError;
pub use ingest::{drive, CancelHandle, ChatStream, IngestEvent, StreamHandler};
pub use mock::{MockBody, MockPart};
