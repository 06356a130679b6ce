//! ac-core: Terminal front end for agentchat.
//!
//! Application state and its transitions, the chat-turn controller, slash
//! commands, rendering, the interactive REPL and one-shot mode. Exposed as a
//! library for integration testing.

pub mod command;
pub mod config;
pub mod display;
pub mod logging;
pub mod oneshot;
pub mod repl;
pub mod state;
pub mod style;
pub mod turn;
