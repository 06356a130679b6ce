//! Text rendering for the terminal front end.
//!
//! Every function here returns a `String` so output can be checked in tests
//! without a terminal.

use std::fmt::Write as _;

use ac_protocol::{HealthStatus, LlmConfigResponse, McpServer, Role, ToolsInfo};
use jiff::tz::TimeZone;
use jiff::Timestamp;

use crate::state::{AppState, Message, DEFAULT_SESSION_ID};
use crate::style::{truncate, Style, Tone};

/// A user-facing notification raised by a turn or a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Error(String),
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self::Success(message.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    pub fn render(&self, style: &Style) -> String {
        match self {
            Notice::Success(msg) => style.paint(Tone::Green, &format!("✓ {msg}")),
            Notice::Error(msg) => style.paint(Tone::Red, &format!("✗ {msg}")),
        }
    }
}

/// Human label for a session id.
pub fn session_label(session_id: &str) -> &str {
    if session_id == DEFAULT_SESSION_ID {
        "Default"
    } else {
        session_id
    }
}

pub fn prompt(style: &Style, state: &AppState) -> String {
    format!(
        "{} {} ",
        style.paint(
            Tone::Dim,
            &format!("[{} · {}]", session_label(&state.current_session_id), state.mode)
        ),
        style.paint(Tone::Bold, "›")
    )
}

fn clock(timestamp: Timestamp, tz: &TimeZone) -> String {
    timestamp.to_zoned(tz.clone()).strftime("%H:%M:%S").to_string()
}

/// Header line printed above an assistant reply as it starts streaming.
pub fn reply_header(style: &Style) -> String {
    style.paint(Tone::Bold, &style.paint(Tone::Cyan, "assistant"))
}

fn render_message_in(style: &Style, message: &Message, tz: &TimeZone) -> String {
    let who = match message.role {
        Role::User => style.paint(Tone::Green, "you"),
        Role::Assistant => style.paint(Tone::Cyan, "assistant"),
    };
    let mut out = format!(
        "{} {}\n{}\n",
        style.paint(Tone::Bold, &who),
        style.paint(Tone::Dim, &clock(message.timestamp, tz)),
        message.content.trim_end()
    );
    if !message.tools_used.is_empty() {
        out.push_str(&tools_line(style, &message.tools_used));
        out.push('\n');
    }
    out
}

pub fn render_message(style: &Style, message: &Message) -> String {
    render_message_in(style, message, &TimeZone::system())
}

/// `Tools used: a, b`, dimmed.
pub fn tools_line(style: &Style, tools: &[String]) -> String {
    style.paint(Tone::Dim, &format!("Tools used: {}", tools.join(", ")))
}

/// Conversation history. Empty assistant messages are not shown.
pub fn render_history(style: &Style, state: &AppState) -> String {
    let visible: Vec<&Message> = state
        .messages
        .iter()
        .filter(|m| m.role == Role::User || !m.content.trim().is_empty())
        .collect();

    if visible.is_empty() {
        return style.paint(
            Tone::Dim,
            "Start a conversation: send a message to begin chatting with the agent.\n",
        );
    }

    let tz = TimeZone::system();
    visible
        .into_iter()
        .map(|m| render_message_in(style, m, &tz))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_sessions(style: &Style, state: &AppState) -> String {
    if state.sessions_loading {
        return style.paint(Tone::Dim, "Loading sessions...\n");
    }
    if state.sessions.is_empty() {
        return style.paint(Tone::Dim, "No sessions yet\n");
    }

    let mut out = String::new();
    for session in &state.sessions {
        let current = session.session_id == state.current_session_id;
        let marker = if current { "*" } else { " " };
        let label = session_label(&session.session_id);
        let label = if current {
            style.paint(Tone::Bold, label)
        } else {
            label.to_string()
        };
        let _ = writeln!(
            out,
            "{marker} {label} {}",
            style.paint(Tone::Dim, &format!("({} messages)", session.message_count))
        );
    }
    out
}

pub fn render_health(style: &Style, health: Option<&HealthStatus>) -> String {
    let Some(health) = health else {
        return style.paint(Tone::Dim, "Checking...");
    };

    let tone = if health.is_healthy() {
        Tone::Green
    } else {
        Tone::Red
    };
    let rag = if health.rag_available { "on" } else { "off" };
    format!(
        "{} {} • {} MCP servers {}",
        style.paint(tone, "●"),
        health.status,
        health.mcp_servers,
        style.paint(Tone::Dim, &format!("(v{}, RAG {rag})", health.version))
    )
}

pub fn render_servers(style: &Style, servers: &[McpServer]) -> String {
    if servers.is_empty() {
        return style.paint(Tone::Dim, "No MCP servers configured\n");
    }

    let width = servers.iter().map(|s| s.name.chars().count()).max().unwrap_or(0);
    let mut out = String::new();
    for server in servers {
        let key = if server.has_api_key {
            style.paint(Tone::Dim, " [api key]")
        } else {
            String::new()
        };
        let _ = writeln!(out, "  {:<width$}  {}{key}", server.name, server.url);
    }
    out
}

pub fn render_llm_config(style: &Style, config: Option<&LlmConfigResponse>) -> String {
    let Some(config) = config else {
        return style.paint(Tone::Dim, "LLM configuration not loaded\n");
    };

    let mut out = String::new();
    let _ = writeln!(out, "  provider  {}", config.provider);
    let _ = writeln!(out, "  model     {}", config.model);
    if let Some(has_key) = config.has_api_key {
        let _ = writeln!(out, "  api key   {}", if has_key { "set" } else { "not set" });
    }
    if let Some(url) = &config.base_url {
        let _ = writeln!(out, "  base url  {url}");
    }
    if let Some(url) = &config.api_base {
        let _ = writeln!(out, "  api base  {url}");
    }
    out
}

pub fn render_tools(style: &Style, tools: &ToolsInfo, width: usize) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}", style.paint(Tone::Bold, "Local tools"));
    if tools.local_tools.is_empty() {
        let _ = writeln!(out, "  {}", style.paint(Tone::Dim, "none"));
    }
    for tool in &tools.local_tools {
        let prefix = format!("  {} ", tool.name);
        let room = width.saturating_sub(prefix.chars().count());
        let _ = writeln!(
            out,
            "{prefix}{}",
            style.paint(Tone::Dim, &truncate(&tool.description, room))
        );
    }

    let _ = writeln!(out, "{}", style.paint(Tone::Bold, "MCP servers"));
    if tools.mcp_servers.is_empty() {
        let _ = writeln!(out, "  {}", style.paint(Tone::Dim, "none"));
    }
    for server in &tools.mcp_servers {
        let tone = if server.status == "connected" {
            Tone::Green
        } else {
            Tone::Yellow
        };
        let _ = writeln!(
            out,
            "  {} {} {}",
            server.name,
            style.paint(Tone::Dim, &server.url),
            style.paint(tone, &server.status)
        );
    }
    out
}

pub const HELP: &str = "\
Commands:
  /help                          Show this help
  /quit                          Exit
  /new                           Start a new session
  /sessions                      List sessions
  /switch <id>                   Switch to a session
  /delete <id>                   Delete a session
  /mode [agent|rag]              Show or set the chat mode
  /clear                         Clear the visible conversation
  /history                       Show the conversation
  /health                        Check backend health
  /tools                         List available tools
  /servers                       List MCP servers
  /server add <name> <url> [key] Register an MCP server
  /server update <name> <url> [key]
                                 Update an MCP server
  /server rm <name>              Remove an MCP server
  /llm                           Show the LLM configuration
  /llm set <provider> <model> [api_key=..] [base_url=..] [api_base=..]
                                 Change the LLM provider
Anything else is sent as a chat message. Ctrl-C cancels a streaming reply.
";
