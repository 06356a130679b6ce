//! Application state and its transitions.
//!
//! `AppState` is owned by the front end and passed by reference to the
//! renderers. Every change goes through [`update`], which consumes the old
//! state and returns the new one.

use ac_protocol::{
    ChatMode, HealthStatus, LlmConfigResponse, McpServer, Role, Session, SessionInfo,
};
use jiff::Timestamp;
use uuid::Uuid;

pub const DEFAULT_SESSION_ID: &str = "default";

/// One message in the visible conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: Timestamp,
    pub tools_used: Vec<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Timestamp::now(),
            tools_used: Vec::new(),
        }
    }

    fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    pub current_session_id: String,
    pub messages: Vec<Message>,
    pub is_loading: bool,
    pub is_streaming: bool,
    pub mode: ChatMode,
    pub sessions: Vec<Session>,
    pub sessions_loading: bool,
    pub mcp_servers: Vec<McpServer>,
    pub llm_config: Option<LlmConfigResponse>,
    /// Last health check result; `None` until the first check lands.
    pub health: Option<HealthStatus>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_ID, ChatMode::default())
    }
}

impl AppState {
    pub fn new(session_id: impl Into<String>, mode: ChatMode) -> Self {
        Self {
            current_session_id: session_id.into(),
            messages: Vec::new(),
            is_loading: false,
            is_streaming: false,
            mode,
            sessions: Vec::new(),
            sessions_loading: false,
            mcp_servers: Vec::new(),
            llm_config: None,
            health: None,
        }
    }

    /// True while a turn is in flight and new input must wait.
    pub fn is_busy(&self) -> bool {
        self.is_loading || self.is_streaming
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SwitchSession(String),
    NewSession(String),
    AddMessage { role: Role, content: String },
    AppendToAssistant(String),
    SetAssistantTools(Vec<String>),
    DropEmptyAssistant,
    ClearMessages,
    SetLoading(bool),
    SetStreaming(bool),
    SetMode(ChatMode),
    SessionsLoading,
    SessionsLoaded(Vec<Session>),
    SessionsLoadFailed,
    SessionLoaded(SessionInfo),
    SessionLoadFailed,
    McpServersLoaded(Vec<McpServer>),
    LlmConfigLoaded(LlmConfigResponse),
    HealthLoaded(HealthStatus),
}

/// Apply one action.
pub fn update(mut state: AppState, action: Action) -> AppState {
    match action {
        Action::SwitchSession(id) => {
            if id != state.current_session_id {
                state.current_session_id = id;
            }
        }
        Action::NewSession(id) => {
            state.current_session_id = id;
            state.messages.clear();
        }
        Action::AddMessage { role, content } => {
            state.messages.push(Message::new(role, content));
        }
        Action::AppendToAssistant(text) => match state.messages.last_mut() {
            Some(last) if last.is_assistant() => last.content.push_str(&text),
            _ if !text.is_empty() => state.messages.push(Message::new(Role::Assistant, text)),
            _ => {}
        },
        Action::SetAssistantTools(tools) => {
            if let Some(last) = state.messages.last_mut().filter(|m| m.is_assistant()) {
                last.tools_used = tools;
            }
        }
        Action::DropEmptyAssistant => {
            if state
                .messages
                .last()
                .is_some_and(|m| m.is_assistant() && m.content.is_empty())
            {
                state.messages.pop();
            }
        }
        Action::ClearMessages => state.messages.clear(),
        Action::SetLoading(loading) => state.is_loading = loading,
        Action::SetStreaming(streaming) => state.is_streaming = streaming,
        Action::SetMode(mode) => state.mode = mode,
        Action::SessionsLoading => state.sessions_loading = true,
        Action::SessionsLoaded(sessions) => {
            state.sessions = sessions;
            state.sessions_loading = false;
        }
        Action::SessionsLoadFailed => state.sessions_loading = false,
        Action::SessionLoaded(info) => {
            state.messages = info
                .messages
                .into_iter()
                .map(|m| Message::new(m.role, m.content))
                .collect();
            state.is_loading = false;
        }
        Action::SessionLoadFailed => {
            state.messages.clear();
            state.is_loading = false;
        }
        Action::McpServersLoaded(servers) => state.mcp_servers = servers,
        Action::LlmConfigLoaded(config) => state.llm_config = Some(config),
        Action::HealthLoaded(health) => state.health = Some(health),
    }
    state
}

/// Apply several actions in order.
pub fn update_all(state: AppState, actions: impl IntoIterator<Item = Action>) -> AppState {
    actions.into_iter().fold(state, update)
}

/// Id for a freshly created session: `session-{unix millis}`.
pub fn new_session_id(now: Timestamp) -> String {
    format!("session-{}", now.as_millisecond())
}
