//! One chat turn: from the user's input to the end of the streamed reply.

use ac_backend::IngestEvent;
use ac_protocol::{ChatRequest, Role, StreamChunk};
use thiserror::Error;

use crate::display::Notice;
use crate::state::{update, update_all, Action, AppState};

/// Why an input line was not sent.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TurnRejected {
    #[error("message is empty")]
    Empty,

    #[error("message is too long ({len} characters, limit is {max})")]
    TooLong { len: usize, max: usize },

    #[error("a reply is still streaming")]
    Busy,
}

/// Validate `input` and build the request for the current session and mode.
pub fn prepare(
    state: &AppState,
    input: &str,
    max_chars: usize,
) -> Result<ChatRequest, TurnRejected> {
    let message = input.trim();
    if message.is_empty() {
        return Err(TurnRejected::Empty);
    }
    let len = message.chars().count();
    if len > max_chars {
        return Err(TurnRejected::TooLong {
            len,
            max: max_chars,
        });
    }
    if state.is_busy() {
        return Err(TurnRejected::Busy);
    }
    Ok(ChatRequest::new(
        message,
        state.current_session_id.clone(),
        state.mode,
    ))
}

/// Folds one request's stream events into the application state.
#[derive(Debug, Default)]
pub struct ChatTurn {
    tools_seen: Vec<String>,
    received_content: bool,
}

fn settle() -> [Action; 2] {
    [Action::SetStreaming(false), Action::SetLoading(false)]
}

impl ChatTurn {
    /// Show the user's message with an empty assistant reply under it.
    pub fn begin(state: AppState, request: &ChatRequest) -> (AppState, Self) {
        let state = update_all(
            state,
            [
                Action::AddMessage {
                    role: Role::User,
                    content: request.message.clone(),
                },
                Action::AddMessage {
                    role: Role::Assistant,
                    content: String::new(),
                },
                Action::SetLoading(true),
                Action::SetStreaming(true),
            ],
        );
        (state, Self::default())
    }

    /// Tools announced so far, in order.
    pub fn tools_seen(&self) -> &[String] {
        &self.tools_seen
    }

    pub fn received_content(&self) -> bool {
        self.received_content
    }

    pub fn apply(&mut self, state: AppState, event: IngestEvent) -> (AppState, Option<Notice>) {
        match event {
            IngestEvent::Chunk(chunk) => self.apply_chunk(state, chunk),
            IngestEvent::Failed(e) => {
                let state = update(state, Action::DropEmptyAssistant);
                (
                    update_all(state, settle()),
                    Some(Notice::error(format!("Error: {e}"))),
                )
            }
            IngestEvent::Completed => (update_all(state, settle()), None),
        }
    }

    fn apply_chunk(&mut self, state: AppState, chunk: StreamChunk) -> (AppState, Option<Notice>) {
        if let Some(message) = chunk.error_message() {
            let notice = Notice::error(message);
            let state = update(state, Action::DropEmptyAssistant);
            return (update_all(state, settle()), Some(notice));
        }

        if let Some(tool) = chunk.tool {
            self.tools_seen.push(tool);
        }

        let mut state = state;
        if let Some(text) = chunk.chunk.filter(|t| !t.is_empty()) {
            self.received_content = true;
            state = update(state, Action::AppendToAssistant(text));
        }

        if chunk.done {
            state = update_all(state, settle());
            if !self.received_content {
                state = update(state, Action::DropEmptyAssistant);
            }
            let tools = match chunk.tools_used {
                Some(tools) if !tools.is_empty() => Some(tools),
                _ if !self.tools_seen.is_empty() => Some(self.tools_seen.clone()),
                _ => None,
            };
            if let Some(tools) = tools {
                state = update(state, Action::SetAssistantTools(tools));
            }
        }

        (state, None)
    }

    /// Abandon the turn after the caller cancelled it.
    pub fn cancel(self, state: AppState) -> AppState {
        let state = update(state, Action::DropEmptyAssistant);
        update_all(state, settle())
    }
}
