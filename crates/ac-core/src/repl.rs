use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

use ac_backend::{ChatClient, IngestEvent};
use ac_protocol::{HealthStatus, Role};
use futures::StreamExt;
use jiff::Timestamp;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::command::Command;
use crate::config::Config;
use crate::display::{self, Notice};
use crate::state::{new_session_id, update, Action, AppState};
use crate::style::{term_width, Style, Tone};
use crate::turn::{prepare, ChatTurn};

/// Input to the REPL loop, fed by the stdin reader, the health poller and
/// the Ctrl-C listener.
#[derive(Debug)]
pub enum Event {
    Line(String),
    Eof,
    /// Result of a background health check.
    Health(Result<HealthStatus, String>),
    Interrupt,
}

enum Flow {
    Continue,
    Quit,
}

pub struct Repl<W: Write> {
    client: ChatClient,
    state: AppState,
    style: Style,
    out: W,
    max_message_chars: usize,
    /// Lines typed while a reply was streaming.
    pending: VecDeque<String>,
    eof: bool,
    needs_prompt: bool,
    at_line_start: bool,
}

impl<W: Write> Repl<W> {
    pub fn new(
        client: ChatClient,
        state: AppState,
        style: Style,
        out: W,
        max_message_chars: usize,
    ) -> Self {
        Self {
            client,
            state,
            style,
            out,
            max_message_chars,
            pending: VecDeque::new(),
            eof: false,
            needs_prompt: true,
            at_line_start: true,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn into_output(self) -> W {
        self.out
    }

    fn dispatch(&mut self, action: Action) {
        self.state = update(std::mem::take(&mut self.state), action);
    }

    fn print(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
        if !text.is_empty() {
            self.at_line_start = text.ends_with('\n');
        }
    }

    fn println(&mut self, text: &str) {
        self.end_line();
        self.print(text);
        if !self.at_line_start {
            self.print("\n");
        }
    }

    fn end_line(&mut self) {
        if !self.at_line_start {
            self.print("\n");
        }
    }

    fn notify(&mut self, notice: Notice) {
        let line = notice.render(&self.style);
        self.println(&line);
    }

    /// Print the banner and load the session list and current session.
    pub async fn start(&mut self) {
        let banner = format!(
            "agentchat {} · {}",
            env!("CARGO_PKG_VERSION"),
            self.client.base_url()
        );
        let banner = self.style.paint(Tone::Bold, &banner);
        self.println(&banner);
        let hint = self.style.paint(Tone::Dim, "Type /help for commands.");
        self.println(&hint);

        self.load_sessions().await;
        self.load_current_session().await;
        if !self.state.messages.is_empty() {
            let history = display::render_history(&self.style, &self.state);
            self.println(&history);
        }
    }

    async fn load_sessions(&mut self) {
        self.dispatch(Action::SessionsLoading);
        match self.client.list_sessions().await {
            Ok(sessions) => self.dispatch(Action::SessionsLoaded(sessions)),
            Err(e) => {
                warn!(error = %e, "failed to load sessions");
                self.dispatch(Action::SessionsLoadFailed);
            }
        }
    }

    async fn load_current_session(&mut self) {
        self.dispatch(Action::SetLoading(true));
        let session_id = self.state.current_session_id.clone();
        match self.client.get_session(&session_id).await {
            Ok(info) => self.dispatch(Action::SessionLoaded(info)),
            Err(e) => {
                warn!(session = %session_id, error = %e, "failed to load session");
                self.dispatch(Action::SessionLoadFailed);
            }
        }
    }

    fn on_health(&mut self, result: Result<HealthStatus, String>) {
        let health = match result {
            Ok(health) => health,
            Err(e) => {
                warn!(error = %e, "health check failed");
                return;
            }
        };

        let was = self.state.health.as_ref().map(HealthStatus::is_healthy);
        let now = health.is_healthy();
        self.dispatch(Action::HealthLoaded(health));
        let changed = match was {
            Some(was) => was != now,
            None => !now,
        };
        if changed {
            let line = display::render_health(&self.style, self.state.health.as_ref());
            self.println(&line);
            self.needs_prompt = true;
        }
    }

    /// Read and execute lines until `/quit`, end of input or Ctrl-C at the
    /// prompt.
    pub async fn run(&mut self, events: &mut mpsc::Receiver<Event>) {
        loop {
            let line = match self.pending.pop_front() {
                Some(line) => line,
                None => {
                    if self.eof {
                        break;
                    }
                    if self.needs_prompt {
                        let prompt = display::prompt(&self.style, &self.state);
                        self.end_line();
                        self.print(&prompt);
                        self.needs_prompt = false;
                    }
                    match events.recv().await {
                        Some(Event::Line(line)) => {
                            // The terminal echoed the newline.
                            self.at_line_start = true;
                            line
                        }
                        Some(Event::Health(result)) => {
                            self.on_health(result);
                            continue;
                        }
                        Some(Event::Interrupt | Event::Eof) | None => break,
                    }
                }
            };
            self.needs_prompt = true;

            match Command::parse(&line) {
                Ok(None) => {}
                Ok(Some(command)) => {
                    if let Flow::Quit = self.execute(command, events).await {
                        break;
                    }
                }
                Err(e) => self.notify(Notice::error(e.to_string())),
            }
        }
        self.end_line();
    }

    async fn execute(&mut self, command: Command, events: &mut mpsc::Receiver<Event>) -> Flow {
        match command {
            Command::Help => self.println(display::HELP),
            Command::Quit => return Flow::Quit,
            Command::NewSession => self.new_session(),
            Command::Sessions => {
                self.load_sessions().await;
                let list = display::render_sessions(&self.style, &self.state);
                self.println(&list);
            }
            Command::Switch(id) => self.switch_session(id).await,
            Command::Delete(id) => self.delete_session(id).await,
            Command::Mode(None) => {
                let line = format!("mode: {}", self.state.mode);
                self.println(&line);
            }
            Command::Mode(Some(mode)) => {
                self.dispatch(Action::SetMode(mode));
                self.notify(Notice::success(format!("Mode set to {mode}")));
            }
            Command::Clear => {
                self.dispatch(Action::ClearMessages);
                self.notify(Notice::success("Conversation cleared"));
            }
            Command::History => {
                let history = display::render_history(&self.style, &self.state);
                self.println(&history);
            }
            Command::Health => match self.client.health().await {
                Ok(health) => {
                    self.dispatch(Action::HealthLoaded(health));
                    let line = display::render_health(&self.style, self.state.health.as_ref());
                    self.println(&line);
                }
                Err(e) => self.notify(Notice::error(format!("Health check failed: {e}"))),
            },
            Command::Tools => match self.client.tools_info().await {
                Ok(tools) => {
                    let text = display::render_tools(&self.style, &tools, term_width());
                    self.println(&text);
                }
                Err(e) => self.notify(Notice::error(format!("Failed to load tools: {e}"))),
            },
            Command::Servers => self.show_servers().await,
            Command::ServerAdd(server) => {
                match self.client.add_mcp_server(&server).await {
                    Ok(_) => self.notify(Notice::success("MCP server added")),
                    Err(e) => self.notify(Notice::error(format!("Failed to add server: {e}"))),
                }
                self.show_servers().await;
            }
            Command::ServerUpdate(server) => {
                match self.client.update_mcp_server(&server.name, &server).await {
                    Ok(_) => self.notify(Notice::success("MCP server updated")),
                    Err(e) => self.notify(Notice::error(format!("Failed to update server: {e}"))),
                }
                self.show_servers().await;
            }
            Command::ServerRemove(name) => {
                match self.client.delete_mcp_server(&name).await {
                    Ok(()) => self.notify(Notice::success("MCP server deleted")),
                    Err(e) => self.notify(Notice::error(format!("Failed to delete server: {e}"))),
                }
                self.show_servers().await;
            }
            Command::Llm => match self.client.get_llm_config().await {
                Ok(config) => {
                    self.dispatch(Action::LlmConfigLoaded(config));
                    let text = display::render_llm_config(&self.style, self.state.llm_config.as_ref());
                    self.println(&text);
                }
                Err(e) => self.notify(Notice::error(format!("Failed to load LLM config: {e}"))),
            },
            Command::LlmSet(config) => match self.client.set_llm_config(&config).await {
                Ok(change) => {
                    self.dispatch(Action::LlmConfigLoaded(change.config));
                    self.notify(Notice::success("LLM configuration saved"));
                }
                Err(e) => self.notify(Notice::error(format!("Failed to save config: {e}"))),
            },
            Command::Message(text) => self.chat(&text, events).await,
        }
        Flow::Continue
    }

    fn new_session(&mut self) {
        let id = new_session_id(Timestamp::now());
        self.dispatch(Action::NewSession(id.clone()));
        self.notify(Notice::success(format!("Started session {id}")));
    }

    async fn switch_session(&mut self, id: String) {
        if id == self.state.current_session_id {
            let line = format!("Already in session {}", display::session_label(&id));
            self.println(&line);
            return;
        }
        self.dispatch(Action::SwitchSession(id));
        self.load_current_session().await;
        let label = display::session_label(&self.state.current_session_id).to_string();
        self.notify(Notice::success(format!("Switched to {label}")));
        let history = display::render_history(&self.style, &self.state);
        self.println(&history);
    }

    async fn delete_session(&mut self, id: String) {
        match self.client.delete_session(&id).await {
            Ok(()) => {
                self.notify(Notice::success("Session deleted"));
                if id == self.state.current_session_id {
                    self.new_session();
                }
                self.load_sessions().await;
            }
            Err(e) => self.notify(Notice::error(format!("Failed to delete session: {e}"))),
        }
    }

    async fn show_servers(&mut self) {
        match self.client.list_mcp_servers().await {
            Ok(servers) => {
                self.dispatch(Action::McpServersLoaded(servers));
                let text = display::render_servers(&self.style, &self.state.mcp_servers);
                self.println(&text);
            }
            Err(e) => self.notify(Notice::error(format!("Failed to load MCP servers: {e}"))),
        }
    }

    /// Send one message and stream the reply. Ctrl-C cancels; lines typed
    /// meanwhile are queued.
    async fn chat(&mut self, input: &str, events: &mut mpsc::Receiver<Event>) {
        let request = match prepare(&self.state, input, self.max_message_chars) {
            Ok(request) => request,
            Err(e) => {
                self.notify(Notice::error(e.to_string()));
                return;
            }
        };

        debug!(session = %request.session_id, mode = %request.mode, "sending message");
        let (state, mut turn) = ChatTurn::begin(std::mem::take(&mut self.state), &request);
        self.state = state;
        let mut stream = self.client.stream_chat(&request);
        let header = display::reply_header(&self.style);
        self.println(&header);

        loop {
            tokio::select! {
                event = stream.next() => {
                    let Some(event) = event else {
                        break;
                    };
                    self.show_progress(&event);
                    let (state, notice) = turn.apply(std::mem::take(&mut self.state), event);
                    self.state = state;
                    if let Some(notice) = notice {
                        self.notify(notice);
                    }
                }
                event = events.recv(), if !self.eof => match event {
                    Some(Event::Interrupt) => {
                        stream.cancel();
                        self.state = turn.cancel(std::mem::take(&mut self.state));
                        self.notify(Notice::error("cancelled"));
                        return;
                    }
                    Some(Event::Line(line)) => self.pending.push_back(line),
                    Some(Event::Health(result)) => self.on_health(result),
                    Some(Event::Eof) | None => self.eof = true,
                },
            }
        }

        self.end_line();
        let tools = self
            .state
            .last_message()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.tools_used.clone())
            .unwrap_or_default();
        if !tools.is_empty() {
            let line = display::tools_line(&self.style, &tools);
            self.println(&line);
        }
    }

    fn show_progress(&mut self, event: &IngestEvent) {
        let IngestEvent::Chunk(chunk) = event else {
            return;
        };
        if let Some(tool) = &chunk.tool {
            let line = self.style.paint(Tone::Dim, &format!("[tool: {tool}]"));
            self.println(&line);
        }
        if chunk.error_message().is_none() {
            if let Some(text) = chunk.chunk.as_deref() {
                self.print(text);
            }
        }
    }
}

/// Forward stdin lines on a dedicated thread; blocking reads stay off the
/// runtime.
fn spawn_stdin_reader(tx: mpsc::Sender<Event>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.blocking_send(Event::Line(line)).is_err() {
                return;
            }
        }
        let _ = tx.blocking_send(Event::Eof);
    });
}

fn spawn_health_poll(client: ChatClient, every: Duration, tx: mpsc::Sender<Event>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let result = client.health().await.map_err(|e| e.to_string());
            if tx.send(Event::Health(result)).await.is_err() {
                return;
            }
        }
    });
}

fn spawn_interrupt_listener(tx: mpsc::Sender<Event>) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(Event::Interrupt).await.is_err() {
                return;
            }
        }
    });
}

/// Run the interactive chat on the terminal.
pub async fn run_repl(config: &Config, client: ChatClient, state: AppState) {
    let (tx, mut rx) = mpsc::channel(64);
    spawn_stdin_reader(tx.clone());
    spawn_health_poll(client.clone(), config.health.poll_interval(), tx.clone());
    spawn_interrupt_listener(tx);

    let mut repl = Repl::new(
        client,
        state,
        Style::new(),
        io::stdout(),
        config.chat.max_message_chars,
    );
    repl.start().await;
    repl.run(&mut rx).await;
}
