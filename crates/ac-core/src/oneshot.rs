//! Non-interactive mode: send one message, stream the reply, exit.
//!
//! The reply goes to stdout as it arrives. Tool activity and errors go to
//! stderr so the reply can be piped.

use std::future::Future;
use std::io::{IsTerminal, Write};

use ac_backend::{ChatClient, ChatStream, IngestEvent};
use ac_protocol::{ChatRequest, Role};
use futures::StreamExt;
use tracing::debug;

use crate::display::{tools_line, Notice};
use crate::state::AppState;
use crate::style::{Style, Tone};
use crate::turn::ChatTurn;

/// Exit code after Ctrl-C.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Where one-shot output goes: reply text to `out`, status to `err`.
pub struct OneShotOutput<O: Write, E: Write> {
    out: O,
    err: E,
    style: Style,
    at_line_start: bool,
}

impl<O: Write, E: Write> OneShotOutput<O, E> {
    pub fn new(out: O, err: E, style: Style) -> Self {
        Self {
            out,
            err,
            style,
            at_line_start: true,
        }
    }

    pub fn emit_text(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
        self.at_line_start = text.ends_with('\n');
    }

    pub fn emit_tool(&mut self, tool: &str) {
        let _ = writeln!(
            self.err,
            "{}",
            self.style.paint(Tone::Dim, &format!("[tool: {tool}]"))
        );
    }

    pub fn emit_tools_used(&mut self, tools: &[String]) {
        let _ = writeln!(self.err, "{}", tools_line(&self.style, tools));
    }

    pub fn emit_notice(&mut self, notice: &Notice) {
        let _ = writeln!(self.err, "{}", notice.render(&self.style));
    }

    /// End the reply with a newline if it did not have one.
    pub fn finish(&mut self) {
        if !self.at_line_start {
            let _ = writeln!(self.out);
            self.at_line_start = true;
        }
        let _ = self.out.flush();
    }

    pub fn into_inner(self) -> (O, E) {
        (self.out, self.err)
    }
}

/// Stream `request`'s reply into `output` until it ends or `interrupt`
/// resolves. Returns the process exit code.
pub async fn consume<O, E, F>(
    request: &ChatRequest,
    mut stream: ChatStream,
    output: &mut OneShotOutput<O, E>,
    interrupt: F,
) -> i32
where
    O: Write,
    E: Write,
    F: Future<Output = ()>,
{
    let (mut state, mut turn) = ChatTurn::begin(
        AppState::new(request.session_id.clone(), request.mode),
        request,
    );
    let mut failed = false;
    tokio::pin!(interrupt);

    loop {
        let event = tokio::select! {
            event = stream.next() => event,
            () = &mut interrupt => {
                stream.cancel();
                output.finish();
                output.emit_notice(&Notice::error("cancelled"));
                return EXIT_INTERRUPTED;
            }
        };
        let Some(event) = event else {
            break;
        };

        if let IngestEvent::Chunk(chunk) = &event {
            if let Some(tool) = &chunk.tool {
                output.emit_tool(tool);
            }
            if chunk.error_message().is_none() {
                if let Some(text) = chunk.chunk.as_deref() {
                    output.emit_text(text);
                }
            }
        }

        let (next, notice) = turn.apply(state, event);
        state = next;
        if let Some(notice) = notice {
            output.finish();
            output.emit_notice(&notice);
            failed = true;
        }
    }

    output.finish();
    if let Some(last) = state.last_message().filter(|m| m.role == Role::Assistant) {
        if !last.tools_used.is_empty() {
            output.emit_tools_used(&last.tools_used);
        }
    }

    if failed {
        1
    } else {
        0
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Send one message and print the reply. Returns the exit code.
pub async fn run_oneshot(client: &ChatClient, request: ChatRequest) -> i32 {
    debug!(session = %request.session_id, mode = %request.mode, "one-shot message");
    let style = Style::for_terminal(std::io::stderr().is_terminal());
    let mut output = OneShotOutput::new(std::io::stdout(), std::io::stderr(), style);
    let stream = client.stream_chat(&request);
    consume(&request, stream, &mut output, ctrl_c()).await
}
