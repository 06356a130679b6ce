use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use ac_backend::ChatClient;
use ac_core::config::{config_path, Config};
use ac_core::oneshot::run_oneshot;
use ac_core::repl::run_repl;
use ac_core::state::AppState;
use ac_core::{logging, turn};
use ac_protocol::ChatMode;
use clap::Parser;
use tracing::warn;

/// Terminal chat client for an AI agent backend.
#[derive(Debug, Parser)]
#[command(name = "agentchat", version)]
struct Cli {
    /// Message to send. Without one, and with nothing piped on stdin, an
    /// interactive session starts.
    message: Vec<String>,

    /// Backend base URL.
    #[arg(long, env = "AGENTCHAT_API_BASE_URL")]
    base_url: Option<String>,

    /// Chat mode: agent or rag.
    #[arg(long)]
    mode: Option<ChatMode>,

    /// Session to use.
    #[arg(long)]
    session: Option<String>,

    /// Config file (default: $XDG_CONFIG_HOME/agentchat/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,
}

/// The message from the command line, else from piped stdin.
fn read_message(args: &[String]) -> Option<String> {
    if !args.is_empty() {
        return Some(args.join(" "));
    }
    if io::stdin().is_terminal() {
        return None;
    }
    let mut buf = String::new();
    if io::stdin().read_to_string(&mut buf).is_ok() && !buf.trim().is_empty() {
        Some(buf)
    } else {
        None
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(config_path);
    let loaded = Config::load(&path);
    let mut config = loaded.as_ref().cloned().unwrap_or_default();
    logging::init(&config.logging.filter);
    if let Err(e) = &loaded {
        warn!("{e}; using defaults");
    }

    if let Some(base_url) = cli.base_url {
        config.backend.base_url = base_url;
    }
    if let Some(mode) = cli.mode {
        config.chat.default_mode = mode;
    }
    if let Some(session) = cli.session {
        config.chat.default_session = session;
    }

    let client = match ChatClient::with_connect_timeout(
        &config.backend.base_url,
        config.backend.connect_timeout(),
    ) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let state = AppState::new(config.chat.default_session.clone(), config.chat.default_mode);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    // One-shot mode
    if let Some(message) = read_message(&cli.message) {
        let request = match turn::prepare(&state, &message, config.chat.max_message_chars) {
            Ok(request) => request,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        };
        let code = runtime.block_on(run_oneshot(&client, request));
        return ExitCode::from(u8::try_from(code).unwrap_or(1));
    }

    runtime.block_on(run_repl(&config, client, state));
    ExitCode::SUCCESS
}
