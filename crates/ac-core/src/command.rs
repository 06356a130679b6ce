//! Slash-command parsing for the REPL.

use ac_protocol::{ChatMode, LlmConfig, LlmProvider, McpServerRequest};
use thiserror::Error;

/// One line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    NewSession,
    Sessions,
    Switch(String),
    Delete(String),
    /// Show the mode, or switch to the given one.
    Mode(Option<ChatMode>),
    Clear,
    History,
    Health,
    Tools,
    Servers,
    ServerAdd(McpServerRequest),
    ServerUpdate(McpServerRequest),
    ServerRemove(String),
    Llm,
    LlmSet(LlmConfig),
    /// Not a command: send as a chat message.
    Message(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command: /{0} (try /help)")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("{0}")]
    Invalid(String),
}

const SWITCH_USAGE: &str = "/switch <session id>";
const DELETE_USAGE: &str = "/delete <session id>";
const MODE_USAGE: &str = "/mode [agent|rag]";
const SERVER_USAGE: &str = "/server add|update <name> <url> [api_key] | /server rm <name>";
const LLM_USAGE: &str = "/llm set <provider> <model> [api_key=..] [base_url=..] [api_base=..]";

impl Command {
    /// Parse a line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Ok(Some(Command::Message(trimmed.to_string())));
        };

        let mut words = rest.split_whitespace();
        let name = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();

        let command = match (name, args.as_slice()) {
            ("help" | "h" | "?", []) => Command::Help,
            ("quit" | "exit" | "q", []) => Command::Quit,
            ("new", []) => Command::NewSession,
            ("sessions", []) => Command::Sessions,
            ("switch", [id]) => Command::Switch((*id).to_string()),
            ("switch", _) => return Err(CommandError::Usage(SWITCH_USAGE)),
            ("delete", [id]) => Command::Delete((*id).to_string()),
            ("delete", _) => return Err(CommandError::Usage(DELETE_USAGE)),
            ("mode", []) => Command::Mode(None),
            ("mode", [mode]) => Command::Mode(Some(mode.parse().map_err(CommandError::Invalid)?)),
            ("mode", _) => return Err(CommandError::Usage(MODE_USAGE)),
            ("clear", []) => Command::Clear,
            ("history", []) => Command::History,
            ("health", []) => Command::Health,
            ("tools", []) => Command::Tools,
            ("servers", []) => Command::Servers,
            ("server", args) => parse_server(args)?,
            ("llm", []) => Command::Llm,
            ("llm", ["set", args @ ..]) => Command::LlmSet(parse_llm_set(args)?),
            ("llm", _) => return Err(CommandError::Usage(LLM_USAGE)),
            ("", _) => return Err(CommandError::Invalid("empty command (try /help)".into())),
            ("help" | "quit" | "new" | "sessions" | "clear" | "history" | "health" | "tools"
            | "servers", _) => {
                return Err(CommandError::Invalid(format!("/{name} takes no arguments")))
            }
            (other, _) => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

fn server_request(name: &str, url: &str, api_key: Option<&&str>) -> McpServerRequest {
    McpServerRequest {
        name: name.to_string(),
        url: url.to_string(),
        api_key: api_key.map(|k| (*k).to_string()),
    }
}

fn parse_server(args: &[&str]) -> Result<Command, CommandError> {
    match args {
        ["add", name, url, key @ ..] if key.len() <= 1 => {
            Ok(Command::ServerAdd(server_request(name, url, key.first())))
        }
        ["update", name, url, key @ ..] if key.len() <= 1 => {
            Ok(Command::ServerUpdate(server_request(name, url, key.first())))
        }
        ["rm" | "remove", name] => Ok(Command::ServerRemove((*name).to_string())),
        _ => Err(CommandError::Usage(SERVER_USAGE)),
    }
}

fn parse_llm_set(args: &[&str]) -> Result<LlmConfig, CommandError> {
    let [provider, model, options @ ..] = args else {
        return Err(CommandError::Usage(LLM_USAGE));
    };
    let provider: LlmProvider = provider.parse().map_err(CommandError::Invalid)?;
    let mut config = LlmConfig::new(provider, *model);

    for option in options {
        let Some((key, value)) = option.split_once('=') else {
            return Err(CommandError::Usage(LLM_USAGE));
        };
        let value = Some(value.to_string()).filter(|v| !v.is_empty());
        match key {
            "api_key" => config.api_key = value,
            "base_url" => config.base_url = value,
            "api_base" => config.api_base = value,
            other => {
                return Err(CommandError::Invalid(format!(
                    "unknown option '{other}' (expected api_key, base_url or api_base)"
                )))
            }
        }
    }
    Ok(config)
}
