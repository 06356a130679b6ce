//! Diagnostic logging setup.
//!
//! Logs go to stderr so a streamed reply on stdout stays clean.

use tracing_subscriber::EnvFilter;

/// Env var checked before `RUST_LOG`.
pub const LOG_ENV: &str = "AGENTCHAT_LOG";

/// Pick the filter directive: `AGENTCHAT_LOG`, then `RUST_LOG`, then the
/// configured one. Unparsable directives are skipped.
fn resolve_filter(
    app_env: Option<String>,
    rust_log: Option<String>,
    configured: &str,
) -> EnvFilter {
    [app_env, rust_log, Some(configured.to_string())]
        .into_iter()
        .flatten()
        .filter(|directive| !directive.trim().is_empty())
        .find_map(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init(configured: &str) {
    let filter = resolve_filter(
        std::env::var(LOG_ENV).ok(),
        std::env::var("RUST_LOG").ok(),
        configured,
    );

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}
