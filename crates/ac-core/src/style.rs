//! Terminal styling helpers with NO_COLOR support.

use std::io::IsTerminal;

/// Check if color output is enabled: stdout is a terminal and `NO_COLOR`
/// is unset.
pub fn color_enabled() -> bool {
    std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Dim,
    Bold,
    Red,
    Green,
    Yellow,
    Cyan,
}

impl Tone {
    fn code(self) -> &'static str {
        match self {
            Tone::Dim => "\x1b[2m",
            Tone::Bold => "\x1b[1m",
            Tone::Red => "\x1b[31m",
            Tone::Green => "\x1b[32m",
            Tone::Yellow => "\x1b[33m",
            Tone::Cyan => "\x1b[36m",
        }
    }
}

/// Terminal style helper that respects NO_COLOR.
#[derive(Debug, Clone, Copy)]
pub struct Style {
    enabled: bool,
}

impl Default for Style {
    fn default() -> Self {
        Self::new()
    }
}

impl Style {
    pub fn new() -> Self {
        Self {
            enabled: color_enabled(),
        }
    }

    /// Style for a stream other than stdout, given whether it is a terminal.
    pub fn for_terminal(is_terminal: bool) -> Self {
        Self {
            enabled: is_terminal && std::env::var_os("NO_COLOR").is_none(),
        }
    }

    /// Create a style with colors explicitly enabled (for tests).
    pub fn force_enabled() -> Self {
        Self { enabled: true }
    }

    /// Create a style with colors explicitly disabled.
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Wrap `text` in the escape codes for `tone`.
    pub fn paint(&self, tone: Tone, text: &str) -> String {
        if self.enabled {
            format!("{}{text}\x1b[0m", tone.code())
        } else {
            text.to_string()
        }
    }
}

/// Width of the terminal on stdout, or 80 when unknown.
pub fn term_width() -> usize {
    crossterm::terminal::size()
        .map(|(w, _)| usize::from(w))
        .unwrap_or(80)
}

/// Shorten `s` to at most `max` characters, ending in `...` when cut.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max <= 3 {
        return s.chars().take(max).collect();
    }
    let mut out: String = s.chars().take(max - 3).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_paint_is_plain() {
        let style = Style::disabled();
        assert_eq!(style.paint(Tone::Red, "oops"), "oops");
        assert!(!style.is_enabled());
    }

    #[test]
    fn enabled_paint_wraps_codes() {
        let style = Style::force_enabled();
        assert_eq!(style.paint(Tone::Dim, "x"), "\x1b[2mx\x1b[0m");
        assert_eq!(style.paint(Tone::Red, "x"), "\x1b[31mx\x1b[0m");
        assert_eq!(style.paint(Tone::Cyan, ""), "\x1b[36m\x1b[0m");
    }

    #[test]
    fn truncate_short_is_unchanged() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 5), "hello");
    }

    #[test]
    fn truncate_long_adds_ellipsis() {
        assert_eq!(truncate("hello world", 8), "hello...");
    }

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate("日本語のテキスト", 6), "日本語...");
        assert_eq!(truncate("abcdef", 2), "ab");
    }
}
