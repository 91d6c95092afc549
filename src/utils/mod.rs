//! Configuration and process-level utilities.

/// Tracing subscriber setup.
pub mod logging;
/// TOML configuration (`sokrat.toml`).
pub mod toml_config;

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
