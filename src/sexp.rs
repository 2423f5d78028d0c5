//! Helpers for the s-expression status surface.

/// Escape a string for embedding inside a quoted s-expression literal.
pub fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Quoted, escaped string literal.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", escape_string(s))
}
