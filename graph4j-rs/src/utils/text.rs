//! Text processing utilities.

use regex::Regex;
use std::sync::OnceLock;

static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();
static TOKEN_RE: OnceLock<Regex> = OnceLock::new();

fn whitespace_re() -> &'static Regex {
    WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("static regex is valid"))
}

fn token_re() -> &'static Regex {
    TOKEN_RE.get_or_init(|| Regex::new(r"[\p{L}\p{N}]+").expect("static regex is valid"))
}

/// Collapse runs of whitespace into a single space and trim both ends.
pub fn normalize_whitespace(s: &str) -> String {
    whitespace_re().replace_all(s, " ").trim().to_string()
}

/// Lowercased alphanumeric tokens, deduplicated, in first-seen order.
pub fn keyword_tokens(s: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for m in token_re().find_iter(s) {
        let token = m.as_str().to_lowercase();
        if !out.contains(&token) {
            out.push(token);
        }
    }
    out
}

/// Truncate to at most `max_len` characters, ending in `"..."` when cut.
/// Counts chars, not bytes.
pub fn truncate_with_ellipsis(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return ".".repeat(max_len);
    }
    let kept: String = s.chars().take(max_len - 3).collect();
    format!("{kept}...")
}

/// Escape Lucene query syntax so user text can be handed to a Neo4j full-text index.
///
/// Escapes `+ - ! ( ) { } [ ] ^ " ~ * ? : \ /` and the operators `&&` and `||`.
pub fn lucene_sanitize(s: &str) -> String {
    const SPECIAL: &[char] = &[
        '+', '-', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\', '/',
    ];

    let mut out = String::with_capacity(s.len() * 2);
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if (c == '&' || c == '|') && chars.peek() == Some(&c) {
            chars.next();
            out.push('\\');
            out.push(c);
            out.push(c);
            continue;
        }
        if SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
