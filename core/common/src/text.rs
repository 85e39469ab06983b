//! Text normalization helpers: slugs, keys and plain text.
//!
//! All functions here are total: any input produces a (possibly empty)
//! normalized output, never an error.

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

static RE_SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").unwrap()
});
static RE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>?").unwrap());
static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static RE_DASHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").unwrap());

/// Remove every markup tag, dropping `script`/`style` bodies entirely.
pub fn strip_tags(input: &str) -> String {
    let without_blocks = RE_SCRIPT_STYLE.replace_all(input, "");
    RE_TAG.replace_all(&without_blocks, "").into_owned()
}

/// Reduce arbitrary input to a single line of plain text.
///
/// Tags are stripped, whitespace runs collapse to one space, and the
/// result is trimmed.
pub fn sanitize_text(input: &str) -> String {
    let stripped = strip_tags(input);
    RE_WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// Normalize an identifier-like key (status names, type names).
///
/// Lowercases and keeps only `[a-z0-9_-]`.
pub fn sanitize_key(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect()
}

/// Turn free text into a URL-safe slug.
///
/// Accented letters are transliterated to their base letter, separators
/// (whitespace, `.`, `/`) become dashes, any other non-ASCII or punctuation
/// is dropped, and dash runs collapse.
pub fn slugify(input: &str) -> String {
    let stripped = strip_tags(input);
    let mut out = String::with_capacity(stripped.len());

    for c in stripped.nfkd().filter(|c| !is_combining_mark(*c)) {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if c == '-' || c == '_' {
            out.push(c);
        } else if c.is_whitespace() || c == '.' || c == '/' {
            out.push('-');
        }
    }

    RE_DASHES.replace_all(&out, "-").trim_matches('-').to_string()
}
