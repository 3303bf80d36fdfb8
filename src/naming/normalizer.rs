//! Output filename policy for processed documents.
//!
//! Mentions (`@name`) are stripped, bracketed fragments are kept only when
//! they look like a quality or episode marker (`[720p]`, `[E05]`, matched
//! case-insensitively), whitespace is collapsed and the configured tag
//! prefix is prepended. Brackets are matched in place, so kept markers stay
//! where they were in the original name.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static MENTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@\S+").expect("mention pattern is valid"));
// Innermost pairs only; a stray `[` or `]` is left as literal text.
static BRACKET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\[\]]*)\]").expect("bracket pattern is valid"));
static MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:\d+p|e\d+)$").expect("marker pattern is valid"));
static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Splits at the last `.`; the extension keeps its dot.
///
/// Leading dots belong to the stem, so `.hidden` has no extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(index) if name[..index].chars().any(|ch| ch != '.') => {
            (&name[..index], &name[index..])
        }
        _ => (name, ""),
    }
}

pub fn is_marker(interior: &str) -> bool {
    MARKER_RE.is_match(interior)
}

fn clean_stem(stem: &str) -> String {
    let without_mentions = MENTION_RE.replace_all(stem, "");
    let without_noise = BRACKET_RE.replace_all(&without_mentions, |caps: &Captures| {
        if is_marker(&caps[1]) {
            caps[0].to_string()
        } else {
            String::new()
        }
    });
    WHITESPACE_RE
        .replace_all(&without_noise, " ")
        .trim()
        .to_string()
}

/// Builds the output filename for `original_name`.
///
/// Never fails: empty input, a missing extension and malformed brackets all
/// produce a deterministic name. Not idempotent, running it on its own output
/// prepends `tag_prefix` again.
pub fn normalize(original_name: &str, tag_prefix: &str) -> String {
    let (stem, extension) = split_extension(original_name);
    let stem = clean_stem(stem);
    if stem.is_empty() {
        return format!("{}{}", tag_prefix.trim_end(), extension);
    }
    format!("{tag_prefix}{stem}{extension}")
}
