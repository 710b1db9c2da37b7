use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

static SENTENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)([^.!?]+[.!?]+)|([^.!?]+$)").expect("sentence pattern is valid")
});

static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\d+[.)]|[-*•])\s*").expect("list marker pattern is valid")
});

/// Splits narration into sentence-aligned chunks of at most `max_chars`
/// for the voice-synthesis stage. A single sentence longer than `max_chars`
/// stays whole.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let sentences: Vec<&str> = SENTENCE
        .find_iter(text)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .collect();
    if sentences.is_empty() {
        if text.trim().is_empty() {
            return Vec::new();
        }
        warn!("No sentence breaks found; returning whole text as one chunk");
        return vec![text.trim().to_string()];
    }
    let mut chunks = Vec::new();
    let mut current = String::new();
    for s in sentences {
        if current.is_empty() {
            current.push_str(s);
        } else if current.len() + 1 + s.len() <= max_chars {
            current.push(' ');
            current.push_str(s);
        } else {
            chunks.push(std::mem::take(&mut current));
            current.push_str(s);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// One title per non-empty line, with list numbering and bullets removed.
pub fn parse_list_lines(text: &str, limit: usize) -> Vec<String> {
    text.lines()
        .map(|line| LIST_MARKER.replace(line, "").trim().trim_matches('"').trim().to_string())
        .filter(|line| !line.is_empty())
        .take(limit)
        .collect()
}

/// File-name friendly form of a title.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() { "untitled".to_string() } else { slug }
}
